use std::env;

/// Immutable configuration snapshot, loaded once at startup and passed
/// into every component by `Arc`. Nothing downstream re-reads the
/// environment.
#[derive(Clone, Debug)]
pub struct Config {
    pub database_url: String,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub json_logging: bool,
    pub log_level: String,

    /// Comma-separated list of allowed CORS origins
    pub allowed_origins: Vec<String>,

    /// Seconds a ticket may wait before it is forcibly expired.
    pub matchmaking_timeout_secs: f64,
    /// Starting compatibility threshold at t=0.
    pub initial_compat_threshold: f64,
    /// Floor the threshold decays to.
    pub minimum_compat_threshold: f64,
    /// Threshold points shed per second of wait.
    pub decay_rate_per_second: f64,
    /// Interval between engine poll ticks.
    pub matchmaking_poll_interval_secs: f64,
    /// K-factor for the rating calculator.
    pub k_factor: f64,
    /// Base rating-proximity tolerance at t=0.
    pub base_skill_tolerance: f64,
    /// Tolerance points gained per second of wait.
    pub skill_relax_rate: f64,
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let allowed_origins = env::var("ALLOWED_ORIGINS")
            .map(|s| s.split(',').map(|o| o.trim().to_string()).collect())
            .unwrap_or_else(|_| vec!["http://localhost:3000".to_string()]);

        Ok(Config {
            database_url: env::var("DATABASE_URL")?,
            db_max_connections: env::var("DB_MAX_CONNECTIONS")
                .unwrap_or_else(|_| "10".to_string())
                .parse()
                .unwrap_or(10),
            db_min_connections: env::var("DB_MIN_CONNECTIONS")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2),
            db_acquire_timeout_secs: env::var("DB_ACQUIRE_TIMEOUT_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            json_logging: env::var("JSON_LOGGING")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            allowed_origins,

            matchmaking_timeout_secs: env::var("MATCHMAKING_TIMEOUT")
                .unwrap_or_else(|_| "60".to_string())
                .parse()
                .unwrap_or(60.0),
            initial_compat_threshold: env::var("INITIAL_COMPAT_THRESHOLD")
                .unwrap_or_else(|_| "8.0".to_string())
                .parse()
                .unwrap_or(8.0),
            minimum_compat_threshold: env::var("MINIMUM_COMPAT_THRESHOLD")
                .unwrap_or_else(|_| "3.0".to_string())
                .parse()
                .unwrap_or(3.0),
            decay_rate_per_second: env::var("DECAY_RATE_PER_SECOND")
                .unwrap_or_else(|_| "0.05".to_string())
                .parse()
                .unwrap_or(0.05),
            matchmaking_poll_interval_secs: env::var("MATCHMAKING_POLL_INTERVAL")
                .unwrap_or_else(|_| "2".to_string())
                .parse()
                .unwrap_or(2.0),
            k_factor: env::var("K_FACTOR")
                .unwrap_or_else(|_| "32".to_string())
                .parse()
                .unwrap_or(32.0),
            base_skill_tolerance: env::var("BASE_SKILL_TOLERANCE")
                .unwrap_or_else(|_| "50".to_string())
                .parse()
                .unwrap_or(50.0),
            skill_relax_rate: env::var("SKILL_RELAX_RATE")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/test");
        let cfg = Config::from_env().unwrap();
        assert_eq!(cfg.matchmaking_timeout_secs, 60.0);
        assert_eq!(cfg.initial_compat_threshold, 8.0);
        assert_eq!(cfg.minimum_compat_threshold, 3.0);
        assert_eq!(cfg.decay_rate_per_second, 0.05);
        assert_eq!(cfg.matchmaking_poll_interval_secs, 2.0);
        assert_eq!(cfg.k_factor, 32.0);
        assert_eq!(cfg.base_skill_tolerance, 50.0);
        assert_eq!(cfg.skill_relax_rate, 5.0);
    }
}
