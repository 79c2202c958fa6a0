//! Threshold Schedule (§4.3) — pure, time-decaying acceptance threshold.

#[derive(Debug, Clone, Copy)]
pub struct ThresholdConfig {
    pub initial: f64,
    pub min: f64,
    pub decay_rate: f64,
}

/// threshold(t) = max(min, initial - decay_rate * t)
pub fn threshold(elapsed_secs: f64, cfg: &ThresholdConfig) -> f64 {
    (cfg.initial - cfg.decay_rate * elapsed_secs).max(cfg.min)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_cfg() -> ThresholdConfig {
        ThresholdConfig {
            initial: 8.0,
            min: 3.0,
            decay_rate: 0.05,
        }
    }

    #[test]
    fn starts_at_initial() {
        assert_eq!(threshold(0.0, &default_cfg()), 8.0);
    }

    #[test]
    fn reaches_minimum_at_100_seconds() {
        assert!((threshold(100.0, &default_cfg()) - 3.0).abs() < 1e-9);
    }

    #[test]
    fn floors_at_minimum_past_100_seconds() {
        assert_eq!(threshold(500.0, &default_cfg()), 3.0);
    }

    #[test]
    fn s4_decay_at_60_seconds() {
        assert!((threshold(60.0, &default_cfg()) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn monotonically_non_increasing() {
        let cfg = default_cfg();
        let mut prev = threshold(0.0, &cfg);
        for t in (1..200).map(|i| i as f64) {
            let cur = threshold(t, &cfg);
            assert!(cur <= prev + 1e-12);
            assert!(cur >= cfg.min - 1e-12);
            assert!(cur <= cfg.initial + 1e-12);
            prev = cur;
        }
    }
}
