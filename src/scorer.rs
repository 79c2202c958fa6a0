//! Compatibility Scorer (§4.2) — pure function producing a score in [0, 10].

/// Snapshot of a ticket's skill/preference data as of enqueue time, plus
/// its area tag. Opaque preference axes: any equal-length numeric vectors.
#[derive(Debug, Clone)]
pub struct TicketSnapshot {
    pub rating: i32,
    pub preferences: Vec<f64>,
    pub area: String,
}

/// Weights and constants from §4.2's defaults.
#[derive(Debug, Clone, Copy)]
pub struct ScorerConfig {
    pub base_skill_tolerance: f64,
    pub skill_relax_rate: f64,
}

const WEIGHT_SKILL: f64 = 0.5;
const WEIGHT_PREFERENCE: f64 = 0.3;
const WEIGHT_WAIT: f64 = 0.2;
/// Per-axis preference sensitivity: two axes 5 apart floor the sub-score at 0.
const PREFERENCE_SENSITIVITY: f64 = 2.0;

fn skill_tolerance(min_wait: f64, cfg: &ScorerConfig) -> f64 {
    cfg.base_skill_tolerance + cfg.skill_relax_rate * min_wait
}

fn skill_subscore(rating_a: i32, rating_b: i32, min_wait: f64, cfg: &ScorerConfig) -> f64 {
    let tolerance = skill_tolerance(min_wait, cfg);
    (10.0 - (rating_a - rating_b).abs() as f64 / tolerance).max(0.0)
}

fn preference_subscore(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 10.0;
    }
    let sum: f64 = a
        .iter()
        .zip(b.iter())
        .map(|(p, q)| (10.0 - PREFERENCE_SENSITIVITY * (p - q).abs()).clamp(0.0, 10.0))
        .sum();
    sum / a.len() as f64
}

/// Compute the compatibility score for a candidate pair, or `None` if
/// their areas differ (§4.2: "score is undefined and the pair is never
/// offered to the engine").
pub fn compatibility_score(
    a: &TicketSnapshot,
    wait_a: f64,
    b: &TicketSnapshot,
    wait_b: f64,
    cfg: &ScorerConfig,
) -> Option<f64> {
    if a.area != b.area {
        return None;
    }

    let min_wait = wait_a.min(wait_b);
    let s_skill = skill_subscore(a.rating, b.rating, min_wait, cfg);
    let s_pref = preference_subscore(&a.preferences, &b.preferences);
    let s_wait = 10.0 - ((wait_a - wait_b).abs() / 2.0).min(10.0);

    Some(WEIGHT_SKILL * s_skill + WEIGHT_PREFERENCE * s_pref + WEIGHT_WAIT * s_wait)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(rating: i32, area: &str) -> TicketSnapshot {
        TicketSnapshot {
            rating,
            preferences: vec![],
            area: area.to_string(),
        }
    }

    fn default_cfg() -> ScorerConfig {
        ScorerConfig {
            base_skill_tolerance: 50.0,
            skill_relax_rate: 5.0,
        }
    }

    #[test]
    fn different_areas_are_incompatible() {
        let a = snap(1000, "NA");
        let b = snap(1000, "EU");
        assert!(compatibility_score(&a, 0.0, &b, 0.0, &default_cfg()).is_none());
    }

    #[test]
    fn identical_tickets_score_ten() {
        let a = snap(1000, "NA");
        let b = snap(1000, "NA");
        let s = compatibility_score(&a, 10.0, &b, 10.0, &default_cfg()).unwrap();
        assert!((s - 10.0).abs() < 1e-9);
    }

    #[test]
    fn s4_threshold_decay_scenario() {
        let a = snap(1000, "NA");
        let b = snap(1400, "NA");
        let cfg = default_cfg();

        let s_t0 = compatibility_score(&a, 0.0, &b, 0.0, &cfg).unwrap();
        // skill subscore at t=0: max(0, 10 - 400/50) = 2 -> weighted 1.0, plus
        // wait balance 10 (identical waits) weighted 2.0, plus preference 10
        // weighted 3.0 => 6.0 total (well below initial threshold 8.0).
        assert!((s_t0 - 6.0).abs() < 1e-6);

        let s_t60 = compatibility_score(&a, 60.0, &b, 60.0, &cfg).unwrap();
        // tolerance(60) = 50 + 5*60 = 350; skill subscore ~= 10 - 400/350 ~= 8.857
        assert!(s_t60 > s_t0);
    }

    #[test]
    fn wait_balance_penalizes_mismatched_waits() {
        let a = snap(1000, "NA");
        let b = snap(1000, "NA");
        let balanced = compatibility_score(&a, 5.0, &b, 5.0, &default_cfg()).unwrap();
        let imbalanced = compatibility_score(&a, 0.0, &b, 20.0, &default_cfg()).unwrap();
        assert!(balanced > imbalanced);
    }

    #[test]
    fn preference_axes_reduce_score_with_distance() {
        let mut a = snap(1000, "NA");
        let mut b = snap(1000, "NA");
        a.preferences = vec![0.0, 0.0];
        b.preferences = vec![5.0, 5.0];
        let s = compatibility_score(&a, 10.0, &b, 10.0, &default_cfg()).unwrap();
        let a2 = TicketSnapshot {
            preferences: vec![0.0, 0.0],
            ..snap(1000, "NA")
        };
        let b2 = TicketSnapshot {
            preferences: vec![0.1, 0.1],
            ..snap(1000, "NA")
        };
        let s2 = compatibility_score(&a2, 10.0, &b2, 10.0, &default_cfg()).unwrap();
        assert!(s2 > s);
    }
}
