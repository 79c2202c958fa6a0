//! Rating Calculator (§4.1) — pure, deterministic ELO update.

use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    AWins,
    BWins,
    Draw,
}

impl Outcome {
    /// Derive the outcome from a non-negative integer score pair (§4.1).
    pub fn from_score(score_a: i32, score_b: i32) -> Result<Self, AppError> {
        if score_a < 0 || score_b < 0 {
            return Err(AppError::validation("score", "scores must be non-negative"));
        }
        Ok(match score_a.cmp(&score_b) {
            std::cmp::Ordering::Greater => Outcome::AWins,
            std::cmp::Ordering::Less => Outcome::BWins,
            std::cmp::Ordering::Equal => Outcome::Draw,
        })
    }

    fn actual_scores(self) -> (f64, f64) {
        match self {
            Outcome::AWins => (1.0, 0.0),
            Outcome::BWins => (0.0, 1.0),
            Outcome::Draw => (0.5, 0.5),
        }
    }
}

/// Expected score for A (and, by symmetry, 1 - result for B).
pub fn expected_score(rating_a: i32, rating_b: i32) -> f64 {
    1.0 / (1.0 + 10f64.powf((rating_b - rating_a) as f64 / 400.0))
}

/// Round half to even ("banker's rounding"), matching §4.1's rounding rule.
fn round_half_even(x: f64) -> i64 {
    let floor = x.floor();
    let diff = x - floor;
    let floor_i = floor as i64;
    if diff < 0.5 {
        floor_i
    } else if diff > 0.5 {
        floor_i + 1
    } else if floor_i % 2 == 0 {
        floor_i
    } else {
        floor_i + 1
    }
}

/// Apply the rating update for one match. Ratings are clamped at 0; K
/// defaults to 32 but is caller-supplied per the configured K-factor.
pub fn update_ratings(rating_a: i32, rating_b: i32, outcome: Outcome, k_factor: f64) -> (i32, i32) {
    let expected_a = expected_score(rating_a, rating_b);
    let expected_b = 1.0 - expected_a;
    let (actual_a, actual_b) = outcome.actual_scores();

    let new_a = round_half_even(rating_a as f64 + k_factor * (actual_a - expected_a));
    let new_b = round_half_even(rating_b as f64 + k_factor * (actual_b - expected_b));

    (new_a.max(0) as i32, new_b.max(0) as i32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s1_symmetric_win() {
        let (a, b) = update_ratings(1000, 1000, Outcome::AWins, 32.0);
        assert_eq!((a, b), (1016, 984));
    }

    #[test]
    fn s2_upset() {
        let (a, b) = update_ratings(1200, 1000, Outcome::BWins, 32.0);
        assert_eq!((a, b), (1176, 1024));
    }

    #[test]
    fn s3_draw_equal_ratings_unchanged() {
        let (a, b) = update_ratings(1100, 1100, Outcome::Draw, 32.0);
        assert_eq!((a, b), (1100, 1100));
    }

    #[test]
    fn outcome_from_score_rejects_negative() {
        assert!(Outcome::from_score(-1, 0).is_err());
    }

    #[test]
    fn outcome_from_score_derives_correctly() {
        assert_eq!(Outcome::from_score(11, 5).unwrap(), Outcome::AWins);
        assert_eq!(Outcome::from_score(5, 11).unwrap(), Outcome::BWins);
        assert_eq!(Outcome::from_score(3, 3).unwrap(), Outcome::Draw);
    }

    #[test]
    fn rating_conservation_within_rounding() {
        let (a, b) = update_ratings(1500, 1400, Outcome::AWins, 32.0);
        let delta_a = a - 1500;
        let delta_b = b - 1400;
        assert!((delta_a + delta_b).abs() <= 1);
    }

    #[test]
    fn clamped_at_zero() {
        let (a, _b) = update_ratings(5, 2000, Outcome::BWins, 32.0);
        assert!(a >= 0);
    }
}
