//! Generic request-field validators shared by the HTTP handlers.

use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Validates a UUID string, e.g. a path parameter.
pub fn validate_uuid(value: &str, field_name: &str) -> AppResult<Uuid> {
    value
        .parse::<Uuid>()
        .map_err(|_| AppError::validation(field_name, format!("invalid {field_name} format")))
}

/// Validates that a score pair (as submitted to `/match/finish`) is
/// non-negative; the precise outcome derivation lives in `rating::Outcome`.
pub fn validate_score(score: [i32; 2], field_name: &str) -> AppResult<()> {
    if score[0] < 0 || score[1] < 0 {
        return Err(AppError::validation(field_name, "scores must be non-negative"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_uuid_rejects_garbage() {
        assert!(validate_uuid("not-a-uuid", "user_id").is_err());
    }

    #[test]
    fn validate_uuid_accepts_valid() {
        let id = Uuid::new_v4();
        assert_eq!(validate_uuid(&id.to_string(), "user_id").unwrap(), id);
    }

    #[test]
    fn validate_score_rejects_negative() {
        assert!(validate_score([-1, 0], "score").is_err());
    }

    #[test]
    fn validate_score_accepts_non_negative() {
        assert!(validate_score([3, 1], "score").is_ok());
    }
}
