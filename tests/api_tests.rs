// Shape tests for the matchmaking API's request/response/event payloads.
// These assert the JSON contract in §6 without standing up a live server.

use serde_json;

#[cfg(test)]
mod match_request_tests {
    use super::*;

    #[test]
    fn test_match_request_shape() {
        let json = r#"{"user_id": "550e8400-e29b-41d4-a716-446655440000"}"#;
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(parsed["user_id"].is_string());
    }

    #[test]
    fn test_match_start_request_shape() {
        let json = r#"{
            "user_a": "550e8400-e29b-41d4-a716-446655440000",
            "user_b": "660e8400-e29b-41d4-a716-446655440000"
        }"#;
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(parsed["user_a"].is_string());
        assert!(parsed["user_b"].is_string());
    }

    #[test]
    fn test_match_finish_request_shape() {
        let json = r#"{
            "match_id": "550e8400-e29b-41d4-a716-446655440000",
            "score": [3, 1]
        }"#;
        let parsed: serde_json::Value = serde_json::from_str(json).unwrap();
        assert!(parsed["match_id"].is_string());
        assert!(parsed["score"].is_array());
        assert_eq!(parsed["score"].as_array().unwrap().len(), 2);
    }
}

#[cfg(test)]
mod match_response_tests {
    use super::*;

    #[test]
    fn test_matched_response_shape() {
        let resp = serde_json::json!({
            "status": "matched",
            "match_id": "550e8400-e29b-41d4-a716-446655440000",
        });
        assert_eq!(resp["status"], "matched");
        assert!(resp["match_id"].is_string());
    }

    #[test]
    fn test_expired_response_shape() {
        let resp = serde_json::json!({ "status": "expired" });
        assert_eq!(resp["status"], "expired");
        assert!(resp.get("match_id").is_none());
    }

    #[test]
    fn test_rating_delta_response_shape() {
        let resp = serde_json::json!({
            "rating_before": [1000, 1000],
            "rating_after": [1016, 984],
        });
        assert_eq!(resp["rating_before"].as_array().unwrap().len(), 2);
        assert_eq!(resp["rating_after"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_cancel_response_shape() {
        let resp = serde_json::json!({ "ok": true });
        assert_eq!(resp["ok"], true);
    }

    #[test]
    fn test_health_response_shape() {
        let resp = serde_json::json!({ "ok": true });
        assert_eq!(resp["ok"], true);
    }
}

#[cfg(test)]
mod sse_event_tests {
    use super::*;

    #[test]
    fn test_searching_event_shape() {
        let event = serde_json::json!({
            "type": "searching",
            "threshold": 6.5,
            "candidates": 3,
            "waited": 4.2,
        });
        assert_eq!(event["type"], "searching");
        assert!(event["threshold"].is_number());
        assert!(event["candidates"].is_number());
        assert!(event["waited"].is_number());
    }

    #[test]
    fn test_matched_event_shape() {
        let event = serde_json::json!({
            "type": "matched",
            "match_id": "550e8400-e29b-41d4-a716-446655440000",
        });
        assert_eq!(event["type"], "matched");
        assert!(event["match_id"].is_string());
    }

    #[test]
    fn test_expired_event_shape() {
        let event = serde_json::json!({ "type": "expired" });
        assert_eq!(event["type"], "expired");
    }

    #[test]
    fn test_cancelled_event_shape() {
        let event = serde_json::json!({ "type": "cancelled" });
        assert_eq!(event["type"], "cancelled");
    }

    #[test]
    fn test_event_sequence_terminates_with_terminal_type() {
        let sequence = vec![
            serde_json::json!({"type": "searching", "threshold": 8.0, "candidates": 0, "waited": 0.0}),
            serde_json::json!({"type": "searching", "threshold": 7.5, "candidates": 1, "waited": 2.0}),
            serde_json::json!({"type": "matched", "match_id": "550e8400-e29b-41d4-a716-446655440000"}),
        ];
        let terminal_types = ["matched", "expired", "cancelled"];
        let last = sequence.last().unwrap();
        assert!(terminal_types.contains(&last["type"].as_str().unwrap()));
        for event in &sequence[..sequence.len() - 1] {
            assert_eq!(event["type"], "searching");
        }
    }
}

#[cfg(test)]
mod error_response_tests {
    use super::*;

    #[test]
    fn test_validation_error_shape() {
        let err = serde_json::json!({
            "code": "VALIDATION_ERROR",
            "message": "invalid user_id format",
            "field": "user_id",
        });
        assert_eq!(err["code"], "VALIDATION_ERROR");
        assert!(err["field"].is_string());
    }

    #[test]
    fn test_conflict_error_shape() {
        let err = serde_json::json!({
            "code": "ALREADY_QUEUED",
            "message": "conflict",
        });
        assert_eq!(err["code"], "ALREADY_QUEUED");
        assert!(err.get("field").is_none());
    }

    #[test]
    fn test_not_found_error_shape() {
        let err = serde_json::json!({
            "code": "NOT_FOUND",
            "message": "match not found: 550e8400-e29b-41d4-a716-446655440000",
        });
        assert_eq!(err["code"], "NOT_FOUND");
    }
}
