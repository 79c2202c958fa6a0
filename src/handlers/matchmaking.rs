//! HTTP handlers for the matchmaking endpoints (§6).

use std::convert::Infallible;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::{Json, http::StatusCode};
use futures_util::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::engine::EngineEvent;
use crate::error::AppResult;
use crate::facade::{MatchOutcome, SessionFacade};
use crate::validation;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MatchStartRequest {
    pub user_a: Uuid,
    pub user_b: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct MatchFinishRequest {
    pub match_id: Uuid,
    pub score: [i32; 2],
}

#[derive(Debug, Serialize)]
struct RatingDeltaResponse {
    rating_before: [i32; 2],
    rating_after: [i32; 2],
}

/// `POST /match` — enqueue and block until the ticket reaches a terminal
/// state.
pub async fn post_match(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> AppResult<Json<serde_json::Value>> {
    match state.facade.request_match_blocking(req.user_id).await? {
        MatchOutcome::Matched { match_id } => Ok(Json(serde_json::json!({
            "status": "matched",
            "match_id": match_id,
        }))),
        MatchOutcome::Expired => Ok(Json(serde_json::json!({ "status": "expired" }))),
    }
}

/// `POST /match/stream` — same as `post_match`, but streams a `searching`
/// event per poll tick ahead of the terminal event. Dropping the response
/// stream (client disconnect) cancels the underlying ticket.
pub async fn post_match_stream(
    State(state): State<AppState>,
    Json(req): Json<MatchRequest>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let (ticket_id, rx) = state.facade.request_match_stream(req.user_id).await?;
    let guard = TicketStreamGuard {
        ticket_id,
        facade: state.facade.clone(),
        armed: true,
    };

    let stream = stream::unfold((rx, guard, false), |(mut rx, mut guard, terminal)| async move {
        if terminal {
            return None;
        }
        let event = rx.recv().await?;
        let is_terminal = matches!(
            event,
            EngineEvent::Matched { .. } | EngineEvent::Expired | EngineEvent::Cancelled
        );
        if is_terminal {
            guard.armed = false;
        }
        let sse_event = Event::default()
            .json_data(sse_payload(&event))
            .expect("EngineEvent serializes to a plain JSON object");
        Some((Ok(sse_event), (rx, guard, is_terminal)))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

fn sse_payload(event: &EngineEvent) -> serde_json::Value {
    match event {
        EngineEvent::Searching { threshold, candidates, waited } => serde_json::json!({
            "type": "searching",
            "threshold": threshold,
            "candidates": candidates,
            "waited": waited,
        }),
        EngineEvent::Matched { match_id } => serde_json::json!({
            "type": "matched",
            "match_id": match_id,
        }),
        EngineEvent::Expired => serde_json::json!({ "type": "expired" }),
        EngineEvent::Cancelled => serde_json::json!({ "type": "cancelled" }),
    }
}

/// Cancels the ticket if the SSE stream is dropped before a terminal event
/// was observed — client disconnect treated as cancellation (§4.6).
struct TicketStreamGuard {
    ticket_id: Uuid,
    facade: std::sync::Arc<SessionFacade>,
    armed: bool,
}

impl Drop for TicketStreamGuard {
    fn drop(&mut self) {
        if self.armed {
            let ticket_id = self.ticket_id;
            let facade = self.facade.clone();
            tokio::spawn(async move {
                facade.cancel_ticket(ticket_id).await;
            });
        }
    }
}

/// `POST /match/start` — directly open a match between two players,
/// bypassing the Engine.
pub async fn post_match_start(
    State(state): State<AppState>,
    Json(req): Json<MatchStartRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let match_id = state.facade.start_match(req.user_a, req.user_b).await?;
    Ok(Json(serde_json::json!({ "match_id": match_id })))
}

/// `POST /match/finish` — record the outcome and apply the rating update.
pub async fn post_match_finish(
    State(state): State<AppState>,
    Json(req): Json<MatchFinishRequest>,
) -> AppResult<Json<serde_json::Value>> {
    validation::validate_score(req.score, "score")?;
    let delta = state
        .facade
        .finish_match(req.match_id, req.score[0], req.score[1], state.config.k_factor)
        .await?;
    Ok(Json(serde_json::json!(RatingDeltaResponse {
        rating_before: delta.rating_before,
        rating_after: delta.rating_after,
    })))
}

/// `GET /match/cancel/{match_id}`.
pub async fn get_match_cancel(
    State(state): State<AppState>,
    Path(match_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    let match_id = validation::validate_uuid(&match_id, "match_id")?;
    state.facade.cancel_match(match_id).await?;
    Ok(Json(serde_json::json!({ "ok": true })))
}

/// `GET /api/health`.
pub async fn api_health() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}
