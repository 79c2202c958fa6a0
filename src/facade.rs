//! Session Facade (§4.6) — wraps the Engine and Store for one external
//! request: blocking match, streaming match, direct start, cancel, finish.

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::Config;
use crate::engine::{EngineEvent, EngineOutcome, MatchmakerEngine};
use crate::error::{AppError, AppResult, StoreError};
use crate::rating::Outcome;
use crate::store::{PlayerSnapshot, TicketStore};

/// Terminal result of a blocking match request.
#[derive(Debug, Clone)]
pub enum MatchOutcome {
    Matched { match_id: Uuid },
    Expired,
}

#[derive(Debug, Clone)]
pub struct RatingDeltaResult {
    pub rating_before: [i32; 2],
    pub rating_after: [i32; 2],
}

pub struct SessionFacade {
    store: Arc<dyn TicketStore>,
    engine: Arc<MatchmakerEngine>,
}

impl SessionFacade {
    pub fn new(store: Arc<dyn TicketStore>, config: Arc<Config>) -> Self {
        let engine = Arc::new(MatchmakerEngine::new(store.clone(), config));
        Self { store, engine }
    }

    async fn enqueue(&self, user_id: Uuid) -> AppResult<Uuid> {
        let (snapshot, area) = self.store.read_player_profile(user_id).await.map_err(|err| match err {
            StoreError::NotFound("user") => AppError::validation("user_id", "unknown user"),
            other => AppError::from(other),
        })?;
        self.create_ticket(user_id, area, snapshot).await
    }

    async fn create_ticket(&self, user_id: Uuid, area: String, snapshot: PlayerSnapshot) -> AppResult<Uuid> {
        self.store
            .create_ticket(user_id, area, snapshot)
            .await
            .map_err(AppError::from)
    }

    /// Blocking match request: enqueue the player and run the Engine poll
    /// loop to completion (matched, expired, or cancelled).
    pub async fn request_match_blocking(&self, user_id: Uuid) -> AppResult<MatchOutcome> {
        let ticket_id = self.enqueue(user_id).await?;
        match self.engine.run_for_ticket(ticket_id, None).await {
            EngineOutcome::Matched { match_id } => Ok(MatchOutcome::Matched { match_id }),
            EngineOutcome::Expired | EngineOutcome::Cancelled => Ok(MatchOutcome::Expired),
        }
    }

    /// Streaming match request: same as blocking, but the Engine emits a
    /// `searching` event per tick in addition to the terminal transition.
    /// Client disconnect is observed by the caller racing this future
    /// against the connection's close signal and calling `cancel`.
    pub async fn request_match_stream(&self, user_id: Uuid) -> AppResult<(Uuid, mpsc::Receiver<EngineEvent>)> {
        let ticket_id = self.enqueue(user_id).await?;
        let (tx, rx) = mpsc::channel(16);
        let engine = self.engine.clone();
        tokio::spawn(async move {
            engine.run_for_ticket(ticket_id, Some(tx)).await;
        });
        Ok((ticket_id, rx))
    }

    /// Invoked when a stream's client disconnects: treat it as cancellation.
    pub async fn cancel_ticket(&self, ticket_id: Uuid) {
        let _ = self.store.cancel(ticket_id).await;
    }

    pub async fn start_match(&self, user_a: Uuid, user_b: Uuid) -> AppResult<Uuid> {
        if user_a == user_b {
            return Err(AppError::validation("user_b", "cannot match a user against themself"));
        }
        self.store.start_match(user_a, user_b).await.map_err(AppError::from)
    }

    pub async fn cancel_match(&self, match_id: Uuid) -> AppResult<()> {
        self.store.cancel_match(match_id).await.map_err(AppError::from)
    }

    pub async fn finish_match(&self, match_id: Uuid, score_a: i32, score_b: i32, k_factor: f64) -> AppResult<RatingDeltaResult> {
        Outcome::from_score(score_a, score_b)?;
        let delta = self
            .store
            .finish_match(match_id, score_a, score_b, k_factor)
            .await
            .map_err(AppError::from)?;
        Ok(RatingDeltaResult {
            rating_before: [delta.rating_before_a, delta.rating_before_b],
            rating_after: [delta.rating_after_a, delta.rating_after_b],
        })
    }
}
