//! Ticket Store Adapter (§4.5) — the only component that touches the
//! database. Everything above this layer (engine, facade) talks to the
//! `TicketStore` trait, never to `sqlx` directly.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::rating::{self, Outcome};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketStatus {
    Waiting,
    Matched,
    Cancelled,
    Expired,
}

impl TicketStatus {
    fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "WAITING" => Ok(TicketStatus::Waiting),
            "MATCHED" => Ok(TicketStatus::Matched),
            "CANCELLED" => Ok(TicketStatus::Cancelled),
            "EXPIRED" => Ok(TicketStatus::Expired),
            other => Err(StoreError::Invariant(format!("unknown ticket status {other}"))),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TicketStatus::Cancelled | TicketStatus::Expired)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchStatus {
    Active,
    Finished,
    Cancelled,
}

impl MatchStatus {
    fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "ACTIVE" => Ok(MatchStatus::Active),
            "FINISHED" => Ok(MatchStatus::Finished),
            "CANCELLED" => Ok(MatchStatus::Cancelled),
            other => Err(StoreError::Invariant(format!("unknown match status {other}"))),
        }
    }
}

/// A player's skill/preference data as of ticket creation, frozen into the
/// ticket's `snapshot` column so later scoring never re-reads `users`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerSnapshot {
    pub rating: i32,
    pub preferences: Vec<f64>,
}

#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: TicketStatus,
    pub area: String,
    pub snapshot: PlayerSnapshot,
    pub created_at: DateTime<Utc>,
    pub bound_match_id: Option<Uuid>,
}

impl Ticket {
    pub fn wait_seconds(&self, now: DateTime<Utc>) -> f64 {
        (now - self.created_at).num_milliseconds().max(0) as f64 / 1000.0
    }
}

/// Outcome of `cancel`, distinguishing "we cancelled it" from the two
/// no-op cases the Facade reports back as idempotent successes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    AlreadyTerminal,
    AlreadyMatched,
}

#[derive(Debug, Clone, Copy)]
pub struct RatingDelta {
    pub rating_before_a: i32,
    pub rating_before_b: i32,
    pub rating_after_a: i32,
    pub rating_after_b: i32,
}

/// A status transition published to a ticket's subscribers, per §4.5's
/// `watch_ticket` contract.
#[derive(Debug, Clone)]
pub enum TicketEvent {
    Matched(Uuid),
    Cancelled,
    Expired,
}

#[async_trait]
pub trait TicketStore: Send + Sync {
    async fn read_player_profile(&self, user_id: Uuid) -> StoreResult<(PlayerSnapshot, String)>;

    async fn create_ticket(&self, user_id: Uuid, area: String, snapshot: PlayerSnapshot) -> StoreResult<Uuid>;
    async fn read_ticket(&self, ticket_id: Uuid) -> StoreResult<Ticket>;
    async fn list_waiting(&self, area: &str, exclude_user: Uuid, exclude_ticket: Uuid) -> StoreResult<Vec<Ticket>>;

    /// Atomically transition both tickets WAITING -> MATCHED and open a
    /// match row, locking in ascending ticket-id order (§5 deadlock rule).
    async fn try_bind(&self, ticket_a: Uuid, ticket_b: Uuid) -> StoreResult<Uuid>;

    async fn cancel(&self, ticket_id: Uuid) -> StoreResult<CancelOutcome>;
    async fn expire(&self, ticket_id: Uuid, reason: &str) -> StoreResult<()>;

    async fn start_match(&self, user_a: Uuid, user_b: Uuid) -> StoreResult<Uuid>;
    async fn cancel_match(&self, match_id: Uuid) -> StoreResult<()>;
    async fn finish_match(
        &self,
        match_id: Uuid,
        score_a: i32,
        score_b: i32,
        k_factor: f64,
    ) -> StoreResult<RatingDelta>;

    /// Subscribe to a ticket's status transitions. Late subscribers (after
    /// the terminal transition already fired) will simply never see an
    /// event; callers must re-check `read_ticket` before awaiting one.
    fn watch_ticket(&self, ticket_id: Uuid) -> broadcast::Receiver<TicketEvent>;
}

#[derive(Debug, FromRow)]
struct TicketRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    area: String,
    snapshot: sqlx::types::Json<PlayerSnapshot>,
    created_at: DateTime<Utc>,
    bound_match_id: Option<Uuid>,
}

impl TicketRow {
    fn into_ticket(self) -> StoreResult<Ticket> {
        Ok(Ticket {
            id: self.id,
            user_id: self.user_id,
            status: TicketStatus::parse(&self.status)?,
            area: self.area,
            snapshot: self.snapshot.0,
            created_at: self.created_at,
            bound_match_id: self.bound_match_id,
        })
    }
}

#[derive(Debug, FromRow)]
struct MatchRow {
    id: Uuid,
    user_a: Uuid,
    user_b: Uuid,
    ticket_a: Uuid,
    ticket_b: Uuid,
    status: String,
    rating_before_a: Option<i32>,
    rating_before_b: Option<i32>,
    rating_after_a: Option<i32>,
    rating_after_b: Option<i32>,
}

/// Per-ticket broadcast senders backing `watch_ticket`. An in-process
/// publish/subscribe, not `LISTEN`/`NOTIFY` — adequate for a single-process
/// deployment and explicitly allowed by §4.5.
type SubscriberMap = Arc<Mutex<HashMap<Uuid, broadcast::Sender<TicketEvent>>>>;

pub struct PgTicketStore {
    pool: PgPool,
    subscribers: SubscriberMap,
}

impl PgTicketStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            subscribers: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn publish(&self, ticket_id: Uuid, event: TicketEvent) {
        let mut subs = self.subscribers.lock().unwrap();
        if let Some(tx) = subs.get(&ticket_id) {
            let _ = tx.send(event);
            if tx.receiver_count() == 0 {
                subs.remove(&ticket_id);
            }
        }
    }

    async fn lock_ticket(
        tx: &mut Transaction<'_, Postgres>,
        ticket_id: Uuid,
    ) -> StoreResult<TicketRow> {
        sqlx::query_as::<_, TicketRow>(
            "SELECT id, user_id, status, area, snapshot, created_at, bound_match_id \
             FROM mm_ticket WHERE id = $1 FOR UPDATE",
        )
        .bind(ticket_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound("ticket"))
    }

    async fn lock_match(tx: &mut Transaction<'_, Postgres>, match_id: Uuid) -> StoreResult<MatchRow> {
        sqlx::query_as::<_, MatchRow>(
            "SELECT id, user_a, user_b, ticket_a, ticket_b, status, \
                    rating_before_a, rating_before_b, rating_after_a, rating_after_b \
             FROM match_tx WHERE id = $1 FOR UPDATE",
        )
        .bind(match_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(StoreError::NotFound("match"))
    }
}

#[async_trait]
impl TicketStore for PgTicketStore {
    async fn read_player_profile(&self, user_id: Uuid) -> StoreResult<(PlayerSnapshot, String)> {
        let row: Option<(i32, String, sqlx::types::Json<Vec<f64>>)> =
            sqlx::query_as("SELECT rating, area, preferences FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool)
                .await?;
        let (rating, area, preferences) = row.ok_or(StoreError::NotFound("user"))?;
        Ok((
            PlayerSnapshot {
                rating,
                preferences: preferences.0,
            },
            area,
        ))
    }

    async fn create_ticket(&self, user_id: Uuid, area: String, snapshot: PlayerSnapshot) -> StoreResult<Uuid> {
        let id = Uuid::new_v4();
        let result = sqlx::query(
            "INSERT INTO mm_ticket (id, user_id, status, area, snapshot) \
             VALUES ($1, $2, 'WAITING', $3, $4)",
        )
        .bind(id)
        .bind(user_id)
        .bind(&area)
        .bind(sqlx::types::Json(&snapshot))
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(id),
            Err(sqlx::Error::Database(db_err)) if db_err.constraint() == Some("ux_mm_ticket_active_user") => {
                Err(StoreError::Conflict("ALREADY_QUEUED"))
            }
            Err(other) => Err(other.into()),
        }
    }

    async fn read_ticket(&self, ticket_id: Uuid) -> StoreResult<Ticket> {
        let row: TicketRow = sqlx::query_as(
            "SELECT id, user_id, status, area, snapshot, created_at, bound_match_id \
             FROM mm_ticket WHERE id = $1",
        )
        .bind(ticket_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound("ticket"))?;
        row.into_ticket()
    }

    async fn list_waiting(&self, area: &str, exclude_user: Uuid, exclude_ticket: Uuid) -> StoreResult<Vec<Ticket>> {
        let rows: Vec<TicketRow> = sqlx::query_as(
            "SELECT id, user_id, status, area, snapshot, created_at, bound_match_id \
             FROM mm_ticket \
             WHERE status = 'WAITING' AND area = $1 AND user_id <> $2 AND id <> $3",
        )
        .bind(area)
        .bind(exclude_user)
        .bind(exclude_ticket)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TicketRow::into_ticket).collect()
    }

    async fn try_bind(&self, ticket_a: Uuid, ticket_b: Uuid) -> StoreResult<Uuid> {
        let (lower, upper) = if ticket_a <= ticket_b {
            (ticket_a, ticket_b)
        } else {
            (ticket_b, ticket_a)
        };

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let lower_row = Self::lock_ticket(&mut tx, lower).await?;
        let upper_row = Self::lock_ticket(&mut tx, upper).await?;

        if lower_row.status != "WAITING" || upper_row.status != "WAITING" {
            return Err(StoreError::Conflict("NOT_WAITING"));
        }

        // A/B in the match row is canonically the lower-player-id side (§3),
        // independent of which ticket the lock ordering above happened to put first.
        let ((user_a, ticket_id_a), (user_b, ticket_id_b)) = if lower_row.user_id <= upper_row.user_id {
            ((lower_row.user_id, lower), (upper_row.user_id, upper))
        } else {
            ((upper_row.user_id, upper), (lower_row.user_id, lower))
        };

        let match_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO match_tx (id, user_a, user_b, ticket_a, ticket_b, status) \
             VALUES ($1, $2, $3, $4, $5, 'ACTIVE')",
        )
        .bind(match_id)
        .bind(user_a)
        .bind(user_b)
        .bind(ticket_id_a)
        .bind(ticket_id_b)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        sqlx::query("UPDATE mm_ticket SET status = 'MATCHED', bound_match_id = $1 WHERE id = $2 OR id = $3")
            .bind(match_id)
            .bind(ticket_a)
            .bind(ticket_b)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;

        self.publish(ticket_a, TicketEvent::Matched(match_id));
        self.publish(ticket_b, TicketEvent::Matched(match_id));

        Ok(match_id)
    }

    async fn cancel(&self, ticket_id: Uuid) -> StoreResult<CancelOutcome> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let row = Self::lock_ticket(&mut tx, ticket_id).await?;
        let status = TicketStatus::parse(&row.status)?;

        let outcome = match status {
            TicketStatus::Waiting => {
                sqlx::query("UPDATE mm_ticket SET status = 'CANCELLED' WHERE id = $1")
                    .bind(ticket_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(StoreError::from)?;
                CancelOutcome::Cancelled
            }
            TicketStatus::Matched => CancelOutcome::AlreadyMatched,
            TicketStatus::Cancelled | TicketStatus::Expired => CancelOutcome::AlreadyTerminal,
        };

        tx.commit().await.map_err(StoreError::from)?;

        if outcome == CancelOutcome::Cancelled {
            self.publish(ticket_id, TicketEvent::Cancelled);
        }

        Ok(outcome)
    }

    async fn expire(&self, ticket_id: Uuid, reason: &str) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let row = Self::lock_ticket(&mut tx, ticket_id).await?;
        let status = TicketStatus::parse(&row.status)?;

        if status != TicketStatus::Waiting {
            return Ok(());
        }

        sqlx::query("UPDATE mm_ticket SET status = 'EXPIRED' WHERE id = $1")
            .bind(ticket_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        tracing::debug!(%ticket_id, reason, "ticket expired");
        self.publish(ticket_id, TicketEvent::Expired);
        Ok(())
    }

    async fn start_match(&self, user_a: Uuid, user_b: Uuid) -> StoreResult<Uuid> {
        if user_a == user_b {
            return Err(StoreError::Invariant("cannot match a user against themself".into()));
        }

        // A/B is canonically the lower-player-id side (§3), regardless of the
        // order the caller supplied them in.
        let (user_a, user_b) = if user_a <= user_b { (user_a, user_b) } else { (user_b, user_a) };

        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;

        let busy: Option<Uuid> = sqlx::query_scalar(
            "SELECT user_id FROM mm_ticket \
             WHERE user_id = ANY($1) AND status IN ('WAITING', 'MATCHED') \
             FOR UPDATE",
        )
        .bind([user_a, user_b].as_slice())
        .fetch_optional(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        if busy.is_some() {
            return Err(StoreError::Conflict("BUSY"));
        }

        let ticket_a = Uuid::new_v4();
        let ticket_b = Uuid::new_v4();
        let match_id = Uuid::new_v4();

        for (ticket_id, user_id) in [(ticket_a, user_a), (ticket_b, user_b)] {
            let row: Option<(i32, String, sqlx::types::Json<Vec<f64>>)> =
                sqlx::query_as("SELECT rating, area, preferences FROM users WHERE id = $1")
                    .bind(user_id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(StoreError::from)?;
            let (rating, area, preferences) = row.ok_or(StoreError::NotFound("user"))?;
            let snapshot = PlayerSnapshot {
                rating,
                preferences: preferences.0,
            };
            sqlx::query(
                "INSERT INTO mm_ticket (id, user_id, status, area, snapshot, bound_match_id) \
                 VALUES ($1, $2, 'MATCHED', $3, $4, $5)",
            )
            .bind(ticket_id)
            .bind(user_id)
            .bind(area)
            .bind(sqlx::types::Json(&snapshot))
            .bind(match_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        }

        sqlx::query(
            "INSERT INTO match_tx (id, user_a, user_b, ticket_a, ticket_b, status) \
             VALUES ($1, $2, $3, $4, $5, 'ACTIVE')",
        )
        .bind(match_id)
        .bind(user_a)
        .bind(user_b)
        .bind(ticket_a)
        .bind(ticket_b)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;
        Ok(match_id)
    }

    async fn cancel_match(&self, match_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let row = Self::lock_match(&mut tx, match_id).await?;
        let status = MatchStatus::parse(&row.status)?;

        if status != MatchStatus::Active {
            return Err(StoreError::Conflict("NOT_ACTIVE"));
        }

        sqlx::query("UPDATE match_tx SET status = 'CANCELLED', finished_at = NOW() WHERE id = $1")
            .bind(match_id)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        sqlx::query("UPDATE mm_ticket SET status = 'CANCELLED' WHERE id = $1 OR id = $2")
            .bind(row.ticket_a)
            .bind(row.ticket_b)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;

        self.publish(row.ticket_a, TicketEvent::Cancelled);
        self.publish(row.ticket_b, TicketEvent::Cancelled);

        Ok(())
    }

    async fn finish_match(
        &self,
        match_id: Uuid,
        score_a: i32,
        score_b: i32,
        k_factor: f64,
    ) -> StoreResult<RatingDelta> {
        let mut tx = self.pool.begin().await.map_err(StoreError::from)?;
        let row = Self::lock_match(&mut tx, match_id).await?;
        let status = MatchStatus::parse(&row.status)?;

        if status == MatchStatus::Finished {
            // Idempotent repeat: return what was recorded the first time,
            // ignoring the score supplied on this call (§7).
            tx.rollback().await.map_err(StoreError::from)?;
            return Ok(RatingDelta {
                rating_before_a: row.rating_before_a.ok_or(StoreError::Invariant(
                    "finished match missing recorded ratings".into(),
                ))?,
                rating_before_b: row.rating_before_b.ok_or(StoreError::Invariant(
                    "finished match missing recorded ratings".into(),
                ))?,
                rating_after_a: row.rating_after_a.ok_or(StoreError::Invariant(
                    "finished match missing recorded ratings".into(),
                ))?,
                rating_after_b: row.rating_after_b.ok_or(StoreError::Invariant(
                    "finished match missing recorded ratings".into(),
                ))?,
            });
        }

        if status != MatchStatus::Active {
            return Err(StoreError::Conflict("NOT_ACTIVE"));
        }

        let outcome = Outcome::from_score(score_a, score_b)
            .map_err(|_| StoreError::Invariant("negative score reached the store".into()))?;

        let (lo, hi) = if row.user_a <= row.user_b {
            (row.user_a, row.user_b)
        } else {
            (row.user_b, row.user_a)
        };
        let rating_lo: i32 = sqlx::query_scalar("SELECT rating FROM users WHERE id = $1 FOR UPDATE")
            .bind(lo)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        let rating_hi: i32 = sqlx::query_scalar("SELECT rating FROM users WHERE id = $1 FOR UPDATE")
            .bind(hi)
            .fetch_one(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        let (rating_before_a, rating_before_b) = if row.user_a == lo {
            (rating_lo, rating_hi)
        } else {
            (rating_hi, rating_lo)
        };

        let (rating_after_a, rating_after_b) =
            rating::update_ratings(rating_before_a, rating_before_b, outcome, k_factor);

        sqlx::query("UPDATE users SET rating = $1 WHERE id = $2")
            .bind(rating_after_a)
            .bind(row.user_a)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;
        sqlx::query("UPDATE users SET rating = $1 WHERE id = $2")
            .bind(rating_after_b)
            .bind(row.user_b)
            .execute(&mut *tx)
            .await
            .map_err(StoreError::from)?;

        sqlx::query(
            "UPDATE match_tx SET status = 'FINISHED', score_a = $1, score_b = $2, finished_at = NOW(), \
             rating_before_a = $3, rating_before_b = $4, rating_after_a = $5, rating_after_b = $6 \
             WHERE id = $7",
        )
        .bind(score_a)
        .bind(score_b)
        .bind(rating_before_a)
        .bind(rating_before_b)
        .bind(rating_after_a)
        .bind(rating_after_b)
        .bind(match_id)
        .execute(&mut *tx)
        .await
        .map_err(StoreError::from)?;

        tx.commit().await.map_err(StoreError::from)?;

        Ok(RatingDelta {
            rating_before_a,
            rating_before_b,
            rating_after_a,
            rating_after_b,
        })
    }

    fn watch_ticket(&self, ticket_id: Uuid) -> broadcast::Receiver<TicketEvent> {
        let mut subs = self.subscribers.lock().unwrap();
        let tx = subs.entry(ticket_id).or_insert_with(|| broadcast::channel(8).0);
        tx.subscribe()
    }
}
