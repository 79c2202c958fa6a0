//! Matchmaker Engine (§4.4) — the per-ticket poll loop that repeatedly
//! attempts to bind a WAITING ticket to the best currently-eligible
//! opponent until it reaches a terminal state.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::config::Config;
use crate::error::StoreError;
use crate::scorer::{self, ScorerConfig, TicketSnapshot};
use crate::store::{Ticket, TicketStatus, TicketStore};
use crate::threshold::{self, ThresholdConfig};

/// Terminal (or timed-out) result of running the poll loop to completion.
#[derive(Debug, Clone)]
pub enum EngineOutcome {
    Matched { match_id: Uuid },
    Expired,
    Cancelled,
}

/// A tick-by-tick progress notification, consumed by the Facade's SSE
/// stream (§4.6). Unused by the blocking request path.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    Searching {
        threshold: f64,
        candidates: usize,
        waited: f64,
    },
    Matched { match_id: Uuid },
    Expired,
    Cancelled,
}

/// Candidates eligible to bind with, ordered per §4.4 step 6 (best first).
struct Candidate {
    ticket: Ticket,
    score: f64,
    min_wait: f64,
}

fn tie_break_key(c: &Candidate, self_rating: i32) -> (std::cmp::Reverse<i64>, std::cmp::Reverse<i64>, i64, Uuid) {
    // Sort descending on score and min_wait, ascending on rating gap and
    // ticket id — encoded as a tuple so a single `sort_by_key` expresses
    // the whole lexicographic rule from §4.4 step 6.
    let score_key = std::cmp::Reverse((c.score * 1_000_000.0).round() as i64);
    let wait_key = std::cmp::Reverse((c.min_wait * 1_000.0).round() as i64);
    let rating_gap = (self_rating - c.ticket.snapshot.rating).unsigned_abs() as i64;
    (score_key, wait_key, rating_gap, c.ticket.id)
}

pub struct MatchmakerEngine {
    store: Arc<dyn TicketStore>,
    config: Arc<Config>,
}

impl MatchmakerEngine {
    pub fn new(store: Arc<dyn TicketStore>, config: Arc<Config>) -> Self {
        Self { store, config }
    }

    fn threshold_cfg(&self) -> ThresholdConfig {
        ThresholdConfig {
            initial: self.config.initial_compat_threshold,
            min: self.config.minimum_compat_threshold,
            decay_rate: self.config.decay_rate_per_second,
        }
    }

    fn scorer_cfg(&self) -> ScorerConfig {
        ScorerConfig {
            base_skill_tolerance: self.config.base_skill_tolerance,
            skill_relax_rate: self.config.skill_relax_rate,
        }
    }

    /// Run the poll loop for one ticket to completion, optionally emitting
    /// progress events for a streaming caller (§4.6).
    pub async fn run_for_ticket(
        &self,
        ticket_id: Uuid,
        mut events: Option<tokio::sync::mpsc::Sender<EngineEvent>>,
    ) -> EngineOutcome {
        let poll_interval = Duration::from_secs_f64(self.config.matchmaking_poll_interval_secs.max(0.01));
        let mut consecutive_failures = 0u32;

        loop {
            let ticket = match self.store.read_ticket(ticket_id).await {
                Ok(t) => t,
                Err(StoreError::NotFound(_)) => return EngineOutcome::Expired,
                Err(_) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= 3 {
                        let _ = self.store.expire(ticket_id, "store errors exhausted").await;
                        return EngineOutcome::Expired;
                    }
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };

            match ticket.status {
                TicketStatus::Matched => {
                    return match ticket.bound_match_id {
                        Some(match_id) => {
                            emit(&mut events, EngineEvent::Matched { match_id }).await;
                            EngineOutcome::Matched { match_id }
                        }
                        None => {
                            emit(&mut events, EngineEvent::Expired).await;
                            EngineOutcome::Expired
                        }
                    };
                }
                TicketStatus::Cancelled => {
                    emit(&mut events, EngineEvent::Cancelled).await;
                    return EngineOutcome::Cancelled;
                }
                TicketStatus::Expired => {
                    emit(&mut events, EngineEvent::Expired).await;
                    return EngineOutcome::Expired;
                }
                TicketStatus::Waiting => {}
            }

            let now = Utc::now();
            let waited = ticket.wait_seconds(now);
            if waited >= self.config.matchmaking_timeout_secs {
                let _ = self.store.expire(ticket_id, "timeout").await;
                emit(&mut events, EngineEvent::Expired).await;
                return EngineOutcome::Expired;
            }

            let tau = threshold::threshold(waited, &self.threshold_cfg());

            let raw_candidates = match self.store.list_waiting(&ticket.area, ticket.user_id, ticket_id).await {
                Ok(c) => c,
                Err(_) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= 3 {
                        let _ = self.store.expire(ticket_id, "store errors exhausted").await;
                        return EngineOutcome::Expired;
                    }
                    tokio::time::sleep(poll_interval).await;
                    continue;
                }
            };
            consecutive_failures = 0;

            let self_snapshot = TicketSnapshot {
                rating: ticket.snapshot.rating,
                preferences: ticket.snapshot.preferences.clone(),
                area: ticket.area.clone(),
            };

            let mut candidates: Vec<Candidate> = raw_candidates
                .into_iter()
                .filter_map(|candidate| {
                    let candidate_wait = candidate.wait_seconds(now);
                    let candidate_snapshot = TicketSnapshot {
                        rating: candidate.snapshot.rating,
                        preferences: candidate.snapshot.preferences.clone(),
                        area: candidate.area.clone(),
                    };
                    let score = scorer::compatibility_score(
                        &self_snapshot,
                        waited,
                        &candidate_snapshot,
                        candidate_wait,
                        &self.scorer_cfg(),
                    )?;
                    if score < tau {
                        return None;
                    }
                    let min_wait = waited.min(candidate_wait);
                    Some(Candidate {
                        ticket: candidate,
                        score,
                        min_wait,
                    })
                })
                .collect();

            emit(
                &mut events,
                EngineEvent::Searching {
                    threshold: tau,
                    candidates: candidates.len(),
                    waited,
                },
            )
            .await;

            if candidates.is_empty() {
                tokio::time::sleep(poll_interval).await;
                continue;
            }

            candidates.sort_by_key(|c| tie_break_key(c, ticket.snapshot.rating));

            let mut bound = None;
            let mut bind_failures = 0u32;
            for candidate in &candidates {
                match self.store.try_bind(ticket_id, candidate.ticket.id).await {
                    Ok(match_id) => {
                        bound = Some(match_id);
                        break;
                    }
                    // Lost the race: expected, not counted as a failure (§4.4).
                    Err(StoreError::Conflict(_)) => continue,
                    Err(_) => bind_failures += 1,
                }
            }

            if let Some(match_id) = bound {
                emit(&mut events, EngineEvent::Matched { match_id }).await;
                return EngineOutcome::Matched { match_id };
            }

            if bind_failures > 0 {
                consecutive_failures += bind_failures;
                if consecutive_failures >= 3 {
                    let _ = self.store.expire(ticket_id, "store errors exhausted").await;
                    return EngineOutcome::Expired;
                }
            }

            tokio::time::sleep(poll_interval).await;
        }
    }
}

async fn emit(events: &mut Option<tokio::sync::mpsc::Sender<EngineEvent>>, event: EngineEvent) {
    if let Some(tx) = events {
        let _ = tx.send(event).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::PlayerSnapshot;

    fn candidate(id: Uuid, rating: i32, score: f64, min_wait: f64) -> Candidate {
        Candidate {
            ticket: Ticket {
                id,
                user_id: Uuid::new_v4(),
                status: TicketStatus::Waiting,
                area: "NA".into(),
                snapshot: PlayerSnapshot {
                    rating,
                    preferences: vec![],
                },
                created_at: Utc::now(),
                bound_match_id: None,
            },
            score,
            min_wait,
        }
    }

    #[test]
    fn tie_break_prefers_higher_score() {
        let a = candidate(Uuid::new_v4(), 1000, 9.0, 1.0);
        let b = candidate(Uuid::new_v4(), 1000, 5.0, 1.0);
        assert!(tie_break_key(&a, 1000) < tie_break_key(&b, 1000));
    }

    #[test]
    fn tie_break_prefers_longer_min_wait_on_equal_score() {
        let a = candidate(Uuid::new_v4(), 1000, 8.0, 10.0);
        let b = candidate(Uuid::new_v4(), 1000, 8.0, 2.0);
        assert!(tie_break_key(&a, 1000) < tie_break_key(&b, 1000));
    }

    #[test]
    fn tie_break_prefers_smaller_rating_gap_on_equal_score_and_wait() {
        let a = candidate(Uuid::new_v4(), 1010, 8.0, 5.0);
        let b = candidate(Uuid::new_v4(), 1200, 8.0, 5.0);
        assert!(tie_break_key(&a, 1000) < tie_break_key(&b, 1000));
    }

    #[test]
    fn tie_break_falls_back_to_ticket_id() {
        let low_id = Uuid::nil();
        let high_id = Uuid::max();
        let a = candidate(low_id, 1000, 8.0, 5.0);
        let b = candidate(high_id, 1000, 8.0, 5.0);
        assert!(tie_break_key(&a, 1000) < tie_break_key(&b, 1000));
    }
}
