//! crates/killfeed_core/src/reactions.rs
//!
//! The Reaction Aggregator: one reaction per user per post, toggled among the fixed
//! set of kinds, plus per-kind counts for display.

use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::cookies::SessionState;
use crate::domain::{ReactionCounts, ReactionKind};
use crate::error::SiteResult;
use crate::ports::{DatabaseService, PortError};

/// Upper bound on read-decide-write rounds when other requests keep changing the row.
const MAX_TOGGLE_ATTEMPTS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ToggleOutcome {
    Added { kind: ReactionKind },
    Removed { kind: ReactionKind },
    Switched { from: ReactionKind, to: ReactionKind },
    /// Every attempt lost a race; the row was left as the other requests made it.
    Unchanged,
}

impl ToggleOutcome {
    pub fn applied(&self) -> bool {
        !matches!(self, ToggleOutcome::Unchanged)
    }
}

#[derive(Clone)]
pub struct ReactionAggregator {
    db: Arc<dyn DatabaseService>,
}

impl ReactionAggregator {
    pub fn new(db: Arc<dyn DatabaseService>) -> Self {
        Self { db }
    }

    /// Counts for every kind of the fixed set. A post without a local record simply
    /// has no reactions; nothing is created here.
    pub async fn aggregate_counts(&self, post_id: &str) -> SiteResult<ReactionCounts> {
        let rows = self.db.count_reactions(post_id).await?;
        Ok(ReactionCounts::from_rows(rows))
    }

    pub async fn user_reaction(
        &self,
        user_id: Uuid,
        post_id: &str,
    ) -> SiteResult<Option<ReactionKind>> {
        Ok(self.db.get_reaction(user_id, post_id).await?)
    }

    /// Adds, switches or removes the actor's reaction on a post.
    ///
    /// Writes are conditional on the state that was read: an insert fails on the
    /// (user, post) key, updates and deletes only match the kind that was seen. A lost
    /// race re-reads and decides again, so each successful call is exactly one
    /// transition and no caller ever sees a uniqueness violation.
    pub async fn toggle(
        &self,
        actor: &SessionState,
        post_id: &str,
        kind: &str,
    ) -> SiteResult<ToggleOutcome> {
        let kind: ReactionKind = kind.parse()?;
        let user_id = actor.require_user()?;

        for attempt in 1..=MAX_TOGGLE_ATTEMPTS {
            let outcome = match self.db.get_reaction(user_id, post_id).await? {
                None => match self.db.insert_reaction(user_id, post_id, kind).await {
                    Ok(()) => Some(ToggleOutcome::Added { kind }),
                    Err(PortError::Conflict(_)) => None,
                    Err(e) => return Err(e.into()),
                },
                Some(current) if current == kind => self
                    .db
                    .delete_reaction(user_id, post_id, kind)
                    .await?
                    .then_some(ToggleOutcome::Removed { kind }),
                Some(current) => self
                    .db
                    .update_reaction(user_id, post_id, current, kind)
                    .await?
                    .then_some(ToggleOutcome::Switched {
                        from: current,
                        to: kind,
                    }),
            };

            if let Some(outcome) = outcome {
                debug!(%user_id, post_id, ?outcome, "Reaction toggled");
                return Ok(outcome);
            }
            debug!(%user_id, post_id, attempt, "Reaction changed underneath us, retrying");
        }

        warn!(%user_id, post_id, "Giving up on reaction toggle after repeated contention");
        Ok(ToggleOutcome::Unchanged)
    }
}
