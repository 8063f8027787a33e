//! Auto-join guard.
//!
//! The last subsession acted on is persisted before the decision is made, so
//! a control that re-renders a moment later is recognized as already handled
//! even across a client reload.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::live::RegistrationStatus;
use crate::error::DatabaseError;
use crate::storage::{Database, JoinType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum JoinDecision {
    Join { subsession_id: i64 },
    AlreadyJoined { subsession_id: i64 },
    /// Filtered out by the race-only policy.
    NotScoredRace { subsession_id: i64 },
}

pub struct JoinGuard {
    policy: JoinType,
    db: Database,
}

impl JoinGuard {
    pub fn new(policy: JoinType, db: Database) -> Self {
        Self { policy, db }
    }

    pub fn policy(&self) -> JoinType {
        self.policy
    }

    pub fn last_joined(&self) -> Result<Option<i64>, DatabaseError> {
        self.db.last_joined_subsession()
    }

    /// Decide what to do with a join control that just rendered.
    ///
    /// # Errors
    ///
    /// Returns an error if the last-joined id cannot be read or written; the
    /// caller must not join in that case.
    pub fn on_join_control(&self, status: &RegistrationStatus) -> Result<JoinDecision, DatabaseError> {
        let subsession_id = status.subsession_id;
        if self.db.last_joined_subsession()? == Some(subsession_id) {
            debug!(subsession_id, "already joined once, skipping");
            return Ok(JoinDecision::AlreadyJoined { subsession_id });
        }

        self.db.set_last_joined_subsession(subsession_id)?;

        let included = match self.policy {
            JoinType::All => true,
            JoinType::Race => status.is_scored_race(),
        };
        if included {
            info!(subsession_id, "auto joining session");
            Ok(JoinDecision::Join { subsession_id })
        } else {
            info!(subsession_id, "not joining unscored session");
            Ok(JoinDecision::NotScoredRace { subsession_id })
        }
    }

    /// Background poll: record a running subsession joined by some other path.
    ///
    /// Returns the id when it was newly recorded.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be read or written.
    pub fn on_running_subsession(&self, subsession_id: i64) -> Result<Option<i64>, DatabaseError> {
        if self.db.last_joined_subsession()? == Some(subsession_id) {
            return Ok(None);
        }
        info!(subsession_id, "session transition detected, last session is now {subsession_id}");
        self.db.set_last_joined_subsession(subsession_id)?;
        Ok(Some(subsession_id))
    }
}
