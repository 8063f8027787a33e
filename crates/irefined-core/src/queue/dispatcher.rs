//! Action dispatcher.
//!
//! Activation is split in two so the caller can own the settle delay:
//! [`ActionDispatcher::begin`] withdraws immediately and returns the pending
//! registration; [`ActionDispatcher::complete`] removes the intent and issues
//! the register command. The intent stays visible as `Registering` in between.
//!
//! Neither step waits for an acknowledgment. A failed register is only
//! noticed by the user, who can queue again.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::scheduler::Activation;
use super::store::QueueStore;
use crate::transport::{RegisterCommand, Transport};

/// Pause between withdrawing and registering.
pub const SETTLE_DELAY: std::time::Duration = std::time::Duration::from_secs(5);

/// A registration waiting out the settle delay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub activation: Activation,
}

impl PendingRegistration {
    /// The register command, built only from values captured at activation.
    pub fn command(&self) -> RegisterCommand {
        RegisterCommand {
            season_name: self.activation.season_name.clone(),
            car_id: self.activation.car_id,
            car_class_id: self.activation.car_class_id,
            session_id: self.activation.session_id,
            subsession_id: None,
        }
    }
}

pub struct ActionDispatcher {
    transport: Arc<dyn Transport>,
}

impl ActionDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Withdraw from the current session and hand back the registration to
    /// complete after [`SETTLE_DELAY`].
    pub fn begin(&self, activation: Activation) -> PendingRegistration {
        info!(
            "registering for series {} in {} seconds",
            activation.season_name,
            SETTLE_DELAY.as_secs()
        );
        if let Err(e) = self.transport.withdraw() {
            warn!(error = %e, "withdraw command was not handed off");
        }
        PendingRegistration { activation }
    }

    /// Drop the intent from the store and send the register command.
    pub fn complete(&self, store: &mut QueueStore, pending: PendingRegistration) {
        store.remove(&pending.activation.key);
        if let Err(e) = self.transport.register(pending.command()) {
            warn!(error = %e, "register command was not handed off");
        }
    }
}
