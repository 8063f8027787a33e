//! Join and forfeit guards.
//!
//! Reconciliation checks that keep automated join/forfeit actions from firing
//! against a stale or already-handled live session.

mod forfeit;
mod join;
mod live;

pub use forfeit::{ForfeitDecision, ForfeitGuard, ForfeitWatch};
pub use join::{JoinDecision, JoinGuard};
pub use live::{ForfeitControlState, LiveObservation, LiveState, RegistrationStatus, SIM_RUNNING};
