//! Auto-forfeit guard.
//!
//! Seeing a forfeit control starts a countdown bound to the subsession shown
//! at that moment. At expiry the control is resolved again from current UI
//! state; the withdraw only fires if the control is still there, the
//! simulator is running, and the subsession has not changed.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::live::{ForfeitControlState, RegistrationStatus};

/// Captured when the countdown starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForfeitWatch {
    pub subsession_id: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ForfeitDecision {
    Forfeit { subsession_id: i64 },
    ControlGone,
    SimNotRunning,
    SessionChanged { captured: i64, current: i64 },
}

#[derive(Debug, Clone)]
pub struct ForfeitGuard {
    countdown: Duration,
}

impl ForfeitGuard {
    pub fn new(countdown: Duration) -> Self {
        Self { countdown }
    }

    pub fn countdown(&self) -> Duration {
        self.countdown
    }

    pub fn observe(&self, registration: &RegistrationStatus) -> ForfeitWatch {
        info!(
            subsession_id = registration.subsession_id,
            "forfeit button seen, beginning {} minute countdown",
            self.countdown.as_secs() / 60
        );
        ForfeitWatch {
            subsession_id: registration.subsession_id,
        }
    }

    /// Decide at countdown expiry against the freshly resolved control.
    pub fn evaluate(&self, watch: ForfeitWatch, control: Option<&ForfeitControlState>) -> ForfeitDecision {
        let decision = match control {
            None => ForfeitDecision::ControlGone,
            Some(control) if !control.sim_running() => ForfeitDecision::SimNotRunning,
            Some(control) if control.registration.subsession_id != watch.subsession_id => {
                ForfeitDecision::SessionChanged {
                    captured: watch.subsession_id,
                    current: control.registration.subsession_id,
                }
            }
            Some(_) => ForfeitDecision::Forfeit {
                subsession_id: watch.subsession_id,
            },
        };

        match decision {
            ForfeitDecision::Forfeit { subsession_id } => {
                info!(subsession_id, "forfeiting session {subsession_id}");
            }
            ForfeitDecision::ControlGone => debug!("forfeit button not available"),
            ForfeitDecision::SimNotRunning => debug!("sim not running, skipping forfeit"),
            ForfeitDecision::SessionChanged { .. } => debug!("session changed, skipping forfeit"),
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::live::SIM_RUNNING;

    fn control(subsession_id: i64, sim: Option<&str>) -> ForfeitControlState {
        ForfeitControlState {
            registration: RegistrationStatus {
                subsession_id,
                event_type: Some(5),
                will_be_scored: true,
            },
            sim_status: sim.map(str::to_string),
        }
    }

    fn guard() -> ForfeitGuard {
        ForfeitGuard::new(Duration::from_secs(13 * 60))
    }

    #[test]
    fn forfeits_when_everything_still_holds() {
        let watch = ForfeitWatch { subsession_id: 100 };
        assert_eq!(
            guard().evaluate(watch, Some(&control(100, Some(SIM_RUNNING)))),
            ForfeitDecision::Forfeit { subsession_id: 100 }
        );
    }

    #[test]
    fn session_change_suppresses_withdraw() {
        let watch = ForfeitWatch { subsession_id: 100 };
        assert_eq!(
            guard().evaluate(watch, Some(&control(101, Some(SIM_RUNNING)))),
            ForfeitDecision::SessionChanged {
                captured: 100,
                current: 101
            }
        );
    }

    #[test]
    fn missing_control_or_stopped_sim_is_a_noop() {
        let watch = ForfeitWatch { subsession_id: 100 };
        assert_eq!(guard().evaluate(watch, None), ForfeitDecision::ControlGone);
        assert_eq!(
            guard().evaluate(watch, Some(&control(100, Some("Sim Not Running")))),
            ForfeitDecision::SimNotRunning
        );
        assert_eq!(
            guard().evaluate(watch, Some(&control(100, None))),
            ForfeitDecision::SimNotRunning
        );
    }
}
