//! What the client UI reports about the live session.

use serde::{Deserialize, Serialize};

use crate::feed::RACE_EVENT_TYPE;

/// Simulator status text while a session is loaded.
pub const SIM_RUNNING: &str = "Sim Running";

/// Registration props attached to the join and forfeit controls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrationStatus {
    pub subsession_id: i64,
    #[serde(default)]
    pub event_type: Option<i64>,
    #[serde(default)]
    pub will_be_scored: bool,
}

impl RegistrationStatus {
    pub fn is_scored_race(&self) -> bool {
        self.event_type == Some(RACE_EVENT_TYPE) && self.will_be_scored
    }
}

/// One observation pushed by the UI side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "observation", rename_all = "snake_case")]
pub enum LiveObservation {
    /// A join control rendered.
    JoinControl { registration: RegistrationStatus },
    /// A forfeit control rendered.
    ForfeitControl {
        registration: RegistrationStatus,
        #[serde(default)]
        sim_status: Option<String>,
    },
    /// The forfeit control is no longer on screen.
    ForfeitControlGone,
    /// Periodic read of the registration bar.
    RegistrationBar {
        #[serde(default)]
        registration: Option<RegistrationStatus>,
        #[serde(default)]
        sim_status: Option<String>,
    },
}

/// The forfeit control as last resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForfeitControlState {
    pub registration: RegistrationStatus,
    pub sim_status: Option<String>,
}

impl ForfeitControlState {
    pub fn sim_running(&self) -> bool {
        self.sim_status.as_deref() == Some(SIM_RUNNING)
    }
}

/// Latest known UI state, folded from observations.
///
/// Guards read this at trigger time instead of trusting what they captured
/// earlier.
#[derive(Debug, Clone, Default)]
pub struct LiveState {
    forfeit_control: Option<ForfeitControlState>,
    bar_registration: Option<RegistrationStatus>,
    bar_sim_status: Option<String>,
}

impl LiveState {
    pub fn apply(&mut self, observation: &LiveObservation) {
        match observation {
            LiveObservation::JoinControl { .. } => {}
            LiveObservation::ForfeitControl {
                registration,
                sim_status,
            } => {
                self.forfeit_control = Some(ForfeitControlState {
                    registration: registration.clone(),
                    sim_status: sim_status.clone(),
                });
            }
            LiveObservation::ForfeitControlGone => self.forfeit_control = None,
            LiveObservation::RegistrationBar {
                registration,
                sim_status,
            } => {
                self.bar_registration = registration.clone();
                self.bar_sim_status = sim_status.clone();
                if let Some(control) = self.forfeit_control.as_mut() {
                    control.sim_status = sim_status.clone();
                }
            }
        }
    }

    /// Re-resolve the forfeit control.
    pub fn forfeit_control(&self) -> Option<&ForfeitControlState> {
        self.forfeit_control.as_ref()
    }

    /// Subsession the simulator is running, if any.
    pub fn running_subsession(&self) -> Option<i64> {
        if self.bar_sim_status.as_deref() != Some(SIM_RUNNING) {
            return None;
        }
        self.bar_registration.as_ref().map(|r| r.subsession_id)
    }
}
