//! Automation features and their lifetimes.
//!
//! Every loaded feature owns a child of the engine's lifetime token. Anything
//! the feature schedules hangs off that child, so unloading the feature or
//! stopping the engine tears it all down.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::storage::FeaturesConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FeatureId {
    AutoRegister,
    AutoJoin,
    AutoForfeit,
}

impl FeatureId {
    pub const ALL: [FeatureId; 3] = [Self::AutoRegister, Self::AutoJoin, Self::AutoForfeit];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoRegister => "auto-register",
            Self::AutoJoin => "auto-join",
            Self::AutoForfeit => "auto-forfeit",
        }
    }
}

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FeatureId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown feature '{s}'"))
    }
}

pub struct FeatureManager {
    root: CancellationToken,
    loaded: HashMap<FeatureId, CancellationToken>,
}

impl FeatureManager {
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            loaded: HashMap::new(),
        }
    }

    /// Load every feature the config enables.
    pub fn from_config(root: CancellationToken, config: &FeaturesConfig) -> Self {
        let mut manager = Self::new(root);
        for (id, enabled) in [
            (FeatureId::AutoRegister, config.auto_register),
            (FeatureId::AutoJoin, config.auto_join),
            (FeatureId::AutoForfeit, config.auto_forfeit),
        ] {
            if enabled {
                manager.load(id);
            }
        }
        manager
    }

    /// Load a feature, returning its token. Loading twice is a no-op.
    pub fn load(&mut self, id: FeatureId) -> CancellationToken {
        if let Some(token) = self.loaded.get(&id).filter(|t| !t.is_cancelled()) {
            return token.clone();
        }
        info!(feature = %id, "loading feature");
        let token = self.root.child_token();
        self.loaded.insert(id, token.clone());
        token
    }

    /// Cancel a feature's token. Returns `false` if it was not loaded.
    pub fn unload(&mut self, id: FeatureId) -> bool {
        match self.loaded.remove(&id) {
            Some(token) => {
                info!(feature = %id, "unloading feature");
                token.cancel();
                true
            }
            None => false,
        }
    }

    pub fn unload_all(&mut self) {
        for id in FeatureId::ALL {
            self.unload(id);
        }
    }

    /// Live token for a loaded feature.
    pub fn token(&self, id: FeatureId) -> Option<CancellationToken> {
        self.loaded.get(&id).filter(|t| !t.is_cancelled()).cloned()
    }

    pub fn is_active(&self, id: FeatureId) -> bool {
        self.token(id).is_some()
    }
}
