//! Delayed actions tagged by owning feature.
//!
//! Each timer is a small task sleeping under a child of its feature's token.
//! Expirations come back over a channel and are only surfaced if the timer is
//! still registered here, so a timer cancelled while its expiry is already in
//! flight is dropped.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::features::FeatureId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
pub struct Expired<T> {
    pub id: TimerId,
    pub feature: FeatureId,
    pub payload: T,
}

struct Pending {
    feature: FeatureId,
    token: CancellationToken,
}

pub struct TimerSet<T> {
    next_id: u64,
    pending: HashMap<TimerId, Pending>,
    tx: mpsc::UnboundedSender<(TimerId, T)>,
    rx: mpsc::UnboundedReceiver<(TimerId, T)>,
}

impl<T: Send + 'static> TimerSet<T> {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            next_id: 0,
            pending: HashMap::new(),
            tx,
            rx,
        }
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Fire `payload` after `delay` unless `feature_token` is cancelled first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(
        &mut self,
        feature: FeatureId,
        feature_token: &CancellationToken,
        delay: Duration,
        payload: T,
    ) -> TimerId {
        let id = TimerId(self.next_id);
        self.next_id += 1;

        let token = feature_token.child_token();
        let tx = self.tx.clone();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                biased;
                () = cancelled.cancelled() => {}
                () = tokio::time::sleep(delay) => {
                    let _ = tx.send((id, payload));
                }
            }
        });

        self.pending.insert(id, Pending { feature, token });
        id
    }

    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.pending.remove(&id) {
            Some(pending) => {
                pending.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every pending timer owned by `feature`.
    pub fn cancel_feature(&mut self, feature: FeatureId) -> usize {
        let ids: Vec<TimerId> = self
            .pending
            .iter()
            .filter(|(_, p)| p.feature == feature)
            .map(|(id, _)| *id)
            .collect();
        for id in &ids {
            self.cancel(*id);
        }
        if !ids.is_empty() {
            debug!(feature = %feature, count = ids.len(), "cancelled pending timers");
        }
        ids.len()
    }

    /// Wait for the next live expiration.
    ///
    /// Pends forever while nothing is scheduled, which suits a `select!` arm.
    pub async fn next_expired(&mut self) -> Expired<T> {
        loop {
            // `recv` cannot yield `None` while `self.tx` is alive.
            let Some((id, payload)) = self.rx.recv().await else {
                return std::future::pending().await;
            };
            let Some(pending) = self.pending.remove(&id) else {
                continue;
            };
            if pending.token.is_cancelled() {
                continue;
            }
            return Expired {
                id,
                feature: pending.feature,
                payload,
            };
        }
    }
}

impl<T: Send + 'static> Default for TimerSet<T> {
    fn default() -> Self {
        Self::new()
    }
}
