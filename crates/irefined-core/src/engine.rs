//! The queue engine task.
//!
//! One tokio task owns the queue store and multiplexes every input through a
//! single `select!` loop:
//!
//! - lifetime cancellation
//! - lifecycle events from the feed adapter
//! - commands from the UI side ([`EngineHandle`])
//! - a one-second ticker driving the deadline scheduler
//! - expired delayed actions (settle delays, forfeit countdowns)
//!
//! Each arm runs to completion before the next is polled, so the matcher and
//! the scheduler never observe a half-applied mutation.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{QueueError, TransportError};
use crate::features::{FeatureId, FeatureManager};
use crate::feed::{FeedAdapter, SessionLifecycleEvent};
use crate::guards::{
    ForfeitDecision, ForfeitGuard, ForfeitWatch, JoinDecision, JoinGuard, LiveObservation,
    LiveState, RegistrationStatus,
};
use crate::queue::{
    ActionDispatcher, Activation, DeadlineScheduler, IntentKey, IntentView, PendingRegistration,
    QueueRequest, QueueStore, QueuedIntent, SessionMatcher, StatusKind, SETTLE_DELAY,
};
use crate::storage::{Config, Database, FeaturesConfig};
use crate::timers::{TimerId, TimerSet};
use crate::transport::{JoinControl, Transport};

/// Scheduler cadence.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

/// Requests from the UI side, each answered over a oneshot.
#[derive(Debug)]
enum Command {
    Enqueue {
        request: QueueRequest,
        reply: oneshot::Sender<Result<IntentKey, QueueError>>,
    },
    Remove {
        key: IntentKey,
        reply: oneshot::Sender<bool>,
    },
    Activate {
        key: IntentKey,
        reply: oneshot::Sender<bool>,
    },
    List {
        reply: oneshot::Sender<Vec<IntentView>>,
    },
    Observe(LiveObservation),
    Unload {
        feature: FeatureId,
        reply: oneshot::Sender<bool>,
    },
}

#[derive(Debug)]
enum Delayed {
    Register(PendingRegistration),
    Forfeit(ForfeitWatch),
}

pub struct Engine {
    store: QueueStore,
    matcher: SessionMatcher,
    scheduler: DeadlineScheduler,
    dispatcher: ActionDispatcher,
    transport: Arc<dyn Transport>,
    join_control: Arc<dyn JoinControl>,
    join_guard: JoinGuard,
    forfeit_guard: ForfeitGuard,
    live: LiveState,
    features_config: FeaturesConfig,
}

impl Engine {
    pub fn new(
        config: &Config,
        transport: Arc<dyn Transport>,
        join_control: Arc<dyn JoinControl>,
        db: Database,
    ) -> Self {
        Self {
            store: QueueStore::new(),
            matcher: SessionMatcher::new(),
            scheduler: DeadlineScheduler::new(
                config.queue.activation_window(),
                config.queue.expire_unmatched_after(),
            ),
            dispatcher: ActionDispatcher::new(Arc::clone(&transport)),
            transport,
            join_control,
            join_guard: JoinGuard::new(config.auto_join.join_type, db),
            forfeit_guard: ForfeitGuard::new(config.auto_forfeit.countdown()),
            live: LiveState::default(),
            features_config: config.features.clone(),
        }
    }

    /// Seed the store before the engine starts, e.g. from a saved queue file.
    ///
    /// # Errors
    ///
    /// Returns the first validation or duplicate-key error.
    pub fn enqueue(&mut self, request: QueueRequest) -> Result<IntentKey, QueueError> {
        let intent = QueuedIntent::from_request(request, Utc::now())?;
        self.store.add(intent)
    }

    /// Start the engine on the current runtime.
    ///
    /// The engine stops when `lifetime` is cancelled.
    pub fn spawn(self, lifetime: CancellationToken) -> (EngineHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let handle = EngineHandle {
            commands: commands_tx,
            feed: Arc::new(FeedAdapter::new(events_tx)),
        };
        let task = tokio::spawn(self.run(lifetime, events_rx, commands_rx));
        (handle, task)
    }

    async fn run(
        self,
        lifetime: CancellationToken,
        mut events: mpsc::UnboundedReceiver<SessionLifecycleEvent>,
        mut commands: mpsc::UnboundedReceiver<Command>,
    ) {
        let features = FeatureManager::from_config(lifetime.clone(), &self.features_config);
        let mut state = RunState {
            engine: self,
            features,
            timers: TimerSet::new(),
            forfeit_timer: None,
        };

        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("queue engine started");
        loop {
            tokio::select! {
                biased;
                () = lifetime.cancelled() => break,
                Some(event) = events.recv() => state.on_event(&event),
                command = commands.recv() => match command {
                    Some(command) => state.on_command(command),
                    None => break,
                },
                expired = state.timers.next_expired() => state.on_delayed(expired.id, expired.payload),
                _ = ticker.tick() => state.on_tick(),
            }
        }
        state.features.unload_all();
        info!("queue engine stopped");
    }
}

/// Engine plus the pieces that only exist while it runs.
struct RunState {
    engine: Engine,
    features: FeatureManager,
    timers: TimerSet<Delayed>,
    forfeit_timer: Option<(TimerId, i64)>,
}

impl RunState {
    // ── Feed ──

    fn on_event(&mut self, event: &SessionLifecycleEvent) {
        if !self.features.is_active(FeatureId::AutoRegister) {
            debug!(kind = ?event.kind, "auto-register unloaded, ignoring event");
            return;
        }
        self.engine.matcher.apply(&mut self.engine.store, event);
    }

    // ── Clock ──

    fn on_tick(&mut self) {
        if !self.features.is_active(FeatureId::AutoRegister) {
            return;
        }
        let outcome = self.engine.scheduler.tick(&mut self.engine.store, Utc::now());
        for activation in outcome.activations {
            self.dispatch(activation);
        }
    }

    fn dispatch(&mut self, activation: Activation) {
        let Some(token) = self.features.token(FeatureId::AutoRegister) else {
            return;
        };
        let pending = self.engine.dispatcher.begin(activation);
        self.timers.schedule(
            FeatureId::AutoRegister,
            &token,
            SETTLE_DELAY,
            Delayed::Register(pending),
        );
    }

    fn on_delayed(&mut self, id: TimerId, delayed: Delayed) {
        match delayed {
            Delayed::Register(pending) => {
                self.engine.dispatcher.complete(&mut self.engine.store, pending);
            }
            Delayed::Forfeit(watch) => {
                if self.forfeit_timer.is_some_and(|(pending, _)| pending == id) {
                    self.forfeit_timer = None;
                }
                let control = self.engine.live.forfeit_control();
                if let ForfeitDecision::Forfeit { .. } =
                    self.engine.forfeit_guard.evaluate(watch, control)
                {
                    if let Err(e) = self.engine.transport.withdraw() {
                        warn!(error = %e, "forfeit withdraw was not handed off");
                    }
                }
            }
        }
    }

    // ── Commands ──

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Enqueue { request, reply } => {
                let _ = reply.send(self.engine.enqueue(request));
            }
            Command::Remove { key, reply } => {
                let removable = self
                    .engine
                    .store
                    .get(&key)
                    .is_some_and(|intent| intent.status.kind() != StatusKind::Registering);
                if removable {
                    self.engine.store.remove(&key);
                } else if self.engine.store.contains(&key) {
                    debug!(%key, "registration in flight, not removing");
                }
                let _ = reply.send(removable);
            }
            Command::Activate { key, reply } => {
                let activation = if self.features.is_active(FeatureId::AutoRegister) {
                    self.engine.scheduler.activate(&mut self.engine.store, &key)
                } else {
                    None
                };
                let activated = activation.is_some();
                if let Some(activation) = activation {
                    self.dispatch(activation);
                }
                let _ = reply.send(activated);
            }
            Command::List { reply } => {
                let views = self
                    .engine
                    .store
                    .views(Utc::now(), self.engine.scheduler.activation_window());
                let _ = reply.send(views);
            }
            Command::Observe(observation) => self.on_observation(observation),
            Command::Unload { feature, reply } => {
                let unloaded = self.features.unload(feature);
                self.timers.cancel_feature(feature);
                if feature == FeatureId::AutoForfeit {
                    self.forfeit_timer = None;
                }
                let _ = reply.send(unloaded);
            }
        }
    }

    // ── Live session ──

    fn on_observation(&mut self, observation: LiveObservation) {
        self.engine.live.apply(&observation);
        match observation {
            LiveObservation::JoinControl { registration } => self.on_join_control(&registration),
            LiveObservation::ForfeitControl { registration, .. } => {
                self.on_forfeit_control(&registration);
            }
            LiveObservation::ForfeitControlGone => {}
            LiveObservation::RegistrationBar { .. } => {
                if !self.features.is_active(FeatureId::AutoJoin) {
                    return;
                }
                if let Some(subsession_id) = self.engine.live.running_subsession() {
                    if let Err(e) = self.engine.join_guard.on_running_subsession(subsession_id) {
                        warn!(error = %e, "could not record running session");
                    }
                }
            }
        }
    }

    fn on_join_control(&mut self, registration: &RegistrationStatus) {
        if !self.features.is_active(FeatureId::AutoJoin) {
            return;
        }
        match self.engine.join_guard.on_join_control(registration) {
            Ok(JoinDecision::Join { subsession_id }) => {
                if let Err(e) = self.engine.join_control.join(subsession_id) {
                    warn!(error = %e, subsession_id, "join was not handed off");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "last joined session unavailable, not joining"),
        }
    }

    fn on_forfeit_control(&mut self, registration: &RegistrationStatus) {
        let Some(token) = self.features.token(FeatureId::AutoForfeit) else {
            return;
        };
        match self.forfeit_timer {
            Some((_, subsession_id)) if subsession_id == registration.subsession_id => return,
            Some((id, _)) => {
                self.timers.cancel(id);
            }
            None => {}
        }
        let watch = self.engine.forfeit_guard.observe(registration);
        let id = self.timers.schedule(
            FeatureId::AutoForfeit,
            &token,
            self.engine.forfeit_guard.countdown(),
            Delayed::Forfeit(watch),
        );
        self.forfeit_timer = Some((id, watch.subsession_id));
    }
}

/// Cloneable front door to a running engine.
#[derive(Clone)]
pub struct EngineHandle {
    commands: mpsc::UnboundedSender<Command>,
    feed: Arc<FeedAdapter>,
}

impl EngineHandle {
    /// Feed one raw push message through the adapter.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] once the engine has stopped.
    pub fn publish(&self, message: &Value) -> Result<usize, TransportError> {
        self.feed.publish(message)
    }

    /// Queue a registration. A missing season name is filled from the season
    /// index when the feed has provided one.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::DuplicateKey`] for an already queued session,
    /// [`QueueError::Validation`] for a bad start time, or
    /// [`QueueError::EngineStopped`].
    pub async fn enqueue(&self, mut request: QueueRequest) -> Result<IntentKey, QueueError> {
        if request.season_name.is_none() {
            request.season_name = self.feed.season_name(request.season_id);
        }
        self.request(|reply| Command::Enqueue { request, reply }).await?
    }

    /// Drop a `queued` or `found` intent. An intent already `registering`
    /// stays until its register goes out, and this returns `false`.
    pub async fn remove(&self, key: IntentKey) -> Result<bool, QueueError> {
        self.request(|reply| Command::Remove { key, reply }).await
    }

    /// Register now for a `found` intent. Returns `false` for any other status.
    pub async fn activate(&self, key: IntentKey) -> Result<bool, QueueError> {
        self.request(|reply| Command::Activate { key, reply }).await
    }

    pub async fn list(&self) -> Result<Vec<IntentView>, QueueError> {
        self.request(|reply| Command::List { reply }).await
    }

    pub fn observe(&self, observation: LiveObservation) -> Result<(), QueueError> {
        self.commands
            .send(Command::Observe(observation))
            .map_err(|_| QueueError::EngineStopped)
    }

    pub async fn unload(&self, feature: FeatureId) -> Result<bool, QueueError> {
        self.request(|reply| Command::Unload { feature, reply }).await
    }

    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, QueueError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(build(tx))
            .map_err(|_| QueueError::EngineStopped)?;
        rx.await.map_err(|_| QueueError::EngineStopped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::SIM_RUNNING;
    use crate::queue::testing::RecordingTransport;
    use crate::time::canonical_start_time;
    use crate::transport::{ChannelJoinControl, OutboundCommand};
    use serde_json::json;

    struct Harness {
        handle: EngineHandle,
        transport: Arc<RecordingTransport>,
        joins: mpsc::UnboundedReceiver<i64>,
        lifetime: CancellationToken,
        task: JoinHandle<()>,
    }

    fn start(config: Config) -> Harness {
        let transport = Arc::new(RecordingTransport::default());
        let (join_control, joins) = ChannelJoinControl::channel();
        let engine = Engine::new(
            &config,
            transport.clone(),
            Arc::new(join_control),
            Database::open_memory().unwrap(),
        );
        let lifetime = CancellationToken::new();
        let (handle, task) = engine.spawn(lifetime.clone());
        Harness {
            handle,
            transport,
            joins,
            lifetime,
            task,
        }
    }

    fn all_features() -> Config {
        let mut config = Config::default();
        config.features.auto_join = true;
        config.features.auto_forfeit = true;
        config
    }

    fn request(start_time: &str) -> QueueRequest {
        QueueRequest {
            season_id: 42,
            season_name: Some("GT Sprint".to_string()),
            start_time: start_time.to_string(),
            car_id: 7,
            car_class_id: 3,
        }
    }

    fn insert_push(start_time: &str, session_id: i64) -> Value {
        json!({
            "data": { "delta": { "INSERT": [{
                "season_id": 42,
                "start_time": start_time,
                "event_type": 5,
                "session_id": session_id,
            }]}}
        })
    }

    fn soon() -> String {
        canonical_start_time(&(Utc::now() + chrono::Duration::minutes(2)))
    }

    fn registration(subsession_id: i64) -> RegistrationStatus {
        RegistrationStatus {
            subsession_id,
            event_type: Some(5),
            will_be_scored: true,
        }
    }

    async fn settle(secs: u64) {
        tokio::time::sleep(Duration::from_secs(secs)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn queued_session_is_found_withdrawn_then_registered() {
        let h = start(Config::default());
        let start_time = soon();
        let key = h.handle.enqueue(request(&start_time)).await.unwrap();

        assert_eq!(h.handle.publish(&insert_push(&start_time, 9001)).unwrap(), 1);
        settle(2).await;

        let views = h.handle.list().await.unwrap();
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].key, key);
        assert_eq!(views[0].status, StatusKind::Registering);
        assert_eq!(h.transport.commands(), vec![OutboundCommand::Withdraw]);

        settle(SETTLE_DELAY.as_secs() + 1).await;

        assert!(h.handle.list().await.unwrap().is_empty());
        let commands = h.transport.commands();
        assert_eq!(commands.len(), 2);
        match &commands[1] {
            OutboundCommand::Register(cmd) => {
                assert_eq!(cmd.session_id, 9001);
                assert_eq!(cmd.car_id, 7);
                assert_eq!(cmd.car_class_id, 3);
            }
            other => panic!("expected register, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn duplicate_enqueue_is_rejected() {
        let h = start(Config::default());
        let start_time = soon();
        h.handle.enqueue(request(&start_time)).await.unwrap();
        let err = h.handle.enqueue(request(&start_time)).await.unwrap_err();
        assert!(matches!(err, QueueError::DuplicateKey(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn session_outside_window_waits() {
        let h = start(Config::default());
        let later = canonical_start_time(&(Utc::now() + chrono::Duration::hours(1)));
        h.handle.enqueue(request(&later)).await.unwrap();
        h.handle.publish(&insert_push(&later, 9001)).unwrap();
        settle(3).await;

        let views = h.handle.list().await.unwrap();
        assert_eq!(views[0].status, StatusKind::Found);
        assert!(h.transport.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_activation_only_for_found() {
        let h = start(Config::default());
        let later = canonical_start_time(&(Utc::now() + chrono::Duration::hours(1)));
        let key = h.handle.enqueue(request(&later)).await.unwrap();

        assert!(!h.handle.activate(key.clone()).await.unwrap());

        h.handle.publish(&insert_push(&later, 9001)).unwrap();
        settle(1).await;
        assert!(h.handle.activate(key.clone()).await.unwrap());
        assert!(!h.handle.activate(key).await.unwrap());
        assert_eq!(h.transport.commands(), vec![OutboundCommand::Withdraw]);
    }

    #[tokio::test(start_paused = true)]
    async fn lifetime_cancel_before_settle_skips_register() {
        let h = start(Config::default());
        let start_time = soon();
        h.handle.enqueue(request(&start_time)).await.unwrap();
        h.handle.publish(&insert_push(&start_time, 9001)).unwrap();
        settle(2).await;

        h.lifetime.cancel();
        h.task.await.unwrap();
        settle(10).await;

        assert_eq!(h.transport.commands(), vec![OutboundCommand::Withdraw]);
        assert!(matches!(h.handle.list().await, Err(QueueError::EngineStopped)));
    }

    #[tokio::test(start_paused = true)]
    async fn unloading_auto_register_cancels_pending_register() {
        let h = start(Config::default());
        let start_time = soon();
        h.handle.enqueue(request(&start_time)).await.unwrap();
        h.handle.publish(&insert_push(&start_time, 9001)).unwrap();
        settle(2).await;

        assert!(h.handle.unload(FeatureId::AutoRegister).await.unwrap());
        settle(10).await;
        assert_eq!(h.transport.commands(), vec![OutboundCommand::Withdraw]);

        // Events are ignored once the matcher is detached.
        let other = canonical_start_time(&(Utc::now() + chrono::Duration::minutes(3)));
        h.handle.enqueue(request(&other)).await.unwrap();
        h.handle.publish(&insert_push(&other, 9002)).unwrap();
        settle(2).await;
        let views = h.handle.list().await.unwrap();
        assert!(views.iter().any(|v| v.status == StatusKind::Queued));
    }

    #[tokio::test(start_paused = true)]
    async fn registering_intent_cannot_be_removed() {
        let h = start(Config::default());
        let start_time = soon();
        let key = h.handle.enqueue(request(&start_time)).await.unwrap();
        h.handle.publish(&insert_push(&start_time, 9001)).unwrap();
        settle(2).await;

        assert!(!h.handle.remove(key.clone()).await.unwrap());
        assert_eq!(h.handle.list().await.unwrap()[0].key, key);

        settle(10).await;
        let commands = h.transport.commands();
        assert_eq!(commands.len(), 2);
        assert!(matches!(&commands[1], OutboundCommand::Register(cmd) if cmd.session_id == 9001));
        assert!(h.handle.list().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn queued_and_found_intents_can_be_removed() {
        let h = start(Config::default());
        let later = canonical_start_time(&(Utc::now() + chrono::Duration::hours(1)));
        let queued = h.handle.enqueue(request(&later)).await.unwrap();
        assert!(h.handle.remove(queued.clone()).await.unwrap());
        assert!(!h.handle.remove(queued).await.unwrap());

        let found = h.handle.enqueue(request(&later)).await.unwrap();
        h.handle.publish(&insert_push(&later, 9001)).unwrap();
        settle(1).await;
        assert_eq!(h.handle.list().await.unwrap()[0].status, StatusKind::Found);
        assert!(h.handle.remove(found).await.unwrap());
        assert!(h.handle.list().await.unwrap().is_empty());
        assert!(h.transport.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn join_control_joins_once() {
        let mut h = start(all_features());
        h.handle
            .observe(LiveObservation::JoinControl {
                registration: registration(100),
            })
            .unwrap();
        h.handle
            .observe(LiveObservation::JoinControl {
                registration: registration(100),
            })
            .unwrap();
        settle(1).await;

        assert_eq!(h.joins.recv().await, Some(100));
        assert!(h.joins.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn join_ignored_when_feature_disabled() {
        let mut h = start(Config::default());
        h.handle
            .observe(LiveObservation::JoinControl {
                registration: registration(100),
            })
            .unwrap();
        settle(1).await;
        assert!(h.joins.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn forfeit_fires_after_countdown_for_same_session() {
        let h = start(all_features());
        h.handle
            .observe(LiveObservation::ForfeitControl {
                registration: registration(100),
                sim_status: Some(SIM_RUNNING.to_string()),
            })
            .unwrap();
        settle(13 * 60 + 1).await;

        assert_eq!(h.transport.commands(), vec![OutboundCommand::Withdraw]);
    }

    #[tokio::test(start_paused = true)]
    async fn forfeit_skipped_when_control_gone() {
        let h = start(all_features());
        h.handle
            .observe(LiveObservation::ForfeitControl {
                registration: registration(100),
                sim_status: Some(SIM_RUNNING.to_string()),
            })
            .unwrap();
        settle(60).await;
        h.handle.observe(LiveObservation::ForfeitControlGone).unwrap();
        settle(13 * 60).await;

        assert!(h.transport.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn new_subsession_rearms_countdown() {
        let h = start(all_features());
        h.handle
            .observe(LiveObservation::ForfeitControl {
                registration: registration(100),
                sim_status: Some(SIM_RUNNING.to_string()),
            })
            .unwrap();
        settle(120).await;
        h.handle
            .observe(LiveObservation::ForfeitControl {
                registration: registration(101),
                sim_status: Some(SIM_RUNNING.to_string()),
            })
            .unwrap();

        // The first countdown would have expired here.
        settle(13 * 60 - 60).await;
        assert!(h.transport.commands().is_empty());

        settle(120).await;
        assert_eq!(h.transport.commands(), vec![OutboundCommand::Withdraw]);
    }

    #[tokio::test(start_paused = true)]
    async fn unloading_auto_forfeit_cancels_countdown() {
        let h = start(all_features());
        h.handle
            .observe(LiveObservation::ForfeitControl {
                registration: registration(100),
                sim_status: Some(SIM_RUNNING.to_string()),
            })
            .unwrap();
        settle(60).await;
        assert!(h.handle.unload(FeatureId::AutoForfeit).await.unwrap());
        settle(13 * 60).await;

        assert!(h.transport.commands().is_empty());
    }
}
