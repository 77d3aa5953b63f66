//! Shared fixtures for exercising the stack without a platform underneath.
//!
//! `FakeActor` stands in for a connected player with scriptable position,
//! health, and motion; `RecordingHooks` captures every seam call;
//! `RecordingBroker` captures published frames (and can be told to fail);
//! `TestNode` wires a full node onto a [`LoopbackHub`].

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::actor::{MoveError, Notice, OnlineActor, SharedActor, Sound};
use crate::broker::{Broker, FrameSink, LoopbackHub, TransportError};
use crate::config::{DisplayMode, Settings};
use crate::frame::Frame;
use crate::hooks::{Economy, EconomyAction, EventBus, EventOutcome, Hooks, InviteHandler, Storage};
use crate::id::Id;
use crate::message::TeleportRequest;
use crate::node::Node;
use crate::position::{Position, World};
use crate::teleport::TeleportResult;

/// Settings with short timers so timeout paths run in milliseconds.
pub fn settings(server: &str) -> Settings {
    Settings {
        cluster_id: "test".into(),
        server: server.into(),
        cross_server: true,
        warmup_seconds: 5,
        warmup_display: DisplayMode::ActionBar,
        warmup_tick: Duration::from_millis(20),
        request_timeout: Duration::from_millis(200),
        lookup_timeout: Duration::from_millis(100),
        save_position_on_teleport: true,
    }
}

pub fn world() -> World {
    World::new("overworld", Id::from_u128(1))
}

pub fn position_on(server: &str) -> Position {
    Position::new(0.0, 64.0, 0.0, world(), server.into())
}

struct FakeActorState {
    position: Position,
    health: f64,
    moving: bool,
}

/// A scriptable stand-in for a connected player.
pub struct FakeActor {
    id: Id,
    name: String,
    state: Mutex<FakeActorState>,
    move_error: Mutex<Option<MoveError>>,
    pub notices: Mutex<Vec<Notice>>,
    pub sounds: Mutex<Vec<Sound>>,
    pub moves: Mutex<Vec<Position>>,
}

impl FakeActor {
    pub fn stationary(name: &str, server: &str) -> Arc<FakeActor> {
        Arc::new(FakeActor {
            id: Id::new(),
            name: name.to_string(),
            state: Mutex::new(FakeActorState {
                position: position_on(server),
                health: 20.0,
                moving: false,
            }),
            move_error: Mutex::new(None),
            notices: Mutex::new(Vec::new()),
            sounds: Mutex::new(Vec::new()),
            moves: Mutex::new(Vec::new()),
        })
    }

    pub fn set_position(&self, position: Position) {
        self.state.lock().position = position;
    }

    pub fn set_health(&self, health: f64) {
        self.state.lock().health = health;
    }

    pub fn set_moving(&self, moving: bool) {
        self.state.lock().moving = moving;
    }

    /// Make every subsequent `move_to` fail with the given error.
    pub fn fail_moves_with(&self, error: MoveError) {
        *self.move_error.lock() = Some(error);
    }

    /// The countdown values shown so far, in order.
    pub fn countdown_notices(&self) -> Vec<u32> {
        self.notices
            .lock()
            .iter()
            .filter_map(|notice| match notice {
                Notice::Countdown {
                    seconds_remaining, ..
                } => Some(*seconds_remaining),
                Notice::Outcome(_) => None,
            })
            .collect()
    }

    pub fn outcome_notices(&self) -> Vec<TeleportResult> {
        self.notices
            .lock()
            .iter()
            .filter_map(|notice| match notice {
                Notice::Outcome(result) => Some(*result),
                Notice::Countdown { .. } => None,
            })
            .collect()
    }
}

#[async_trait]
impl OnlineActor for FakeActor {
    fn id(&self) -> Id {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn position(&self) -> Position {
        self.state.lock().position.clone()
    }

    fn health(&self) -> f64 {
        self.state.lock().health
    }

    fn is_moving(&self) -> bool {
        self.state.lock().moving
    }

    async fn move_to(&self, position: &Position) -> Result<(), MoveError> {
        if let Some(error) = *self.move_error.lock() {
            return Err(error);
        }
        self.moves.lock().push(position.clone());
        self.state.lock().position = position.clone();
        Ok(())
    }

    fn send_notice(&self, notice: Notice) {
        self.notices.lock().push(notice);
    }

    fn play_sound(&self, sound: Sound) {
        self.sounds.lock().push(sound);
    }
}

/// Broker that records every published frame instead of delivering it.
#[derive(Default)]
pub struct RecordingBroker {
    pub published: Mutex<Vec<(String, Bytes)>>,
    fail: Mutex<bool>,
}

impl RecordingBroker {
    /// Make every subsequent publish fail.
    pub fn fail_publishes(&self) {
        *self.fail.lock() = true;
    }

    pub fn frames(&self) -> Vec<Frame> {
        self.published
            .lock()
            .iter()
            .map(|(_, bytes)| Frame::decode(bytes).expect("recorded frame should decode"))
            .collect()
    }
}

#[async_trait]
impl Broker for RecordingBroker {
    async fn publish(&self, channel: &str, frame: Bytes) -> Result<(), TransportError> {
        if *self.fail.lock() {
            return Err(TransportError::Closed);
        }
        self.published.lock().push((channel.to_string(), frame));
        Ok(())
    }
}

/// Hub observer that records every frame it can decode.
#[derive(Default)]
pub struct RecordingSink {
    pub frames: Mutex<Vec<Frame>>,
}

#[async_trait]
impl FrameSink for RecordingSink {
    async fn on_frame(&self, _channel: &str, frame: Bytes) {
        if let Ok(frame) = Frame::decode(&frame) {
            self.frames.lock().push(frame);
        }
    }
}

/// Poll until `condition` holds, panicking after a second. For effects that
/// happen on a spawned task rather than inside an awaited call.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition still false after one second");
}

/// Captures every hook call and lets tests script vetoes and economy
/// refusals.
pub struct RecordingHooks {
    pub veto_teleport: Mutex<bool>,
    pub veto_warmup: Mutex<bool>,
    pub economy_allows: Mutex<bool>,
    pub completed: Mutex<Vec<(String, TeleportResult)>>,
    pub last_positions: Mutex<Vec<(Id, Position)>>,
    pub inflight: Mutex<HashMap<Id, Option<Position>>>,
    pub charges: Mutex<Vec<(String, EconomyAction)>>,
    pub invites_received: Mutex<Vec<(String, TeleportRequest)>>,
    pub responses_received: Mutex<Vec<(String, TeleportRequest)>>,
}

impl Default for RecordingHooks {
    fn default() -> Self {
        Self {
            veto_teleport: Mutex::new(false),
            veto_warmup: Mutex::new(false),
            economy_allows: Mutex::new(true),
            completed: Mutex::new(Vec::new()),
            last_positions: Mutex::new(Vec::new()),
            inflight: Mutex::new(HashMap::new()),
            charges: Mutex::new(Vec::new()),
            invites_received: Mutex::new(Vec::new()),
            responses_received: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingHooks {
    pub fn bundle(self: &Arc<Self>) -> Hooks {
        Hooks {
            events: self.clone(),
            storage: self.clone(),
            economy: self.clone(),
            invites: self.clone(),
        }
    }

    pub fn inflight_for(&self, id: Id) -> Option<Position> {
        self.inflight.lock().get(&id).cloned().flatten()
    }
}

#[async_trait]
impl EventBus for RecordingHooks {
    async fn on_teleport(&self, _actor: &SharedActor, _target: &Position) -> EventOutcome {
        if *self.veto_teleport.lock() {
            EventOutcome::Cancel
        } else {
            EventOutcome::Allow
        }
    }

    async fn on_warmup_start(&self, _actor: &SharedActor, _target: &Position) -> EventOutcome {
        if *self.veto_warmup.lock() {
            EventOutcome::Cancel
        } else {
            EventOutcome::Allow
        }
    }

    async fn teleport_completed(&self, actor: &SharedActor, result: TeleportResult) {
        self.completed.lock().push((actor.name().to_string(), result));
    }
}

#[async_trait]
impl Storage for RecordingHooks {
    async fn save_last_position(&self, actor: Id, position: Position) {
        self.last_positions.lock().push((actor, position));
    }

    async fn set_inflight_teleport(&self, actor: Id, target: Option<Position>) {
        self.inflight.lock().insert(actor, target);
    }
}

#[async_trait]
impl Economy for RecordingHooks {
    async fn validate(&self, _actor: &SharedActor, _action: EconomyAction) -> bool {
        *self.economy_allows.lock()
    }

    async fn charge(&self, actor: &SharedActor, action: EconomyAction) {
        self.charges.lock().push((actor.name().to_string(), action));
    }
}

#[async_trait]
impl InviteHandler for RecordingHooks {
    async fn on_request(&self, target: SharedActor, request: TeleportRequest) {
        self.invites_received
            .lock()
            .push((target.name().to_string(), request));
    }

    async fn on_response(&self, requester: SharedActor, request: TeleportRequest) {
        self.responses_received
            .lock()
            .push((requester.name().to_string(), request));
    }
}

/// A full node wired onto a loopback hub, with recording hooks.
pub struct TestNode {
    pub node: Node,
    pub hooks: Arc<RecordingHooks>,
}

impl TestNode {
    pub fn join(hub: &LoopbackHub, settings: Settings) -> TestNode {
        let hooks = Arc::new(RecordingHooks::default());
        let node = Node::new(settings, Arc::new(hub.broker()), hooks.bundle());
        hub.attach(node.sink());
        TestNode { node, hooks }
    }

    /// Connect a fake actor to this node's server.
    pub fn spawn_actor(&self, name: &str) -> Arc<FakeActor> {
        let actor = FakeActor::stationary(name, self.node.settings().server.as_str());
        self.node.actors().join(actor.clone());
        actor
    }
}
