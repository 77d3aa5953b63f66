//! Host integration seams.
//!
//! Everything the core must consult or inform but does not own: lifecycle
//! events, persistence of positions, economy checks, and the teleport-invite
//! subsystem. All methods default to no-ops so an embedder implements only
//! what it cares about; [`NoHooks`] is the all-defaults implementation.

use async_trait::async_trait;
use std::sync::Arc;

use crate::actor::SharedActor;
use crate::id::Id;
use crate::message::TeleportRequest;
use crate::position::Position;
use crate::teleport::TeleportResult;

/// Answer to a cancellable notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventOutcome {
    Allow,
    Cancel,
}

impl EventOutcome {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EventOutcome::Cancel)
    }
}

/// Lifecycle notifications. The two `on_*` calls fire before the effect and
/// may veto it; `teleport_completed` is informational.
#[async_trait]
pub trait EventBus: Send + Sync {
    async fn on_teleport(&self, _actor: &SharedActor, _target: &Position) -> EventOutcome {
        EventOutcome::Allow
    }

    async fn on_warmup_start(&self, _actor: &SharedActor, _target: &Position) -> EventOutcome {
        EventOutcome::Allow
    }

    async fn teleport_completed(&self, _actor: &SharedActor, _result: TeleportResult) {}
}

/// Position persistence. Failures are the host's to handle; a persistence
/// problem must never veto a teleport.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Remember where the actor stood before a teleport, for a return
    /// command.
    async fn save_last_position(&self, _actor: Id, _position: Position) {}

    /// Record or clear the marker for a cross-server teleport in flight, so
    /// the destination server can finish the move when the actor arrives.
    async fn set_inflight_teleport(&self, _actor: Id, _target: Option<Position>) {}
}

/// The billable operation behind a teleport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EconomyAction {
    RandomTeleport,
    BackCommand,
}

/// Economy boundary: validate before committing, charge after success.
#[async_trait]
pub trait Economy: Send + Sync {
    async fn validate(&self, _actor: &SharedActor, _action: EconomyAction) -> bool {
        true
    }

    async fn charge(&self, _actor: &SharedActor, _action: EconomyAction) {}
}

/// Hand-off point for TPA invites riding `TELEPORT_REQUEST` envelopes.
#[async_trait]
pub trait InviteHandler: Send + Sync {
    /// An invite arrived for a locally-online actor.
    async fn on_request(&self, _target: SharedActor, _request: TeleportRequest) {}

    /// The answer to an invite this cluster member sent earlier.
    async fn on_response(&self, _requester: SharedActor, _request: TeleportRequest) {}
}

/// The full set of host seams handed to a node at construction.
#[derive(Clone)]
pub struct Hooks {
    pub events: Arc<dyn EventBus>,
    pub storage: Arc<dyn Storage>,
    pub economy: Arc<dyn Economy>,
    pub invites: Arc<dyn InviteHandler>,
}

impl Default for Hooks {
    fn default() -> Self {
        Self {
            events: Arc::new(NoHooks),
            storage: Arc::new(NoHooks),
            economy: Arc::new(NoHooks),
            invites: Arc::new(NoHooks),
        }
    }
}

/// Implements every seam with its default body.
pub struct NoHooks;

#[async_trait]
impl EventBus for NoHooks {}

#[async_trait]
impl Storage for NoHooks {}

#[async_trait]
impl Economy for NoHooks {}

#[async_trait]
impl InviteHandler for NoHooks {}
