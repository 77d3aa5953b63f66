//! The online-actor surface.
//!
//! The embedding host implements [`OnlineActor`] over its player handle and
//! keeps the [`LocalActors`] registry in step with joins and quits. The core
//! reads positions and health through this trait, never the platform API.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::DisplayMode;
use crate::id::Id;
use crate::position::Position;
use crate::teleport::TeleportResult;

/// Failure codes from the platform's move primitive.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveError {
    #[error("Target world does not exist on this server")]
    InvalidWorld,

    #[error("Target coordinates are outside the world border")]
    IllegalCoordinates,
}

/// On-screen text pushed at an actor. The host owns wording and locale; the
/// core only says what happened.
#[derive(Clone, Debug, PartialEq)]
pub enum Notice {
    /// One warmup tick: seconds left until the teleport commits.
    Countdown {
        seconds_remaining: u32,
        display: DisplayMode,
    },
    /// The terminal outcome of a teleport the actor initiated.
    Outcome(TeleportResult),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Sound {
    WarmupTick,
    TeleportComplete,
    TeleportCancelled,
}

/// A locally-connected actor.
///
/// Reads are cheap snapshots of live platform state; `move_to` is the only
/// effectful call and the only one allowed to fail.
#[async_trait]
pub trait OnlineActor: Send + Sync {
    fn id(&self) -> Id;
    fn name(&self) -> &str;
    fn position(&self) -> Position;
    fn health(&self) -> f64;
    /// Whether the actor is currently in motion (riding, falling, walking).
    fn is_moving(&self) -> bool;
    async fn move_to(&self, position: &Position) -> Result<(), MoveError>;
    fn send_notice(&self, notice: Notice);
    fn play_sound(&self, sound: Sound);
}

pub type SharedActor = Arc<dyn OnlineActor>;

/// Registry of actors connected to this server, keyed by lowercased name.
#[derive(Clone, Default)]
pub struct LocalActors {
    inner: Arc<RwLock<HashMap<String, SharedActor>>>,
}

impl LocalActors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn join(&self, actor: SharedActor) {
        self.inner
            .write()
            .insert(actor.name().to_lowercase(), actor);
    }

    pub fn leave(&self, name: &str) {
        self.inner.write().remove(&name.to_lowercase());
    }

    /// Case-insensitive lookup by exact name.
    pub fn find(&self, name: &str) -> Option<SharedActor> {
        self.inner.read().get(&name.to_lowercase()).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.inner.read().contains_key(&name.to_lowercase())
    }

    /// Display names of everyone connected here.
    pub fn names(&self) -> Vec<String> {
        self.inner
            .read()
            .values()
            .map(|actor| actor.name().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::FakeActor;

    #[test]
    fn find_is_case_insensitive() {
        let actors = LocalActors::new();
        actors.join(FakeActor::stationary("Steve", "alpha"));

        assert!(actors.find("steve").is_some());
        assert!(actors.find("STEVE").is_some());
        assert!(actors.find("Alex").is_none());
    }

    #[test]
    fn leave_removes_the_actor() {
        let actors = LocalActors::new();
        actors.join(FakeActor::stationary("Steve", "alpha"));
        actors.leave("STEVE");

        assert!(!actors.contains("Steve"));
        assert!(actors.names().is_empty());
    }
}
