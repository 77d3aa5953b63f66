//! The pre-teleport countdown.
//!
//! One state machine per actor: IDLE until a warmup begins, WARMING while the
//! tick loop runs, then COMPLETE or CANCELLED. The warming set is the
//! mutual-exclusion lock: membership is taken atomically before anything
//! else, so two overlapping requests for the same actor can never both start
//! a countdown.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::actor::{Notice, SharedActor, Sound};
use crate::config::Settings;
use crate::hooks::{Economy, EconomyAction, EventBus};
use crate::id::Id;
use crate::position::Position;
use crate::teleport::TeleportResult;

#[cfg(test)]
#[path = "warmup.test.rs"]
mod tests;

/// Squared block distance an actor may drift before the countdown cancels.
const MOVE_TOLERANCE: f64 = 0.1;

/// What the countdown decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WarmupOutcome {
    /// Countdown ran to zero (or was not required) and the economy check
    /// passed; the caller may commit the teleport.
    Cleared,
    /// The teleport must not happen. Carries the terminal result to report.
    Rejected(TeleportResult),
}

pub struct WarmupScheduler {
    settings: Arc<Settings>,
    events: Arc<dyn EventBus>,
    economy: Arc<dyn Economy>,
    warming: Mutex<HashSet<Id>>,
    cancel: CancellationToken,
}

impl WarmupScheduler {
    pub fn new(
        settings: Arc<Settings>,
        events: Arc<dyn EventBus>,
        economy: Arc<dyn Economy>,
    ) -> Self {
        Self {
            settings,
            events,
            economy,
            warming: Mutex::new(HashSet::new()),
            cancel: CancellationToken::new(),
        }
    }

    pub fn is_warming(&self, id: Id) -> bool {
        self.warming.lock().contains(&id)
    }

    /// Cancel every in-flight countdown at the next tick boundary.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Gate a teleport behind the configured countdown.
    ///
    /// With `timed` false or a zero warmup the countdown is skipped entirely
    /// and only the economy check runs. Otherwise the actor is admitted to
    /// the warming set, snapshotted, and ticked until the countdown reaches
    /// zero or a cancellation trigger fires. The cancelling tick never also
    /// clears: damage and movement are checked before the countdown is
    /// advanced.
    pub async fn run(
        &self,
        actor: &SharedActor,
        target: &Position,
        action: Option<EconomyAction>,
        timed: bool,
    ) -> WarmupOutcome {
        let seconds = if timed { self.settings.warmup_seconds } else { 0 };
        if seconds == 0 {
            return self.check_economy(actor, action).await;
        }

        if !self.try_begin(actor.id()) {
            return WarmupOutcome::Rejected(TeleportResult::FailedAlreadyTeleporting);
        }
        if actor.is_moving() {
            self.end(actor.id());
            return WarmupOutcome::Rejected(TeleportResult::FailedMoving);
        }
        if self.events.on_warmup_start(actor, target).await.is_cancelled() {
            self.end(actor.id());
            return WarmupOutcome::Rejected(TeleportResult::Cancelled);
        }

        let cleared = self.countdown(actor, seconds).await;
        self.end(actor.id());

        if !cleared {
            return WarmupOutcome::Rejected(TeleportResult::Cancelled);
        }
        self.check_economy(actor, action).await
    }

    /// Tick until the countdown clears or a trigger cancels it. Returns
    /// whether the teleport may proceed.
    async fn countdown(&self, actor: &SharedActor, seconds: u32) -> bool {
        let start_position = actor.position();
        let start_health = actor.health();
        let mut remaining = seconds;

        // First tick fires immediately: the countdown starts at t=0.
        let mut interval = tokio::time::interval(self.settings.warmup_tick);
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::debug!(actor = %actor.name(), "Warmup cancelled by shutdown");
                    return false;
                }
                _ = interval.tick() => {
                    if remaining == 0 {
                        return true;
                    }
                    if actor.health() < start_health {
                        tracing::debug!(actor = %actor.name(), "Warmup cancelled by damage");
                        return false;
                    }
                    let position = actor.position();
                    if !position.same_world(&start_position)
                        || position.distance_squared(&start_position) > MOVE_TOLERANCE
                    {
                        tracing::debug!(actor = %actor.name(), "Warmup cancelled by movement");
                        return false;
                    }
                    actor.send_notice(Notice::Countdown {
                        seconds_remaining: remaining,
                        display: self.settings.warmup_display,
                    });
                    actor.play_sound(Sound::WarmupTick);
                    remaining -= 1;
                }
            }
        }
    }

    async fn check_economy(
        &self,
        actor: &SharedActor,
        action: Option<EconomyAction>,
    ) -> WarmupOutcome {
        if let Some(action) = action {
            if !self.economy.validate(actor, action).await {
                tracing::debug!(actor = %actor.name(), ?action, "Economy check refused the teleport");
                return WarmupOutcome::Rejected(TeleportResult::Cancelled);
            }
        }
        WarmupOutcome::Cleared
    }

    fn try_begin(&self, id: Id) -> bool {
        self.warming.lock().insert(id)
    }

    fn end(&self, id: Id) {
        self.warming.lock().remove(&id);
    }
}
