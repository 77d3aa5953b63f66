//! Teleport orchestration.
//!
//! [`Teleporter`] decides whether a move runs locally or crosses servers,
//! fronts the warmup countdown, resolves names cluster-wide, and produces
//! the reply payloads for inbound envelopes. Recoverable failures come back
//! as [`TeleportResult`] values; only transport problems are errors.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::actor::{LocalActors, MoveError, Notice, SharedActor, Sound};
use crate::config::Settings;
use crate::correlator::{Correlator, EnvelopeHandler, SendError};
use crate::hooks::{EconomyAction, Hooks};
use crate::message::{Message, MessageKind, Payload, TeleportRequest};
use crate::position::Position;
use crate::roster::Roster;
use crate::warmup::{WarmupOutcome, WarmupScheduler};

#[cfg(test)]
#[path = "teleport.test.rs"]
mod tests;

/// Terminal outcome of a teleport operation. Recoverable failures are
/// values here, never errors; each maps to exactly one notification to the
/// actor involved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TeleportResult {
    CompletedLocally,
    CompletedCrossServer,
    Cancelled,
    FailedAlreadyTeleporting,
    FailedMoving,
    FailedInvalidWorld,
    FailedIllegalCoordinates,
    FailedInvalidServer,
}

impl TeleportResult {
    pub fn successful(&self) -> bool {
        matches!(
            self,
            TeleportResult::CompletedLocally | TeleportResult::CompletedCrossServer
        )
    }
}

/// How a teleport came about. A `Back` teleport returns the actor to their
/// saved last position and must not overwrite that save on the way out.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TeleportKind {
    Teleport,
    Back,
}

pub struct Teleporter {
    settings: Arc<Settings>,
    local: LocalActors,
    correlator: Arc<Correlator>,
    roster: Arc<Roster>,
    warmup: Arc<WarmupScheduler>,
    hooks: Hooks,
}

impl Teleporter {
    pub fn new(
        settings: Arc<Settings>,
        local: LocalActors,
        correlator: Arc<Correlator>,
        roster: Arc<Roster>,
        warmup: Arc<WarmupScheduler>,
        hooks: Hooks,
    ) -> Self {
        Self {
            settings,
            local,
            correlator,
            roster,
            warmup,
            hooks,
        }
    }

    /// Move an actor to a position, locally or across servers.
    ///
    /// Fires the cancellable pre-teleport event, persists the actor's last
    /// position (unless the kind is `Back` or persistence is deferred to an
    /// event listener), then either performs the platform move or records the
    /// in-flight marker and asks the transport to hand the actor over. The
    /// cross-server path resolves as soon as the transfer request is
    /// accepted; it does not wait for the destination server to finish the
    /// move.
    pub async fn teleport(
        &self,
        actor: &SharedActor,
        position: &Position,
        kind: TeleportKind,
    ) -> Result<TeleportResult, SendError> {
        if self.hooks.events.on_teleport(actor, position).await.is_cancelled() {
            tracing::debug!(actor = %actor.name(), "Teleport vetoed by event listener");
            return Ok(TeleportResult::Cancelled);
        }

        if self.settings.save_position_on_teleport && kind == TeleportKind::Teleport {
            self.hooks
                .storage
                .save_last_position(actor.id(), actor.position())
                .await;
        }

        if position.server == self.settings.server {
            return Ok(self.move_locally(actor, position).await);
        }
        if !self.settings.cross_server {
            tracing::warn!(server = %position.server, "Cross-server teleports are disabled");
            return Ok(TeleportResult::FailedInvalidServer);
        }
        self.transfer_out(actor, position).await
    }

    async fn move_locally(&self, actor: &SharedActor, position: &Position) -> TeleportResult {
        if !position.coordinates_valid() {
            return TeleportResult::FailedIllegalCoordinates;
        }
        match actor.move_to(position).await {
            Ok(()) => {
                tracing::debug!(actor = %actor.name(), %position, "Teleported locally");
                TeleportResult::CompletedLocally
            }
            Err(MoveError::InvalidWorld) => TeleportResult::FailedInvalidWorld,
            Err(MoveError::IllegalCoordinates) => TeleportResult::FailedIllegalCoordinates,
        }
    }

    async fn transfer_out(
        &self,
        actor: &SharedActor,
        position: &Position,
    ) -> Result<TeleportResult, SendError> {
        // The marker outlives this call on success: the destination server
        // reads it when the actor arrives and finishes the move there.
        self.hooks
            .storage
            .set_inflight_teleport(actor.id(), Some(position.clone()))
            .await;

        match self
            .roster
            .request_transfer(actor.name(), &position.server)
            .await
        {
            Ok(true) => {
                tracing::info!(
                    actor = %actor.name(),
                    server = %position.server,
                    "Handed actor to the transport for transfer"
                );
                Ok(TeleportResult::CompletedCrossServer)
            }
            Ok(false) => {
                self.hooks.storage.set_inflight_teleport(actor.id(), None).await;
                Ok(TeleportResult::FailedInvalidServer)
            }
            Err(e) => {
                self.hooks.storage.set_inflight_teleport(actor.id(), None).await;
                Err(e)
            }
        }
    }

    /// Warmup countdown, then teleport, then the terminal notification.
    pub async fn timed_teleport(
        &self,
        actor: &SharedActor,
        position: &Position,
        kind: TeleportKind,
        action: Option<EconomyAction>,
    ) -> Result<TeleportResult, SendError> {
        self.gated_teleport(actor, position, kind, action, true).await
    }

    /// Teleport without a countdown. The economy check still applies.
    pub async fn instant_teleport(
        &self,
        actor: &SharedActor,
        position: &Position,
        kind: TeleportKind,
        action: Option<EconomyAction>,
    ) -> Result<TeleportResult, SendError> {
        self.gated_teleport(actor, position, kind, action, false).await
    }

    async fn gated_teleport(
        &self,
        actor: &SharedActor,
        position: &Position,
        kind: TeleportKind,
        action: Option<EconomyAction>,
        timed: bool,
    ) -> Result<TeleportResult, SendError> {
        let result = match self.warmup.run(actor, position, action, timed).await {
            WarmupOutcome::Cleared => self.teleport(actor, position, kind).await?,
            WarmupOutcome::Rejected(result) => result,
        };
        self.finish(actor, result, action).await;
        Ok(result)
    }

    /// Report a terminal result to the actor: one notice per outcome, a
    /// sound for completion or cancellation, and the economy charge once the
    /// move actually happened.
    pub async fn finish(
        &self,
        actor: &SharedActor,
        result: TeleportResult,
        action: Option<EconomyAction>,
    ) {
        actor.send_notice(Notice::Outcome(result));
        if result.successful() {
            actor.play_sound(Sound::TeleportComplete);
            if let Some(action) = action {
                self.hooks.economy.charge(actor, action).await;
            }
        } else if result == TeleportResult::Cancelled {
            actor.play_sound(Sound::TeleportCancelled);
        }
        self.hooks.events.teleport_completed(actor, result).await;
    }

    /// Find where a named actor currently stands, checking local actors
    /// first and then asking across the cluster.
    ///
    /// Remote resolution goes through the cached roster; the position request
    /// runs under the lookup deadline and a timeout resolves to `None`, same
    /// as an unknown name.
    pub async fn locate_actor(
        &self,
        requester: &SharedActor,
        target_name: &str,
    ) -> Result<Option<Position>, SendError> {
        if let Some(actor) = self.local.find(target_name) {
            return Ok(Some(actor.position()));
        }
        if !self.settings.cross_server {
            return Ok(None);
        }
        let Some(resolved) = self.roster.find_online_name(target_name) else {
            return Ok(None);
        };

        let message = Message::request(
            MessageKind::PositionRequest,
            requester.name(),
            resolved,
            &self.settings.cluster_id,
            Payload::Empty,
        );
        match self
            .correlator
            .send_with_deadline(message, self.settings.lookup_timeout)
            .await
        {
            Ok(reply) => Ok(reply.payload.position()),
            Err(SendError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Teleport the requester to a named actor, wherever they are.
    /// `None` means the name resolved nowhere in the cluster.
    pub async fn teleport_to_actor(
        &self,
        requester: &SharedActor,
        target_name: &str,
        timed: bool,
        action: Option<EconomyAction>,
    ) -> Result<Option<TeleportResult>, SendError> {
        let Some(position) = self.locate_actor(requester, target_name).await? else {
            return Ok(None);
        };
        let result = self
            .gated_teleport(requester, &position, TeleportKind::Teleport, action, timed)
            .await?;
        Ok(Some(result))
    }

    /// Teleport a named actor to a position. A local target moves here; a
    /// remote target is asked to move via `TELEPORT_TO_POSITION_REQUEST` and
    /// the reply carries their server's result. `None` means the name
    /// resolved nowhere (or the remote side could not act on it).
    pub async fn teleport_actor_by_name(
        &self,
        requester: &SharedActor,
        target_name: &str,
        position: &Position,
        timed: bool,
    ) -> Result<Option<TeleportResult>, SendError> {
        if let Some(actor) = self.local.find(target_name) {
            let result = self
                .gated_teleport(&actor, position, TeleportKind::Teleport, None, timed)
                .await?;
            return Ok(Some(result));
        }
        if !self.settings.cross_server {
            return Ok(None);
        }
        let Some(resolved) = self.roster.find_online_name(target_name) else {
            return Ok(None);
        };

        let message = Message::request(
            MessageKind::TeleportToPositionRequest,
            requester.name(),
            resolved,
            &self.settings.cluster_id,
            Payload::Position(position.clone()),
        );
        match self
            .correlator
            .send_with_deadline(message, self.settings.lookup_timeout)
            .await
        {
            Ok(reply) => Ok(reply.payload.teleport_result()),
            Err(SendError::Timeout(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Deliver a teleport invite to a named actor. Returns whether anyone
    /// was there to receive it.
    pub async fn send_invite(
        &self,
        requester: &SharedActor,
        target_name: &str,
        request: TeleportRequest,
    ) -> Result<bool, SendError> {
        self.deliver_invite(requester, target_name, request, MessageKind::TeleportRequest)
            .await
    }

    /// Deliver the answer to an invite back to its requester.
    pub async fn send_invite_response(
        &self,
        requester: &SharedActor,
        target_name: &str,
        request: TeleportRequest,
    ) -> Result<bool, SendError> {
        self.deliver_invite(
            requester,
            target_name,
            request,
            MessageKind::TeleportRequestResponse,
        )
        .await
    }

    async fn deliver_invite(
        &self,
        requester: &SharedActor,
        target_name: &str,
        request: TeleportRequest,
        kind: MessageKind,
    ) -> Result<bool, SendError> {
        if let Some(actor) = self.local.find(target_name) {
            self.hand_off_invite(actor, request, kind).await;
            return Ok(true);
        }
        if !self.settings.cross_server {
            return Ok(false);
        }
        let Some(resolved) = self.roster.find_online_name(target_name) else {
            return Ok(false);
        };

        let message = Message::request(
            kind,
            requester.name(),
            resolved,
            &self.settings.cluster_id,
            Payload::TeleportRequest(request),
        );
        // The reply is an empty delivery ack; the meaningful answer arrives
        // later as a TELEPORT_REQUEST_RESPONSE envelope of its own.
        match self.correlator.send(message).await {
            Ok(_) => Ok(true),
            Err(SendError::Timeout(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn hand_off_invite(&self, target: SharedActor, request: TeleportRequest, kind: MessageKind) {
        match kind {
            MessageKind::TeleportRequest => self.hooks.invites.on_request(target, request).await,
            _ => self.hooks.invites.on_response(target, request).await,
        }
    }
}

#[async_trait]
impl EnvelopeHandler for Teleporter {
    async fn handle(&self, target: SharedActor, message: &Message) -> Result<Payload, SendError> {
        match message.kind {
            MessageKind::PositionRequest => Ok(Payload::Position(target.position())),
            MessageKind::TeleportToPositionRequest => {
                let Payload::Position(position) = &message.payload else {
                    tracing::warn!(id = %message.id, "Teleport request without a position");
                    return Ok(Payload::Empty);
                };
                let result = self.teleport(&target, position, TeleportKind::Teleport).await?;
                self.finish(&target, result, None).await;
                Ok(Payload::TeleportResult(result))
            }
            MessageKind::TeleportRequest | MessageKind::TeleportRequestResponse => {
                if let Payload::TeleportRequest(request) = &message.payload {
                    self.hand_off_invite(target, request.clone(), message.kind).await;
                } else {
                    tracing::warn!(id = %message.id, "Invite envelope without a request payload");
                }
                Ok(Payload::Empty)
            }
        }
    }
}
