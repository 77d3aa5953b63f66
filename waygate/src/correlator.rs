//! Request/reply correlation over the fire-and-forget broker channel.
//!
//! Outbound requests are parked in a pending table keyed by message id and
//! resolved when the matching `REPLY` frame comes back; inbound requests are
//! dispatched off the delivery path and answered with whatever payload the
//! bound handler produces. There are no retries: a request that gets no
//! reply within its deadline fails once, and the already-published frame is
//! never retracted, so a late reply is expected and dropped with a warning.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;

use crate::actor::{LocalActors, SharedActor};
use crate::broker::{Broker, FrameSink, TransportError};
use crate::config::Settings;
use crate::frame::{CodecError, Frame};
use crate::id::Id;
use crate::message::{Message, Payload, Relay};
use crate::roster::Roster;

#[cfg(test)]
#[path = "correlator.test.rs"]
mod tests;

#[derive(thiserror::Error, Debug)]
pub enum SendError {
    #[error("Request was not sent: {0}")]
    NotSent(#[from] TransportError),

    #[error("Request could not be encoded: {0}")]
    Codec(#[from] CodecError),

    #[error("No reply within {0:?}")]
    Timeout(Duration),
}

/// Produces the reply payload for an inbound request addressed to a
/// locally-online actor. Implemented by the teleport orchestrator.
#[async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, target: SharedActor, message: &Message) -> Result<Payload, SendError>;
}

/// Turns the broker's frames into request/reply semantics.
pub struct Correlator {
    settings: Arc<Settings>,
    broker: Arc<dyn Broker>,
    local: LocalActors,
    roster: Arc<Roster>,
    channel: String,
    pending: Mutex<HashMap<Id, oneshot::Sender<Message>>>,
    /// Bound after construction; the orchestrator holds the correlator, so
    /// the reverse edge is late and replaceable. Until bound, inbound
    /// requests answer with an empty payload.
    handler: RwLock<Option<Arc<dyn EnvelopeHandler>>>,
}

impl Correlator {
    pub fn new(
        settings: Arc<Settings>,
        broker: Arc<dyn Broker>,
        local: LocalActors,
        roster: Arc<Roster>,
    ) -> Self {
        let channel = settings.channel();
        Self {
            settings,
            broker,
            local,
            roster,
            channel,
            pending: Mutex::new(HashMap::new()),
            handler: RwLock::new(None),
        }
    }

    pub fn bind_handler(&self, handler: Arc<dyn EnvelopeHandler>) {
        *self.handler.write() = Some(handler);
    }

    /// Publish a request and await its reply under the default deadline.
    pub async fn send(&self, message: Message) -> Result<Message, SendError> {
        let deadline = self.settings.request_timeout;
        self.send_with_deadline(message, deadline).await
    }

    /// Publish a request and await its reply.
    ///
    /// The pending entry is inserted before the publish future is first
    /// polled, so a reply racing the publish can never miss the table. On
    /// timeout or publish failure the entry is removed and the error is
    /// final; the caller re-issues if it wants another attempt.
    pub async fn send_with_deadline(
        &self,
        message: Message,
        deadline: Duration,
    ) -> Result<Message, SendError> {
        let id = message.id;
        let (tx, rx) = oneshot::channel();
        if self.pending.lock().insert(id, tx).is_some() {
            tracing::error!(id = %id, "Correlation id collision, previous waiter dropped");
        }

        let encoded = match Frame::Envelope(message).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                self.pending.lock().remove(&id);
                return Err(e.into());
            }
        };
        if let Err(e) = self.broker.publish(&self.channel, encoded).await {
            self.pending.lock().remove(&id);
            return Err(SendError::NotSent(e));
        }

        match tokio::time::timeout(deadline, rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_)) | Err(_) => {
                self.pending.lock().remove(&id);
                tracing::debug!(id = %id, ?deadline, "Request timed out without a reply");
                Err(SendError::Timeout(deadline))
            }
        }
    }

    fn handle_envelope(&self, message: Message) {
        if message.cluster_id != self.settings.cluster_id {
            tracing::trace!(
                cluster = %message.cluster_id,
                "Dropping envelope from another cluster"
            );
            return;
        }

        // Broadcast transports deliver every frame to every node, this one's
        // own publications included. Only the node hosting the target actor
        // may act on an envelope.
        let Some(actor) = self.local.find(&message.target) else {
            tracing::trace!(target = %message.target, "Envelope target is not online here");
            return;
        };

        match message.relay {
            Relay::Reply => match self.pending.lock().remove(&message.id) {
                Some(waiter) => {
                    let _ = waiter.send(message);
                }
                None => {
                    tracing::warn!(
                        id = %message.id,
                        "Received a reply to a request this server is no longer waiting on"
                    );
                }
            },
            Relay::Message => self.dispatch(actor, message),
        }
    }

    /// Hand an inbound request to the handler on its own task so a slow
    /// handler never stalls frame delivery, and always answer: a failed
    /// handler produces an empty payload instead of leaving the sender to
    /// time out in silence.
    fn dispatch(&self, actor: SharedActor, message: Message) {
        let handler = self.handler.read().clone();
        let broker = self.broker.clone();
        let channel = self.channel.clone();

        tokio::spawn(async move {
            let payload = match handler {
                Some(handler) => match handler.handle(actor, &message).await {
                    Ok(payload) => payload,
                    Err(e) => {
                        tracing::error!(
                            error = %e,
                            id = %message.id,
                            kind = ?message.kind,
                            "Envelope handler failed, replying empty"
                        );
                        Payload::Empty
                    }
                },
                None => {
                    tracing::warn!(id = %message.id, "No envelope handler bound, replying empty");
                    Payload::Empty
                }
            };

            let reply = message.into_reply(payload);
            match Frame::Envelope(reply).encode() {
                Ok(bytes) => {
                    if let Err(e) = broker.publish(&channel, bytes).await {
                        tracing::error!(error = %e, "Failed to publish reply");
                    }
                }
                Err(e) => tracing::error!(error = %e, "Failed to encode reply"),
            }
        });
    }

    #[cfg(test)]
    pub(crate) fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[async_trait]
impl FrameSink for Correlator {
    async fn on_frame(&self, channel: &str, frame: Bytes) {
        if channel != self.channel {
            tracing::trace!(channel, "Ignoring frame from a foreign channel");
            return;
        }

        let frame = match Frame::decode(&frame) {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(error = %e, "Dropping undecodable frame");
                return;
            }
        };

        match frame {
            Frame::Envelope(message) => self.handle_envelope(message),
            housekeeping => self.roster.on_housekeeping(housekeeping).await,
        }
    }
}
