//! The cross-cluster message envelope and its payload types.
//!
//! An envelope is either an original `MESSAGE` or the `REPLY` answering it;
//! a reply reuses the request's id, which is the whole correlation scheme.
//! On the wire the payload is an object with at most one non-null field, so a
//! private bridge struct maps that shape onto a proper sum type.

use serde::{Deserialize, Serialize};

use crate::id::Id;
use crate::position::Position;
use crate::teleport::TeleportResult;

/// What the receiver is being asked to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    /// Ask the target actor for its current position.
    PositionRequest,
    /// Teleport the target actor to the carried position and report the
    /// outcome.
    TeleportToPositionRequest,
    /// Deliver a teleport invite to the target actor. Fire-and-forget.
    TeleportRequest,
    /// Deliver the answer to an earlier invite. Fire-and-forget.
    TeleportRequestResponse,
}

/// Whether an envelope is an original request or the answer to one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Relay {
    Message,
    Reply,
}

/// A TPA/TPAHERE invite ridden by `TELEPORT_REQUEST` envelopes. The core
/// transports these; accept/decline policy belongs to the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeleportRequest {
    pub requester_name: String,
    pub requester_position: Position,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub expires_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestKind {
    Tpa,
    TpaHere,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Accepted,
    Declined,
    Ignored,
}

/// Envelope body. Exactly one variant is meaningful for a given
/// [`MessageKind`]; `Empty` answers the fire-and-forget kinds and any request
/// whose handler failed.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PayloadWire", into = "PayloadWire")]
pub enum Payload {
    Position(Position),
    TeleportRequest(TeleportRequest),
    TeleportResult(TeleportResult),
    Empty,
}

impl Payload {
    pub fn position(self) -> Option<Position> {
        match self {
            Payload::Position(position) => Some(position),
            _ => None,
        }
    }

    pub fn teleport_result(self) -> Option<TeleportResult> {
        match self {
            Payload::TeleportResult(result) => Some(result),
            _ => None,
        }
    }
}

/// Wire shape of [`Payload`]: nullable fields, at most one set.
#[derive(Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PayloadWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    teleport_request: Option<TeleportRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    teleport_result: Option<TeleportResult>,
}

impl From<PayloadWire> for Payload {
    fn from(wire: PayloadWire) -> Self {
        if let Some(position) = wire.position {
            Payload::Position(position)
        } else if let Some(request) = wire.teleport_request {
            Payload::TeleportRequest(request)
        } else if let Some(result) = wire.teleport_result {
            Payload::TeleportResult(result)
        } else {
            Payload::Empty
        }
    }
}

impl From<Payload> for PayloadWire {
    fn from(payload: Payload) -> Self {
        let mut wire = PayloadWire::default();
        match payload {
            Payload::Position(position) => wire.position = Some(position),
            Payload::TeleportRequest(request) => wire.teleport_request = Some(request),
            Payload::TeleportResult(result) => wire.teleport_result = Some(result),
            Payload::Empty => {}
        }
        wire
    }
}

/// A unit of cross-cluster communication.
///
/// `target` names the connected actor on the receiving cluster that should
/// process the message; envelopes whose `cluster_id` differs from the
/// receiver's own are dropped without note.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: Id,
    pub kind: MessageKind,
    pub relay: Relay,
    pub sender: String,
    pub target: String,
    pub cluster_id: String,
    pub payload: Payload,
}

impl Message {
    /// A fresh outbound request with a newly generated correlation id.
    pub fn request(
        kind: MessageKind,
        sender: impl Into<String>,
        target: impl Into<String>,
        cluster_id: impl Into<String>,
        payload: Payload,
    ) -> Self {
        Self {
            id: Id::new(),
            kind,
            relay: Relay::Message,
            sender: sender.into(),
            target: target.into(),
            cluster_id: cluster_id.into(),
            payload,
        }
    }

    /// Turn a received request into its reply: same id, endpoints swapped,
    /// relay flipped, payload replaced.
    pub fn into_reply(self, payload: Payload) -> Self {
        Self {
            id: self.id,
            kind: self.kind,
            relay: Relay::Reply,
            sender: self.target,
            target: self.sender,
            cluster_id: self.cluster_id,
            payload,
        }
    }
}
