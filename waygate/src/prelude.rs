//! The embedder-facing surface of the crate.
//!
//! A host wires a [`Node`] to its transport and player platform through the
//! traits re-exported here; everything else stays internal.

pub use super::actor::{
    LocalActors, // Registry of actors connected to this server
    MoveError,   // Failure codes from the platform's move primitive
    Notice,      // On-screen text pushed at an actor
    OnlineActor, // The connected-actor trait the host implements
    SharedActor, // Shared handle to an online actor
    Sound,       // Sound cues around warmups and teleports
};
pub use super::broker::{
    Broker,         // Outbound transport seam
    FrameSink,      // Inbound frame receiver
    LoopbackBroker, // Publishing handle onto a loopback hub
    LoopbackHub,    // In-memory bus for single-process clusters
    TransportError, // Broker failures
};
pub use super::config::{
    DisplayMode, // Where countdown notices are rendered
    Settings,    // Runtime settings shared by every component
};
pub use super::correlator::SendError; // Request/reply failures
pub use super::frame::{
    CodecError, // Frame encode/decode failures
    Frame,      // Subchannel frames carried over the broker channel
};
pub use super::hooks::{
    Economy,       // Validate-then-charge seam
    EconomyAction, // The billable operation behind a teleport
    EventBus,      // Cancellable lifecycle notifications
    EventOutcome,  // Allow or cancel
    Hooks,         // The full seam bundle handed to a node
    InviteHandler, // Teleport-invite hand-off
    NoHooks,       // All-defaults seam implementation
    Storage,       // Position persistence seam
};
pub use super::id::Id; // Correlation and actor identifier
pub use super::message::{
    Message,         // The cross-cluster envelope
    MessageKind,     // What the receiver is being asked to do
    Payload,         // Envelope body
    Relay,           // Request or reply
    RequestKind,     // TPA or TPAHERE
    RequestStatus,   // Lifecycle of an invite
    TeleportRequest, // A teleport invite
};
pub use super::node::Node; // Per-server assembly of the core
pub use super::position::{
    Position,         // A point in a world on a server
    ServerName,       // Name of a server within the cluster
    World,            // A named world on some server
    COORDINATE_LIMIT, // The world border
};
pub use super::roster::Roster; // Cached view of the cluster
pub use super::teleport::{
    TeleportKind,   // How a teleport came about
    TeleportResult, // Terminal outcome of a teleport
    Teleporter,     // Teleport orchestration
};
