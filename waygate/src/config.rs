use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::position::ServerName;

/// Where the per-second warmup countdown is rendered on the actor's screen.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DisplayMode {
    ActionBar,
    Subtitle,
    Title,
    Message,
}

/// Runtime settings shared by every component.
///
/// `cluster_id` partitions the broker: nodes only process frames published
/// under their own cluster, so several independent networks can share one
/// transport. `server` is this node's name within the cluster and decides
/// local vs cross-server execution.
#[derive(Clone, Debug)]
pub struct Settings {
    pub cluster_id: String,
    pub server: ServerName,
    pub cross_server: bool,
    /// Countdown length before a teleport commits. Zero disables warmup.
    pub warmup_seconds: u32,
    pub warmup_display: DisplayMode,
    /// Period of the warmup tick loop. One second in production; tests
    /// shorten it.
    pub warmup_tick: Duration,
    /// Deadline for a generic request/reply round-trip.
    pub request_timeout: Duration,
    /// Narrower deadline for position lookups and transfer sub-operations.
    pub lookup_timeout: Duration,
    /// When false, last-position persistence is left to an external event
    /// listener instead of being written by the orchestrator.
    pub save_position_on_teleport: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            cluster_id: "main".to_string(),
            server: ServerName::hostname(),
            cross_server: true,
            warmup_seconds: 5,
            warmup_display: DisplayMode::ActionBar,
            warmup_tick: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            lookup_timeout: Duration::from_secs(3),
            save_position_on_teleport: true,
        }
    }
}

impl Settings {
    /// The logical broker channel this node publishes and listens on.
    pub fn channel(&self) -> String {
        format!("waygate:{}", self.cluster_id)
    }
}
