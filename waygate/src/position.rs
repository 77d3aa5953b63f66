//! Positions in the cluster's world space.
//!
//! A [`Position`] is always qualified by the server it lives on, which is what
//! lets the orchestrator decide between a local move and a cross-server
//! handoff.

use serde::{Deserialize, Serialize};
use std::fmt::Display;

use crate::id::Id;

/// Vanilla world border. Coordinates past this are unreachable and rejected
/// before any move is attempted.
pub const COORDINATE_LIMIT: f64 = 29_999_984.0;

/// Name of a server within the cluster.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ServerName(String);

impl ServerName {
    /// Server name derived from the machine hostname, used when the host
    /// does not configure one explicitly.
    pub fn hostname() -> Self {
        ServerName(
            hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "unknown".to_string()),
        )
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ServerName {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ServerName {
    fn from(s: &str) -> Self {
        ServerName(s.to_string())
    }
}

impl From<String> for ServerName {
    fn from(s: String) -> Self {
        ServerName(s)
    }
}

/// A named world on some server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct World {
    pub name: String,
    pub uuid: Id,
}

impl World {
    pub fn new(name: impl Into<String>, uuid: Id) -> Self {
        Self {
            name: name.into(),
            uuid,
        }
    }
}

impl Display for World {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// A point in a world on a server, with facing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub yaw: f32,
    pub pitch: f32,
    pub world: World,
    pub server: ServerName,
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64, world: World, server: ServerName) -> Self {
        Self {
            x,
            y,
            z,
            yaw: 0.0,
            pitch: 0.0,
            world,
            server,
        }
    }

    /// Whether the coordinates are finite and inside the world border.
    /// Only x and z are bounded; worlds have no vertical border.
    pub fn coordinates_valid(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.z.is_finite()
            && self.x.abs() <= COORDINATE_LIMIT
            && self.z.abs() <= COORDINATE_LIMIT
    }

    /// Squared block distance to another position. Facing is ignored, so
    /// the warmup movement check tolerates looking around.
    pub fn distance_squared(&self, other: &Position) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// True when `other` is in the same world on the same server.
    pub fn same_world(&self, other: &Position) -> bool {
        self.server == other.server && self.world.uuid == other.world.uuid
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "({:.1}, {:.1}, {:.1}) in {} on {}",
            self.x, self.y, self.z, self.world, self.server
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn world() -> World {
        World::new("overworld", Id::from_u128(1))
    }

    #[test]
    fn coordinates_inside_border_are_valid() {
        let pos = Position::new(100.0, 64.0, -200.0, world(), "alpha".into());
        assert!(pos.coordinates_valid());
    }

    #[test]
    fn coordinates_past_border_are_invalid() {
        let pos = Position::new(30_000_000.0, 64.0, 0.0, world(), "alpha".into());
        assert!(!pos.coordinates_valid());

        let pos = Position::new(0.0, 64.0, -30_000_000.0, world(), "alpha".into());
        assert!(!pos.coordinates_valid());
    }

    #[test]
    fn non_finite_coordinates_are_invalid() {
        let pos = Position::new(f64::NAN, 64.0, 0.0, world(), "alpha".into());
        assert!(!pos.coordinates_valid());
    }

    #[test]
    fn same_world_requires_same_server() {
        let a = Position::new(0.0, 64.0, 0.0, world(), "alpha".into());
        let b = Position::new(5.0, 64.0, 5.0, world(), "beta".into());
        assert!(!a.same_world(&b));

        let c = Position::new(5.0, 64.0, 5.0, world(), "alpha".into());
        assert!(a.same_world(&c));
    }

    #[test]
    fn distance_is_euclidean_squared() {
        let a = Position::new(0.0, 0.0, 0.0, world(), "alpha".into());
        let b = Position::new(3.0, 4.0, 0.0, world(), "alpha".into());
        assert_eq!(a.distance_squared(&b), 25.0);
    }
}
