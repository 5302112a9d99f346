//! Relay and room configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// RelayConfig
// ---------------------------------------------------------------------------

/// Settings for a relay process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: String,

    /// How long a new connection may take to send its handshake.
    pub handshake_timeout: Duration,

    /// A connection that sends nothing (not even a heartbeat) for this
    /// long is dropped.
    pub idle_timeout: Duration,

    /// Command channel capacity of each room actor.
    pub room_channel_size: usize,

    /// Upper bound on `max_participants` a client may ask for.
    pub max_room_size: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:7400".to_string(),
            handshake_timeout: Duration::from_secs(5),
            idle_timeout: Duration::from_secs(15),
            room_channel_size: 256,
            max_room_size: 16,
        }
    }
}

// ---------------------------------------------------------------------------
// RoomConfig
// ---------------------------------------------------------------------------

/// The fixed properties of one session room, taken from the
/// `CreateSession` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// Display name chosen by the creator.
    pub name: String,

    /// Only `JoinRandom` requests with this exact tag match the room.
    pub game_version: String,

    /// Capacity, including the creator.
    pub max_participants: usize,
}

impl RoomConfig {
    /// Whether a `JoinRandom` for `game_version` may land in this room.
    pub fn matches(&self, game_version: &str) -> bool {
        self.game_version == game_version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relay_config_default() {
        let config = RelayConfig::default();
        assert_eq!(config.handshake_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Duration::from_secs(15));
        assert!(config.room_channel_size > 0);
    }

    #[test]
    fn test_relay_config_partial_json_keeps_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{ "bind_addr": "0.0.0.0:9000" }"#).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:9000");
        assert_eq!(config.max_room_size, 16);
    }

    #[test]
    fn test_room_config_matches_exact_version() {
        let room = RoomConfig {
            name: "arena".into(),
            game_version: "1.0".into(),
            max_participants: 4,
        };
        assert!(room.matches("1.0"));
        assert!(!room.matches("1.0.1"));
    }
}
