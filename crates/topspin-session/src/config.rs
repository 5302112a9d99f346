//! Session configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings for connecting and for finding or creating a session.
///
/// Participants only end up in the same session when their
/// `game_version` tags match exactly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Compatibility tag sent with every join/create request.
    pub game_version: String,

    /// Capacity of sessions this client creates.
    pub max_participants: usize,

    /// How long to search for an open session before creating one.
    pub join_timeout: Duration,

    /// How long a connection attempt may take before it counts as failed.
    pub connect_timeout: Duration,

    /// Immediate reconnect attempts after a connectivity failure before
    /// the coordinator gives up and stays disconnected.
    pub max_reconnect_attempts: u32,

    /// Prefix for the names of sessions this client creates.
    pub session_name_prefix: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            game_version: "1.0".to_string(),
            max_participants: 4,
            join_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(5),
            max_reconnect_attempts: 5,
            session_name_prefix: "arena".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_config_default() {
        let config = SessionConfig::default();
        assert_eq!(config.max_participants, 4);
        assert_eq!(config.join_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_session_config_partial_json_uses_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{ "game_version": "2.1" }"#).unwrap();
        assert_eq!(config.game_version, "2.1");
        assert_eq!(config.max_participants, 4);
    }
}
