//! Lobby configuration.

use rookery_protocol::Role;
use serde::{Deserialize, Serialize};

/// Settings for the matchmaking engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LobbyConfig {
    /// Side given to the player who issued the challenge (or who was
    /// already waiting, for quick match). The other player gets the
    /// opposite side.
    pub challenger_role: Role,

    /// Whether `MATCH_FIND_REQ` is served.
    pub quick_match: bool,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            challenger_role: Role::White,
            quick_match: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lobby_config_default() {
        let config = LobbyConfig::default();
        assert_eq!(config.challenger_role, Role::White);
        assert!(config.quick_match);
    }
}
