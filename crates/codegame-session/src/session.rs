//! Session types: who the client is in which game on which server.
//!
//! A session is either *bound* (it carries player credentials and can be
//! used to send commands or to reconnect later) or a *spectator* session
//! (game only, read-only stream). There is no in-between: the player id
//! and the secret live together in [`PlayerCredentials`], and a session
//! either has them or it doesn't.

use std::fmt;

/// The credentials the server minted for one player.
#[derive(Clone, PartialEq, Eq)]
pub struct PlayerCredentials {
    /// The player's id within the game.
    pub player_id: String,
    /// The secret that authenticates as this player. Sensitive.
    pub player_secret: String,
}

impl PlayerCredentials {
    /// Creates a new set of credentials.
    pub fn new(player_id: impl Into<String>, player_secret: impl Into<String>) -> Self {
        Self {
            player_id: player_id.into(),
            player_secret: player_secret.into(),
        }
    }
}

/// The secret is redacted so sessions can be logged with `{:?}`.
impl fmt::Debug for PlayerCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlayerCredentials")
            .field("player_id", &self.player_id)
            .field("player_secret", &"<redacted>")
            .finish()
    }
}

/// One client's membership in one game on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// The server address without protocol prefix, e.g. `localhost:8080`.
    pub server_address: String,
    /// The player's username. Empty for spectators.
    pub username: String,
    /// The game this session belongs to.
    pub game_id: String,
    /// Player credentials; `None` for spectator sessions.
    pub player: Option<PlayerCredentials>,
}

impl Session {
    /// Creates a bound session for a player.
    pub fn player(
        server_address: impl Into<String>,
        username: impl Into<String>,
        game_id: impl Into<String>,
        credentials: PlayerCredentials,
    ) -> Self {
        Self {
            server_address: server_address.into(),
            username: username.into(),
            game_id: game_id.into(),
            player: Some(credentials),
        }
    }

    /// Creates a spectator session: a game but no player.
    pub fn spectator(server_address: impl Into<String>, game_id: impl Into<String>) -> Self {
        Self {
            server_address: server_address.into(),
            username: String::new(),
            game_id: game_id.into(),
            player: None,
        }
    }

    /// Returns `true` if this session carries player credentials.
    pub fn is_bound(&self) -> bool {
        self.player.is_some()
    }

    /// The player id, if bound.
    pub fn player_id(&self) -> Option<&str> {
        self.player.as_ref().map(|p| p.player_id.as_str())
    }

    /// The player secret, if bound.
    pub fn player_secret(&self) -> Option<&str> {
        self.player.as_ref().map(|p| p.player_secret.as_str())
    }
}
