//! Request and response bodies of the server's HTTP API.
//!
//! Field names are the server's snake_case names; don't rename them.

use serde::{Deserialize, Serialize};

/// `GET /api/info`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GameInfo {
    pub name: String,
    /// The CodeGame protocol version the server speaks.
    pub cg_version: String,
    pub display_name: String,
    pub description: String,
    /// The game's own version.
    pub version: String,
    pub repository_url: String,
}

/// `POST /api/games` response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GameData {
    #[serde(rename = "game_id")]
    pub id: String,
    /// Only present for protected games.
    #[serde(default)]
    pub join_secret: Option<String>,
}

/// `POST /api/games/{game_id}/players` response.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerData {
    pub player_id: String,
    pub player_secret: String,
}

impl std::fmt::Debug for PlayerData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlayerData")
            .field("player_id", &self.player_id)
            .field("player_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct CreateGameRequest<'a, C: Serialize> {
    pub public: bool,
    pub protected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config: Option<&'a C>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CreatePlayerRequest<'a> {
    pub username: &'a str,
    pub join_secret: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GameConfigResponse<T> {
    pub config: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct UsernameResponse {
    pub username: String,
}
