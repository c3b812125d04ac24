//! HTTP side of a CodeGame game server.
//!
//! The real-time client only needs a handful of request/response calls
//! (server info, player creation, username lookups) plus a way to open
//! the game's message stream. Those are the [`GameApi`] trait; [`HttpApi`]
//! implements it with `reqwest` and `tokio-tungstenite`, and adds the
//! calls the client itself never makes (creating games, reading a game's
//! config).
//!
//! Keeping this behind a trait lets the client be tested against an
//! in-process fake server.

mod error;
mod http;
mod types;

pub use error::ApiError;
pub use http::{HttpApi, base_url, trim_url};
pub use types::{GameData, GameInfo, PlayerData};

use std::collections::HashMap;
use std::future::Future;

use codegame_transport::{Connection, TransportError};

/// The server operations the real-time client depends on.
///
/// # Trait bounds
///
/// `Send + Sync + 'static` because the client shares the API between the
/// caller's task and the connection's delivery task.
pub trait GameApi: Send + Sync + 'static {
    /// The stream type returned by [`open_stream`](Self::open_stream).
    type Connection: Connection;

    /// The server address without protocol prefix. Used as the session
    /// store key.
    fn url(&self) -> &str;

    /// `GET /api/info`.
    fn fetch_info(&self) -> impl Future<Output = Result<GameInfo, ApiError>> + Send;

    /// `POST /api/games/{game_id}/players` with `{username, join_secret}`.
    ///
    /// `join_secret` is empty for unprotected games.
    fn create_player(
        &self,
        game_id: &str,
        username: &str,
        join_secret: &str,
    ) -> impl Future<Output = Result<PlayerData, ApiError>> + Send;

    /// `GET /api/games/{game_id}/players`: player id → username.
    fn fetch_players(
        &self,
        game_id: &str,
    ) -> impl Future<Output = Result<HashMap<String, String>, ApiError>> + Send;

    /// `GET /api/games/{game_id}/players/{player_id}`.
    fn fetch_username(
        &self,
        game_id: &str,
        player_id: &str,
    ) -> impl Future<Output = Result<String, ApiError>> + Send;

    /// Opens the message stream at `endpoint` (a path such as
    /// `/api/games/{id}/spectate`). `bearer` is sent as an
    /// `Authorization` header when given.
    fn open_stream(
        &self,
        endpoint: &str,
        bearer: Option<&str>,
    ) -> impl Future<Output = Result<Self::Connection, TransportError>> + Send;
}
