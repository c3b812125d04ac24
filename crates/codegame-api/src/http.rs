//! `reqwest`-based implementation of [`GameApi`].

use std::collections::HashMap;
use std::time::Duration;

use codegame_protocol::encode_component;
use codegame_transport::{TransportError, WebSocketConnection};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::types::{
    CreateGameRequest, CreatePlayerRequest, GameConfigResponse, UsernameResponse,
};
use crate::{ApiError, GameApi, GameData, GameInfo, PlayerData};

/// How long the TLS probe in [`HttpApi::new`] waits for an answer.
const TLS_PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Client for one game server's HTTP API.
#[derive(Debug, Clone)]
pub struct HttpApi {
    client: reqwest::Client,
    url: String,
    tls: bool,
}

impl HttpApi {
    /// Creates a client for the server at `url`.
    ///
    /// `url` may include a protocol (`https://...`) and a trailing slash;
    /// both are stripped. Whether the server speaks TLS is found out by
    /// requesting `https://<url>/api/info`.
    pub async fn new(url: &str) -> Result<Self, ApiError> {
        let trimmed = trim_url(url);
        let client = reqwest::Client::new();
        let tls = probe_tls(&client, &trimmed).await;
        tracing::debug!(url = %trimmed, tls, "resolved game server");
        Ok(Self {
            client,
            url: trimmed,
            tls,
        })
    }

    /// Creates a client without probing; the caller says whether the
    /// server uses TLS.
    pub fn with_tls(url: &str, tls: bool) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: trim_url(url),
            tls,
        }
    }

    /// Returns `true` if requests go over `https`/`wss`.
    pub fn is_tls(&self) -> bool {
        self.tls
    }

    /// `http(s)://<url>`.
    pub fn base_url(&self) -> String {
        base_url("http", self.tls, &self.url)
    }

    /// `ws(s)://<url><endpoint>`.
    pub fn websocket_url(&self, endpoint: &str) -> String {
        format!("{}{endpoint}", base_url("ws", self.tls, &self.url))
    }

    /// Creates a new game without a config.
    pub async fn create_game(&self, public: bool, protected: bool) -> Result<GameData, ApiError> {
        let request: CreateGameRequest<'_, ()> = CreateGameRequest {
            public,
            protected,
            config: None,
        };
        self.post_json("/api/games", &request).await
    }

    /// Creates a new game with a game-specific config.
    ///
    /// A protected game gets a join secret, returned in
    /// [`GameData::join_secret`].
    pub async fn create_game_with_config<C: Serialize + Sync>(
        &self,
        public: bool,
        protected: bool,
        config: &C,
    ) -> Result<GameData, ApiError> {
        let request = CreateGameRequest {
            public,
            protected,
            config: Some(config),
        };
        self.post_json("/api/games", &request).await
    }

    /// Fetches the config a game was created with.
    pub async fn fetch_game_config<T: DeserializeOwned>(&self, game_id: &str) -> Result<T, ApiError> {
        let endpoint = format!("/api/games/{}", encode_component(game_id));
        let response: GameConfigResponse<T> = self.get_json(&endpoint).await?;
        Ok(response.config)
    }

    async fn get_json<T: DeserializeOwned>(&self, endpoint: &str) -> Result<T, ApiError> {
        let response = self
            .client
            .get(format!("{}{endpoint}", self.base_url()))
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoint.to_owned(),
                source,
            })?;
        decode_response(endpoint, response).await
    }

    async fn post_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self
            .client
            .post(format!("{}{endpoint}", self.base_url()))
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::Request {
                endpoint: endpoint.to_owned(),
                source,
            })?;
        decode_response(endpoint, response).await
    }
}

impl GameApi for HttpApi {
    type Connection = WebSocketConnection;

    fn url(&self) -> &str {
        &self.url
    }

    async fn fetch_info(&self) -> Result<GameInfo, ApiError> {
        self.get_json("/api/info").await
    }

    async fn create_player(
        &self,
        game_id: &str,
        username: &str,
        join_secret: &str,
    ) -> Result<PlayerData, ApiError> {
        let endpoint = format!("/api/games/{}/players", encode_component(game_id));
        let request = CreatePlayerRequest {
            username,
            join_secret,
        };
        self.post_json(&endpoint, &request).await
    }

    async fn fetch_players(&self, game_id: &str) -> Result<HashMap<String, String>, ApiError> {
        let endpoint = format!("/api/games/{}/players", encode_component(game_id));
        self.get_json(&endpoint).await
    }

    async fn fetch_username(&self, game_id: &str, player_id: &str) -> Result<String, ApiError> {
        let endpoint = format!(
            "/api/games/{}/players/{}",
            encode_component(game_id),
            encode_component(player_id)
        );
        let response: UsernameResponse = self.get_json(&endpoint).await?;
        Ok(response.username)
    }

    async fn open_stream(
        &self,
        endpoint: &str,
        bearer: Option<&str>,
    ) -> Result<WebSocketConnection, TransportError> {
        WebSocketConnection::connect(&self.websocket_url(endpoint), bearer).await
    }
}

async fn decode_response<T: DeserializeOwned>(
    endpoint: &str,
    response: reqwest::Response,
) -> Result<T, ApiError> {
    let status = response.status();
    if !status.is_success() {
        return Err(ApiError::Status {
            endpoint: endpoint.to_owned(),
            status: status.as_u16(),
        });
    }
    response.json().await.map_err(|source| ApiError::Decode {
        endpoint: endpoint.to_owned(),
        source,
    })
}

async fn probe_tls(client: &reqwest::Client, trimmed_url: &str) -> bool {
    let url = format!("{}/api/info", base_url("http", true, trimmed_url));
    match client.get(url).timeout(TLS_PROBE_TIMEOUT).send().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "TLS probe failed, using plain http");
            false
        }
    }
}

/// Strips a trailing slash and the protocol prefix:
/// `https://example.com/` → `example.com`.
pub fn trim_url(url: &str) -> String {
    let url = url.strip_suffix('/').unwrap_or(url);
    match url.split_once("://") {
        Some((_, rest)) => rest.to_owned(),
        None => url.to_owned(),
    }
}

/// Joins a protocol (`http`, `ws`) with a trimmed URL, adding the `s`
/// suffix for TLS.
pub fn base_url(protocol: &str, tls: bool, trimmed_url: &str) -> String {
    if tls {
        format!("{protocol}s://{trimmed_url}")
    } else {
        format!("{protocol}://{trimmed_url}")
    }
}
