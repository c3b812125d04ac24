//! `ProtocolClient`: connection lifecycle, sessions, and commands.
//!
//! The client ties the layers together:
//!
//! ```text
//! GameApi (HTTP)  ──mint player / fetch usernames──┐
//!                                                  ▼
//! Connection (stream) ──text frames──▶ delivery task ──▶ CallbackRegistry
//!        ▲                                                   │
//!        └──────────── send(command, data) ◀── user code ◀───┘
//! ```
//!
//! # State machine
//!
//! ```text
//! Unbound ──join/connect/spectate/restore_session──▶ Connecting ──▶ Connected ──▶ Closed
//!    ▲                                                  │
//!    └───────────────────── (failure) ──────────────────┘
//! ```
//!
//! `Closed` is terminal; a new client is needed to connect again.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use codegame_api::{GameApi, GameInfo, HttpApi};
use codegame_protocol::{
    CG_VERSION, Codec, Event, JsonCodec, connect_endpoint, is_version_compatible,
    spectate_endpoint,
};
use codegame_session::{PlayerCredentials, Session, SessionError, SessionStore};
use codegame_transport::Connection;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tokio::sync::{Notify, watch};

use crate::{CallbackId, CallbackRegistry, ClientError};

/// The close reason sent by [`ProtocolClient::close`].
const NORMAL_CLOSURE: &str = "Normal closure.";

/// Where a [`ProtocolClient`] is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// No game yet. The only state that accepts `join`, `connect`,
    /// `spectate`, and `restore_session`.
    Unbound,
    /// A join/connect/spectate is in progress.
    Connecting,
    /// The message stream is open.
    Connected,
    /// The stream has closed. Terminal.
    Closed,
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for configuring a [`ProtocolClient`].
///
/// # Example
///
/// ```rust,no_run
/// # async fn run() -> Result<(), codegame::ClientError> {
/// use codegame::{HttpApi, ProtocolClient, SessionStore};
///
/// let api = HttpApi::new("localhost:8080").await?;
/// let client = ProtocolClient::builder()
///     .session_store(SessionStore::new("/tmp/codegame-sessions"))
///     .secret_in_header(true)
///     .build(api)
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ProtocolClientBuilder {
    store: Option<SessionStore>,
    secret_in_header: bool,
    client_version: String,
}

impl ProtocolClientBuilder {
    /// Creates a builder with default settings: the shared session store,
    /// the secret in the query string, and [`CG_VERSION`].
    pub fn new() -> Self {
        Self {
            store: None,
            secret_in_header: false,
            client_version: CG_VERSION.to_owned(),
        }
    }

    /// Sets where sessions are saved and restored from.
    pub fn session_store(mut self, store: SessionStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Sends the player secret as an `Authorization: Bearer` header
    /// instead of a `player_secret` query parameter.
    pub fn secret_in_header(mut self, enabled: bool) -> Self {
        self.secret_in_header = enabled;
        self
    }

    /// Overrides the protocol version compared against the server's.
    pub fn client_version(mut self, version: &str) -> Self {
        self.client_version = version.to_owned();
        self
    }

    /// Fetches the server info and creates the client.
    ///
    /// A protocol version mismatch is logged as a warning; it never
    /// prevents the client from being built.
    pub async fn build<A: GameApi>(self, api: A) -> Result<ProtocolClient<A>, ClientError> {
        let store = match self.store {
            Some(store) => store,
            None => SessionStore::default_location()?,
        };

        let info = api.fetch_info().await?;
        if !is_version_compatible(&info.cg_version, &self.client_version) {
            tracing::warn!(
                server = %info.cg_version,
                client = %self.client_version,
                "CodeGame version mismatch"
            );
        }

        let (state, _) = watch::channel(ClientState::Unbound);
        let released = Arc::new(Notify::new());

        Ok(ProtocolClient {
            handle: Arc::new(HandleGuard {
                released: Arc::clone(&released),
            }),
            inner: Arc::new(Inner {
                api,
                info,
                store,
                secret_in_header: self.secret_in_header,
                state,
                session: Mutex::new(None),
                connection: Mutex::new(None),
                registry: CallbackRegistry::new(),
                usernames: Mutex::new(HashMap::new()),
                released,
            }),
        })
    }
}

impl Default for ProtocolClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Shared client state, referenced by every clone of the client and by
/// the connection's delivery task.
///
/// The std mutexes guard short, synchronous sections only and are never
/// held across an `.await`.
struct Inner<A: GameApi> {
    api: A,
    info: GameInfo,
    store: SessionStore,
    secret_in_header: bool,
    /// Single source of truth for the lifecycle; `listen` waits on it.
    state: watch::Sender<ClientState>,
    session: Mutex<Option<Session>>,
    connection: Mutex<Option<Arc<A::Connection>>>,
    registry: CallbackRegistry,
    usernames: Mutex<HashMap<String, String>>,
    /// Notified when the last client handle is dropped.
    released: Arc<Notify>,
}

/// Shared by all clones of one client. Its drop tells the delivery task
/// that nobody can call `close` any more.
struct HandleGuard {
    released: Arc<Notify>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.released.notify_one();
    }
}

/// A real-time connection to one game on a CodeGame server.
///
/// Cloning is cheap and every clone drives the same connection, so a
/// handler can capture a clone and spawn a `send` from inside.
///
/// Dropping the last clone closes an open connection normally, as if
/// [`close`](Self::close) had been called. A clone captured by a handler
/// registered on this same client counts as a live handle, so such a
/// client stays connected until it is closed explicitly or by the server.
pub struct ProtocolClient<A: GameApi> {
    inner: Arc<Inner<A>>,
    handle: Arc<HandleGuard>,
}

impl<A: GameApi> Clone for ProtocolClient<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            handle: Arc::clone(&self.handle),
        }
    }
}

impl ProtocolClient<HttpApi> {
    /// Creates a client for the server at `url` with default settings.
    pub async fn new(url: &str) -> Result<Self, ClientError> {
        let api = HttpApi::new(url).await?;
        ProtocolClientBuilder::new().build(api).await
    }

    /// Creates a new builder. The builder accepts any [`GameApi`].
    pub fn builder() -> ProtocolClientBuilder {
        ProtocolClientBuilder::new()
    }
}

impl<A: GameApi> ProtocolClient<A> {
    /// The HTTP API this client uses.
    pub fn api(&self) -> &A {
        &self.inner.api
    }

    /// The server info fetched when the client was built.
    pub fn server_info(&self) -> &GameInfo {
        &self.inner.info
    }

    /// The current lifecycle state.
    pub fn state(&self) -> ClientState {
        *self.inner.state.borrow()
    }

    /// The current session, if the client has connected.
    pub fn session(&self) -> Option<Session> {
        lock(&self.inner.session).clone()
    }

    /// The registry inbound events are dispatched to.
    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.inner.registry
    }

    /// Registers a handler for every `event`. See
    /// [`CallbackRegistry::subscribe`].
    pub fn on<T, F>(&self, event: &str, handler: F) -> Result<CallbackId, ClientError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe(event, handler)
    }

    /// Registers a handler for the next `event` only. See
    /// [`CallbackRegistry::subscribe_once`].
    pub fn once<T, F>(&self, event: &str, handler: F) -> Result<CallbackId, ClientError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.inner.registry.subscribe_once(event, handler)
    }

    /// Removes a handler. Unknown ids are ignored.
    pub fn remove_callback(&self, event: &str, id: CallbackId) {
        self.inner.registry.unsubscribe(event, id);
    }

    // -- Connecting -------------------------------------------------------

    /// Creates a new player in `game_id` and connects as that player.
    ///
    /// `join_secret` is empty for unprotected games.
    ///
    /// # Errors
    /// [`ClientError::AlreadyConnected`] unless the client is `Unbound`.
    pub async fn join(&self, game_id: &str, username: &str, join_secret: &str) -> Result<(), ClientError> {
        self.begin_connecting()?;
        let result = async {
            let player = self
                .inner
                .api
                .create_player(game_id, username, join_secret)
                .await?;
            self.bind_player(
                game_id,
                &player.player_id,
                &player.player_secret,
                Some(username),
            )
            .await
        }
        .await;
        self.finish_connecting(result)
    }

    /// Connects as an existing player.
    ///
    /// On success the session is saved to the session store; a failed
    /// save is logged and otherwise ignored.
    ///
    /// # Errors
    /// [`ClientError::AlreadyConnected`] unless the client is `Unbound`.
    pub async fn connect(&self, game_id: &str, player_id: &str, player_secret: &str) -> Result<(), ClientError> {
        self.begin_connecting()?;
        let result = self
            .bind_player(game_id, player_id, player_secret, None)
            .await;
        self.finish_connecting(result)
    }

    /// Connects to `game_id` as a spectator. Spectators receive events
    /// but cannot send commands, and their sessions are never saved.
    ///
    /// # Errors
    /// [`ClientError::AlreadyConnected`] unless the client is `Unbound`.
    pub async fn spectate(&self, game_id: &str) -> Result<(), ClientError> {
        self.begin_connecting()?;
        let result = self.bind_spectator(game_id).await;
        self.finish_connecting(result)
    }

    /// Reconnects with the session saved for `username` on this server.
    ///
    /// If the saved session is invalid, or connecting with it fails, the
    /// session file is deleted before the error is returned, so a bad
    /// credential is never retried silently.
    ///
    /// # Errors
    /// - [`ClientError::AlreadyConnected`] unless the client is `Unbound`
    /// - [`ClientError::InvalidSession`] if nothing usable is saved
    /// - any error from connecting
    pub async fn restore_session(&self, username: &str) -> Result<(), ClientError> {
        self.begin_connecting()?;
        let result = self.bind_saved(username).await;
        self.finish_connecting(result)
    }

    async fn bind_saved(&self, username: &str) -> Result<(), ClientError> {
        let store = &self.inner.store;
        let server = self.inner.api.url();

        let session = match store.load(server, username) {
            Ok(session) => session,
            Err(SessionError::Invalid(reason)) => {
                tracing::warn!(%username, %reason, "removing invalid session file");
                store.remove_entry(server, username);
                return Err(SessionError::Invalid(reason).into());
            }
            Err(e) => return Err(e.into()),
        };
        let Some(credentials) = session.player.as_ref() else {
            return Err(SessionError::Invalid("session has no player".into()).into());
        };

        let result = self
            .bind_player(
                &session.game_id,
                &credentials.player_id,
                &credentials.player_secret,
                Some(&session.username),
            )
            .await;
        if let Err(e) = &result {
            tracing::warn!(%username, error = %e, "restoring session failed, removing it");
            store.remove(&session);
        }
        result
    }

    /// Opens the player stream and installs the session. `known_username`
    /// is what the caller already knows (from `join` or a saved session);
    /// otherwise the username comes from the server's player list.
    async fn bind_player(
        &self,
        game_id: &str,
        player_id: &str,
        player_secret: &str,
        known_username: Option<&str>,
    ) -> Result<(), ClientError> {
        let (endpoint, bearer) = if self.inner.secret_in_header {
            (connect_endpoint(game_id, player_id, None), Some(player_secret))
        } else {
            (connect_endpoint(game_id, player_id, Some(player_secret)), None)
        };

        let connection = self.inner.api.open_stream(&endpoint, bearer).await?;
        let mut usernames = self.fetch_players_or_close(&connection, game_id).await?;

        let username = match known_username {
            Some(name) => {
                usernames
                    .entry(player_id.to_owned())
                    .or_insert_with(|| name.to_owned());
                name.to_owned()
            }
            None => usernames.get(player_id).cloned().unwrap_or_default(),
        };
        let session = Session::player(
            self.inner.api.url(),
            username,
            game_id,
            PlayerCredentials::new(player_id, player_secret),
        );
        if let Err(e) = self.inner.store.save(&session) {
            tracing::error!(error = %e, "failed to save session");
        }

        tracing::info!(%game_id, %player_id, conn = %connection.id(), "connected as player");
        self.attach(connection, session, usernames);
        Ok(())
    }

    async fn bind_spectator(&self, game_id: &str) -> Result<(), ClientError> {
        let connection = self
            .inner
            .api
            .open_stream(&spectate_endpoint(game_id), None)
            .await?;
        let usernames = self.fetch_players_or_close(&connection, game_id).await?;

        let session = Session::spectator(self.inner.api.url(), game_id);

        tracing::info!(%game_id, conn = %connection.id(), "connected as spectator");
        self.attach(connection, session, usernames);
        Ok(())
    }

    async fn fetch_players_or_close(
        &self,
        connection: &A::Connection,
        game_id: &str,
    ) -> Result<HashMap<String, String>, ClientError> {
        match self.inner.api.fetch_players(game_id).await {
            Ok(usernames) => Ok(usernames),
            Err(e) => {
                if let Err(close_err) = connection.close("Failed to fetch players.").await {
                    tracing::debug!(error = %close_err, "close after failed connect");
                }
                Err(e.into())
            }
        }
    }

    /// Installs a freshly opened connection and starts delivering its
    /// frames to the registry.
    fn attach(&self, connection: A::Connection, session: Session, usernames: HashMap<String, String>) {
        let connection = Arc::new(connection);
        *lock(&self.inner.session) = Some(session);
        *lock(&self.inner.usernames) = usernames;
        *lock(&self.inner.connection) = Some(Arc::clone(&connection));

        self.inner.state.send_if_modified(|state| {
            if *state == ClientState::Connecting {
                *state = ClientState::Connected;
                true
            } else {
                false
            }
        });

        tokio::spawn(deliver(Arc::clone(&self.inner), connection));
    }

    fn begin_connecting(&self) -> Result<(), ClientError> {
        let started = self.inner.state.send_if_modified(|state| {
            if *state == ClientState::Unbound {
                *state = ClientState::Connecting;
                true
            } else {
                false
            }
        });
        if started {
            Ok(())
        } else {
            Err(ClientError::AlreadyConnected)
        }
    }

    fn finish_connecting(&self, result: Result<(), ClientError>) -> Result<(), ClientError> {
        if result.is_err() {
            self.inner.state.send_if_modified(|state| {
                if *state == ClientState::Connecting {
                    *state = ClientState::Unbound;
                    true
                } else {
                    false
                }
            });
        }
        result
    }

    // -- Talking to the game ----------------------------------------------

    /// Sends a command to the server as `{"name": command, "data": data}`.
    ///
    /// Resolves once the frame has been handed to the stream.
    ///
    /// # Errors
    /// [`ClientError::NotConnected`] unless the client is `Connected` as a
    /// player (spectators can't send).
    pub async fn send<T: Serialize + ?Sized>(&self, command: &str, data: &T) -> Result<(), ClientError> {
        let connection = self.player_connection()?;
        let text = JsonCodec.encode_text(&Event::new(command, data))?;
        connection.send(&text).await?;
        Ok(())
    }

    fn player_connection(&self) -> Result<Arc<A::Connection>, ClientError> {
        if self.state() != ClientState::Connected {
            return Err(ClientError::NotConnected);
        }
        let bound = lock(&self.inner.session)
            .as_ref()
            .is_some_and(Session::is_bound);
        if !bound {
            return Err(ClientError::NotConnected);
        }
        lock(&self.inner.connection)
            .clone()
            .ok_or(ClientError::NotConnected)
    }

    /// Returns the username of `player_id`, fetching it from the server
    /// if it isn't cached yet.
    ///
    /// # Errors
    /// [`ClientError::NotConnected`] on a cache miss before the client has
    /// a game.
    pub async fn username(&self, player_id: &str) -> Result<String, ClientError> {
        if let Some(username) = self.cached_username(player_id) {
            return Ok(username);
        }

        let game_id = lock(&self.inner.session)
            .as_ref()
            .map(|s| s.game_id.clone())
            .ok_or(ClientError::NotConnected)?;

        let username = self.inner.api.fetch_username(&game_id, player_id).await?;
        lock(&self.inner.usernames).insert(player_id.to_owned(), username.clone());
        Ok(username)
    }

    /// Returns the cached username of `player_id` without touching the
    /// network. Usable from inside event handlers.
    pub fn cached_username(&self, player_id: &str) -> Option<String> {
        lock(&self.inner.usernames).get(player_id).cloned()
    }

    // -- Closing ----------------------------------------------------------

    /// Waits until the connection has closed.
    ///
    /// Returns immediately if the client never connected (or its connect
    /// attempt failed). Any number of tasks may wait at once.
    pub async fn listen(&self) {
        let mut state = self.inner.state.subscribe();
        // The sender lives in `inner`, which `self` keeps alive.
        let _ = state
            .wait_for(|s| matches!(s, ClientState::Unbound | ClientState::Closed))
            .await;
    }

    /// Closes the connection normally and waits until the close has been
    /// observed.
    ///
    /// # Errors
    /// [`ClientError::NotConnected`] if the client never connected.
    pub async fn close(&self) -> Result<(), ClientError> {
        match self.state() {
            ClientState::Closed => return Ok(()),
            ClientState::Unbound | ClientState::Connecting => {
                return Err(ClientError::NotConnected);
            }
            ClientState::Connected => {}
        }

        let connection = lock(&self.inner.connection).clone();
        if let Some(connection) = connection {
            // Fails when the server closed first; the delivery task has
            // seen (or is about to see) the end of the stream then.
            if let Err(e) = connection.close(NORMAL_CLOSURE).await {
                tracing::debug!(error = %e, "close frame not sent");
            }
        }

        self.listen().await;
        Ok(())
    }
}

/// The connection's delivery task: one frame at a time, in arrival order,
/// until the stream ends. Starts a normal close once every client handle
/// is gone, then keeps reading until the server acknowledges it.
async fn deliver<A: GameApi>(inner: Arc<Inner<A>>, connection: Arc<A::Connection>) {
    let id = connection.id();
    let mut closing = false;
    loop {
        let frame = tokio::select! {
            frame = connection.recv() => Some(frame),
            () = inner.released.notified(), if !closing => None,
        };
        let Some(frame) = frame else {
            closing = true;
            tracing::info!(conn = %id, "client dropped, closing connection");
            if let Err(e) = connection.close(NORMAL_CLOSURE).await {
                tracing::debug!(conn = %id, error = %e, "close frame not sent");
                break;
            }
            continue;
        };

        match frame {
            Ok(Some(text)) => {
                inner.registry.dispatch(&text);
            }
            Ok(None) => {
                tracing::info!(conn = %id, "connection closed");
                break;
            }
            Err(e) => {
                tracing::warn!(conn = %id, error = %e, "connection lost");
                break;
            }
        }
    }
    inner.state.send_replace(ClientState::Closed);
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
