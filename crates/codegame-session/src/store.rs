//! On-disk session storage.
//!
//! Each saved session is one small JSON file:
//!
//! ```text
//! <root>/<percent-encoded server address>/<username>.json
//! {"game_id": "...", "player_id": "...", "player_secret": "..."}
//! ```
//!
//! The server address and the username are part of the path, not of the
//! file body. One directory per server and one file per username lets a
//! machine keep several identities on several servers side by side.

use std::fs;
use std::path::{Path, PathBuf};

use codegame_protocol::encode_component;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::{PlayerCredentials, Session, SessionError};

/// The file body. Missing fields decode as empty strings so that an
/// incomplete file is reported as [`SessionError::Invalid`], the same as
/// one with empty values.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionRecord {
    #[serde(default)]
    game_id: String,
    #[serde(default)]
    player_id: String,
    #[serde(default)]
    player_secret: String,
}

/// Loads, saves, and removes session files under a root directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
}

impl SessionStore {
    /// Creates a store rooted at `root`. Nothing is created on disk until
    /// the first [`save`](Self::save).
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The store every CodeGame client on this machine shares:
    /// `<local data dir>/codegame/games`.
    ///
    /// On Linux that is `$XDG_DATA_HOME` or `~/.local/share`, on macOS
    /// `~/Library/Application Support`, on Windows `%LOCALAPPDATA%`.
    pub fn default_location() -> Result<Self, SessionError> {
        let dirs = BaseDirs::new().ok_or(SessionError::NoDataDir)?;
        Ok(Self::new(
            dirs.data_local_dir().join("codegame").join("games"),
        ))
    }

    /// The root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The file a session for `(server_address, username)` is stored in.
    ///
    /// The username is used verbatim as the file's base name so other
    /// CodeGame clients sharing the directory find the same file.
    pub fn path_for(&self, server_address: &str, username: &str) -> PathBuf {
        self.server_dir(server_address)
            .join(format!("{username}.json"))
    }

    fn server_dir(&self, server_address: &str) -> PathBuf {
        self.root.join(encode_component(server_address))
    }

    /// Loads the session for `(server_address, username)`.
    ///
    /// # Errors
    /// - [`SessionError::NotFound`]: no file at the derived path
    /// - [`SessionError::Invalid`]: the file isn't a session record, or
    ///   one of `game_id`, `player_id`, `player_secret` is missing/empty
    /// - [`SessionError::Io`]: the file exists but couldn't be read
    pub fn load(&self, server_address: &str, username: &str) -> Result<Session, SessionError> {
        let path = self.path_for(server_address, username);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SessionError::NotFound(path));
            }
            Err(e) => return Err(SessionError::Io(e)),
        };

        let record: SessionRecord = serde_json::from_slice(&bytes).map_err(|e| {
            SessionError::Invalid(format!("{}: {e}", path.display()))
        })?;

        if record.game_id.is_empty()
            || record.player_id.is_empty()
            || record.player_secret.is_empty()
        {
            return Err(SessionError::Invalid(format!(
                "{}: incomplete session file",
                path.display()
            )));
        }

        Ok(Session::player(
            server_address,
            username,
            record.game_id,
            PlayerCredentials::new(record.player_id, record.player_secret),
        ))
    }

    /// Writes `session` to disk, replacing any earlier file for the same
    /// server and username. Missing directories are created.
    ///
    /// # Errors
    /// [`SessionError::Invalid`] if any of server address, username, game
    /// id, player id, or player secret is empty. Nothing is written then.
    pub fn save(&self, session: &Session) -> Result<(), SessionError> {
        let credentials = session
            .player
            .as_ref()
            .ok_or_else(|| SessionError::Invalid("session has no player".into()))?;

        if session.server_address.is_empty()
            || session.username.is_empty()
            || session.game_id.is_empty()
            || credentials.player_id.is_empty()
            || credentials.player_secret.is_empty()
        {
            return Err(SessionError::Invalid(
                "session has empty required fields".into(),
            ));
        }

        let record = SessionRecord {
            game_id: session.game_id.clone(),
            player_id: credentials.player_id.clone(),
            player_secret: credentials.player_secret.clone(),
        };
        let body = serde_json::to_vec(&record)
            .map_err(|e| SessionError::Invalid(e.to_string()))?;

        fs::create_dir_all(self.server_dir(&session.server_address))?;
        let path = self.path_for(&session.server_address, &session.username);
        fs::write(&path, body)?;

        tracing::debug!(path = %path.display(), "session saved");
        Ok(())
    }

    /// Deletes the file for `session`, if any.
    pub fn remove(&self, session: &Session) {
        self.remove_entry(&session.server_address, &session.username);
    }

    /// Deletes the file for `(server_address, username)` and the server
    /// directory if that leaves it empty. Best effort: errors are logged at
    /// debug level and otherwise ignored.
    pub fn remove_entry(&self, server_address: &str, username: &str) {
        if server_address.is_empty() {
            return;
        }

        let dir = self.server_dir(server_address);
        if !dir.is_dir() {
            return;
        }

        let path = self.path_for(server_address, username);
        if let Err(e) = fs::remove_file(&path) {
            tracing::debug!(path = %path.display(), error = %e, "could not remove session file");
        }
        // Fails (harmlessly) while other usernames are still stored.
        let _ = fs::remove_dir(&dir);
    }
}
