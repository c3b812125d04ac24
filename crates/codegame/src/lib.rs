//! # CodeGame
//!
//! Real-time client for CodeGame game servers.
//!
//! A [`ProtocolClient`] joins (or spectates) one game on one server over
//! a WebSocket message stream. Inbound events are decoded into the types
//! your handlers ask for; outbound commands are any `Serialize` value.
//! Player sessions are saved to disk so a later run can pick up where
//! this one left off with [`ProtocolClient::restore_session`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use codegame::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Deserialize)]
//! struct Tick {
//!     turn: u32,
//! }
//!
//! # async fn run() -> Result<(), ClientError> {
//! let client = ProtocolClient::new("localhost:8080").await?;
//! client.on("tick", |tick: &Tick| println!("turn {}", tick.turn))?;
//!
//! client.join("some-game-id", "alice", "").await?;
//! client.send("move", &serde_json::json!({"x": 1, "y": 2})).await?;
//! client.listen().await;
//! # Ok(())
//! # }
//! ```

mod client;
mod error;
mod registry;

pub use client::{ClientState, ProtocolClient, ProtocolClientBuilder};
pub use error::ClientError;
pub use registry::{CallbackId, CallbackRegistry};

pub use codegame_api::{ApiError, GameApi, GameData, GameInfo, HttpApi, PlayerData};
pub use codegame_protocol::{CG_VERSION, Event, ProtocolError, is_version_compatible};
pub use codegame_session::{PlayerCredentials, Session, SessionError, SessionStore};
pub use codegame_transport::{Connection, ConnectionId, TransportError};

/// The types most programs need.
pub mod prelude {
    pub use crate::{
        CallbackId, ClientError, ClientState, GameApi, HttpApi, ProtocolClient,
        ProtocolClientBuilder, Session, SessionStore,
    };
}
