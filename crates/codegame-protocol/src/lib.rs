//! Wire protocol for the CodeGame client.
//!
//! This crate defines what travels over a game's message stream:
//!
//! - **Types** ([`Event`], [`EventName`]): the `{name, data}` envelope.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how envelopes are
//!   converted to/from bytes.
//! - **Endpoints** ([`connect_endpoint`], [`spectate_endpoint`]): where
//!   the streams live on the server.
//! - **Versioning** ([`is_version_compatible`], [`CG_VERSION`]).
//! - **Errors** ([`ProtocolError`]).
//!
//! # Architecture
//!
//! ```text
//! Transport (text frames) → Protocol (Event<T>) → Client (typed handlers)
//! ```

mod codec;
mod endpoint;
mod error;
mod types;
mod version;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use endpoint::{connect_endpoint, encode_component, spectate_endpoint};
pub use error::ProtocolError;
pub use types::{Event, EventName};
pub use version::{CG_VERSION, is_version_compatible};
