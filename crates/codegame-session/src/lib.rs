//! Player sessions for the CodeGame client.
//!
//! A [`Session`] records which game on which server the client is part
//! of, and with which player credentials. Bound sessions can be written
//! to disk with a [`SessionStore`] so that a later process can reconnect
//! as the same player without joining again.
//!
//! # How it fits in the stack
//!
//! ```text
//! Client (above)  ← owns the current session, saves it after connecting
//!     ↕
//! Session Layer (this crate)  ← session data + credential files
//!     ↕
//! Protocol Layer (below)  ← path-segment encoding
//! ```

mod error;
mod session;
mod store;

pub use error::SessionError;
pub use session::{PlayerCredentials, Session};
pub use store::SessionStore;
