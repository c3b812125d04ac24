//! CodeGame protocol version negotiation.
//!
//! Versions are dotted strings (`"0.7"`, `"1.2"`). Only the first two
//! components matter; a missing minor counts as `"0"`.

/// The protocol version this client implements.
pub const CG_VERSION: &str = "0.7";

/// Returns `true` if a client speaking `client_version` can talk to a
/// server speaking `server_version`.
///
/// - Majors must be equal.
/// - Before 1.0 there is no backward compatibility, so minors must match
///   exactly.
/// - From 1.0 on, the server may be newer: the client's minor must be
///   less than or equal to the server's. A minor that isn't a number makes
///   the versions incompatible.
///
/// ```rust
/// use codegame_protocol::is_version_compatible;
///
/// assert!(is_version_compatible("1.3", "1.1"));
/// assert!(!is_version_compatible("0.8", "0.7"));
/// ```
pub fn is_version_compatible(server_version: &str, client_version: &str) -> bool {
    let (server_major, server_minor) = major_minor(server_version);
    let (client_major, client_minor) = major_minor(client_version);

    if server_major != client_major {
        return false;
    }

    if client_major == "0" {
        return server_minor == client_minor;
    }

    match (server_minor.parse::<u64>(), client_minor.parse::<u64>()) {
        (Ok(server), Ok(client)) => client <= server,
        _ => false,
    }
}

/// Splits a version into its first two components.
fn major_minor(version: &str) -> (&str, &str) {
    let mut parts = version.split('.');
    let major = parts.next().unwrap_or("");
    let minor = parts.next().unwrap_or("0");
    (major, minor)
}
