//! Stream endpoint paths.
//!
//! The server exposes two message-stream endpoints per game:
//!
//! ```text
//! /api/games/{game_id}/connect?player_id={id}&player_secret={secret}
//! /api/games/{game_id}/spectate
//! ```
//!
//! The secret can be left out of the query string when it travels in an
//! `Authorization` header instead.

/// Builds the endpoint for a player connection.
///
/// Pass `player_secret: None` when the secret is sent as a header.
pub fn connect_endpoint(game_id: &str, player_id: &str, player_secret: Option<&str>) -> String {
    let mut endpoint = format!(
        "/api/games/{}/connect?player_id={}",
        encode_component(game_id),
        encode_component(player_id),
    );
    if let Some(secret) = player_secret {
        endpoint.push_str("&player_secret=");
        endpoint.push_str(&encode_component(secret));
    }
    endpoint
}

/// Builds the endpoint for a spectator connection.
pub fn spectate_endpoint(game_id: &str) -> String {
    format!("/api/games/{}/spectate", encode_component(game_id))
}

/// Percent-encodes everything except RFC 3986 unreserved characters, so
/// the result is safe both as a URL path segment and as a file name.
pub fn encode_component(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}
