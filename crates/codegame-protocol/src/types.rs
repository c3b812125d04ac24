//! The event envelope: the only message shape on a CodeGame stream.
//!
//! Every frame in either direction is `{"name": ..., "data": ...}`. The
//! name says which event (inbound) or command (outbound) it is; the data
//! is game-specific and only gets a concrete type where a handler or a
//! caller of `send` supplies one.

use serde::{Deserialize, Serialize};

/// A named event with a typed payload.
///
/// `T` is whatever the game defines for this event name. The same struct
/// is used for inbound events and outbound commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event<T> {
    /// The event or command name.
    pub name: String,
    /// The payload.
    pub data: T,
}

impl<T> Event<T> {
    /// Wraps `data` in an envelope named `name`.
    pub fn new(name: impl Into<String>, data: T) -> Self {
        Self {
            name: name.into(),
            data,
        }
    }
}

/// Just the name of an event.
///
/// Decoding into this first lets the receiver find out which event a
/// frame carries without committing to a payload type. Unknown fields
/// (including `data`) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EventName {
    /// The event name.
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Move {
        row: u8,
        col: u8,
    }

    #[test]
    fn test_event_serializes_to_name_and_data() {
        let event = Event::new("move", Move { row: 1, col: 2 });
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value, json!({"name": "move", "data": {"row": 1, "col": 2}}));
    }

    #[test]
    fn test_event_borrowed_payload_serializes_like_owned() {
        let payload = Move { row: 0, col: 0 };
        let borrowed = serde_json::to_string(&Event::new("move", &payload)).unwrap();
        let owned = serde_json::to_string(&Event::new("move", payload)).unwrap();
        assert_eq!(borrowed, owned);
    }

    #[test]
    fn test_event_name_ignores_payload() {
        let name: EventName =
            serde_json::from_str(r#"{"name":"tick","data":{"nested":[1,2,3]}}"#).unwrap();
        assert_eq!(name.name, "tick");
    }

    #[test]
    fn test_event_name_missing_name_fails() {
        let result: Result<EventName, _> = serde_json::from_str(r#"{"data":5}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_event_wrong_payload_shape_fails() {
        let result: Result<Event<u32>, _> =
            serde_json::from_str(r#"{"name":"tick","data":"five"}"#);
        assert!(result.is_err());
    }
}
