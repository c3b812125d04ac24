//! Event subscriptions and dispatch.
//!
//! Handlers are registered per event name with a concrete payload type:
//!
//! ```rust
//! use codegame::CallbackRegistry;
//!
//! let registry = CallbackRegistry::new();
//! registry
//!     .subscribe::<u32, _>("tick", |tick| println!("tick {tick}"))
//!     .unwrap();
//! registry.dispatch(r#"{"name":"tick","data":5}"#);
//! ```
//!
//! # Type erasure
//!
//! Every event name owns a *bucket*. The first subscription fixes the
//! bucket's payload type: it stores the type's `TypeId` and a decoder
//! function monomorphized for that type. A frame is decoded once with the
//! bucket's decoder into a `Box<dyn Any>`, and every handler downcasts it
//! back to `&T`. A later subscription with a different `T` would need a
//! second decode of the same frame, so it is refused with
//! [`ClientError::TypeMismatch`].
//!
//! # Re-entrancy
//!
//! The lock is never held while a handler runs. Dispatch copies the
//! bucket's registrations, releases the lock, and re-checks each
//! registration right before calling it, so handlers can subscribe and
//! unsubscribe (including themselves) freely.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use codegame_protocol::{Codec, Event, EventName, JsonCodec, ProtocolError};
use rand::Rng;
use serde::de::DeserializeOwned;

use crate::ClientError;

/// Opaque token identifying one registration. Pass it to
/// [`CallbackRegistry::unsubscribe`] to remove the handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackId(u128);

impl CallbackId {
    fn random() -> Self {
        Self(rand::rng().random())
    }
}

impl fmt::Display for CallbackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

type DecodeFn = fn(&[u8]) -> Result<Box<dyn Any>, ProtocolError>;
type ErasedHandler = Arc<dyn Fn(&dyn Any) + Send + Sync>;

#[derive(Clone)]
struct Registration {
    id: CallbackId,
    once: bool,
    handler: ErasedHandler,
}

struct Bucket {
    type_id: TypeId,
    type_name: &'static str,
    decode: DecodeFn,
    registrations: Vec<Registration>,
}

/// Maps event names to typed handlers and dispatches inbound frames.
///
/// All methods take `&self` and are safe to call from any thread,
/// including from inside a handler.
#[derive(Default)]
pub struct CallbackRegistry {
    buckets: Mutex<HashMap<String, Bucket>>,
}

impl CallbackRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for every `event` frame.
    ///
    /// # Errors
    /// [`ClientError::TypeMismatch`] if `event` is already bound to a
    /// payload type other than `T`.
    pub fn subscribe<T, F>(&self, event: &str, handler: F) -> Result<CallbackId, ClientError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(event, false, handler)
    }

    /// Registers `handler` for the next `event` frame only.
    ///
    /// The handler is removed before it runs, so it sees exactly one
    /// event even if it (or an earlier handler) subscribes again.
    ///
    /// # Errors
    /// Same as [`subscribe`](Self::subscribe).
    pub fn subscribe_once<T, F>(&self, event: &str, handler: F) -> Result<CallbackId, ClientError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        self.register(event, true, handler)
    }

    fn register<T, F>(&self, event: &str, once: bool, handler: F) -> Result<CallbackId, ClientError>
    where
        T: DeserializeOwned + 'static,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let mut buckets = self.lock();
        let bucket = buckets.entry(event.to_owned()).or_insert_with(|| Bucket {
            type_id: TypeId::of::<T>(),
            type_name: type_name::<T>(),
            decode: decode_payload::<T>,
            registrations: Vec::new(),
        });

        if bucket.type_id != TypeId::of::<T>() {
            return Err(ClientError::TypeMismatch {
                event: event.to_owned(),
                expected: bucket.type_name,
                found: type_name::<T>(),
            });
        }

        let id = CallbackId::random();
        let handler: ErasedHandler = Arc::new(move |data: &dyn Any| {
            if let Some(data) = data.downcast_ref::<T>() {
                handler(data);
            }
        });
        bucket.registrations.push(Registration { id, once, handler });

        tracing::trace!(event, %id, once, "handler registered");
        Ok(id)
    }

    /// Removes a registration. Unknown names or ids are ignored.
    ///
    /// Returns `true` if a handler was removed.
    pub fn unsubscribe(&self, event: &str, id: CallbackId) -> bool {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(event) else {
            return false;
        };
        let before = bucket.registrations.len();
        bucket.registrations.retain(|r| r.id != id);
        before != bucket.registrations.len()
    }

    /// Returns `true` if `id` is still registered under `event`.
    pub fn is_subscribed(&self, event: &str, id: CallbackId) -> bool {
        self.lock()
            .get(event)
            .is_some_and(|b| b.registrations.iter().any(|r| r.id == id))
    }

    /// Number of handlers currently registered under `event`.
    pub fn handler_count(&self, event: &str) -> usize {
        self.lock().get(event).map_or(0, |b| b.registrations.len())
    }

    /// Delivers one raw `{"name", "data"}` frame to its handlers.
    ///
    /// Frames for names nobody subscribed to are dropped without decoding
    /// the payload. Handlers run synchronously, in registration order, on
    /// the calling thread. A handler that panics is logged and skipped;
    /// the others still run.
    ///
    /// Returns the number of handlers invoked.
    pub fn dispatch(&self, raw: &str) -> usize {
        let name = match JsonCodec.decode::<EventName>(raw.as_bytes()) {
            Ok(envelope) => envelope.name,
            Err(e) => {
                tracing::debug!(error = %e, "dropping frame without an event name");
                return 0;
            }
        };

        let (decode, snapshot) = {
            let buckets = self.lock();
            let Some(bucket) = buckets.get(&name) else {
                tracing::trace!(event = %name, "no handlers, dropping frame");
                return 0;
            };
            (bucket.decode, bucket.registrations.clone())
        };
        if snapshot.is_empty() {
            return 0;
        }

        let payload = match decode(raw.as_bytes()) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(event = %name, error = %e, "failed to decode event payload");
                return 0;
            }
        };

        let mut invoked = 0;
        for registration in snapshot {
            if !self.claim(&name, &registration) {
                continue;
            }
            invoked += 1;
            let result = catch_unwind(AssertUnwindSafe(|| (registration.handler)(&*payload)));
            if result.is_err() {
                tracing::error!(event = %name, id = %registration.id, "event handler panicked");
            }
        }
        invoked
    }

    /// Checks that `registration` is still live, removing it in the same
    /// step if it is one-shot. Returns `false` if it was removed earlier.
    fn claim(&self, event: &str, registration: &Registration) -> bool {
        let mut buckets = self.lock();
        let Some(bucket) = buckets.get_mut(event) else {
            return false;
        };
        let Some(pos) = bucket
            .registrations
            .iter()
            .position(|r| r.id == registration.id)
        else {
            return false;
        };
        if registration.once {
            bucket.registrations.remove(pos);
        }
        true
    }

    // Handlers never run under the lock, so a poisoned lock still holds
    // consistent data.
    fn lock(&self) -> MutexGuard<'_, HashMap<String, Bucket>> {
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let buckets = self.lock();
        let mut map = f.debug_map();
        for (name, bucket) in buckets.iter() {
            map.entry(name, &(bucket.type_name, bucket.registrations.len()));
        }
        map.finish()
    }
}

fn decode_payload<T: DeserializeOwned + 'static>(raw: &[u8]) -> Result<Box<dyn Any>, ProtocolError> {
    let event: Event<T> = JsonCodec.decode(raw)?;
    Ok(Box::new(event.data))
}

#[cfg(test)]
mod tests {
    //! Unit tests for `CallbackRegistry`.

    use super::*;
    use serde::Deserialize;

    /// Collects values handed to handlers, in call order.
    fn recorder<T: Send + 'static>() -> Arc<Mutex<Vec<T>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[derive(Debug, Clone, PartialEq, Deserialize)]
    struct Move {
        player: String,
        cell: u8,
    }

    // =====================================================================
    // subscribe()
    // =====================================================================

    #[test]
    fn test_subscribe_same_type_twice_succeeds() {
        let registry = CallbackRegistry::new();
        let a = registry.subscribe::<u32, _>("tick", |_| {}).unwrap();
        let b = registry.subscribe_once::<u32, _>("tick", |_| {}).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.handler_count("tick"), 2);
    }

    #[test]
    fn test_subscribe_different_type_returns_type_mismatch() {
        let registry = CallbackRegistry::new();
        registry.subscribe::<u32, _>("tick", |_| {}).unwrap();

        let result = registry.subscribe::<String, _>("tick", |_| {});
        assert!(matches!(
            result,
            Err(ClientError::TypeMismatch { ref event, .. }) if event == "tick"
        ));

        let result = registry.subscribe_once::<Move, _>("tick", |_| {});
        assert!(matches!(result, Err(ClientError::TypeMismatch { .. })));
        assert_eq!(registry.handler_count("tick"), 1);
    }

    #[test]
    fn test_subscribe_type_binding_survives_unsubscribe() {
        let registry = CallbackRegistry::new();
        let id = registry.subscribe::<u32, _>("tick", |_| {}).unwrap();
        registry.unsubscribe("tick", id);

        let result = registry.subscribe::<String, _>("tick", |_| {});
        assert!(matches!(result, Err(ClientError::TypeMismatch { .. })));
    }

    #[test]
    fn test_subscribe_types_are_per_event_name() {
        let registry = CallbackRegistry::new();
        registry.subscribe::<u32, _>("tick", |_| {}).unwrap();
        registry.subscribe::<Move, _>("move", |_| {}).unwrap();
        assert_eq!(registry.handler_count("tick"), 1);
        assert_eq!(registry.handler_count("move"), 1);
    }

    // =====================================================================
    // unsubscribe()
    // =====================================================================

    #[test]
    fn test_unsubscribe_removes_handler() {
        let registry = CallbackRegistry::new();
        let calls = recorder::<u32>();
        let sink = Arc::clone(&calls);
        let id = registry
            .subscribe::<u32, _>("tick", move |t| sink.lock().unwrap().push(*t))
            .unwrap();

        assert!(registry.unsubscribe("tick", id));
        assert_eq!(registry.dispatch(r#"{"name":"tick","data":1}"#), 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsubscribe_unknown_is_noop() {
        let registry = CallbackRegistry::new();
        let id = registry.subscribe::<u32, _>("tick", |_| {}).unwrap();

        assert!(!registry.unsubscribe("nope", id));
        assert!(registry.unsubscribe("tick", id));
        assert!(!registry.unsubscribe("tick", id));
        assert_eq!(registry.handler_count("tick"), 0);
    }

    // =====================================================================
    // dispatch()
    // =====================================================================

    #[test]
    fn test_dispatch_unknown_event_is_noop() {
        let registry = CallbackRegistry::new();
        let calls = recorder::<u32>();
        let sink = Arc::clone(&calls);
        registry
            .subscribe::<u32, _>("tick", move |t| sink.lock().unwrap().push(*t))
            .unwrap();

        assert_eq!(registry.dispatch(r#"{"name":"unknown","data":{"x":1}}"#), 0);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_dispatch_passes_typed_payload() {
        let registry = CallbackRegistry::new();
        let calls = recorder::<Move>();
        let sink = Arc::clone(&calls);
        registry
            .subscribe::<Move, _>("move", move |m| sink.lock().unwrap().push(m.clone()))
            .unwrap();

        let invoked = registry.dispatch(r#"{"name":"move","data":{"player":"p1","cell":4}}"#);

        assert_eq!(invoked, 1);
        assert_eq!(
            *calls.lock().unwrap(),
            vec![Move { player: "p1".into(), cell: 4 }]
        );
    }

    #[test]
    fn test_dispatch_runs_handlers_in_registration_order() {
        let registry = CallbackRegistry::new();
        let order = recorder::<&'static str>();
        for label in ["first", "second", "third"] {
            let sink = Arc::clone(&order);
            registry
                .subscribe::<u32, _>("tick", move |_| sink.lock().unwrap().push(label))
                .unwrap();
        }

        assert_eq!(registry.dispatch(r#"{"name":"tick","data":0}"#), 3);
        assert_eq!(*order.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_dispatch_malformed_payload_invokes_nothing() {
        let registry = CallbackRegistry::new();
        let calls = recorder::<u32>();
        let sink = Arc::clone(&calls);
        registry
            .subscribe::<u32, _>("tick", move |t| sink.lock().unwrap().push(*t))
            .unwrap();

        assert_eq!(registry.dispatch(r#"{"name":"tick","data":"five"}"#), 0);
        assert_eq!(registry.dispatch("not json"), 0);
        assert_eq!(registry.dispatch(r#"{"data":5}"#), 0);
        assert!(calls.lock().unwrap().is_empty());

        // Still works for the next well-formed frame.
        assert_eq!(registry.dispatch(r#"{"name":"tick","data":5}"#), 1);
    }

    #[test]
    fn test_dispatch_once_handler_runs_exactly_once() {
        let registry = CallbackRegistry::new();
        let calls = recorder::<u32>();
        let sink = Arc::clone(&calls);
        let id = registry
            .subscribe_once::<u32, _>("tick", move |t| sink.lock().unwrap().push(*t))
            .unwrap();

        for i in 0..5 {
            registry.dispatch(&format!(r#"{{"name":"tick","data":{i}}}"#));
        }

        assert_eq!(*calls.lock().unwrap(), vec![0]);
        assert!(!registry.is_subscribed("tick", id));
        assert_eq!(registry.handler_count("tick"), 0);
    }

    #[test]
    fn test_dispatch_panicking_handler_does_not_stop_others() {
        let registry = CallbackRegistry::new();
        let calls = recorder::<u32>();

        registry
            .subscribe::<u32, _>("tick", |_| panic!("handler bug"))
            .unwrap();
        let sink = Arc::clone(&calls);
        registry
            .subscribe::<u32, _>("tick", move |t| sink.lock().unwrap().push(*t))
            .unwrap();

        assert_eq!(registry.dispatch(r#"{"name":"tick","data":1}"#), 2);
        assert_eq!(registry.dispatch(r#"{"name":"tick","data":2}"#), 2);
        assert_eq!(*calls.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_dispatch_handler_may_subscribe_without_deadlock() {
        let registry = Arc::new(CallbackRegistry::new());
        let calls = recorder::<u32>();

        let inner_registry = Arc::clone(&registry);
        let sink = Arc::clone(&calls);
        registry
            .subscribe_once::<u32, _>("tick", move |_| {
                let sink = Arc::clone(&sink);
                inner_registry
                    .subscribe::<u32, _>("tick", move |t| sink.lock().unwrap().push(*t))
                    .unwrap();
            })
            .unwrap();

        // The handler added during the first dispatch must not see the
        // event that was being dispatched when it was added.
        assert_eq!(registry.dispatch(r#"{"name":"tick","data":1}"#), 1);
        assert!(calls.lock().unwrap().is_empty());

        assert_eq!(registry.dispatch(r#"{"name":"tick","data":2}"#), 1);
        assert_eq!(*calls.lock().unwrap(), vec![2]);
    }

    #[test]
    fn test_dispatch_resubscribed_once_handler_sees_only_next_event() {
        let registry = Arc::new(CallbackRegistry::new());
        let calls = recorder::<u32>();

        fn arm(registry: &Arc<CallbackRegistry>, calls: &Arc<Mutex<Vec<u32>>>) {
            let again = Arc::clone(registry);
            let sink = Arc::clone(calls);
            registry
                .subscribe_once::<u32, _>("tick", move |t| {
                    sink.lock().unwrap().push(*t);
                    arm(&again, &sink);
                })
                .unwrap();
        }
        arm(&registry, &calls);

        for i in 1..=3 {
            assert_eq!(registry.dispatch(&format!(r#"{{"name":"tick","data":{i}}}"#)), 1);
        }
        assert_eq!(*calls.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(registry.handler_count("tick"), 1);
    }

    #[test]
    fn test_dispatch_skips_handler_removed_earlier_in_same_dispatch() {
        let registry = Arc::new(CallbackRegistry::new());
        let calls = recorder::<&'static str>();

        let victim_id = Arc::new(Mutex::new(None::<CallbackId>));
        let remover_registry = Arc::clone(&registry);
        let remover_target = Arc::clone(&victim_id);
        registry
            .subscribe::<u32, _>("tick", move |_| {
                if let Some(id) = *remover_target.lock().unwrap() {
                    remover_registry.unsubscribe("tick", id);
                }
            })
            .unwrap();

        let sink = Arc::clone(&calls);
        let id = registry
            .subscribe::<u32, _>("tick", move |_| sink.lock().unwrap().push("victim"))
            .unwrap();
        *victim_id.lock().unwrap() = Some(id);

        assert_eq!(registry.dispatch(r#"{"name":"tick","data":0}"#), 1);
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_callback_id_display_is_hex() {
        let id = CallbackId(0xab);
        assert_eq!(id.to_string(), format!("{:032x}", 0xab));
    }
}
