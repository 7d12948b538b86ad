//! Events and their payloads.

use std::{any::Any, fmt, sync::Arc};

/// Event kind.
///
/// Only outcomes are recorded: finally signals never produce an event.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// The computation completed.
    Complete,

    /// The computation failed.
    Error,
}

impl EventKind {
    /// Returns the name of this event kind.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An opaque event payload.
///
/// Payloads are type-erased and cheap to clone. Handlers that know what they were signalled with can recover the
/// concrete value with [`downcast_ref`][Self::downcast_ref].
#[derive(Clone)]
pub struct Payload {
    inner: Arc<dyn Any + Send + Sync>,
}

impl Payload {
    /// Creates a new `Payload` wrapping `value`.
    pub fn new<T>(value: T) -> Self
    where
        T: Any + Send + Sync,
    {
        Self { inner: Arc::new(value) }
    }

    /// Converts the value carried by a panic into a `Payload`.
    ///
    /// Panic messages, whether static or formatted, are normalized to `String`. A `Payload` raised directly via
    /// [`std::panic::panic_any`] is passed through untouched, which lets a handler fail with an arbitrary value.
    /// Anything else is replaced by a placeholder message, since it cannot be shared across threads.
    pub fn from_panic(panic: Box<dyn Any + Send>) -> Self {
        let panic = match panic.downcast::<Payload>() {
            Ok(payload) => return *payload,
            Err(panic) => panic,
        };

        let panic = match panic.downcast::<String>() {
            Ok(message) => return Self::new(*message),
            Err(panic) => panic,
        };

        match panic.downcast::<&'static str>() {
            Ok(message) => Self::new(message.to_string()),
            Err(_) => Self::new(String::from("handler panicked with a non-string value")),
        }
    }

    /// Returns a reference to the inner value if it is of type `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    /// Returns `true` if the inner value is of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.inner.is::<T>()
    }

    /// Returns the inner value as a string slice, if it is a `String` or `&'static str`.
    pub fn as_str(&self) -> Option<&str> {
        self.downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| self.downcast_ref::<&'static str>().copied())
    }
}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_str() {
            Some(s) => f.debug_tuple("Payload").field(&s).finish(),
            None => f.write_str("Payload(<opaque>)"),
        }
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&'static str> for Payload {
    fn from(value: &'static str) -> Self {
        Self::new(value)
    }
}

/// A recorded event.
#[derive(Clone, Debug)]
pub struct Event {
    kind: EventKind,
    payload: Payload,
}

impl Event {
    /// Creates a completion event.
    pub fn complete(payload: Payload) -> Self {
        Self {
            kind: EventKind::Complete,
            payload,
        }
    }

    /// Creates an error event.
    pub fn error(payload: Payload) -> Self {
        Self {
            kind: EventKind::Error,
            payload,
        }
    }

    /// Returns the kind of this event.
    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Returns the payload of this event.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consumes the event, returning its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use std::panic::{catch_unwind, panic_any};

    use super::*;

    #[test]
    fn payload_from_panic_normalizes_messages() {
        let static_msg = catch_unwind(|| panic!("boom")).unwrap_err();
        assert_eq!(Payload::from_panic(static_msg).downcast_ref::<String>().map(String::as_str), Some("boom"));

        let formatted = catch_unwind(|| panic!("boom {}", 42)).unwrap_err();
        assert_eq!(Payload::from_panic(formatted).as_str(), Some("boom 42"));
    }

    #[test]
    fn payload_from_panic_passes_payloads_through() {
        let panic = catch_unwind(|| panic_any(Payload::new(7u32))).unwrap_err();
        assert_eq!(Payload::from_panic(panic).downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn payload_from_panic_replaces_unshareable_values() {
        let panic = catch_unwind(|| panic_any(std::cell::Cell::new(1))).unwrap_err();
        let payload = Payload::from_panic(panic);
        assert!(payload.is::<String>());
        assert!(payload.downcast_ref::<std::cell::Cell<i32>>().is_none());
    }

    #[test]
    fn payload_debug() {
        assert_eq!(format!("{:?}", Payload::from("hello")), "Payload(\"hello\")");
        assert_eq!(format!("{:?}", Payload::new(1u8)), "Payload(<opaque>)");
    }

    #[test]
    fn into_payload_keeps_value() {
        let event = Event::complete(Payload::new(9u64));
        assert_eq!(event.kind(), EventKind::Complete);
        assert_eq!(event.into_payload().downcast_ref::<u64>(), Some(&9));
    }

    #[test]
    fn event_kind_names() {
        assert_eq!(EventKind::Complete.to_string(), "complete");
        assert_eq!(Event::error(Payload::new(())).kind().as_str(), "error");
    }
}
