//! Bound methods — a listener's method attached to a channel
//!
//! A [`Handler`] wraps one single-argument method of a specific listener
//! instance. Two handlers are equal when they refer to the same method on the
//! same instance (not the same type) with the same declared parameter tag;
//! that property keeps registration idempotent while letting two instances of
//! one type hold independent bindings.

use crate::types::{Payload, TypeTag};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Opaque handle identifying one listener *instance*
///
/// Issued once per instance (typically at construction) and presented on
/// every register/unregister call. Distinct instances of the same type carry
/// distinct ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ListenerId(Uuid);

impl ListenerId {
    /// Issue a fresh listener id
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ListenerId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Result of invoking a bound method
pub type HandlerResult = std::result::Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// The callback invoked for each compatible event
pub type HandlerFn = Arc<dyn Fn(&Payload) -> HandlerResult + Send + Sync>;

/// A listener instance's method bound to one declared parameter type
///
/// Filters incoming events by variant tag and invokes the callback for
/// matches. Invocation errors are returned to the stream layer, which logs
/// them and applies the configured failure policy — they never abort the
/// stream or affect delivery to other handlers of the same event.
#[derive(Clone)]
pub struct Handler {
    owner: ListenerId,
    method: &'static str,
    accepts: TypeTag,
    invoke: HandlerFn,
}

impl Handler {
    /// Create a handler for `method` on the instance identified by `owner`
    pub fn new(
        owner: ListenerId,
        method: &'static str,
        accepts: TypeTag,
        invoke: HandlerFn,
    ) -> Self {
        Self {
            owner,
            method,
            accepts,
            invoke,
        }
    }

    /// Identity of the owning listener instance
    pub fn owner(&self) -> ListenerId {
        self.owner
    }

    /// Name of the bound method (diagnostics and identity)
    pub fn method(&self) -> &'static str {
        self.method
    }

    /// The variant tag this handler accepts
    pub fn accepts(&self) -> TypeTag {
        self.accepts
    }

    /// Whether this handler is a member of the given listener instance
    pub fn is_member_of(&self, listener: ListenerId) -> bool {
        self.owner == listener
    }

    /// Whether the payload's variant tag matches the declared parameter tag
    pub fn matches(&self, payload: &Payload) -> bool {
        payload.tag() == self.accepts
    }

    /// Invoke the bound method
    ///
    /// Callers must check [`Handler::matches`] first; the stream layer only
    /// dispatches compatible payloads.
    pub fn call(&self, payload: &Payload) -> HandlerResult {
        (self.invoke)(payload)
    }
}

impl PartialEq for Handler {
    fn eq(&self, other: &Self) -> bool {
        // Same instance, same method, same declared type
        self.owner == other.owner && self.method == other.method && self.accepts == other.accepts
    }
}

impl Eq for Handler {}

impl std::fmt::Debug for Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("owner", &self.owner)
            .field("method", &self.method)
            .field("accepts", &self.accepts)
            .finish()
    }
}
