//! Listener discovery — the declarative binding table
//!
//! Listeners declare their bound methods explicitly through [`Binding`]
//! values instead of being scanned at runtime. The [`Discovery`] collaborator
//! turns a listener's declaration into channel-grouped handlers, expanding
//! multi-tag bindings into one entry per tag and rejecting malformed
//! declarations before anything touches the registry.

use crate::error::{BusError, Result};
use crate::handler::{Handler, HandlerFn, HandlerResult, ListenerId};
use crate::scheduler::ContextId;
use crate::types::{ChannelKey, DeliveryKind, Payload, TypeTag, DEFAULT_TAG};
use std::sync::Arc;

/// An object whose methods can be bound to channels
///
/// `id` must be stable for the lifetime of the instance and distinct across
/// instances of the same type — issue it once with [`ListenerId::new`] at
/// construction. `bindings` is consulted on both register and unregister, so
/// it should be a pure function of the instance.
pub trait Listener: Send + Sync {
    /// Opaque identity of this instance
    fn id(&self) -> ListenerId;

    /// The bound-method declarations of this instance
    fn bindings(&self) -> Vec<Binding>;
}

/// One declared bound method
///
/// A binding names the delivery kind, the tags it listens on (empty means the
/// default tag), the method identity, the accepted payload variant, and the
/// execution contexts for delivery. One binding with N tags contributes to N
/// distinct channels.
#[derive(Clone)]
pub struct Binding {
    kind: DeliveryKind,
    tags: Vec<String>,
    method: &'static str,
    accepts: TypeTag,
    invoke: HandlerFn,
    observe_on: ContextId,
    subscribe_on: ContextId,
}

impl Binding {
    /// Declare a binding for the given delivery kind
    pub fn new(
        kind: DeliveryKind,
        method: &'static str,
        accepts: TypeTag,
        invoke: impl Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self {
            kind,
            tags: Vec::new(),
            method,
            accepts,
            invoke: Arc::new(invoke),
            observe_on: ContextId::default(),
            subscribe_on: ContextId::default(),
        }
    }

    /// Declare a fire-and-forget binding
    pub fn publish(
        method: &'static str,
        accepts: TypeTag,
        invoke: impl Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self::new(DeliveryKind::Publish, method, accepts, invoke)
    }

    /// Declare a full-history replay binding
    pub fn replay(
        method: &'static str,
        accepts: TypeTag,
        invoke: impl Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self::new(DeliveryKind::Replay, method, accepts, invoke)
    }

    /// Declare a latest-value binding
    pub fn behavior(
        method: &'static str,
        accepts: TypeTag,
        invoke: impl Fn(&Payload) -> HandlerResult + Send + Sync + 'static,
    ) -> Self {
        Self::new(DeliveryKind::Behavior, method, accepts, invoke)
    }

    /// Listen on an additional tag
    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    /// Listen on several additional tags
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    /// Execution context handlers are invoked on (default: Main)
    pub fn observe_on(mut self, ctx: ContextId) -> Self {
        self.observe_on = ctx;
        self
    }

    /// Execution context the channel's pipe work is attributed to (default: Main)
    pub fn subscribe_on(mut self, ctx: ContextId) -> Self {
        self.subscribe_on = ctx;
        self
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Binding")
            .field("kind", &self.kind)
            .field("tags", &self.tags)
            .field("method", &self.method)
            .field("accepts", &self.accepts)
            .field("observe_on", &self.observe_on)
            .field("subscribe_on", &self.subscribe_on)
            .finish()
    }
}

/// A listener's handlers grouped under one channel key
#[derive(Clone)]
pub struct DiscoveredChannel {
    /// Routing identity the handlers attach to
    pub key: ChannelKey,

    /// Context handlers run on, taken from the first binding naming this key
    pub observe_on: ContextId,

    /// Context the pipe work is attributed to
    pub subscribe_on: ContextId,

    /// Handlers in declaration order
    pub handlers: Vec<Handler>,
}

impl std::fmt::Debug for DiscoveredChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiscoveredChannel")
            .field("key", &self.key)
            .field("observe_on", &self.observe_on)
            .field("subscribe_on", &self.subscribe_on)
            .field("handlers", &self.handlers.len())
            .finish()
    }
}

/// Collaborator that maps a listener to its bindable methods per channel
///
/// The default implementation reads the listener's declared binding table;
/// tests may substitute their own to inject synthetic channels.
pub trait Discovery: Send + Sync {
    /// Group the listener's bound methods by channel key
    ///
    /// Fails fast on malformed declarations; a listener with no bindings
    /// yields an empty result.
    fn discover(&self, listener: &dyn Listener) -> Result<Vec<DiscoveredChannel>>;
}

/// Default [`Discovery`] over the declarative binding table
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclaredBindings;

impl Discovery for DeclaredBindings {
    fn discover(&self, listener: &dyn Listener) -> Result<Vec<DiscoveredChannel>> {
        let owner = listener.id();
        let mut channels: Vec<DiscoveredChannel> = Vec::new();

        for binding in listener.bindings() {
            if binding.method.is_empty() {
                return Err(BusError::InvalidBinding {
                    method: String::new(),
                    reason: "binding declares an empty method name".to_string(),
                });
            }

            let tags: Vec<String> = if binding.tags.is_empty() {
                vec![DEFAULT_TAG.to_string()]
            } else {
                binding.tags.clone()
            };

            for tag in tags {
                let key = ChannelKey::new(binding.kind, tag);
                let handler = Handler::new(owner, binding.method, binding.accepts, binding.invoke.clone());

                match channels.iter_mut().find(|c| c.key == key) {
                    Some(channel) => {
                        // Same name with a different accepted type is a
                        // distinct bound method, mirroring handler equality
                        if channel
                            .handlers
                            .iter()
                            .any(|h| h.method() == binding.method && h.accepts() == binding.accepts)
                        {
                            return Err(BusError::InvalidBinding {
                                method: binding.method.to_string(),
                                reason: format!(
                                    "method declared more than once for channel '{}'",
                                    channel.key
                                ),
                            });
                        }
                        channel.handlers.push(handler);
                    }
                    None => channels.push(DiscoveredChannel {
                        key,
                        observe_on: binding.observe_on,
                        subscribe_on: binding.subscribe_on,
                        handlers: vec![handler],
                    }),
                }
            }
        }

        Ok(channels)
    }
}
