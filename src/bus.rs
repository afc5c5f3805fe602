//! The bus façade — register listeners, post events
//!
//! One [`Bus`] owns one routing table. Independent buses (distinguished by
//! name) never share registries. All mutations pass the configured
//! thread-confinement policy first; delivery happens asynchronously on each
//! stream's observe context.

use crate::discovery::{DeclaredBindings, Discovery, DiscoveredChannel, Listener};
use crate::enforcer::{AnyThread, ThreadEnforcer};
use crate::error::Result;
use crate::registry::Registry;
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::stream::FailurePolicy;
use crate::types::{ChannelKey, DeliveryKind, Payload, DEFAULT_TAG};
use std::sync::Arc;

/// Name given to a bus when the caller supplies none
pub const DEFAULT_IDENTIFIER: &str = "default";

/// In-process publish/subscribe event bus
///
/// Listeners declare bound methods through their binding table; posters fan
/// events out to every matching bound method under the channel's delivery
/// semantics. See the crate docs for an end-to-end example.
pub struct Bus {
    name: String,
    registry: Registry,
    discovery: Arc<dyn Discovery>,
    scheduler: Arc<dyn Scheduler>,
    enforcer: Arc<dyn ThreadEnforcer>,
    failure_policy: FailurePolicy,
}

impl Bus {
    /// Create a bus named "default" with the default configuration
    ///
    /// Uses the permissive any-thread policy and a [`TokioScheduler`] on the
    /// current runtime — call from within a tokio runtime context, or build
    /// with an explicit scheduler via [`Bus::builder`].
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Create a bus with the given name and default configuration
    pub fn named(name: impl Into<String>) -> Self {
        Self::builder().name(name).build()
    }

    /// Start configuring a bus
    pub fn builder() -> BusBuilder {
        BusBuilder::default()
    }

    /// This bus's name (for diagnostics)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of channels currently routed by this bus
    pub fn channel_count(&self) -> usize {
        self.registry.len()
    }

    /// Register a listener's bound methods
    ///
    /// Streams are created lazily per discovered channel key. Registering the
    /// same instance twice is idempotent; registering a different instance of
    /// the same type adds an independent set of bindings; a listener that
    /// declares no bindings is a no-op. Fails fast on malformed declarations
    /// or a policy violation, leaving the routing table untouched.
    pub fn register(&self, listener: &dyn Listener) -> Result<()> {
        self.enforcer.enforce(&self.name)?;

        let channels = self.discovery.discover(listener)?;
        if channels.is_empty() {
            tracing::trace!(bus = %self.name, listener = %listener.id(), "Listener declares no bindings");
            return Ok(());
        }

        let mut attached = 0;
        for channel in &channels {
            attached += self
                .registry
                .bind(channel, self.scheduler.as_ref(), self.failure_policy)?;
        }

        tracing::debug!(
            bus = %self.name,
            listener = %listener.id(),
            channels = channels.len(),
            attached,
            "Listener registered"
        );
        Ok(())
    }

    /// Unregister a listener, detaching its bound methods everywhere
    ///
    /// The same key set is discovered for symmetry with [`Bus::register`].
    /// Streams left empty complete and their keys are erased. Unregistering a
    /// listener that was never registered is a no-op.
    pub fn unregister(&self, listener: &dyn Listener) -> Result<()> {
        self.enforcer.enforce(&self.name)?;

        let channels = self.discovery.discover(listener)?;
        let listener_id = listener.id();
        for channel in &channels {
            self.registry.remove_listener_for(&channel.key, listener_id);
        }

        tracing::debug!(bus = %self.name, listener = %listener_id, "Listener unregistered");
        Ok(())
    }

    /// Post an event to the channels `(kind, tag)` for each supplied tag
    ///
    /// An empty tag list means the default tag. Tags fan out in the supplied
    /// order; a tag with no bound channel silently drops the event. Never
    /// blocks beyond handing the event to each stream's buffer.
    pub fn post(
        &self,
        kind: DeliveryKind,
        event: impl Into<Payload>,
        tags: &[&str],
    ) -> Result<()> {
        self.enforcer.enforce(&self.name)?;

        let payload = event.into();
        if tags.is_empty() {
            self.post_one(kind, DEFAULT_TAG, &payload);
        } else {
            for tag in tags {
                self.post_one(kind, tag, &payload);
            }
        }
        Ok(())
    }

    /// Post to fire-and-forget channels
    pub fn post_publish(&self, event: impl Into<Payload>, tags: &[&str]) -> Result<()> {
        self.post(DeliveryKind::Publish, event, tags)
    }

    /// Post to full-history replay channels
    pub fn post_replay(&self, event: impl Into<Payload>, tags: &[&str]) -> Result<()> {
        self.post(DeliveryKind::Replay, event, tags)
    }

    /// Post to latest-value channels
    pub fn post_behavior(&self, event: impl Into<Payload>, tags: &[&str]) -> Result<()> {
        self.post(DeliveryKind::Behavior, event, tags)
    }

    /// Attach a pre-built channel directly, bypassing discovery
    ///
    /// Low-level hook for callers that assemble handlers themselves; the
    /// normal path is [`Bus::register`]. Returns the number of handlers added.
    pub fn bind_channel(&self, channel: &DiscoveredChannel) -> Result<usize> {
        self.enforcer.enforce(&self.name)?;
        self.registry
            .bind(channel, self.scheduler.as_ref(), self.failure_policy)
    }

    /// Complete and remove a channel unconditionally
    ///
    /// Detaches every handler and discards any retained history for the key.
    pub fn drop_channel(&self, key: &ChannelKey) -> Result<()> {
        self.enforcer.enforce(&self.name)?;
        self.registry.drop_channel(key);
        Ok(())
    }

    fn post_one(&self, kind: DeliveryKind, tag: &str, payload: &Payload) {
        let key = ChannelKey::new(kind, tag);
        match self.registry.get(&key) {
            Some(stream) => {
                if !stream.push(payload.clone()) {
                    // Raced against completion; tidy the entry
                    self.registry.remove_completed(&key);
                }
            }
            None => {
                tracing::trace!(bus = %self.name, channel = %key, "No stream for key, event dropped");
            }
        }
    }
}

impl std::fmt::Debug for Bus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &self.name)
            .field("channels", &self.registry.len())
            .finish()
    }
}

/// Configures and builds a [`Bus`]
pub struct BusBuilder {
    name: String,
    discovery: Option<Arc<dyn Discovery>>,
    scheduler: Option<Arc<dyn Scheduler>>,
    enforcer: Option<Arc<dyn ThreadEnforcer>>,
    failure_policy: FailurePolicy,
}

impl Default for BusBuilder {
    fn default() -> Self {
        Self {
            name: DEFAULT_IDENTIFIER.to_string(),
            discovery: None,
            scheduler: None,
            enforcer: None,
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl BusBuilder {
    /// Name the bus (for diagnostics)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the discovery collaborator (default: the declared binding table)
    pub fn discovery(mut self, discovery: impl Discovery + 'static) -> Self {
        self.discovery = Some(Arc::new(discovery));
        self
    }

    /// Replace the scheduler capability (default: [`TokioScheduler`])
    pub fn scheduler(mut self, scheduler: impl Scheduler + 'static) -> Self {
        self.scheduler = Some(Arc::new(scheduler));
        self
    }

    /// Set the thread-confinement policy (default: any thread)
    pub fn enforcer(mut self, enforcer: impl ThreadEnforcer + 'static) -> Self {
        self.enforcer = Some(Arc::new(enforcer));
        self
    }

    /// Set the failing-handler policy (default: log only)
    pub fn failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    /// Build the bus
    ///
    /// Falls back to a [`TokioScheduler`] on the current runtime when no
    /// scheduler was supplied.
    pub fn build(self) -> Bus {
        Bus {
            name: self.name,
            registry: Registry::new(),
            discovery: self.discovery.unwrap_or_else(|| Arc::new(DeclaredBindings)),
            scheduler: self
                .scheduler
                .unwrap_or_else(|| Arc::new(TokioScheduler::new())),
            enforcer: self.enforcer.unwrap_or_else(|| Arc::new(AnyThread)),
            failure_policy: self.failure_policy,
        }
    }
}
