//! Delivery streams — the per-channel event pipe
//!
//! A [`DeliveryStream`] owns the ordered set of handlers bound to one
//! [`ChannelKey`] plus the buffer its delivery kind prescribes. All stream
//! operations are serialized by one mutex, and delivery jobs are enqueued to
//! the stream's FIFO observe executor while that mutex is held — which is
//! exactly what makes "replay history to a late binder" atomic with respect
//! to a concurrent push.
//!
//! Lifecycle: `Active → Completed` when the last handler detaches. Terminal
//! and irreversible; the registry creates a fresh stream object if the same
//! key is bound again later.

use crate::error::{BusError, Result};
use crate::handler::{Handler, ListenerId};
use crate::scheduler::{ContextId, Executor};
use crate::types::{ChannelKey, DeliveryKind, Payload};
use parking_lot::Mutex;
use std::sync::Arc;

/// What to do when a bound method fails while handling an event
///
/// Either way the failure is reported through `tracing` and never reaches
/// the poster or the channel's other handlers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log the failure and keep the handler attached
    #[default]
    LogOnly,
    /// Detach the failing handler from its stream
    Detach,
}

/// Per-kind event buffer
enum Buffer {
    /// Publish: nothing is retained
    None,
    /// Replay: every event ever pushed, in push order
    Replay(Vec<Payload>),
    /// Behavior: the most recently pushed event, if any
    Behavior(Option<Payload>),
}

impl Buffer {
    fn for_kind(kind: DeliveryKind, seed: Option<Vec<Payload>>) -> Self {
        match kind {
            DeliveryKind::Publish => Buffer::None,
            DeliveryKind::Replay => Buffer::Replay(seed.unwrap_or_default()),
            DeliveryKind::Behavior => Buffer::Behavior(None),
        }
    }
}

struct StreamState {
    /// Insertion order is delivery order
    handlers: Vec<Handler>,
    buffer: Buffer,
    completed: bool,
}

/// One channel's event pipe: handlers, buffer, and observe context
pub struct DeliveryStream {
    key: ChannelKey,
    observe: Arc<dyn Executor>,
    subscribe_on: ContextId,
    failure_policy: FailurePolicy,
    state: Mutex<StreamState>,
    /// Detach requests raised from observe-context jobs, applied at the next
    /// serialized state operation (a running job never takes the state lock)
    pending_detach: Mutex<Vec<(ListenerId, &'static str)>>,
}

impl DeliveryStream {
    /// Create a stream for `key`, optionally seeded with retained replay history
    pub fn new(
        key: ChannelKey,
        observe: Arc<dyn Executor>,
        subscribe_on: ContextId,
        failure_policy: FailurePolicy,
        seed: Option<Vec<Payload>>,
    ) -> Arc<Self> {
        let buffer = Buffer::for_kind(key.kind, seed);
        Arc::new(Self {
            key,
            observe,
            subscribe_on,
            failure_policy,
            state: Mutex::new(StreamState {
                handlers: Vec::new(),
                buffer,
                completed: false,
            }),
            pending_detach: Mutex::new(Vec::new()),
        })
    }

    /// The routing identity of this stream
    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    /// The subscribe context this stream was declared with
    pub fn subscribe_on(&self) -> ContextId {
        self.subscribe_on
    }

    /// Whether the stream has completed (terminal)
    pub fn is_completed(&self) -> bool {
        let mut state = self.state.lock();
        self.apply_pending(&mut state);
        state.completed
    }

    /// Number of currently attached handlers
    pub fn handler_count(&self) -> usize {
        let mut state = self.state.lock();
        self.apply_pending(&mut state);
        state.handlers.len()
    }

    /// Attach every handler not already present, by handler equality
    ///
    /// A newly attached handler first receives this stream's buffered history
    /// (Replay: everything, in push order; Behavior: the cached value, if
    /// any; Publish: nothing). Attachment and replay are atomic with respect
    /// to concurrent pushes. Returns the number of handlers actually added,
    /// or [`BusError::StreamCompleted`] if the stream has already completed.
    pub fn add_if_absent(self: &Arc<Self>, handlers: Vec<Handler>) -> Result<usize> {
        let mut state = self.state.lock();
        self.apply_pending(&mut state);
        if state.completed {
            return Err(BusError::StreamCompleted {
                key: self.key.to_string(),
            });
        }

        let mut added = 0;
        for handler in handlers {
            if state.handlers.contains(&handler) {
                continue;
            }

            match &state.buffer {
                Buffer::None => {}
                Buffer::Replay(history) => {
                    for payload in history {
                        if handler.matches(payload) {
                            self.dispatch(&handler, payload.clone());
                        }
                    }
                }
                Buffer::Behavior(cached) => {
                    if let Some(payload) = cached {
                        if handler.matches(payload) {
                            self.dispatch(&handler, payload.clone());
                        }
                    }
                }
            }

            tracing::debug!(
                channel = %self.key,
                method = handler.method(),
                owner = %handler.owner(),
                "Handler attached"
            );
            state.handlers.push(handler);
            added += 1;
        }

        Ok(added)
    }

    /// Detach every handler owned by `listener`; returns the remaining count
    ///
    /// When the last handler detaches the stream transitions to Completed —
    /// exactly once, irreversibly — and subsequent pushes are no-ops.
    pub fn remove_listener(&self, listener: ListenerId) -> usize {
        let mut state = self.state.lock();
        self.apply_pending(&mut state);
        if state.completed {
            return 0;
        }

        let before = state.handlers.len();
        state.handlers.retain(|h| !h.is_member_of(listener));
        let remaining = state.handlers.len();
        if remaining < before {
            tracing::debug!(
                channel = %self.key,
                owner = %listener,
                detached = before - remaining,
                "Listener detached"
            );
        }

        if remaining == 0 {
            self.complete(&mut state);
        }
        remaining
    }

    /// Deliver an event to every attached, type-compatible handler
    ///
    /// Records the event into the buffer per the stream's kind, then enqueues
    /// one invocation job per matching handler, in attachment order, on the
    /// observe executor. Never blocks beyond the in-memory hand-off. Returns
    /// `false` (a no-op) once the stream has completed.
    pub fn push(self: &Arc<Self>, payload: Payload) -> bool {
        let mut state = self.state.lock();
        self.apply_pending(&mut state);
        if state.completed {
            return false;
        }

        match &mut state.buffer {
            Buffer::None => {}
            Buffer::Replay(history) => history.push(payload.clone()),
            Buffer::Behavior(cached) => *cached = Some(payload.clone()),
        }

        tracing::trace!(channel = %self.key, handlers = state.handlers.len(), "Event pushed");
        for handler in &state.handlers {
            if handler.matches(&payload) {
                self.dispatch(handler, payload.clone());
            }
        }
        true
    }

    /// Complete the stream unconditionally, detaching all handlers
    pub fn complete_now(&self) {
        let mut state = self.state.lock();
        if !state.completed {
            state.handlers.clear();
            self.complete(&mut state);
        }
    }

    /// Take the replay history out of a completed stream for retention
    pub fn take_replay_buffer(&self) -> Option<Vec<Payload>> {
        let mut state = self.state.lock();
        match &mut state.buffer {
            Buffer::Replay(history) if !history.is_empty() => Some(std::mem::take(history)),
            _ => None,
        }
    }

    /// Queue a detach for a handler that failed under [`FailurePolicy::Detach`]
    fn request_detach(&self, owner: ListenerId, method: &'static str) {
        self.pending_detach.lock().push((owner, method));
    }

    /// Apply queued detaches; must hold the state lock
    fn apply_pending(&self, state: &mut StreamState) {
        let pending = {
            let mut queue = self.pending_detach.lock();
            if queue.is_empty() {
                return;
            }
            std::mem::take(&mut *queue)
        };

        for (owner, method) in pending {
            state
                .handlers
                .retain(|h| !(h.owner() == owner && h.method() == method));
            tracing::debug!(
                channel = %self.key,
                owner = %owner,
                method,
                "Failing handler detached"
            );
        }

        if state.handlers.is_empty() && !state.completed {
            self.complete(state);
        }
    }

    fn complete(&self, state: &mut StreamState) {
        state.completed = true;
        tracing::debug!(channel = %self.key, "Stream completed");
    }

    /// Enqueue one invocation job on the observe executor
    fn dispatch(self: &Arc<Self>, handler: &Handler, payload: Payload) {
        let handler = handler.clone();
        let stream = Arc::downgrade(self);
        let policy = self.failure_policy;
        let key = self.key.clone();

        self.observe.execute(Box::new(move || {
            if let Err(error) = handler.call(&payload) {
                tracing::warn!(
                    channel = %key,
                    method = handler.method(),
                    owner = %handler.owner(),
                    %error,
                    "Handler invocation failed"
                );
                if policy == FailurePolicy::Detach {
                    if let Some(stream) = stream.upgrade() {
                        stream.request_detach(handler.owner(), handler.method());
                    }
                }
            }
        }));
    }
}

impl std::fmt::Debug for DeliveryStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryStream")
            .field("key", &self.key)
            .field("subscribe_on", &self.subscribe_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::HandlerFn;
    use crate::scheduler::InlineExecutor;
    use crate::types::TypeTag;

    fn stream_for(kind: DeliveryKind) -> Arc<DeliveryStream> {
        DeliveryStream::new(
            ChannelKey::new(kind, "t"),
            Arc::new(InlineExecutor),
            ContextId::Immediate,
            FailurePolicy::LogOnly,
            None,
        )
    }

    fn recording(owner: ListenerId, method: &'static str) -> (Handler, Arc<Mutex<Vec<Payload>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let invoke: HandlerFn = Arc::new(move |p| {
            sink.lock().push(p.clone());
            Ok(())
        });
        (Handler::new(owner, method, TypeTag::Str, invoke), seen)
    }

    #[test]
    fn test_stream_reports_key_and_declared_contexts() {
        let stream = DeliveryStream::new(
            ChannelKey::new(DeliveryKind::Publish, "t"),
            Arc::new(InlineExecutor),
            ContextId::Io,
            FailurePolicy::LogOnly,
            None,
        );
        assert_eq!(stream.key(), &ChannelKey::new(DeliveryKind::Publish, "t"));
        assert_eq!(stream.subscribe_on(), ContextId::Io);
    }

    #[test]
    fn test_publish_late_binder_misses_earlier_events() {
        let stream = stream_for(DeliveryKind::Publish);
        let (early, early_seen) = recording(ListenerId::new(), "early");
        stream.add_if_absent(vec![early]).unwrap();

        stream.push(Payload::from("before"));

        let (late, late_seen) = recording(ListenerId::new(), "late");
        stream.add_if_absent(vec![late]).unwrap();
        stream.push(Payload::from("after"));

        assert_eq!(
            *early_seen.lock(),
            vec![Payload::from("before"), Payload::from("after")]
        );
        assert_eq!(*late_seen.lock(), vec![Payload::from("after")]);
    }

    #[test]
    fn test_replay_late_binder_receives_full_history_in_order() {
        let stream = stream_for(DeliveryKind::Replay);
        let (early, _) = recording(ListenerId::new(), "early");
        stream.add_if_absent(vec![early]).unwrap();

        stream.push(Payload::from("x"));
        stream.push(Payload::from("y"));

        let (late, late_seen) = recording(ListenerId::new(), "late");
        stream.add_if_absent(vec![late]).unwrap();
        stream.push(Payload::from("z"));

        assert_eq!(
            *late_seen.lock(),
            vec![Payload::from("x"), Payload::from("y"), Payload::from("z")]
        );
    }

    #[test]
    fn test_behavior_late_binder_receives_only_latest_value() {
        let stream = stream_for(DeliveryKind::Behavior);
        let (early, _) = recording(ListenerId::new(), "early");
        stream.add_if_absent(vec![early]).unwrap();

        stream.push(Payload::from("x"));
        stream.push(Payload::from("y"));

        let (late, late_seen) = recording(ListenerId::new(), "late");
        stream.add_if_absent(vec![late]).unwrap();

        assert_eq!(*late_seen.lock(), vec![Payload::from("y")]);
    }

    #[test]
    fn test_behavior_with_no_pushes_delivers_nothing_on_attach() {
        let stream = stream_for(DeliveryKind::Behavior);
        let (handler, seen) = recording(ListenerId::new(), "on_msg");
        stream.add_if_absent(vec![handler]).unwrap();
        assert!(seen.lock().is_empty());

        stream.push(Payload::from("first"));
        assert_eq!(*seen.lock(), vec![Payload::from("first")]);
    }

    #[test]
    fn test_add_if_absent_is_idempotent() {
        let stream = stream_for(DeliveryKind::Publish);
        let owner = ListenerId::new();
        let (first, _) = recording(owner, "on_msg");
        let (again, _) = recording(owner, "on_msg");

        assert_eq!(stream.add_if_absent(vec![first]).unwrap(), 1);
        assert_eq!(stream.add_if_absent(vec![again]).unwrap(), 0);
        assert_eq!(stream.handler_count(), 1);
    }

    #[test]
    fn test_type_filtering_on_shared_stream() {
        let stream = stream_for(DeliveryKind::Publish);
        let owner = ListenerId::new();

        let strings = Arc::new(Mutex::new(Vec::new()));
        let ints = Arc::new(Mutex::new(Vec::new()));
        let string_sink = strings.clone();
        let int_sink = ints.clone();

        stream
            .add_if_absent(vec![
                Handler::new(
                    owner,
                    "on_string",
                    TypeTag::Str,
                    Arc::new(move |p| {
                        string_sink.lock().push(p.clone());
                        Ok(())
                    }),
                ),
                Handler::new(
                    owner,
                    "on_int",
                    TypeTag::I32,
                    Arc::new(move |p| {
                        int_sink.lock().push(p.clone());
                        Ok(())
                    }),
                ),
            ])
            .unwrap();

        stream.push(Payload::from("hello"));
        stream.push(Payload::from(7i32));

        assert_eq!(*strings.lock(), vec![Payload::from("hello")]);
        assert_eq!(*ints.lock(), vec![Payload::from(7i32)]);
    }

    #[test]
    fn test_remove_last_listener_completes_stream() {
        let stream = stream_for(DeliveryKind::Publish);
        let owner = ListenerId::new();
        let (handler, seen) = recording(owner, "on_msg");
        stream.add_if_absent(vec![handler]).unwrap();

        assert_eq!(stream.remove_listener(owner), 0);
        assert!(stream.is_completed());

        // Pushing into a completed stream is a no-op
        assert!(!stream.push(Payload::from("late")));
        assert!(seen.lock().is_empty());

        // A completed stream is never revived
        let (again, _) = recording(ListenerId::new(), "on_msg");
        assert!(stream.add_if_absent(vec![again]).is_err());
    }

    #[test]
    fn test_remove_keeps_other_listeners_attached() {
        let stream = stream_for(DeliveryKind::Publish);
        let gone = ListenerId::new();
        let kept = ListenerId::new();
        let (a, _) = recording(gone, "on_msg");
        let (b, b_seen) = recording(kept, "on_msg");
        stream.add_if_absent(vec![a, b]).unwrap();

        assert_eq!(stream.remove_listener(gone), 1);
        assert!(!stream.is_completed());

        stream.push(Payload::from("still"));
        assert_eq!(*b_seen.lock(), vec![Payload::from("still")]);
    }

    #[test]
    fn test_remove_unknown_listener_is_noop() {
        let stream = stream_for(DeliveryKind::Publish);
        let (handler, _) = recording(ListenerId::new(), "on_msg");
        stream.add_if_absent(vec![handler]).unwrap();

        assert_eq!(stream.remove_listener(ListenerId::new()), 1);
        assert!(!stream.is_completed());
    }

    #[test]
    fn test_failing_handler_does_not_affect_peers_under_log_only() {
        let stream = stream_for(DeliveryKind::Publish);
        let owner = ListenerId::new();
        let (ok, ok_seen) = recording(owner, "on_ok");
        let failing = Handler::new(
            owner,
            "on_fail",
            TypeTag::Str,
            Arc::new(|_| Err("boom".into())),
        );

        stream.add_if_absent(vec![failing, ok]).unwrap();
        stream.push(Payload::from("a"));
        stream.push(Payload::from("b"));

        // The failing handler stays attached and the peer sees every event
        assert_eq!(stream.handler_count(), 2);
        assert_eq!(
            *ok_seen.lock(),
            vec![Payload::from("a"), Payload::from("b")]
        );
    }

    #[test]
    fn test_failing_handler_is_detached_under_detach_policy() {
        let stream = DeliveryStream::new(
            ChannelKey::new(DeliveryKind::Publish, "t"),
            Arc::new(InlineExecutor),
            ContextId::Immediate,
            FailurePolicy::Detach,
            None,
        );
        let owner = ListenerId::new();
        let (ok, ok_seen) = recording(owner, "on_ok");
        let failing = Handler::new(
            owner,
            "on_fail",
            TypeTag::Str,
            Arc::new(|_| Err("boom".into())),
        );

        stream.add_if_absent(vec![failing, ok]).unwrap();
        stream.push(Payload::from("a"));

        // Detach is applied at the next serialized operation
        assert_eq!(stream.handler_count(), 1);
        stream.push(Payload::from("b"));
        assert_eq!(
            *ok_seen.lock(),
            vec![Payload::from("a"), Payload::from("b")]
        );
    }

    #[test]
    fn test_replay_seed_is_delivered_to_first_binder() {
        let stream = DeliveryStream::new(
            ChannelKey::new(DeliveryKind::Replay, "t"),
            Arc::new(InlineExecutor),
            ContextId::Immediate,
            FailurePolicy::LogOnly,
            Some(vec![Payload::from("old1"), Payload::from("old2")]),
        );

        let (handler, seen) = recording(ListenerId::new(), "on_msg");
        stream.add_if_absent(vec![handler]).unwrap();
        assert_eq!(
            *seen.lock(),
            vec![Payload::from("old1"), Payload::from("old2")]
        );
    }

    #[test]
    fn test_take_replay_buffer_after_completion() {
        let stream = stream_for(DeliveryKind::Replay);
        let owner = ListenerId::new();
        let (handler, _) = recording(owner, "on_msg");
        stream.add_if_absent(vec![handler]).unwrap();
        stream.push(Payload::from("x"));
        stream.remove_listener(owner);

        assert_eq!(stream.take_replay_buffer(), Some(vec![Payload::from("x")]));
        // Second take yields nothing
        assert_eq!(stream.take_replay_buffer(), None);
    }

    #[test]
    fn test_complete_now_detaches_everything() {
        let stream = stream_for(DeliveryKind::Publish);
        let (handler, seen) = recording(ListenerId::new(), "on_msg");
        stream.add_if_absent(vec![handler]).unwrap();

        stream.complete_now();
        assert!(stream.is_completed());
        assert!(!stream.push(Payload::from("late")));
        assert!(seen.lock().is_empty());
    }
}
