//! The routing table — concurrent map from channel keys to delivery streams
//!
//! Entries are created lazily on first bind and removed once their stream
//! completes. A completed stream is never revived: binders that lose the race
//! against completion retry with a fresh stream object. Replay history
//! outlives its stream — a completed Replay stream's buffer is parked here
//! and seeds the next stream created for the same key.

use crate::discovery::DiscoveredChannel;
use crate::error::{BusError, Result};
use crate::handler::ListenerId;
use crate::scheduler::Scheduler;
use crate::stream::{DeliveryStream, FailurePolicy};
use crate::types::{ChannelKey, DeliveryKind, Payload};
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent mapping from [`ChannelKey`] to its [`DeliveryStream`]
#[derive(Default)]
pub struct Registry {
    streams: DashMap<ChannelKey, Arc<DeliveryStream>>,
    /// Replay buffers that survived their stream, keyed by channel
    parked_replays: DashMap<ChannelKey, Vec<Payload>>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a discovered channel's handlers, creating the stream on demand
    ///
    /// Returns the number of handlers actually added (idempotent with respect
    /// to handler equality).
    pub fn bind(
        &self,
        channel: &DiscoveredChannel,
        scheduler: &dyn Scheduler,
        failure_policy: FailurePolicy,
    ) -> Result<usize> {
        if channel.handlers.is_empty() {
            // A stream with no handlers could never complete and, for Replay,
            // would buffer without bound
            return Err(BusError::InvalidBinding {
                method: String::new(),
                reason: format!("channel '{}' binds no handlers", channel.key),
            });
        }

        loop {
            let stream = self
                .streams
                .entry(channel.key.clone())
                .or_insert_with(|| {
                    let observe = scheduler.resolve(channel.observe_on);
                    let seed = match channel.key.kind {
                        DeliveryKind::Replay => self
                            .parked_replays
                            .remove(&channel.key)
                            .map(|(_, history)| history),
                        _ => None,
                    };
                    tracing::debug!(channel = %channel.key, "Stream created");
                    DeliveryStream::new(
                        channel.key.clone(),
                        observe,
                        channel.subscribe_on,
                        failure_policy,
                        seed,
                    )
                })
                .clone();

            match stream.add_if_absent(channel.handlers.clone()) {
                Ok(added) => return Ok(added),
                Err(BusError::StreamCompleted { .. }) => {
                    // Lost the race against completion — retire the entry and
                    // retry with a fresh stream
                    self.remove_completed(&channel.key);
                }
                Err(other) => return Err(other),
            }
        }
    }

    /// Detach a listener's handlers from the stream for `key`, if present
    ///
    /// Returns the remaining handler count, or `None` when no stream exists
    /// for the key. A stream left empty is completed and its entry erased.
    pub fn remove_listener_for(&self, key: &ChannelKey, listener: ListenerId) -> Option<usize> {
        let stream = self.streams.get(key).map(|entry| entry.clone())?;
        let remaining = stream.remove_listener(listener);
        if remaining == 0 {
            self.remove_completed(key);
        }
        Some(remaining)
    }

    /// Look up the stream for a key
    pub fn get(&self, key: &ChannelKey) -> Option<Arc<DeliveryStream>> {
        self.streams.get(key).map(|entry| entry.clone())
    }

    /// Erase the entry for `key` if its stream has completed, parking any
    /// replay history for the key's next stream
    ///
    /// Parking happens inside the removal critical section, under the same
    /// map shard lock a concurrent `bind` contends for — no binder can
    /// observe the vacancy before the history is retained.
    pub fn remove_completed(&self, key: &ChannelKey) {
        let removed = self.streams.remove_if(key, |key, stream| {
            if !stream.is_completed() {
                return false;
            }
            if let Some(history) = stream.take_replay_buffer() {
                tracing::debug!(channel = %key, events = history.len(), "Replay history parked");
                self.parked_replays.insert(key.clone(), history);
            }
            true
        });
        if let Some((key, _)) = removed {
            tracing::debug!(channel = %key, "Stream removed from registry");
        }
    }

    /// Complete and erase the channel unconditionally, dropping any history
    pub fn drop_channel(&self, key: &ChannelKey) {
        if let Some((key, stream)) = self.streams.remove(key) {
            stream.complete_now();
            tracing::debug!(channel = %key, "Channel dropped");
        }
        self.parked_replays.remove(key);
    }

    /// Number of live channel entries
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    /// Whether the registry has no live channels
    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Whether a stream currently exists for the key
    pub fn contains(&self, key: &ChannelKey) -> bool {
        self.streams.contains_key(key)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("channels", &self.streams.len())
            .field("parked_replays", &self.parked_replays.len())
            .finish()
    }
}
