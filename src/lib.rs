//! # tagbus
//!
//! In-process publish/subscribe event bus with tag-routed channels and three
//! delivery semantics.
//!
//! ## Overview
//!
//! Listeners declare bound methods against named channels; posters fan events
//! out to every matching bound method. A channel is identified by
//! `(DeliveryKind, tag)` and carries events as a closed [`Payload`] envelope —
//! a bound method only sees payloads of the variant it declared. Delivery
//! happens asynchronously on each channel's configured execution context.
//!
//! - **Publish** — fire-and-forget; events with no attached method are lost.
//! - **Replay** — full-history buffer; late binders receive everything, in
//!   push order, before any new event. History survives listener churn.
//! - **Behavior** — latest-value cache; late binders receive only the most
//!   recent value.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use tagbus::{Binding, Bus, ContextId, Listener, ListenerId, TypeTag};
//!
//! struct OrderLog {
//!     id: ListenerId,
//!     lines: Arc<Mutex<Vec<String>>>,
//! }
//!
//! impl Listener for OrderLog {
//!     fn id(&self) -> ListenerId {
//!         self.id
//!     }
//!
//!     fn bindings(&self) -> Vec<Binding> {
//!         let lines = self.lines.clone();
//!         vec![Binding::publish("on_order", TypeTag::Str, move |event| {
//!             lines.lock().push(event.as_str().unwrap_or_default().to_string());
//!             Ok(())
//!         })
//!         .tag("orders")
//!         .observe_on(ContextId::Immediate)]
//!     }
//! }
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> tagbus::Result<()> {
//! let bus = Bus::new();
//! let log = OrderLog {
//!     id: ListenerId::new(),
//!     lines: Arc::new(Mutex::new(Vec::new())),
//! };
//!
//! bus.register(&log)?;
//! bus.post_publish("order #42 placed", &["orders"])?;
//!
//! assert_eq!(log.lines.lock().as_slice(), ["order #42 placed"]);
//! bus.unregister(&log)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`Bus`] — the façade: register/unregister listeners, post events
//! - [`Listener`] + [`Binding`] — the declarative binding table
//! - [`Discovery`] trait — maps a listener to its channel-grouped handlers
//! - [`Scheduler`] trait — resolves symbolic execution contexts
//! - [`ThreadEnforcer`] trait — confinement policy for bus mutations

pub mod bus;
pub mod discovery;
pub mod enforcer;
pub mod error;
pub mod handler;
pub mod registry;
pub mod scheduler;
pub mod stream;
pub mod types;

// Re-export core types
pub use bus::{Bus, BusBuilder, DEFAULT_IDENTIFIER};
pub use discovery::{Binding, DeclaredBindings, Discovery, DiscoveredChannel, Listener};
pub use enforcer::{AnyThread, SameThread, ThreadEnforcer};
pub use error::{BusError, Result};
pub use handler::{Handler, HandlerFn, HandlerResult, ListenerId};
pub use registry::Registry;
pub use scheduler::{ContextId, Executor, InlineExecutor, Job, Scheduler, TokioScheduler};
pub use stream::{DeliveryStream, FailurePolicy};
pub use types::{ChannelKey, DeliveryKind, Payload, TypeTag, DEFAULT_TAG};
