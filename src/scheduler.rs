//! Execution contexts — where handler invocations run
//!
//! The bus never invokes handlers on the poster's thread unless asked to:
//! each stream resolves its symbolic [`ContextId`] to an [`Executor`] once at
//! creation, and every delivery job for that stream is enqueued there. The
//! default [`TokioScheduler`] hands out FIFO serial workers, which is what
//! preserves per-channel delivery order on pool-like contexts.

use parking_lot::RwLock;
use std::sync::{Arc, OnceLock};
use tokio::sync::mpsc;

/// A unit of work dispatched to an execution context
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// An execution context that runs jobs
///
/// Implementations resolved by a [`Scheduler`] must run jobs in the order
/// they were enqueued; `execute` must never block the caller.
pub trait Executor: Send + Sync {
    /// Enqueue a job for execution
    fn execute(&self, job: Job);
}

/// Symbolic identifier for an execution context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ContextId {
    /// The shared main context (stand-in for a platform UI loop)
    #[default]
    Main,
    /// A dedicated worker for this stream
    NewTask,
    /// A worker intended for IO-bound handlers
    Io,
    /// A worker intended for CPU-bound handlers
    Compute,
    /// Run inline on the calling context
    Immediate,
    /// The installed custom executor; falls back to Main if none is set
    Custom,
}

/// Resolves a symbolic context identifier to an execution context
///
/// Called once per stream at creation time, in the manner of Rx's
/// per-subscription workers — two streams resolving the same pool-like
/// context get independent FIFO queues.
pub trait Scheduler: Send + Sync {
    /// Resolve `ctx` to an executor for one stream
    fn resolve(&self, ctx: ContextId) -> Arc<dyn Executor>;
}

/// FIFO worker backed by a spawned task draining an unbounded queue
///
/// Enqueueing never blocks; the worker exits when every handle to it is
/// dropped.
pub struct SerialExecutor {
    tx: mpsc::UnboundedSender<Job>,
}

impl SerialExecutor {
    /// Spawn a worker on the given runtime
    pub fn spawn(handle: &tokio::runtime::Handle, label: &'static str) -> Arc<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        handle.spawn(async move {
            while let Some(job) = rx.recv().await {
                job();
            }
            tracing::trace!(context = label, "Serial worker drained and exited");
        });
        Arc::new(Self { tx })
    }
}

impl Executor for SerialExecutor {
    fn execute(&self, job: Job) {
        // Send only fails when the worker is gone, i.e. during teardown
        let _ = self.tx.send(job);
    }
}

/// Executor that runs jobs inline on the calling context
#[derive(Debug, Default, Clone, Copy)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, job: Job) {
        job();
    }
}

/// Default scheduler over a tokio runtime
///
/// `Main` resolves to one shared serial worker for the whole scheduler;
/// `NewTask`, `Io`, and `Compute` each resolve to a fresh dedicated worker
/// per call; `Immediate` runs inline; `Custom` uses the installed executor
/// and falls back to `Main` when none is set.
pub struct TokioScheduler {
    handle: tokio::runtime::Handle,
    main: OnceLock<Arc<SerialExecutor>>,
    custom: RwLock<Option<Arc<dyn Executor>>>,
}

impl TokioScheduler {
    /// Create a scheduler on the current runtime
    ///
    /// Panics outside a tokio runtime context; use
    /// [`TokioScheduler::with_handle`] to supply one explicitly.
    pub fn new() -> Self {
        Self::with_handle(tokio::runtime::Handle::current())
    }

    /// Create a scheduler on the given runtime handle
    pub fn with_handle(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle,
            main: OnceLock::new(),
            custom: RwLock::new(None),
        }
    }

    /// Install the executor returned for [`ContextId::Custom`]
    pub fn set_custom(&self, executor: Arc<dyn Executor>) {
        *self.custom.write() = Some(executor);
    }

    fn main_executor(&self) -> Arc<SerialExecutor> {
        self.main
            .get_or_init(|| SerialExecutor::spawn(&self.handle, "main"))
            .clone()
    }
}

impl Scheduler for TokioScheduler {
    fn resolve(&self, ctx: ContextId) -> Arc<dyn Executor> {
        match ctx {
            ContextId::Main => self.main_executor(),
            ContextId::NewTask => SerialExecutor::spawn(&self.handle, "new-task"),
            ContextId::Io => SerialExecutor::spawn(&self.handle, "io"),
            ContextId::Compute => SerialExecutor::spawn(&self.handle, "compute"),
            ContextId::Immediate => Arc::new(InlineExecutor),
            ContextId::Custom => match self.custom.read().clone() {
                Some(executor) => executor,
                None => self.main_executor(),
            },
        }
    }
}
