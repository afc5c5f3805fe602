//! Thread-confinement policies for bus mutations
//!
//! A [`ThreadEnforcer`] is consulted at the top of `register`, `unregister`,
//! and `post`. It either passes silently or rejects the calling thread with a
//! policy violation — the operation does not proceed.

use crate::error::{BusError, Result};

/// Enforces a thread-confinement policy for methods on a particular bus
pub trait ThreadEnforcer: Send + Sync {
    /// Validate the calling thread for an operation on the named bus
    fn enforce(&self, bus: &str) -> Result<()>;
}

/// A policy that does no verification
#[derive(Debug, Default, Clone, Copy)]
pub struct AnyThread;

impl ThreadEnforcer for AnyThread {
    fn enforce(&self, _bus: &str) -> Result<()> {
        Ok(())
    }
}

/// Confines bus mutations to one designated thread
///
/// The designated thread is whichever one constructed the policy — typically
/// the application's main thread, standing in for a platform UI loop.
#[derive(Debug)]
pub struct SameThread {
    allowed: std::thread::ThreadId,
}

impl SameThread {
    /// Confine to the current thread
    pub fn current() -> Self {
        Self {
            allowed: std::thread::current().id(),
        }
    }
}

impl ThreadEnforcer for SameThread {
    fn enforce(&self, bus: &str) -> Result<()> {
        let caller = std::thread::current().id();
        if caller == self.allowed {
            Ok(())
        } else {
            Err(BusError::PolicyViolation {
                bus: bus.to_string(),
                thread: format!("{caller:?}"),
            })
        }
    }
}
