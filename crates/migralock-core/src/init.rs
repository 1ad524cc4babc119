//! One-time table initialization per store handle.
//!
//! Each store creates its table lazily on first use. Concurrent first callers
//! inside one process wait on the same gate, so the `CREATE TABLE` runs once.
//! Later calls only read an atomic flag.

use std::{
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
};

use tokio::sync::Mutex;

use crate::Result;

/// Single-flight guard around a store's table creation.
#[derive(Debug, Default)]
pub struct InitGuard {
    ready: AtomicBool,
    gate: Mutex<()>,
}

impl InitGuard {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ready: AtomicBool::new(false),
            gate: Mutex::const_new(()),
        }
    }

    /// Run `init` unless it already completed on this handle.
    ///
    /// A failed `init` leaves the guard unarmed so the next caller retries.
    pub async fn ensure<F, Fut>(&self, init: F) -> Result<()>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let _gate = self.gate.lock().await;
        if self.ready.load(Ordering::Acquire) {
            return Ok(());
        }

        init().await?;
        self.ready.store(true, Ordering::Release);
        Ok(())
    }

    /// Forget the completed initialization (the table was dropped).
    pub fn reset(&self) {
        self.ready.store(false, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }
}
