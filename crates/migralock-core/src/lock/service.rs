//! Acquire-with-retry and scoped execution on top of a [`LockStore`].
//!
//! Every attempt first sweeps expired rows store-wide, then tries to insert
//! the lock row. A crashed holder's lock is therefore reclaimed by the next
//! contender once its timeout has elapsed.
//!
//! # Timeout vs action duration
//!
//! Nothing renews a lock while it is held. If a protected action runs longer
//! than `timeout`, another process may sweep the row and acquire the same lock
//! while the first holder is still running. Pick a timeout comfortably larger
//! than the expected action duration.

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::store::{LockRecord, LockStore, SqliteLockStore};
use crate::{Error, Result};

/// Default lock timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
/// Default number of acquisition attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 1;
/// Default delay between attempts in milliseconds.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// How long a lock lives and how hard to try for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// Lifetime of the lock row; the lock expires after this elapses.
    pub timeout: Duration,
    /// Total attempts before giving up. Zero is treated as one.
    pub max_attempts: u32,
    /// Constant wait between attempts.
    pub retry_delay: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        }
    }
}

impl LockOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    #[must_use]
    pub const fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    const fn attempts(&self) -> u32 {
        if self.max_attempts == 0 {
            1
        } else {
            self.max_attempts
        }
    }
}

/// Returned by a successful [`LockService::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockLease {
    /// The lock that was acquired.
    pub name: String,
    /// When the lock stops being live unless released earlier.
    pub expires_at: DateTime<Utc>,
    /// Which attempt succeeded (1-based).
    pub attempt: u32,
}

/// Named locks shared by every process using the same store.
#[derive(Clone)]
pub struct LockService {
    store: Arc<dyn LockStore>,
}

impl std::fmt::Debug for LockService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockService").finish_non_exhaustive()
    }
}

impl LockService {
    #[must_use]
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self { store }
    }

    /// Lock service over the `SQLite` lock table in `db`.
    #[must_use]
    pub fn sqlite(db: SqlitePool) -> Self {
        Self::new(Arc::new(SqliteLockStore::new(db)))
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Acquire the lock `name`, retrying up to `options.max_attempts` times.
    ///
    /// Fails with [`Error::LockUnavailable`] once every attempt found the lock
    /// held. Store failures other than contention are returned immediately.
    pub async fn acquire(&self, name: &str, options: &LockOptions) -> Result<LockLease> {
        let max_attempts = options.attempts();
        let timeout = chrono::Duration::from_std(options.timeout)
            .map_err(|e| Error::InvalidConfig(format!("Lock timeout out of range: {e}")))?;

        for attempt in 1..=max_attempts {
            debug!(
                "Try to acquire the lock {name} (attempt={attempt}/{max_attempts}, timeout={}s) ...",
                options.timeout.as_secs()
            );

            let now = Utc::now();
            let swept = self.store.delete_expired(now).await?;
            if swept > 0 {
                debug!("Removed {swept} expired lock(s)");
            }

            let expires_at = now.checked_add_signed(timeout).ok_or_else(|| {
                Error::InvalidConfig(format!(
                    "Lock timeout of {}s is out of range",
                    options.timeout.as_secs()
                ))
            })?;
            if self.store.create_if_absent(name, expires_at, now).await? {
                info!(lock = name, attempt, "Lock acquired");
                return Ok(LockLease {
                    name: name.to_string(),
                    expires_at,
                    attempt,
                });
            }

            if attempt < max_attempts {
                warn!(
                    "Cannot acquire the lock {name}. Retry in {} milliseconds.",
                    options.retry_delay.as_millis()
                );
                tokio::time::sleep(options.retry_delay).await;
            }
        }

        Err(Error::LockUnavailable {
            name: name.to_string(),
            attempts: max_attempts,
        })
    }

    /// Release the lock `name`.
    ///
    /// Succeeds whether or not the row still exists; it may already have
    /// expired and been swept.
    pub async fn release(&self, name: &str) -> Result<()> {
        debug!("Release the lock '{name}'");
        if !self.store.delete(name).await? {
            debug!("Lock '{name}' was not held");
        }
        Ok(())
    }

    /// Current row for `name`, if any.
    pub async fn find(&self, name: &str) -> Result<Option<LockRecord>> {
        self.store.find(name).await
    }

    /// Acquire `name`, run `action`, and release the lock on every exit path.
    ///
    /// If the lock cannot be acquired `action` is never invoked. A failure
    /// from `action` is returned as-is after the lock is released.
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        name: &str,
        options: &LockOptions,
        action: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: From<Error>,
    {
        let lease = self.acquire(name, options).await?;
        let started = Instant::now();

        let outcome = action().await;

        let held = started.elapsed();
        if held > options.timeout {
            warn!(
                lock = %lease.name,
                held_ms = u64::try_from(held.as_millis()).unwrap_or(u64::MAX),
                "Protected action outlived the lock timeout; the lock may have been taken by another process"
            );
        }

        match (outcome, self.release(name).await) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(release_err)) => Err(release_err.into()),
            (Err(action_err), Ok(())) => Err(action_err),
            (Err(action_err), Err(release_err)) => {
                warn!(lock = name, error = %release_err, "Failed to release lock after action failure");
                Err(action_err)
            }
        }
    }
}
