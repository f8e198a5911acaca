//! Connection slots handed out over a bounded channel.
//!
//! Every slot is a persistent [`MayPostgresExecutor`]. Idle slots sit in a
//! channel; a `may` semaphore counts them. `acquire` waits on the semaphore
//! (at most `pool_timeout_seconds`), which parks only the calling coroutine,
//! then takes a slot without blocking. The returned guard puts the slot back
//! and posts the semaphore on drop, so a slot is never shared by two callers
//! at once. That exclusivity is what makes `BEGIN … COMMIT` on a slot safe.

use crate::connection::{connect, ConnectionError};
use crate::executor::{DbError, MayPostgresExecutor};
use crate::pool::config::DatabaseConfig;
use crossbeam_channel::{bounded, Receiver, Sender};
use may::sync::Semphore;
use std::ops::Deref;
use std::time::{Duration, Instant};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

pub struct ConnectionPool {
    slots_tx: Sender<MayPostgresExecutor>,
    slots_rx: Receiver<MayPostgresExecutor>,
    available: Semphore,
    timeout: Duration,
    size: usize,
}

impl ConnectionPool {
    /// Open `max_connections` connections to `url`.
    ///
    /// # Errors
    ///
    /// Returns the first `ConnectionError` hit while opening slots.
    pub fn from_config(config: &DatabaseConfig) -> Result<Self, ConnectionError> {
        let size = config.max_connections.max(1);
        let mut executors = Vec::with_capacity(size);
        for _ in 0..size {
            executors.push(MayPostgresExecutor::new(connect(&config.url)?));
        }
        log::info!("opened {size} postgres connection(s)");
        Ok(Self::from_executors(
            executors,
            Duration::from_secs(config.pool_timeout_seconds),
        ))
    }

    /// Build a pool from already-open executors.
    pub fn from_executors(executors: Vec<MayPostgresExecutor>, timeout: Duration) -> Self {
        let size = executors.len();
        let (slots_tx, slots_rx) = bounded(size.max(1));
        for executor in executors {
            // Capacity equals the number of executors, so this never blocks.
            let _ = slots_tx.send(executor);
        }
        Self {
            slots_tx,
            slots_rx,
            available: Semphore::new(size),
            timeout,
            size,
        }
    }

    /// Take a slot, waiting up to the configured timeout.
    ///
    /// # Errors
    ///
    /// Returns `DbError::Pool` if no slot frees up in time.
    pub fn acquire(&self) -> Result<PooledExecutor<'_>, DbError> {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::acquire_connection_span().entered();

        let start = Instant::now();
        if !self.available.wait_timeout(self.timeout) {
            return Err(DbError::Pool(format!(
                "no connection available within {}s ({} slot(s) in use)",
                self.timeout.as_secs(),
                self.size
            )));
        }
        match self.slots_rx.try_recv() {
            Ok(executor) => {
                log::trace!("pool slot acquired after {:?}", start.elapsed());
                Ok(PooledExecutor {
                    executor: Some(executor),
                    pool: self,
                })
            }
            Err(_) => {
                // permit without a slot; hand the permit back
                self.available.post();
                Err(DbError::Pool("connection pool is closed".to_string()))
            }
        }
    }

    /// Number of slots the pool was built with.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of slots currently idle.
    pub fn idle(&self) -> usize {
        self.slots_rx.len()
    }
}

/// A slot borrowed from a [`ConnectionPool`]; returned when dropped.
pub struct PooledExecutor<'a> {
    executor: Option<MayPostgresExecutor>,
    pool: &'a ConnectionPool,
}

impl Deref for PooledExecutor<'_> {
    type Target = MayPostgresExecutor;

    fn deref(&self) -> &Self::Target {
        // Only `None` after `drop` has taken it.
        self.executor
            .as_ref()
            .unwrap_or_else(|| unreachable!("pooled executor used after release"))
    }
}

impl Drop for PooledExecutor<'_> {
    fn drop(&mut self) {
        if let Some(executor) = self.executor.take() {
            if self.pool.slots_tx.try_send(executor).is_err() {
                log::warn!("dropping connection: pool slot channel is full");
                return;
            }
            self.pool.available.post();
        }
    }
}
