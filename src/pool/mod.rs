//! Fixed-size pool of `may_postgres` executors.

pub mod config;
pub mod manager;

pub use manager::{ConnectionPool, PooledExecutor};
