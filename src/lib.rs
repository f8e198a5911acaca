//! # Contractguard
//!
//! Contract lifecycle, approval workflow and authorization core on
//! PostgreSQL for the `may` coroutine runtime.
//!
//! - [`lifecycle`] and [`code`]: status graph, date rules, `CON-YYYY-NNNN` codes
//! - [`policy`]: `can_access(actor, resource, action)`
//! - [`store`]: the [`ContractStore`] gateway, in memory or on PostgreSQL
//! - [`service`]: [`ContractService`], what an API layer calls
//!
//! ```no_run
//! use contractguard::{
//!     migration::startup_migrations, AppConfig, ConnectionPool, ContractService, PostgresStore,
//! };
//!
//! let config = AppConfig::load()?;
//! let pool = ConnectionPool::from_config(&config.database)?;
//! startup_migrations(&pool.acquire()?, Some(config.database.migration_lock_timeout_seconds))?;
//!
//! let service = ContractService::from_config(PostgresStore::new(pool), &config.contracts);
//! let history = service.transition_status(42, "submitted", 7, Some("ready for review"))?;
//! println!("{} -> {}", history.old_status, history.new_status);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod code;
pub mod config;
pub mod connection;
#[macro_use]
pub mod domain;
pub mod documents;
pub mod error;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod migration;
pub mod policy;
pub mod pool;
pub mod query;
pub mod service;
pub mod store;
pub mod transaction;

pub use code::ContractCode;
pub use config::AppConfig;
pub use connection::{connect, ConnectionError};
pub use documents::{DocumentStorage, LocalDocumentStorage, MemoryDocumentStorage, Upload};
pub use domain::{
    Comment, Contract, ContractDocument, ContractPatch, ContractStatus, ContractType, Department,
    NewContract, NewUser, PaymentTerms, RenewalTerms, Role, StatusHistory, User, UserPatch,
};
pub use error::ContractError;
pub use executor::{DbError, MayPostgresExecutor, SqlExecutor};
pub use policy::{can_access, Action, Resource};
pub use pool::{ConnectionPool, PooledExecutor};
pub use service::{ContractDetails, ContractService};
pub use store::{
    ContractFilter, ContractOrder, ContractStore, MemoryStore, PostgresStore, UserFilter,
};
pub use transaction::{IsolationLevel, Transaction, TransactionError};
