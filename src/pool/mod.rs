//! PostgreSQL client pooling.
//!
//! [`ClientPool`] owns a fixed number of `may_postgres` clients and lends them
//! out one transaction at a time. [`DatabaseConfig`] carries the URL, pool
//! size and acquire timeout.

pub mod config;
pub mod manager;

pub use config::DatabaseConfig;
pub use manager::{validate_connection_string, ClientPool, PooledClient};
