//! Integration tests for the inheritance engine.
//!
//! Everything except the `postgres` module runs against the in-memory store.
//! The PostgreSQL tests start a container and are ignored by default:
//!
//! ```text
//! cargo test --test integration -- --ignored
//! ```

mod batch;
mod cascade;
mod common;
mod concurrency;
mod postgres;
mod randomized;
mod scenarios;
