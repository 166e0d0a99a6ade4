//! # Lineage
//!
//! Category-scoped attribute inheritance for product catalogues, on
//! PostgreSQL through the `may` coroutine runtime.
//!
//! Attributes bound to a category flow down to every descendant. The nearest
//! binding on the path from the root wins. Bind, unbind and update cascade to
//! the materialized copies below, and reads always resolve live.
//!
//! Start from [`AttributeInheritanceService`] with a [`MemoryStore`] or a
//! [`PostgresStore`]. See the README for the data model.

pub mod config;
pub mod error;
pub mod executor;
pub mod inheritance;
pub mod metrics;
pub mod model;
pub mod pool;
pub mod service;
pub mod store;
pub mod transaction;
pub mod tree;

pub use config::{DatabaseConfig, InheritanceConfig};
pub use error::{CascadeWarning, EntityKind, InheritanceError};
pub use executor::{Executor, MayPostgresExecutor, StoreError};
pub use inheritance::{CascadeOperation, CascadeReport, ConsistencyReport};
pub use model::{
    Attribute, AttributeId, AttributeOption, AttributeType, AttributeValue, Binding, BindingId,
    BindingPatch, BindingRequest, BindingSummary, Category, CategoryAttributeBinding, CategoryId,
    ResolvedBinding, ValidationRule,
};
pub use service::{AttributeInheritanceService, BatchBindOutcome, BindOutcome, UnbindOutcome};
pub use store::{Database, MemoryStore, PostgresStore, Session};
