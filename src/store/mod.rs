//! Persistence seam of the engine.
//!
//! A [`Database`] opens transactions; inside one, the engine talks to a
//! [`Session`] made of row-level primitives. Two implementations ship with the
//! crate: [`MemoryStore`] (tests, embedding) and [`PostgresStore`].
//!
//! Sessions never enforce inheritance rules. They only guarantee:
//!
//! * at most one live row per `(category_id, attribute_id)`;
//! * a row inserted without a stamp gets a `created_at` later than every
//!   stamp handed out before, while a copy keeps the stamp it was given;
//! * tree walks stop after `max_depth` levels.

pub mod memory;
pub mod postgres;
pub mod schema;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;

use crate::error::InheritanceError;
use crate::executor::StoreError;
use crate::model::{
    Attribute, AttributeId, Binding, BindingId, BindingPatch, Category, CategoryId, NewBinding,
};

/// Row-level access inside one open transaction. Removed categories are
/// invisible to every read.
pub trait Session {
    fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError>;

    /// Direct children ordered by id.
    fn children(&self, id: CategoryId) -> Result<Vec<Category>, StoreError>;

    /// Subtree below `id` (excluded), ordered by depth then id, at most
    /// `max_depth` levels deep.
    fn descendants(&self, id: CategoryId, max_depth: usize) -> Result<Vec<Category>, StoreError>;

    /// Root to `id` inclusive. Returns at most `max_depth + 1` entries so the
    /// caller can tell a cycle or over-deep tree from a legitimate path.
    /// Empty when `id` does not exist or was removed; stops below a removed
    /// ancestor.
    fn ancestor_path(&self, id: CategoryId, max_depth: usize) -> Result<Vec<Category>, StoreError>;

    fn attribute(&self, id: AttributeId) -> Result<Option<Attribute>, StoreError>;

    fn attribute_exists(&self, id: AttributeId) -> Result<bool, StoreError> {
        Ok(self.attribute(id)?.is_some())
    }

    fn live_binding(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<Option<Binding>, StoreError>;

    /// Live rows of the given categories, ordered by `(sort, created_at, id)`.
    fn live_bindings(&self, category_ids: &[CategoryId]) -> Result<Vec<Binding>, StoreError>;

    /// Live rows for one attribute across the given categories.
    fn live_bindings_for_attribute(
        &self,
        category_ids: &[CategoryId],
        attribute_id: AttributeId,
    ) -> Result<Vec<Binding>, StoreError>;

    /// Insert a live row, stamped with `new.created_at` or a fresh timestamp.
    ///
    /// # Errors
    ///
    /// Fails if a live row already exists for the pair.
    fn insert_binding(&self, new: &NewBinding) -> Result<Binding, StoreError>;

    /// Soft-delete a live row and return it with `deleted_at` set.
    fn soft_delete_binding(&self, id: BindingId) -> Result<Binding, StoreError>;

    /// Apply `patch` to a live row and return the updated row.
    fn update_binding(&self, id: BindingId, patch: &BindingPatch) -> Result<Binding, StoreError>;

    fn savepoint(&self, name: &str) -> Result<(), StoreError>;
    fn rollback_to_savepoint(&self, name: &str) -> Result<(), StoreError>;
    fn release_savepoint(&self, name: &str) -> Result<(), StoreError>;
}

/// Something that can run a closure inside a transaction.
///
/// The transaction commits when `f` returns `Ok` and rolls back otherwise.
pub trait Database: Send + Sync {
    fn transaction<R, F>(&self, f: F) -> Result<R, InheritanceError>
    where
        F: FnOnce(&dyn Session) -> Result<R, InheritanceError>;
}

impl<D: Database> Database for std::sync::Arc<D> {
    fn transaction<R, F>(&self, f: F) -> Result<R, InheritanceError>
    where
        F: FnOnce(&dyn Session) -> Result<R, InheritanceError>,
    {
        (**self).transaction(f)
    }
}
