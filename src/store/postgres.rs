//! PostgreSQL store over `may_postgres`.
//!
//! Each [`Database::transaction`] call borrows one client from the
//! [`ClientPool`], wraps it in a [`Transaction`] and hands the engine a
//! session that runs every statement through the [`Executor`] trait.
//! Tree walks are recursive CTEs; timestamps come from `clock_timestamp()` so
//! rows written later in the same transaction still sort after earlier ones.

use super::{schema, Database, Session};
use crate::error::InheritanceError;
use crate::executor::{Executor, MayPostgresExecutor, StoreError};
use crate::model::{
    Attribute, AttributeId, AttributeType, Binding, BindingId, BindingPatch, Category, CategoryId,
    NewBinding,
};
use crate::pool::{ClientPool, DatabaseConfig};
use crate::transaction::Transaction;
use may_postgres::Row;

const BINDING_COLUMNS: &str =
    "id, category_id, attribute_id, is_required, sort, created_at, updated_at, deleted_at";

const SELECT_CATEGORY: &str = "SELECT id, parent_id, level, name, is_active, deleted_at \
     FROM categories WHERE id = $1 AND deleted_at IS NULL";

const SELECT_CHILDREN: &str = "SELECT id, parent_id, level, name, is_active, deleted_at \
     FROM categories WHERE parent_id = $1 AND deleted_at IS NULL ORDER BY id";

// Removed categories stop both walks, so a removed node hides its subtree.
const SELECT_DESCENDANTS: &str = "\
WITH RECURSIVE subtree AS (
    SELECT id, parent_id, level, name, is_active, deleted_at, 1 AS depth, ARRAY[id] AS visited
    FROM categories
    WHERE parent_id = $1 AND id <> $1 AND deleted_at IS NULL
  UNION ALL
    SELECT c.id, c.parent_id, c.level, c.name, c.is_active, c.deleted_at, s.depth + 1, s.visited || c.id
    FROM categories c
    JOIN subtree s ON c.parent_id = s.id
    WHERE s.depth < $2 AND c.id <> $1 AND c.id <> ALL(s.visited) AND c.deleted_at IS NULL
)
SELECT id, parent_id, level, name, is_active, deleted_at FROM subtree ORDER BY depth, id";

const SELECT_ANCESTOR_PATH: &str = "\
WITH RECURSIVE path AS (
    SELECT id, parent_id, level, name, is_active, deleted_at, 0 AS hops
    FROM categories
    WHERE id = $1 AND deleted_at IS NULL
  UNION ALL
    SELECT c.id, c.parent_id, c.level, c.name, c.is_active, c.deleted_at, p.hops + 1
    FROM categories c
    JOIN path p ON c.id = p.parent_id
    WHERE p.hops < $2 AND c.deleted_at IS NULL
)
SELECT id, parent_id, level, name, is_active, deleted_at FROM path ORDER BY hops DESC";

const SELECT_ATTRIBUTE: &str = "\
SELECT id, name, display_name, attribute_type, unit, is_required, default_value,
       options, validation, sort, is_active
FROM attributes WHERE id = $1";

pub struct PostgresStore {
    pool: ClientPool,
}

impl PostgresStore {
    pub fn new(pool: ClientPool) -> Self {
        Self { pool }
    }

    /// Open a pool sized by `config`.
    pub fn connect(config: &DatabaseConfig) -> Result<Self, StoreError> {
        Ok(Self::new(ClientPool::connect(config)?))
    }

    pub fn pool(&self) -> &ClientPool {
        &self.pool
    }

    fn with_executor<T>(
        &self,
        f: impl FnOnce(&MayPostgresExecutor) -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let client = self.pool.acquire()?;
        let executor = MayPostgresExecutor::new((*client).clone());
        f(&executor)
    }

    /// `SELECT 1` on a pooled client.
    pub fn check_health(&self) -> Result<bool, StoreError> {
        self.with_executor(|exec| exec.check_health())
    }

    /// Create tables and indexes if missing.
    pub fn install_schema(&self) -> Result<(), StoreError> {
        self.with_executor(|exec| schema::install_schema(exec))
    }

    /// Insert or replace a category record (owned by the category catalogue).
    pub fn upsert_category(&self, category: &Category) -> Result<(), StoreError> {
        self.with_executor(|exec| {
            exec.execute(
                "INSERT INTO categories (id, parent_id, level, name, is_active, deleted_at) \
                 VALUES ($1, $2, $3, $4, $5, $6) \
                 ON CONFLICT (id) DO UPDATE SET parent_id = EXCLUDED.parent_id, \
                 level = EXCLUDED.level, name = EXCLUDED.name, is_active = EXCLUDED.is_active, \
                 deleted_at = EXCLUDED.deleted_at",
                &[
                    &category.id,
                    &category.parent_id,
                    &category.level,
                    &category.name,
                    &category.is_active,
                    &category.deleted_at,
                ],
            )
            .map(|_| ())
        })
    }

    /// Soft-delete a category. Returns false when no live category has `id`.
    pub fn remove_category(&self, id: CategoryId) -> Result<bool, StoreError> {
        self.with_executor(|exec| {
            exec.execute(
                "UPDATE categories SET deleted_at = clock_timestamp() \
                 WHERE id = $1 AND deleted_at IS NULL",
                &[&id],
            )
            .map(|n| n > 0)
        })
    }

    /// Insert or replace an attribute definition (owned by the attribute catalogue).
    pub fn upsert_attribute(&self, attribute: &Attribute) -> Result<(), StoreError> {
        let options = serde_json::to_string(&attribute.options)
            .map_err(|e| StoreError::Parse(format!("attribute options: {e}")))?;
        let validation = serde_json::to_string(&attribute.validation)
            .map_err(|e| StoreError::Parse(format!("attribute validation: {e}")))?;
        let attribute_type = attribute.attribute_type.as_str();
        self.with_executor(|exec| {
            exec.execute(
                "INSERT INTO attributes (id, name, display_name, attribute_type, unit, is_required, \
                 default_value, options, validation, sort, is_active) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) \
                 ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, \
                 display_name = EXCLUDED.display_name, attribute_type = EXCLUDED.attribute_type, \
                 unit = EXCLUDED.unit, is_required = EXCLUDED.is_required, \
                 default_value = EXCLUDED.default_value, options = EXCLUDED.options, \
                 validation = EXCLUDED.validation, sort = EXCLUDED.sort, is_active = EXCLUDED.is_active",
                &[
                    &attribute.id,
                    &attribute.name,
                    &attribute.display_name,
                    &attribute_type,
                    &attribute.unit,
                    &attribute.is_required,
                    &attribute.default_value,
                    &options,
                    &validation,
                    &attribute.sort,
                    &attribute.is_active,
                ],
            )
            .map(|_| ())
        })
    }
}

impl Database for PostgresStore {
    fn transaction<R, F>(&self, f: F) -> Result<R, InheritanceError>
    where
        F: FnOnce(&dyn Session) -> Result<R, InheritanceError>,
    {
        let client = self.pool.acquire()?;
        let tx = Transaction::new((*client).clone())?;
        let result = f(&PgSession { tx: &tx });
        match result {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback() {
                    log::warn!("rollback after failed unit of work also failed: {rollback_err}");
                }
                Err(err)
            }
        }
    }
}

struct PgSession<'t> {
    tx: &'t Transaction,
}

fn depth_param(max_depth: usize) -> Result<i32, StoreError> {
    i32::try_from(max_depth).map_err(|_| StoreError::Other(format!("depth {max_depth} out of range")))
}

fn parse_err(what: &str, e: may_postgres::Error) -> StoreError {
    StoreError::Parse(format!("{what}: {e}"))
}

fn category_from_row(row: &Row) -> Result<Category, StoreError> {
    Ok(Category {
        id: row.try_get("id").map_err(|e| parse_err("categories.id", e))?,
        parent_id: row
            .try_get("parent_id")
            .map_err(|e| parse_err("categories.parent_id", e))?,
        level: row.try_get("level").map_err(|e| parse_err("categories.level", e))?,
        name: row.try_get("name").map_err(|e| parse_err("categories.name", e))?,
        is_active: row
            .try_get("is_active")
            .map_err(|e| parse_err("categories.is_active", e))?,
        deleted_at: row
            .try_get("deleted_at")
            .map_err(|e| parse_err("categories.deleted_at", e))?,
    })
}

fn binding_from_row(row: &Row) -> Result<Binding, StoreError> {
    let get = |col: &str| format!("category_attributes.{col}");
    Ok(Binding {
        id: row.try_get("id").map_err(|e| parse_err(&get("id"), e))?,
        category_id: row
            .try_get("category_id")
            .map_err(|e| parse_err(&get("category_id"), e))?,
        attribute_id: row
            .try_get("attribute_id")
            .map_err(|e| parse_err(&get("attribute_id"), e))?,
        is_required: row
            .try_get("is_required")
            .map_err(|e| parse_err(&get("is_required"), e))?,
        sort: row.try_get("sort").map_err(|e| parse_err(&get("sort"), e))?,
        created_at: row
            .try_get("created_at")
            .map_err(|e| parse_err(&get("created_at"), e))?,
        updated_at: row
            .try_get("updated_at")
            .map_err(|e| parse_err(&get("updated_at"), e))?,
        deleted_at: row
            .try_get("deleted_at")
            .map_err(|e| parse_err(&get("deleted_at"), e))?,
    })
}

fn attribute_from_row(row: &Row) -> Result<Attribute, StoreError> {
    let attribute_type: String = row
        .try_get("attribute_type")
        .map_err(|e| parse_err("attributes.attribute_type", e))?;
    let options: String = row
        .try_get("options")
        .map_err(|e| parse_err("attributes.options", e))?;
    let validation: String = row
        .try_get("validation")
        .map_err(|e| parse_err("attributes.validation", e))?;

    Ok(Attribute {
        id: row.try_get("id").map_err(|e| parse_err("attributes.id", e))?,
        name: row.try_get("name").map_err(|e| parse_err("attributes.name", e))?,
        display_name: row
            .try_get("display_name")
            .map_err(|e| parse_err("attributes.display_name", e))?,
        attribute_type: attribute_type
            .parse::<AttributeType>()
            .map_err(StoreError::Parse)?,
        unit: row.try_get("unit").map_err(|e| parse_err("attributes.unit", e))?,
        is_required: row
            .try_get("is_required")
            .map_err(|e| parse_err("attributes.is_required", e))?,
        default_value: row
            .try_get("default_value")
            .map_err(|e| parse_err("attributes.default_value", e))?,
        options: serde_json::from_str(&options)
            .map_err(|e| StoreError::Parse(format!("attributes.options: {e}")))?,
        validation: serde_json::from_str(&validation)
            .map_err(|e| StoreError::Parse(format!("attributes.validation: {e}")))?,
        sort: row.try_get("sort").map_err(|e| parse_err("attributes.sort", e))?,
        is_active: row
            .try_get("is_active")
            .map_err(|e| parse_err("attributes.is_active", e))?,
    })
}

fn collect<T>(rows: Vec<Row>, map: fn(&Row) -> Result<T, StoreError>) -> Result<Vec<T>, StoreError> {
    rows.iter().map(map).collect()
}

impl Session for PgSession<'_> {
    fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        self.tx
            .query_opt(SELECT_CATEGORY, &[&id])?
            .as_ref()
            .map(category_from_row)
            .transpose()
    }

    fn children(&self, id: CategoryId) -> Result<Vec<Category>, StoreError> {
        collect(self.tx.query_all(SELECT_CHILDREN, &[&id])?, category_from_row)
    }

    fn descendants(&self, id: CategoryId, max_depth: usize) -> Result<Vec<Category>, StoreError> {
        let depth = depth_param(max_depth)?;
        collect(
            self.tx.query_all(SELECT_DESCENDANTS, &[&id, &depth])?,
            category_from_row,
        )
    }

    fn ancestor_path(&self, id: CategoryId, max_depth: usize) -> Result<Vec<Category>, StoreError> {
        let depth = depth_param(max_depth)?;
        collect(
            self.tx.query_all(SELECT_ANCESTOR_PATH, &[&id, &depth])?,
            category_from_row,
        )
    }

    fn attribute(&self, id: AttributeId) -> Result<Option<Attribute>, StoreError> {
        self.tx
            .query_opt(SELECT_ATTRIBUTE, &[&id])?
            .as_ref()
            .map(attribute_from_row)
            .transpose()
    }

    fn live_binding(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<Option<Binding>, StoreError> {
        let sql = format!(
            "SELECT {BINDING_COLUMNS} FROM category_attributes \
             WHERE category_id = $1 AND attribute_id = $2 AND deleted_at IS NULL"
        );
        self.tx
            .query_opt(&sql, &[&category_id, &attribute_id])?
            .as_ref()
            .map(binding_from_row)
            .transpose()
    }

    fn live_bindings(&self, category_ids: &[CategoryId]) -> Result<Vec<Binding>, StoreError> {
        let ids = category_ids.to_vec();
        let sql = format!(
            "SELECT {BINDING_COLUMNS} FROM category_attributes \
             WHERE category_id = ANY($1) AND deleted_at IS NULL \
             ORDER BY sort, created_at, id"
        );
        collect(self.tx.query_all(&sql, &[&ids])?, binding_from_row)
    }

    fn live_bindings_for_attribute(
        &self,
        category_ids: &[CategoryId],
        attribute_id: AttributeId,
    ) -> Result<Vec<Binding>, StoreError> {
        let ids = category_ids.to_vec();
        let sql = format!(
            "SELECT {BINDING_COLUMNS} FROM category_attributes \
             WHERE category_id = ANY($1) AND attribute_id = $2 AND deleted_at IS NULL \
             ORDER BY sort, created_at, id"
        );
        collect(
            self.tx.query_all(&sql, &[&ids, &attribute_id])?,
            binding_from_row,
        )
    }

    fn insert_binding(&self, new: &NewBinding) -> Result<Binding, StoreError> {
        let sql = format!(
            "WITH now AS (SELECT clock_timestamp() AS ts) \
             INSERT INTO category_attributes \
                 (category_id, attribute_id, is_required, sort, created_at, updated_at) \
             SELECT $1, $2, $3, $4, COALESCE($5::timestamptz, now.ts), now.ts FROM now \
             RETURNING {BINDING_COLUMNS}"
        );
        let row = self.tx.query_one(
            &sql,
            &[
                &new.category_id,
                &new.attribute_id,
                &new.is_required,
                &new.sort,
                &new.created_at,
            ],
        )?;
        binding_from_row(&row)
    }

    fn soft_delete_binding(&self, id: BindingId) -> Result<Binding, StoreError> {
        let sql = format!(
            "WITH now AS (SELECT clock_timestamp() AS ts) \
             UPDATE category_attributes SET deleted_at = now.ts, updated_at = now.ts FROM now \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {}",
            qualified_binding_columns()
        );
        match self.tx.query_opt(&sql, &[&id])? {
            Some(row) => binding_from_row(&row),
            None => Err(StoreError::Query(format!("binding {id} is not live"))),
        }
    }

    fn update_binding(&self, id: BindingId, patch: &BindingPatch) -> Result<Binding, StoreError> {
        let sql = format!(
            "UPDATE category_attributes \
             SET is_required = COALESCE($2, is_required), sort = COALESCE($3, sort), \
                 updated_at = clock_timestamp() \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {BINDING_COLUMNS}"
        );
        match self
            .tx
            .query_opt(&sql, &[&id, &patch.is_required, &patch.sort])?
        {
            Some(row) => binding_from_row(&row),
            None => Err(StoreError::Query(format!("binding {id} is not live"))),
        }
    }

    fn savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.tx.savepoint(name)
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.tx.rollback_to_savepoint(name)
    }

    fn release_savepoint(&self, name: &str) -> Result<(), StoreError> {
        self.tx.release_savepoint(name)
    }
}

/// Binding columns prefixed with the table name, for statements joining `now`.
fn qualified_binding_columns() -> String {
    BINDING_COLUMNS
        .split(", ")
        .map(|col| format!("category_attributes.{col}"))
        .collect::<Vec<_>>()
        .join(", ")
}
