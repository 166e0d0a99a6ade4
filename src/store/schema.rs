//! Schema installation for the PostgreSQL store.
//!
//! Tables are built with `sea-query`. The live-row uniqueness rule needs a
//! partial index, which is written as raw SQL.

use crate::executor::{Executor, StoreError};
use sea_query::{ColumnDef, ForeignKey, Index, PostgresQueryBuilder, Table, TableCreateStatement};

pub const CATEGORIES: &str = "categories";
pub const ATTRIBUTES: &str = "attributes";
pub const CATEGORY_ATTRIBUTES: &str = "category_attributes";

const LIVE_BINDING_INDEX: &str = "CREATE UNIQUE INDEX IF NOT EXISTS uq_category_attributes_live \
     ON category_attributes (category_id, attribute_id) WHERE deleted_at IS NULL";

// Tables created before categories could be removed.
const CATEGORY_SOFT_DELETE: &str =
    "ALTER TABLE categories ADD COLUMN IF NOT EXISTS deleted_at timestamptz NULL";

fn categories_table() -> TableCreateStatement {
    Table::create()
        .table(CATEGORIES)
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().primary_key())
        .col(ColumnDef::new("parent_id").big_integer().null())
        .col(ColumnDef::new("level").integer().not_null().default(1))
        .col(ColumnDef::new("name").text().not_null())
        .col(ColumnDef::new("is_active").boolean().not_null().default(true))
        .col(ColumnDef::new("deleted_at").timestamp_with_time_zone().null())
        .foreign_key(
            ForeignKey::create()
                .name("fk_categories_parent")
                .from(CATEGORIES, "parent_id")
                .to(CATEGORIES, "id"),
        )
        .to_owned()
}

fn attributes_table() -> TableCreateStatement {
    Table::create()
        .table(ATTRIBUTES)
        .if_not_exists()
        .col(ColumnDef::new("id").big_integer().not_null().primary_key())
        .col(ColumnDef::new("name").text().not_null())
        .col(ColumnDef::new("display_name").text().not_null())
        .col(ColumnDef::new("attribute_type").text().not_null())
        .col(ColumnDef::new("unit").text().null())
        .col(ColumnDef::new("is_required").boolean().not_null().default(false))
        .col(ColumnDef::new("default_value").text().null())
        .col(ColumnDef::new("options").text().not_null().default("[]"))
        .col(ColumnDef::new("validation").text().not_null().default("{}"))
        .col(ColumnDef::new("sort").integer().not_null().default(0))
        .col(ColumnDef::new("is_active").boolean().not_null().default(true))
        .to_owned()
}

fn category_attributes_table() -> TableCreateStatement {
    Table::create()
        .table(CATEGORY_ATTRIBUTES)
        .if_not_exists()
        .col(
            ColumnDef::new("id")
                .big_integer()
                .not_null()
                .auto_increment()
                .primary_key(),
        )
        .col(ColumnDef::new("category_id").big_integer().not_null())
        .col(ColumnDef::new("attribute_id").big_integer().not_null())
        .col(ColumnDef::new("is_required").boolean().not_null().default(false))
        .col(ColumnDef::new("sort").integer().not_null().default(0))
        .col(ColumnDef::new("created_at").timestamp_with_time_zone().not_null())
        .col(ColumnDef::new("updated_at").timestamp_with_time_zone().not_null())
        .col(ColumnDef::new("deleted_at").timestamp_with_time_zone().null())
        .foreign_key(
            ForeignKey::create()
                .name("fk_category_attributes_category")
                .from(CATEGORY_ATTRIBUTES, "category_id")
                .to(CATEGORIES, "id"),
        )
        .foreign_key(
            ForeignKey::create()
                .name("fk_category_attributes_attribute")
                .from(CATEGORY_ATTRIBUTES, "attribute_id")
                .to(ATTRIBUTES, "id"),
        )
        .to_owned()
}

/// Every statement `install_schema` runs, in order.
pub fn schema_statements() -> Vec<String> {
    vec![
        categories_table().build(PostgresQueryBuilder),
        CATEGORY_SOFT_DELETE.to_string(),
        attributes_table().build(PostgresQueryBuilder),
        category_attributes_table().build(PostgresQueryBuilder),
        Index::create()
            .if_not_exists()
            .name("idx_categories_parent_id")
            .table(CATEGORIES)
            .col("parent_id")
            .to_owned()
            .build(PostgresQueryBuilder),
        Index::create()
            .if_not_exists()
            .name("idx_category_attributes_attribute_id")
            .table(CATEGORY_ATTRIBUTES)
            .col("attribute_id")
            .to_owned()
            .build(PostgresQueryBuilder),
        LIVE_BINDING_INDEX.to_string(),
    ]
}

/// Create the tables and indexes if they do not exist yet.
pub fn install_schema(executor: &dyn Executor) -> Result<(), StoreError> {
    for statement in schema_statements() {
        log::debug!("installing schema: {statement}");
        executor.execute(&statement, &[])?;
    }
    Ok(())
}
