//! Category/attribute binding rows and the shapes derived from them.

use super::{AttributeId, CategoryId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type BindingId = i64;

/// A materialized `(category, attribute)` row.
///
/// Direct and inherited rows share one shape. A copy keeps the `created_at` of
/// the row it was copied from; which one a row is gets derived from the rows
/// above it (see [`crate::inheritance::provenance`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryAttributeBinding {
    pub id: BindingId,
    pub category_id: CategoryId,
    pub attribute_id: AttributeId,
    pub is_required: bool,
    pub sort: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

pub type Binding = CategoryAttributeBinding;

impl CategoryAttributeBinding {
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Same per-category settings (`is_required`, `sort`).
    pub fn same_settings(&self, other: &Binding) -> bool {
        self.is_required == other.is_required && self.sort == other.sort
    }

    /// Insert payload that copies this row to `category_id`, lineage stamp
    /// included.
    pub fn copy_to(&self, category_id: CategoryId) -> NewBinding {
        NewBinding {
            category_id,
            attribute_id: self.attribute_id,
            is_required: self.is_required,
            sort: self.sort,
            created_at: Some(self.created_at),
        }
    }

    /// Patch that brings this row's settings in line with `source`.
    pub fn patch_towards(&self, source: &Binding) -> BindingPatch {
        BindingPatch {
            is_required: (self.is_required != source.is_required).then_some(source.is_required),
            sort: (self.sort != source.sort).then_some(source.sort),
        }
    }
}

/// Insert payload for a binding row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBinding {
    pub category_id: CategoryId,
    pub attribute_id: AttributeId,
    pub is_required: bool,
    pub sort: i32,
    /// Stamp of the copied row. `None` stamps a fresh direct row.
    pub created_at: Option<DateTime<Utc>>,
}

impl NewBinding {
    pub fn direct(
        category_id: CategoryId,
        attribute_id: AttributeId,
        is_required: bool,
        sort: i32,
    ) -> Self {
        Self {
            category_id,
            attribute_id,
            is_required,
            sort,
            created_at: None,
        }
    }
}

/// One entry of a batch bind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingRequest {
    pub attribute_id: AttributeId,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub sort: i32,
}

impl BindingRequest {
    pub fn new(attribute_id: AttributeId, is_required: bool, sort: i32) -> Self {
        Self {
            attribute_id,
            is_required,
            sort,
        }
    }
}

/// Partial update of a binding. `None` leaves the field untouched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingPatch {
    pub is_required: Option<bool>,
    pub sort: Option<i32>,
}

impl BindingPatch {
    pub fn is_empty(&self) -> bool {
        self.is_required.is_none() && self.sort.is_none()
    }

    pub fn apply(&self, binding: &mut Binding) {
        if let Some(is_required) = self.is_required {
            binding.is_required = is_required;
        }
        if let Some(sort) = self.sort {
            binding.sort = sort;
        }
    }
}

/// An entry of a category's effective attribute set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedBinding {
    pub binding_id: BindingId,
    /// Category holding the winning row.
    pub category_id: CategoryId,
    pub attribute_id: AttributeId,
    pub is_required: bool,
    pub sort: i32,
    pub is_inherited: bool,
    /// Topmost category the winning row was copied from, when inherited.
    pub inherited_from: Option<CategoryId>,
}

/// Own versus inherited counts of a category's effective set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindingSummary {
    pub category_id: CategoryId,
    pub total: usize,
    pub own: usize,
    pub inherited: usize,
}
