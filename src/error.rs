//! Error types for the inheritance engine.
//!
//! [`InheritanceError`] is returned by every fallible engine and service call.
//! [`CascadeWarning`] is not an error: it records a descendant write that failed
//! during a cascade and travels inside the cascade report.

use crate::executor::StoreError;
use crate::model::{AttributeId, CategoryId};
use serde::Serialize;
use std::fmt;

/// Kind of entity a [`InheritanceError::NotFound`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Category,
    Attribute,
    Binding,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Category => write!(f, "category"),
            EntityKind::Attribute => write!(f, "attribute"),
            EntityKind::Binding => write!(f, "binding"),
        }
    }
}

/// Inheritance engine error type
#[derive(Debug)]
pub enum InheritanceError {
    /// Category, attribute or live binding does not exist
    NotFound { kind: EntityKind, id: String },
    /// A direct live binding already exists for the pair
    DuplicateBinding {
        category_id: CategoryId,
        attribute_id: AttributeId,
    },
    /// Malformed request or invalid attribute value
    Validation(String),
    /// Persistence failure
    Store(StoreError),
}

impl InheritanceError {
    pub fn category_not_found(id: CategoryId) -> Self {
        InheritanceError::NotFound {
            kind: EntityKind::Category,
            id: id.to_string(),
        }
    }

    pub fn attribute_not_found(id: AttributeId) -> Self {
        InheritanceError::NotFound {
            kind: EntityKind::Attribute,
            id: id.to_string(),
        }
    }

    pub fn binding_not_found(category_id: CategoryId, attribute_id: AttributeId) -> Self {
        InheritanceError::NotFound {
            kind: EntityKind::Binding,
            id: format!("{category_id}/{attribute_id}"),
        }
    }

    /// `true` for errors a caller should surface as "not found".
    pub fn is_not_found(&self) -> bool {
        matches!(self, InheritanceError::NotFound { .. })
    }

    /// `true` for errors a caller should surface as a conflict.
    pub fn is_conflict(&self) -> bool {
        matches!(self, InheritanceError::DuplicateBinding { .. })
    }
}

impl fmt::Display for InheritanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InheritanceError::NotFound { kind, id } => write!(f, "{kind} {id} not found"),
            InheritanceError::DuplicateBinding {
                category_id,
                attribute_id,
            } => write!(
                f,
                "attribute {attribute_id} is already bound to category {category_id}"
            ),
            InheritanceError::Validation(msg) => write!(f, "Validation error: {msg}"),
            InheritanceError::Store(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for InheritanceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InheritanceError::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for InheritanceError {
    fn from(err: StoreError) -> Self {
        InheritanceError::Store(err)
    }
}

/// A cascade step that failed and was rolled back on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeWarning {
    pub category_id: CategoryId,
    pub attribute_id: AttributeId,
    pub operation: &'static str,
    pub message: String,
}

impl fmt::Display for CascadeWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cascade {} of attribute {} at category {} failed: {}",
            self.operation, self.attribute_id, self.category_id, self.message
        )
    }
}
