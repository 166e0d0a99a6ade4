//! The inheritance engine.
//!
//! * [`bindings`]: direct bind / unbind / update of `(category, attribute)` rows.
//! * [`provenance`]: deriving whether a row is a copy and where it came from.
//! * [`resolver`]: effective attribute set of a category, closest wins.
//! * [`cascade`]: propagating a direct change to the rows copied from it.
//! * [`validator`]: detecting and repairing missing or outdated inherited rows.
//!
//! Every function here runs inside a transaction opened by the caller and
//! reads the tree through a [`crate::tree::CategoryTree`].

pub mod bindings;
pub mod cascade;
pub mod provenance;
pub mod resolver;
pub mod validator;

pub use bindings::{BindingStore, Bound, Updated};
pub use cascade::Cascade;
pub use provenance::Chain;
pub use validator::ConsistencyReport;

use crate::error::CascadeWarning;
use crate::model::{AttributeId, CategoryId};
use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CascadeOperation {
    Bind,
    Unbind,
    Update,
}

impl CascadeOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            CascadeOperation::Bind => "bind",
            CascadeOperation::Unbind => "unbind",
            CascadeOperation::Update => "update",
        }
    }
}

impl fmt::Display for CascadeOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of propagating one direct change to the subtree below it.
///
/// The direct change has already committed when a report exists; `warnings`
/// lists the descendants left behind, which the rebuilder can repair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CascadeReport {
    pub operation: CascadeOperation,
    pub origin_category: CategoryId,
    pub attribute_id: AttributeId,
    /// Descendants a write was planned for.
    pub attempted: usize,
    /// Planned writes that committed.
    pub applied: usize,
    /// Descendants left alone by the provenance guard.
    pub skipped: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<CascadeWarning>,
}

impl CascadeReport {
    pub fn new(operation: CascadeOperation, origin_category: CategoryId, attribute_id: AttributeId) -> Self {
        Self {
            operation,
            origin_category,
            attribute_id,
            attempted: 0,
            applied: 0,
            skipped: 0,
            warnings: Vec::new(),
        }
    }

    /// A cascade whose own transaction failed: nothing below the origin changed.
    pub fn failed(
        operation: CascadeOperation,
        origin_category: CategoryId,
        attribute_id: AttributeId,
        message: String,
    ) -> Self {
        let mut report = Self::new(operation, origin_category, attribute_id);
        report.warnings.push(CascadeWarning {
            category_id: origin_category,
            attribute_id,
            operation: operation.as_str(),
            message,
        });
        report
    }

    /// Every planned write committed.
    pub fn is_complete(&self) -> bool {
        self.warnings.is_empty() && self.applied == self.attempted
    }
}
