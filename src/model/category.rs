use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type CategoryId = i64;

/// A node of the category tree. Read-only to the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: CategoryId,
    pub parent_id: Option<CategoryId>,
    /// Depth in the tree, root = 1.
    pub level: i32,
    pub name: String,
    pub is_active: bool,
    /// Set when the category was removed; tree walks never see it again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

impl Category {
    pub fn new(id: CategoryId, parent_id: Option<CategoryId>, level: i32, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            level,
            name: name.into(),
            is_active: true,
            deleted_at: None,
        }
    }

    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }
}
