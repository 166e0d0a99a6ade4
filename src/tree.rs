//! Category tree accessor.
//!
//! Read-only traversal over the parent-pointer tree, scoped to one session.
//! Ancestor paths are memoized for the lifetime of the accessor, which is one
//! unit of work; nothing is cached across calls.

use crate::error::InheritanceError;
use crate::model::{Category, CategoryId};
use crate::store::Session;
use std::cell::RefCell;
use std::collections::HashMap;

pub struct CategoryTree<'s> {
    session: &'s dyn Session,
    max_depth: usize,
    paths: RefCell<HashMap<CategoryId, Vec<Category>>>,
}

impl<'s> CategoryTree<'s> {
    pub fn new(session: &'s dyn Session, max_depth: usize) -> Self {
        Self {
            session,
            max_depth,
            paths: RefCell::new(HashMap::new()),
        }
    }

    pub fn session(&self) -> &'s dyn Session {
        self.session
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn get_category(&self, id: CategoryId) -> Result<Category, InheritanceError> {
        self.session
            .category(id)?
            .ok_or_else(|| InheritanceError::category_not_found(id))
    }

    /// Direct children, ordered by id.
    pub fn get_children(&self, id: CategoryId) -> Result<Vec<Category>, InheritanceError> {
        self.get_category(id)?;
        Ok(self.session.children(id)?)
    }

    /// Ids of the whole subtree below `id`, parents before children.
    pub fn get_all_descendants(&self, id: CategoryId) -> Result<Vec<CategoryId>, InheritanceError> {
        Ok(self
            .descendant_categories(id)?
            .into_iter()
            .map(|c| c.id)
            .collect())
    }

    /// Subtree below `id` with parent pointers, ordered by depth then id.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown category, `Validation` when the subtree is
    /// deeper than the configured limit.
    pub fn descendant_categories(&self, id: CategoryId) -> Result<Vec<Category>, InheritanceError> {
        self.get_category(id)?;
        // one extra level so an over-deep subtree is detected, not truncated
        let below = self.session.descendants(id, self.max_depth + 1)?;

        let mut depth: HashMap<CategoryId, usize> = HashMap::from([(id, 0)]);
        for category in &below {
            let d = category
                .parent_id
                .and_then(|p| depth.get(&p).copied())
                .map_or(1, |parent_depth| parent_depth + 1);
            if d > self.max_depth {
                return Err(self.depth_exceeded(id));
            }
            depth.insert(category.id, d);
        }
        Ok(below)
    }

    /// Root to `id` inclusive.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown or removed category, or one below a removed
    /// ancestor. `Validation` when the walk exceeds the configured depth (a
    /// cycle or a runaway tree).
    pub fn get_ancestor_path(&self, id: CategoryId) -> Result<Vec<Category>, InheritanceError> {
        if let Some(path) = self.paths.borrow().get(&id) {
            return Ok(path.clone());
        }

        let path = self.session.ancestor_path(id, self.max_depth)?;
        if path.is_empty() {
            return Err(InheritanceError::category_not_found(id));
        }
        if path.len() > self.max_depth {
            return Err(self.depth_exceeded(id));
        }
        // the walk stopped below a removed ancestor
        if path.first().is_some_and(|top| top.parent_id.is_some()) {
            return Err(InheritanceError::category_not_found(id));
        }

        // every prefix is the path of an ancestor
        let mut paths = self.paths.borrow_mut();
        for end in 1..=path.len() {
            paths
                .entry(path[end - 1].id)
                .or_insert_with(|| path[..end].to_vec());
        }
        Ok(path)
    }

    /// Ancestor path as ids, root first.
    pub fn ancestor_ids(&self, id: CategoryId) -> Result<Vec<CategoryId>, InheritanceError> {
        Ok(self.get_ancestor_path(id)?.iter().map(|c| c.id).collect())
    }

    fn depth_exceeded(&self, id: CategoryId) -> InheritanceError {
        InheritanceError::Validation(format!(
            "category {id}: cycle or depth limit of {} levels exceeded",
            self.max_depth
        ))
    }
}
