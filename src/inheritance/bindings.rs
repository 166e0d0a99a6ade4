//! Direct mutations of `(category, attribute)` binding rows.
//!
//! A live row at the target may be a copy materialized by an earlier cascade.
//! Binding over such a copy, or updating it, promotes it: the copy is
//! soft-deleted and a fresh direct row takes its place. Binding over a direct
//! row is a conflict.

use super::provenance::chain_of;
use crate::error::InheritanceError;
use crate::model::{AttributeId, Binding, BindingPatch, BindingRequest, CategoryId, NewBinding};
use crate::tree::CategoryTree;
use std::collections::HashSet;

/// A freshly written direct row and the inherited copy it replaced, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Bound {
    pub binding: Binding,
    pub replaced: Option<Binding>,
}

/// Result of an update. `promoted` marks an inherited copy that was replaced
/// by a direct row carrying the patched settings.
#[derive(Debug, Clone, PartialEq)]
pub struct Updated {
    pub before: Binding,
    pub after: Binding,
    pub promoted: bool,
}

pub struct BindingStore<'a, 's> {
    tree: &'a CategoryTree<'s>,
}

fn check_sort(sort: i32) -> Result<(), InheritanceError> {
    if sort < 0 {
        return Err(InheritanceError::Validation(format!(
            "sort must be non-negative, got {sort}"
        )));
    }
    Ok(())
}

impl<'a, 's> BindingStore<'a, 's> {
    pub fn new(tree: &'a CategoryTree<'s>) -> Self {
        Self { tree }
    }

    /// Bind `attribute_id` directly to `category_id`.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown category or attribute, `Validation` for a
    /// negative sort, `DuplicateBinding` when a direct row already exists.
    pub fn bind(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
        is_required: bool,
        sort: i32,
    ) -> Result<Bound, InheritanceError> {
        check_sort(sort)?;
        self.tree.get_category(category_id)?;
        if !self.tree.session().attribute_exists(attribute_id)? {
            return Err(InheritanceError::attribute_not_found(attribute_id));
        }
        self.bind_checked(category_id, attribute_id, is_required, sort)
    }

    fn bind_checked(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
        is_required: bool,
        sort: i32,
    ) -> Result<Bound, InheritanceError> {
        let session = self.tree.session();
        let replaced = match session.live_binding(category_id, attribute_id)? {
            Some(existing) => {
                if chain_of(self.tree, &existing)?.is_direct() {
                    return Err(InheritanceError::DuplicateBinding {
                        category_id,
                        attribute_id,
                    });
                }
                log::debug!(
                    "promoting inherited binding {} of attribute {attribute_id} at category {category_id}",
                    existing.id
                );
                session.soft_delete_binding(existing.id)?;
                Some(existing)
            }
            None => None,
        };

        let binding =
            session.insert_binding(&NewBinding::direct(category_id, attribute_id, is_required, sort))?;
        Ok(Bound { binding, replaced })
    }

    /// Soft-delete the live row and return it as it was before deletion.
    pub fn unbind(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<Binding, InheritanceError> {
        let existing = self.get(category_id, attribute_id)?;
        self.tree.session().soft_delete_binding(existing.id)?;
        Ok(existing)
    }

    /// Apply `patch` to the live row.
    ///
    /// An empty patch writes nothing. A patch on an inherited copy promotes it
    /// to a direct row so later cascades and rebuilds leave the change alone.
    pub fn update(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
        patch: &BindingPatch,
    ) -> Result<Updated, InheritanceError> {
        if let Some(sort) = patch.sort {
            check_sort(sort)?;
        }
        let before = self.get(category_id, attribute_id)?;
        if patch.is_empty() {
            return Ok(Updated {
                after: before.clone(),
                before,
                promoted: false,
            });
        }
        if chain_of(self.tree, &before)?.is_direct() {
            let after = self.tree.session().update_binding(before.id, patch)?;
            return Ok(Updated {
                before,
                after,
                promoted: false,
            });
        }

        let mut settings = before.clone();
        patch.apply(&mut settings);
        let bound = self.bind_checked(category_id, attribute_id, settings.is_required, settings.sort)?;
        Ok(Updated {
            before,
            after: bound.binding,
            promoted: true,
        })
    }

    pub fn exists(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<bool, InheritanceError> {
        Ok(self
            .tree
            .session()
            .live_binding(category_id, attribute_id)?
            .is_some())
    }

    /// The live row for the pair.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown category or when no live row exists.
    pub fn get(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<Binding, InheritanceError> {
        self.tree.get_category(category_id)?;
        self.tree
            .session()
            .live_binding(category_id, attribute_id)?
            .ok_or_else(|| InheritanceError::binding_not_found(category_id, attribute_id))
    }

    /// Live rows held by the category, ordered by sort, creation and id.
    pub fn list(&self, category_id: CategoryId) -> Result<Vec<Binding>, InheritanceError> {
        self.tree.get_category(category_id)?;
        Ok(self.tree.session().live_bindings(&[category_id])?)
    }

    /// Bind every request to `category_id`.
    ///
    /// The whole batch is validated before anything is written; the caller's
    /// transaction makes it all-or-nothing.
    ///
    /// # Errors
    ///
    /// `Validation` for an empty batch, a repeated attribute, a negative sort
    /// or an unknown attribute; `NotFound` for an unknown category;
    /// `DuplicateBinding` when any attribute is already bound directly.
    pub fn batch_bind(
        &self,
        category_id: CategoryId,
        requests: &[BindingRequest],
    ) -> Result<Vec<Bound>, InheritanceError> {
        if requests.is_empty() {
            return Err(InheritanceError::Validation(
                "batch bind needs at least one attribute".to_string(),
            ));
        }
        let mut seen = HashSet::with_capacity(requests.len());
        for request in requests {
            if !seen.insert(request.attribute_id) {
                return Err(InheritanceError::Validation(format!(
                    "attribute {} appears more than once in the batch",
                    request.attribute_id
                )));
            }
            check_sort(request.sort)?;
        }

        self.tree.get_category(category_id)?;
        let session = self.tree.session();
        for request in requests {
            if !session.attribute_exists(request.attribute_id)? {
                return Err(InheritanceError::Validation(format!(
                    "attribute {} in batch does not exist",
                    request.attribute_id
                )));
            }
        }

        requests
            .iter()
            .map(|r| self.bind_checked(category_id, r.attribute_id, r.is_required, r.sort))
            .collect()
    }
}
