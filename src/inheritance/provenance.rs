//! Provenance of materialized binding rows.
//!
//! No "inherited" flag is stored. A copy carries the `created_at` of the row it
//! was copied from, while a direct row is stamped with a fresh, strictly
//! increasing timestamp no other row can share. A row at category D is linked
//! to every ancestor row carrying the same stamp; those ancestors, nearest
//! first, form D's inheritance chain and the last of them is the source. An
//! empty chain means the row was bound directly at D.
//!
//! Ancestors holding a row from another lineage do not break the chain. They
//! are recorded so a copy shadowed by a closer binding (a failed cascade step)
//! can be told apart from a current one.

use crate::error::InheritanceError;
use crate::model::{AttributeId, Binding, CategoryId};
use crate::tree::CategoryTree;
use std::collections::HashMap;

/// `row` is a copy of `ancestor`, or both are copies of the same source.
pub fn is_linked(ancestor: &Binding, row: &Binding) -> bool {
    ancestor.attribute_id == row.attribute_id && ancestor.created_at == row.created_at
}

/// Ancestors of a row that hold a row themselves, nearest first, each marked
/// linked or not. Ends at the last linked ancestor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chain(Vec<(CategoryId, bool)>);

impl Chain {
    /// Derive the chain of `row` from the rows of its ancestors, nearest
    /// ancestor first. `None` marks an ancestor without a row.
    pub fn derive<'a, I>(row: &Binding, ancestors: I) -> Self
    where
        I: IntoIterator<Item = Option<&'a Binding>>,
    {
        let mut steps: Vec<(CategoryId, bool)> = ancestors
            .into_iter()
            .flatten()
            .map(|candidate| (candidate.category_id, is_linked(candidate, row)))
            .collect();
        let end = steps.iter().rposition(|&(_, linked)| linked).map_or(0, |i| i + 1);
        steps.truncate(end);
        Chain(steps)
    }

    /// Derive the chain of the row held by `path[position]`, where `path` is a
    /// root-first ancestor path and `rows` the attribute's rows along it.
    pub fn on_path(
        path: &[CategoryId],
        rows: &HashMap<CategoryId, &Binding>,
        position: usize,
    ) -> Option<Self> {
        let row = rows.get(path.get(position)?)?;
        Some(Self::derive(
            row,
            path[..position].iter().rev().map(|c| rows.get(c).copied()),
        ))
    }

    pub fn is_direct(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, category_id: CategoryId) -> bool {
        self.0.iter().any(|&(c, linked)| linked && c == category_id)
    }

    /// Linked ancestors, nearest first.
    pub fn categories(&self) -> Vec<CategoryId> {
        self.0.iter().filter(|(_, linked)| *linked).map(|&(c, _)| c).collect()
    }

    /// A closer ancestor holds a row from another lineage.
    pub fn is_shadowed(&self) -> bool {
        self.0.iter().any(|&(_, linked)| !linked)
    }

    /// `category_id` is linked and no row from another lineage sits between
    /// it and the row.
    pub fn reaches(&self, category_id: CategoryId) -> bool {
        for &(c, linked) in &self.0 {
            if !linked {
                return false;
            }
            if c == category_id {
                return true;
            }
        }
        false
    }

    /// Topmost linked ancestor, `None` for a direct row.
    pub fn source(&self) -> Option<CategoryId> {
        self.0.last().map(|&(c, _)| c)
    }
}

/// Chain of a live row, read from the store.
pub fn chain_of(tree: &CategoryTree<'_>, row: &Binding) -> Result<Chain, InheritanceError> {
    let path = tree.ancestor_ids(row.category_id)?;
    let above = &path[..path.len().saturating_sub(1)];
    if above.is_empty() {
        return Ok(Chain::default());
    }
    let rows = tree
        .session()
        .live_bindings_for_attribute(above, row.attribute_id)?;
    let by_category: HashMap<CategoryId, &Binding> =
        rows.iter().map(|b| (b.category_id, b)).collect();
    Ok(Chain::derive(
        row,
        above.iter().rev().map(|c| by_category.get(c).copied()),
    ))
}

/// Nearest row above `category_id` that was bound directly, if any.
pub fn direct_source(
    tree: &CategoryTree<'_>,
    category_id: CategoryId,
    attribute_id: AttributeId,
) -> Result<Option<Binding>, InheritanceError> {
    let path = tree.ancestor_ids(category_id)?;
    let above = &path[..path.len().saturating_sub(1)];
    if above.is_empty() {
        return Ok(None);
    }
    let rows = tree.session().live_bindings_for_attribute(above, attribute_id)?;
    let by_category: HashMap<CategoryId, &Binding> =
        rows.iter().map(|b| (b.category_id, b)).collect();
    for position in (0..above.len()).rev() {
        if let Some(chain) = Chain::on_path(above, &by_category, position) {
            if chain.is_direct() {
                return Ok(by_category.get(&above[position]).map(|b| (*b).clone()));
            }
        }
    }
    Ok(None)
}
