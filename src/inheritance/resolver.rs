//! Effective attribute resolution.
//!
//! Resolution always walks the live ancestor path, so the effective set is
//! correct even while the materialized copies below a change are out of date.

use super::provenance::Chain;
use crate::error::InheritanceError;
use crate::model::{AttributeId, Binding, CategoryId, ResolvedBinding};
use crate::tree::CategoryTree;
use std::collections::HashMap;

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

fn resolved(row: &Binding, chain: &Chain, target: CategoryId) -> ResolvedBinding {
    let source = chain.source().unwrap_or(row.category_id);
    let is_inherited = source != target;
    ResolvedBinding {
        binding_id: row.id,
        category_id: row.category_id,
        attribute_id: row.attribute_id,
        is_required: row.is_required,
        sort: row.sort,
        is_inherited,
        inherited_from: is_inherited.then_some(source),
    }
}

/// Effective attribute set of `category_id`.
///
/// Walks root to leaf; a row at a closer category replaces the entry for its
/// attribute in place, new attributes append in their category's order.
pub fn resolve_effective_attributes(
    tree: &CategoryTree<'_>,
    category_id: CategoryId,
) -> Result<Vec<ResolvedBinding>, InheritanceError> {
    #[cfg(feature = "tracing")]
    let _span = tracing_helpers::resolve_span(category_id).entered();

    let path = tree.ancestor_ids(category_id)?;
    let rows = tree.session().live_bindings(&path)?;

    let mut per_category: HashMap<CategoryId, Vec<&Binding>> = HashMap::new();
    let mut per_attribute: HashMap<AttributeId, HashMap<CategoryId, &Binding>> = HashMap::new();
    for row in &rows {
        per_category.entry(row.category_id).or_default().push(row);
        per_attribute
            .entry(row.attribute_id)
            .or_default()
            .insert(row.category_id, row);
    }

    let mut winners: Vec<(usize, &Binding)> = Vec::new();
    let mut slot: HashMap<AttributeId, usize> = HashMap::new();
    for (position, category) in path.iter().enumerate() {
        for &row in per_category.get(category).into_iter().flatten() {
            match slot.get(&row.attribute_id) {
                Some(&i) => winners[i] = (position, row),
                None => {
                    slot.insert(row.attribute_id, winners.len());
                    winners.push((position, row));
                }
            }
        }
    }

    Ok(winners
        .into_iter()
        .map(|(position, row)| {
            let chain = per_attribute
                .get(&row.attribute_id)
                .and_then(|rows| Chain::on_path(&path, rows, position))
                .unwrap_or_default();
            resolved(row, &chain, category_id)
        })
        .collect())
}

/// Every live row for `attribute_id` on the path to `category_id`, root first.
pub fn resolve_inheritance_path(
    tree: &CategoryTree<'_>,
    category_id: CategoryId,
    attribute_id: AttributeId,
) -> Result<Vec<ResolvedBinding>, InheritanceError> {
    let path = tree.ancestor_ids(category_id)?;
    let rows = tree
        .session()
        .live_bindings_for_attribute(&path, attribute_id)?;
    let by_category: HashMap<CategoryId, &Binding> =
        rows.iter().map(|b| (b.category_id, b)).collect();

    Ok(path
        .iter()
        .enumerate()
        .filter_map(|(position, category)| {
            let row = by_category.get(category)?;
            let chain = Chain::on_path(&path, &by_category, position)?;
            Some(resolved(row, &chain, category_id))
        })
        .collect())
}

/// Describe a single live row as seen from its own category.
pub fn describe(tree: &CategoryTree<'_>, row: &Binding) -> Result<ResolvedBinding, InheritanceError> {
    let chain = super::provenance::chain_of(tree, row)?;
    Ok(resolved(row, &chain, row.category_id))
}
