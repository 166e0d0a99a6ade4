//! Consistency checks and repair of materialized inherited rows.
//!
//! The effective set is always resolved live, so the materialized copies can
//! drift from it without reads going wrong. Two kinds of drift are reported:
//!
//! * a category inherits an attribute but holds no copy of it (a failed
//!   cascade step, an unbind that left a gap, a category created after the
//!   bind);
//! * a category holds a copy that no longer matches the nearest direct row
//!   above it (a failed cascade update, or a copy shadowed by a closer bind).
//!
//! The rebuilder inserts missing copies and re-syncs stale ones. It never
//! removes a row without putting a copy in its place.

use super::provenance::{chain_of, direct_source};
use super::resolver::resolve_effective_attributes;
use crate::error::InheritanceError;
use crate::model::{Binding, CategoryId};
use crate::tree::CategoryTree;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsistencyReport {
    pub category_id: CategoryId,
    pub is_consistent: bool,
    pub issues: Vec<String>,
}

enum Drift {
    /// Inherited from `owner` with no row at the category.
    Missing { owner: CategoryId, source: Binding },
    /// The copy carries outdated settings of its own lineage.
    Stale { copy: Binding, source: Binding },
    /// The copy belongs to a lineage a closer direct row has replaced.
    Shadowed { copy: Binding, source: Binding },
}

impl Drift {
    fn describe(&self, category_id: CategoryId) -> String {
        match self {
            Drift::Missing { owner, source } => format!(
                "attribute {} is inherited from category {} but has no row at category {}",
                source.attribute_id, owner, category_id
            ),
            Drift::Stale { copy, source } => format!(
                "attribute {} at category {} is out of date with category {}",
                copy.attribute_id, category_id, source.category_id
            ),
            Drift::Shadowed { copy, source } => format!(
                "attribute {} at category {} is copied from a binding category {} overrides",
                copy.attribute_id, category_id, source.category_id
            ),
        }
    }
}

fn find_drift(tree: &CategoryTree<'_>, category_id: CategoryId) -> Result<Vec<Drift>, InheritanceError> {
    let session = tree.session();
    let mut drift = Vec::new();

    for entry in resolve_effective_attributes(tree, category_id)? {
        if entry.category_id != category_id {
            let source = match direct_source(tree, category_id, entry.attribute_id)? {
                Some(source) => source,
                None => match session.live_binding(entry.category_id, entry.attribute_id)? {
                    Some(owner_row) => owner_row,
                    None => continue,
                },
            };
            drift.push(Drift::Missing {
                owner: entry.category_id,
                source,
            });
            continue;
        }

        let Some(own) = session.live_binding(category_id, entry.attribute_id)? else {
            continue;
        };
        if chain_of(tree, &own)?.is_direct() {
            continue;
        }
        let Some(source) = direct_source(tree, category_id, own.attribute_id)? else {
            continue;
        };
        if source.created_at != own.created_at {
            drift.push(Drift::Shadowed { copy: own, source });
        } else if !own.same_settings(&source) {
            drift.push(Drift::Stale { copy: own, source });
        }
    }
    Ok(drift)
}

pub fn validate_inheritance_consistency(
    tree: &CategoryTree<'_>,
    category_id: CategoryId,
) -> Result<ConsistencyReport, InheritanceError> {
    let issues: Vec<String> = find_drift(tree, category_id)?
        .iter()
        .map(|d| d.describe(category_id))
        .collect();

    Ok(ConsistencyReport {
        category_id,
        is_consistent: issues.is_empty(),
        issues,
    })
}

/// Repair every drift at `category_id`. Returns the number of rows written;
/// a second call writes nothing.
pub fn rebuild_inheritance_for_category(
    tree: &CategoryTree<'_>,
    category_id: CategoryId,
) -> Result<usize, InheritanceError> {
    let session = tree.session();
    let drift = find_drift(tree, category_id)?;
    for d in &drift {
        match d {
            Drift::Missing { source, .. } => {
                session.insert_binding(&source.copy_to(category_id))?;
            }
            Drift::Stale { copy, source } => {
                session.update_binding(copy.id, &copy.patch_towards(source))?;
            }
            Drift::Shadowed { copy, source } => {
                session.soft_delete_binding(copy.id)?;
                session.insert_binding(&source.copy_to(category_id))?;
            }
        }
    }
    Ok(drift.len())
}

/// Rebuild `category_id` and its whole subtree, parents first so children
/// copy from freshly repaired rows.
pub fn rebuild_subtree(tree: &CategoryTree<'_>, category_id: CategoryId) -> Result<usize, InheritanceError> {
    let mut repaired = rebuild_inheritance_for_category(tree, category_id)?;
    for descendant in tree.get_all_descendants(category_id)? {
        repaired += rebuild_inheritance_for_category(tree, descendant)?;
    }
    Ok(repaired)
}
