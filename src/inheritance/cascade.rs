//! Cascade engine.
//!
//! After a direct change at category C commits, the change is pushed to the
//! descendants whose rows were copied from C's lineage. Every descendant is
//! classified against the state before the change (C's row replaced by its
//! pre-change snapshot) and only then written, parents before children.
//!
//! Each write runs inside its own savepoint. A failing write is rolled back
//! alone and turned into a [`CascadeWarning`]; the walk goes on.

use super::provenance::Chain;
use super::{CascadeOperation, CascadeReport};
use crate::error::{CascadeWarning, InheritanceError};
use crate::model::{AttributeId, Binding, BindingPatch, CategoryId};
use crate::tree::CategoryTree;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "tracing")]
use crate::metrics::tracing_helpers;

/// Rows of one attribute around an origin category, as they were before the
/// direct change.
struct Lineage {
    origin: CategoryId,
    /// Ancestors of the origin, origin excluded.
    above: HashSet<CategoryId>,
    /// Descendants of the origin, parents before children.
    below: Vec<CategoryId>,
    parents: HashMap<CategoryId, Option<CategoryId>>,
    rows: HashMap<CategoryId, Binding>,
}

impl Lineage {
    /// Load the lineage of `attribute_id` around `origin`, with the origin's
    /// row replaced by `origin_row` (or removed when `None`).
    fn load(
        tree: &CategoryTree<'_>,
        origin: CategoryId,
        attribute_id: AttributeId,
        origin_row: Option<&Binding>,
    ) -> Result<Self, InheritanceError> {
        let path = tree.get_ancestor_path(origin)?;
        let subtree = tree.descendant_categories(origin)?;

        let mut parents = HashMap::with_capacity(path.len() + subtree.len());
        for category in path.iter().chain(subtree.iter()) {
            parents.insert(category.id, category.parent_id);
        }
        let ids: Vec<CategoryId> = parents.keys().copied().collect();

        let mut rows: HashMap<CategoryId, Binding> = tree
            .session()
            .live_bindings_for_attribute(&ids, attribute_id)?
            .into_iter()
            .map(|b| (b.category_id, b))
            .collect();
        match origin_row {
            Some(row) => rows.insert(origin, row.clone()),
            None => rows.remove(&origin),
        };

        Ok(Self {
            origin,
            above: path.iter().map(|c| c.id).filter(|&id| id != origin).collect(),
            below: subtree.iter().map(|c| c.id).collect(),
            parents,
            rows,
        })
    }

    /// Chain of the row held by `category_id`, if it holds one.
    fn chain(&self, category_id: CategoryId) -> Option<(&Binding, Chain)> {
        let row = self.rows.get(&category_id)?;
        let parents = &self.parents;
        let ancestors = std::iter::successors(parents.get(&category_id).copied().flatten(), |c| {
            parents.get(c).copied().flatten()
        })
        .take(parents.len());
        Some((row, Chain::derive(row, ancestors.map(|c| self.rows.get(&c)))))
    }

    /// The chain reaches the origin or goes past it.
    fn runs_through_origin(&self, chain: &Chain) -> bool {
        chain
            .categories()
            .iter()
            .any(|c| *c == self.origin || self.above.contains(c))
    }

    /// Plan a new row at the origin. A descendant is in reach when every
    /// category between it and the origin ends up holding a copy of the new
    /// row; in reach, a missing row is inserted and a copy taken from the
    /// origin or above is replaced.
    fn plan_push_down(&self) -> Vec<(CategoryId, Option<Step>)> {
        let mut receives: HashSet<CategoryId> = HashSet::new();
        let mut plan = Vec::with_capacity(self.below.len());
        for &d in &self.below {
            let parent = self.parents.get(&d).copied().flatten();
            let in_reach = parent.is_some_and(|p| p == self.origin || receives.contains(&p));
            let step = match self.chain(d) {
                _ if !in_reach => None,
                None => Some(Step::Insert),
                Some((row, chain)) if !chain.is_direct() && self.runs_through_origin(&chain) => {
                    Some(Step::Reparent(row.clone()))
                }
                Some(_) => None,
            };
            if step.is_some() {
                receives.insert(d);
            }
            plan.push((d, step));
        }
        plan
    }
}

enum Step {
    Insert,
    Reparent(Binding),
    Delete(Binding),
    Patch(Binding),
}

impl Step {
    fn describe(&self) -> &'static str {
        match self {
            Step::Insert => "insert copy",
            Step::Reparent(_) => "replace copy",
            Step::Delete(_) => "delete copy",
            Step::Patch(_) => "update copy",
        }
    }
}

pub struct Cascade<'a, 's> {
    tree: &'a CategoryTree<'s>,
    warn_on_failure: bool,
}

impl<'a, 's> Cascade<'a, 's> {
    pub fn new(tree: &'a CategoryTree<'s>, warn_on_failure: bool) -> Self {
        Self {
            tree,
            warn_on_failure,
        }
    }

    /// Push a new direct row at its category down the subtree.
    ///
    /// Descendants without a row get a copy. Descendants whose copy came from
    /// the origin or from above it get a fresh copy of `origin_row`. Direct
    /// rows, and everything below them, are left alone.
    ///
    /// `replaced` is the inherited copy the direct row displaced, if any.
    pub fn bind(
        &self,
        origin_row: &Binding,
        replaced: Option<&Binding>,
    ) -> Result<CascadeReport, InheritanceError> {
        self.push_down(CascadeOperation::Bind, origin_row, replaced)
    }

    /// Push down the direct row an update of an inherited copy produced.
    pub fn promote(
        &self,
        origin_row: &Binding,
        replaced: &Binding,
    ) -> Result<CascadeReport, InheritanceError> {
        self.push_down(CascadeOperation::Update, origin_row, Some(replaced))
    }

    fn push_down(
        &self,
        operation: CascadeOperation,
        origin_row: &Binding,
        replaced: Option<&Binding>,
    ) -> Result<CascadeReport, InheritanceError> {
        let origin = origin_row.category_id;
        let plan = Lineage::load(self.tree, origin, origin_row.attribute_id, replaced)?.plan_push_down();

        self.apply(operation, origin, origin_row.attribute_id, plan, |d, step| {
            let session = self.tree.session();
            if let Step::Reparent(current) = step {
                session.soft_delete_binding(current.id)?;
            }
            session.insert_binding(&origin_row.copy_to(d))?;
            Ok(())
        })
    }

    /// Remove the copies taken from `origin_snapshot`, the row as it was
    /// before it was unbound.
    pub fn unbind(&self, origin_snapshot: &Binding) -> Result<CascadeReport, InheritanceError> {
        let origin = origin_snapshot.category_id;
        let plan = self.plan_copies_of(origin_snapshot, Step::Delete)?;
        self.apply(CascadeOperation::Unbind, origin, origin_snapshot.attribute_id, plan, |_, step| {
            if let Step::Delete(row) = step {
                self.tree.session().soft_delete_binding(row.id)?;
            }
            Ok(())
        })
    }

    /// Apply `patch` to the copies taken from `origin_snapshot`, the row as it
    /// was before the update.
    pub fn update(
        &self,
        origin_snapshot: &Binding,
        patch: &BindingPatch,
    ) -> Result<CascadeReport, InheritanceError> {
        let origin = origin_snapshot.category_id;
        let plan = self.plan_copies_of(origin_snapshot, Step::Patch)?;
        self.apply(CascadeOperation::Update, origin, origin_snapshot.attribute_id, plan, |_, step| {
            if let Step::Patch(row) = step {
                self.tree.session().update_binding(row.id, patch)?;
            }
            Ok(())
        })
    }

    fn plan_copies_of(
        &self,
        origin_snapshot: &Binding,
        step: fn(Binding) -> Step,
    ) -> Result<Vec<(CategoryId, Option<Step>)>, InheritanceError> {
        let lineage = Lineage::load(
            self.tree,
            origin_snapshot.category_id,
            origin_snapshot.attribute_id,
            Some(origin_snapshot),
        )?;
        Ok(lineage
            .below
            .iter()
            .map(|&d| match lineage.chain(d) {
                Some((row, chain)) if chain.contains(lineage.origin) => (d, Some(step(row.clone()))),
                _ => (d, None),
            })
            .collect())
    }

    fn apply<F>(
        &self,
        operation: CascadeOperation,
        origin: CategoryId,
        attribute_id: AttributeId,
        plan: Vec<(CategoryId, Option<Step>)>,
        write: F,
    ) -> Result<CascadeReport, InheritanceError>
    where
        F: Fn(CategoryId, &Step) -> Result<(), InheritanceError>,
    {
        #[cfg(feature = "tracing")]
        let _span = tracing_helpers::cascade_span(operation.as_str(), origin, attribute_id).entered();

        let session = self.tree.session();
        let mut report = CascadeReport::new(operation, origin, attribute_id);

        for (n, (category_id, step)) in plan.into_iter().enumerate() {
            let Some(step) = step else {
                report.skipped += 1;
                continue;
            };
            report.attempted += 1;

            let savepoint = format!("cascade_step_{n}");
            let outcome = session
                .savepoint(&savepoint)
                .map_err(InheritanceError::from)
                .and_then(|()| write(category_id, &step));

            match outcome {
                Ok(()) => {
                    session.release_savepoint(&savepoint)?;
                    report.applied += 1;
                }
                Err(err) => {
                    if let Err(rollback_err) = session
                        .rollback_to_savepoint(&savepoint)
                        .and_then(|()| session.release_savepoint(&savepoint))
                    {
                        log::warn!("could not roll back cascade step at category {category_id}: {rollback_err}");
                    }
                    if self.warn_on_failure {
                        log::warn!(
                            "cascade {operation} ({}) of attribute {attribute_id} at category {category_id} failed: {err}",
                            step.describe()
                        );
                    }
                    report.warnings.push(CascadeWarning {
                        category_id,
                        attribute_id,
                        operation: operation.as_str(),
                        message: err.to_string(),
                    });
                }
            }
        }

        log::debug!(
            "cascade {operation} from category {origin} attribute {attribute_id}: \
             {} applied, {} skipped, {} failed",
            report.applied,
            report.skipped,
            report.warnings.len()
        );
        Ok(report)
    }
}

/// `descendant` holds a live row for `attribute_id` copied through `ancestor`.
///
/// True only when `ancestor` lies on the descendant's path and no category
/// between them holds a row from another lineage.
pub fn is_attribute_inherited_from_parent(
    tree: &CategoryTree<'_>,
    descendant: CategoryId,
    attribute_id: AttributeId,
    ancestor: CategoryId,
) -> Result<bool, InheritanceError> {
    let path = tree.ancestor_ids(descendant)?;
    if descendant == ancestor || !path.contains(&ancestor) {
        return Ok(false);
    }
    let Some(row) = tree.session().live_binding(descendant, attribute_id)? else {
        return Ok(false);
    };
    Ok(super::provenance::chain_of(tree, &row)?.reaches(ancestor))
}
