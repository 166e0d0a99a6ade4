//! Public facade over the inheritance engine.
//!
//! Every direct mutation commits in its own transaction. The cascade that
//! follows runs in a second transaction; whatever happens there, the direct
//! change stands and the outcome carries a [`CascadeReport`].

use crate::config::InheritanceConfig;
use crate::error::InheritanceError;
use crate::inheritance::{
    cascade, resolver, validator, BindingStore, Cascade, CascadeOperation, CascadeReport,
    ConsistencyReport,
};
use crate::model::{
    AttributeId, AttributeValue, Binding, BindingPatch, BindingRequest, BindingSummary,
    CategoryId, ResolvedBinding,
};
use crate::store::Database;
use crate::tree::CategoryTree;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[cfg(feature = "metrics")]
use crate::metrics::METRICS;
#[cfg(feature = "metrics")]
use std::time::Instant;

/// Result of a bind or update.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindOutcome {
    pub binding: ResolvedBinding,
    pub cascade: CascadeReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnbindOutcome {
    /// The row as it was before it was soft-deleted.
    pub removed: Binding,
    pub cascade: CascadeReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchBindOutcome {
    pub bindings: Vec<ResolvedBinding>,
    /// One report per bound attribute, in request order.
    pub cascades: Vec<CascadeReport>,
}

/// Attribute inheritance over a category tree.
///
/// ```no_run
/// use lineage::{AttributeInheritanceService, InheritanceConfig, MemoryStore};
///
/// let service = AttributeInheritanceService::new(MemoryStore::new(), InheritanceConfig::default());
/// let effective = service.get_category_attributes_with_inheritance(42);
/// ```
pub struct AttributeInheritanceService<D: Database> {
    db: D,
    config: InheritanceConfig,
}

impl<D: Database> AttributeInheritanceService<D> {
    pub fn new(db: D, config: InheritanceConfig) -> Self {
        Self { db, config }
    }

    pub fn database(&self) -> &D {
        &self.db
    }

    pub fn config(&self) -> &InheritanceConfig {
        &self.config
    }

    /// Run `f` in one transaction with a fresh tree accessor.
    fn with_tree<R, F>(&self, f: F) -> Result<R, InheritanceError>
    where
        F: FnOnce(&CategoryTree<'_>) -> Result<R, InheritanceError>,
    {
        let max_depth = self.config.max_tree_depth;
        self.db.transaction(|session| f(&CategoryTree::new(session, max_depth)))
    }

    fn run_cascade<F>(
        &self,
        operation: CascadeOperation,
        category_id: CategoryId,
        attribute_id: AttributeId,
        f: F,
    ) -> CascadeReport
    where
        F: FnOnce(&Cascade<'_, '_>) -> Result<CascadeReport, InheritanceError>,
    {
        if !self.config.cascade_enabled {
            log::debug!("cascade disabled, {operation} at category {category_id} not propagated");
            return CascadeReport::new(operation, category_id, attribute_id);
        }

        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let warn_on_failure = self.config.warn_on_cascade_failure;
        let report = match self.with_tree(|tree| f(&Cascade::new(tree, warn_on_failure))) {
            Ok(report) => report,
            Err(err) => {
                log::warn!(
                    "cascade {operation} of attribute {attribute_id} from category {category_id} could not run: {err}"
                );
                CascadeReport::failed(operation, category_id, attribute_id, err.to_string())
            }
        };

        #[cfg(feature = "metrics")]
        METRICS.record_cascade(&report, started.elapsed());
        report
    }

    /// Bind an attribute directly to a category and cascade it down.
    ///
    /// # Errors
    ///
    /// `NotFound`, `Validation` or `DuplicateBinding` from the direct bind;
    /// nothing is written in that case.
    pub fn bind_attribute_to_category(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
        is_required: bool,
        sort: i32,
    ) -> Result<BindOutcome, InheritanceError> {
        log::debug!("binding attribute {attribute_id} to category {category_id}");
        let (bound, binding) = self.with_tree(|tree| {
            let bound = BindingStore::new(tree).bind(category_id, attribute_id, is_required, sort)?;
            let described = resolver::describe(tree, &bound.binding)?;
            Ok((bound, described))
        })?;

        #[cfg(feature = "metrics")]
        METRICS.record_binding_operation("bind");

        let cascade = self.run_cascade(CascadeOperation::Bind, category_id, attribute_id, |c| {
            c.bind(&bound.binding, bound.replaced.as_ref())
        });
        Ok(BindOutcome { binding, cascade })
    }

    pub fn unbind_attribute_from_category(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<UnbindOutcome, InheritanceError> {
        log::debug!("unbinding attribute {attribute_id} from category {category_id}");
        let removed = self.with_tree(|tree| BindingStore::new(tree).unbind(category_id, attribute_id))?;

        #[cfg(feature = "metrics")]
        METRICS.record_binding_operation("unbind");

        let cascade = self.run_cascade(CascadeOperation::Unbind, category_id, attribute_id, |c| {
            c.unbind(&removed)
        });
        Ok(UnbindOutcome { removed, cascade })
    }

    /// Change `is_required` and/or `sort` of a live binding.
    ///
    /// With neither field given nothing is written and no cascade runs. On an
    /// inherited copy the change turns the row into a direct binding, and the
    /// copies below it are re-pointed at the new row.
    pub fn update_category_attribute(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
        is_required: Option<bool>,
        sort: Option<i32>,
    ) -> Result<BindOutcome, InheritanceError> {
        log::debug!("updating attribute {attribute_id} at category {category_id}");
        let patch = BindingPatch { is_required, sort };
        let (updated, binding) = self.with_tree(|tree| {
            let updated = BindingStore::new(tree).update(category_id, attribute_id, &patch)?;
            let described = resolver::describe(tree, &updated.after)?;
            Ok((updated, described))
        })?;

        if patch.is_empty() {
            return Ok(BindOutcome {
                binding,
                cascade: CascadeReport::new(CascadeOperation::Update, category_id, attribute_id),
            });
        }

        #[cfg(feature = "metrics")]
        METRICS.record_binding_operation("update");

        if updated.promoted {
            log::debug!(
                "inherited binding of attribute {attribute_id} at category {category_id} promoted by update"
            );
        }
        let cascade = self.run_cascade(CascadeOperation::Update, category_id, attribute_id, |c| {
            if updated.promoted {
                c.promote(&updated.after, &updated.before)
            } else {
                c.update(&updated.before, &patch)
            }
        });
        Ok(BindOutcome { binding, cascade })
    }

    /// Bind several attributes at once. The direct rows are all-or-nothing;
    /// each one is then cascaded separately.
    pub fn batch_bind_attributes_to_category(
        &self,
        category_id: CategoryId,
        requests: &[BindingRequest],
    ) -> Result<BatchBindOutcome, InheritanceError> {
        log::debug!(
            "batch binding {} attributes to category {category_id}",
            requests.len()
        );
        let (bound, bindings) = self.with_tree(|tree| {
            let bound = BindingStore::new(tree).batch_bind(category_id, requests)?;
            let described = bound
                .iter()
                .map(|b| resolver::describe(tree, &b.binding))
                .collect::<Result<Vec<_>, _>>()?;
            Ok((bound, described))
        })?;

        #[cfg(feature = "metrics")]
        METRICS.record_binding_operation("batch_bind");

        let cascades = bound
            .iter()
            .map(|b| {
                self.run_cascade(CascadeOperation::Bind, category_id, b.binding.attribute_id, |c| {
                    c.bind(&b.binding, b.replaced.as_ref())
                })
            })
            .collect();
        Ok(BatchBindOutcome { bindings, cascades })
    }

    /// Live rows held by the category itself, copies included.
    pub fn get_category_attributes(&self, category_id: CategoryId) -> Result<Vec<Binding>, InheritanceError> {
        self.with_tree(|tree| BindingStore::new(tree).list(category_id))
    }

    pub fn get_category_attributes_with_inheritance(
        &self,
        category_id: CategoryId,
    ) -> Result<Vec<ResolvedBinding>, InheritanceError> {
        #[cfg(feature = "metrics")]
        let started = Instant::now();

        let effective = self.with_tree(|tree| resolver::resolve_effective_attributes(tree, category_id))?;

        #[cfg(feature = "metrics")]
        METRICS.record_resolve_duration(started.elapsed());
        Ok(effective)
    }

    pub fn get_attribute_inheritance_path(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<Vec<ResolvedBinding>, InheritanceError> {
        self.with_tree(|tree| {
            if !tree.session().attribute_exists(attribute_id)? {
                return Err(InheritanceError::attribute_not_found(attribute_id));
            }
            resolver::resolve_inheritance_path(tree, category_id, attribute_id)
        })
    }

    pub fn is_attribute_inherited_from_parent(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
        parent_id: CategoryId,
    ) -> Result<bool, InheritanceError> {
        self.with_tree(|tree| {
            cascade::is_attribute_inherited_from_parent(tree, category_id, attribute_id, parent_id)
        })
    }

    /// Insert the inherited rows the category is missing and re-sync its
    /// outdated copies. Returns how many rows were repaired.
    pub fn rebuild_category_inheritance(&self, category_id: CategoryId) -> Result<usize, InheritanceError> {
        let repaired =
            self.with_tree(|tree| validator::rebuild_inheritance_for_category(tree, category_id))?;
        log::info!("rebuilt inheritance for category {category_id}: {repaired} rows repaired");
        Ok(repaired)
    }

    pub fn rebuild_subtree_inheritance(&self, category_id: CategoryId) -> Result<usize, InheritanceError> {
        let repaired = self.with_tree(|tree| validator::rebuild_subtree(tree, category_id))?;
        log::info!("rebuilt inheritance below category {category_id}: {repaired} rows repaired");
        Ok(repaired)
    }

    pub fn validate_inheritance_consistency(
        &self,
        category_id: CategoryId,
    ) -> Result<ConsistencyReport, InheritanceError> {
        self.with_tree(|tree| validator::validate_inheritance_consistency(tree, category_id))
    }

    /// Materialize what a newly created category inherits from its ancestors.
    pub fn on_category_created(&self, category_id: CategoryId) -> Result<usize, InheritanceError> {
        log::debug!("materializing inherited attributes for new category {category_id}");
        self.rebuild_category_inheritance(category_id)
    }

    pub fn get_binding_summary(&self, category_id: CategoryId) -> Result<BindingSummary, InheritanceError> {
        let effective = self.get_category_attributes_with_inheritance(category_id)?;
        let inherited = effective.iter().filter(|r| r.is_inherited).count();
        Ok(BindingSummary {
            category_id,
            total: effective.len(),
            own: effective.len() - inherited,
            inherited,
        })
    }

    /// Check entity values against the category's effective attribute set.
    ///
    /// Every value must belong to an effective attribute and pass that
    /// attribute's rules; every attribute the category requires must be
    /// present. A binding's `is_required` overrides the definition's.
    ///
    /// # Errors
    ///
    /// One `Validation` error listing every problem found.
    pub fn validate_entity_values(
        &self,
        category_id: CategoryId,
        values: &[(AttributeId, AttributeValue)],
    ) -> Result<(), InheritanceError> {
        let issues = self.with_tree(|tree| {
            let effective: HashMap<AttributeId, ResolvedBinding> =
                resolver::resolve_effective_attributes(tree, category_id)?
                    .into_iter()
                    .map(|r| (r.attribute_id, r))
                    .collect();

            let mut issues = Vec::new();
            let mut supplied = HashSet::with_capacity(values.len());
            for (attribute_id, value) in values {
                supplied.insert(*attribute_id);
                let Some(resolved) = effective.get(attribute_id) else {
                    issues.push(format!(
                        "attribute {attribute_id} is not available in category {category_id}"
                    ));
                    continue;
                };
                let mut attribute = tree
                    .session()
                    .attribute(*attribute_id)?
                    .ok_or_else(|| InheritanceError::attribute_not_found(*attribute_id))?;
                attribute.is_required = resolved.is_required;
                match attribute.validate_value(value) {
                    Ok(()) => {}
                    Err(InheritanceError::Validation(msg)) => issues.push(msg),
                    Err(other) => return Err(other),
                }
            }

            for resolved in effective.values().filter(|r| r.is_required) {
                if !supplied.contains(&resolved.attribute_id) {
                    issues.push(format!(
                        "required attribute {} is missing",
                        resolved.attribute_id
                    ));
                }
            }
            Ok(issues)
        })?;

        if issues.is_empty() {
            Ok(())
        } else {
            Err(InheritanceError::Validation(issues.join("; ")))
        }
    }
}
