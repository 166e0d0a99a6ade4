//! In-memory store.
//!
//! One mutex-protected [`State`]. A transaction holds the lock, works on a
//! clone of the state and publishes it on commit, so transactions are fully
//! serialized. Savepoints are a stack of further clones.
//!
//! Writes to a category can be made to fail with
//! [`MemoryStore::inject_write_failure`] to exercise cascade error paths.

use super::{Database, Session};
use crate::error::InheritanceError;
use crate::executor::StoreError;
use crate::model::{
    Attribute, AttributeId, Binding, BindingId, BindingPatch, Category, CategoryId, NewBinding,
};
use chrono::{DateTime, Duration, Utc};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, Default)]
struct State {
    categories: BTreeMap<CategoryId, Category>,
    attributes: BTreeMap<AttributeId, Attribute>,
    bindings: BTreeMap<BindingId, Binding>,
    next_binding_id: BindingId,
    last_timestamp: Option<DateTime<Utc>>,
}

impl State {
    /// Wall clock, nudged forward so successive writes never share a timestamp.
    fn tick(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let ts = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(ts);
        ts
    }

    fn live_row(&self, category_id: CategoryId, attribute_id: AttributeId) -> Option<&Binding> {
        self.bindings.values().find(|b| {
            b.is_live() && b.category_id == category_id && b.attribute_id == attribute_id
        })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    failing_categories: Mutex<HashSet<CategoryId>>,
}

fn poisoned() -> StoreError {
    StoreError::Other("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>, StoreError> {
        self.state.lock().map_err(|_| poisoned())
    }

    /// Add a category under `parent_id`, deriving its level.
    ///
    /// # Errors
    ///
    /// `NotFound` for an unknown parent, `Validation` for a reused id.
    pub fn add_category(
        &self,
        id: CategoryId,
        parent_id: Option<CategoryId>,
        name: &str,
    ) -> Result<Category, InheritanceError> {
        let mut state = self.lock()?;
        if state.categories.contains_key(&id) {
            return Err(InheritanceError::Validation(format!(
                "category {id} already exists"
            )));
        }
        let level = match parent_id {
            None => 1,
            Some(pid) => {
                state
                    .categories
                    .get(&pid)
                    .filter(|p| p.is_live())
                    .ok_or_else(|| InheritanceError::category_not_found(pid))?
                    .level
                    + 1
            }
        };
        let category = Category::new(id, parent_id, level, name);
        state.categories.insert(id, category.clone());
        Ok(category)
    }

    /// Soft-delete a category. It and everything below it drop out of tree
    /// walks; its binding rows are left as they are.
    pub fn remove_category(&self, id: CategoryId) -> Result<(), InheritanceError> {
        let mut state = self.lock()?;
        let now = state.tick();
        let category = state
            .categories
            .get_mut(&id)
            .filter(|c| c.is_live())
            .ok_or_else(|| InheritanceError::category_not_found(id))?;
        category.deleted_at = Some(now);
        Ok(())
    }

    /// Store a category record exactly as given, without checking its parent.
    pub fn put_category_unchecked(&self, category: Category) -> Result<(), StoreError> {
        self.lock()?.categories.insert(category.id, category);
        Ok(())
    }

    pub fn add_attribute(&self, attribute: Attribute) -> Result<(), StoreError> {
        self.lock()?.attributes.insert(attribute.id, attribute);
        Ok(())
    }

    /// Make every write touching `category_id` fail until cleared.
    pub fn inject_write_failure(&self, category_id: CategoryId) -> Result<(), StoreError> {
        self.failing_categories
            .lock()
            .map_err(|_| poisoned())?
            .insert(category_id);
        Ok(())
    }

    pub fn clear_write_failures(&self) -> Result<(), StoreError> {
        self.failing_categories.lock().map_err(|_| poisoned())?.clear();
        Ok(())
    }

    /// Every row ever written, soft-deleted ones included, ordered by id.
    pub fn all_bindings(&self) -> Result<Vec<Binding>, StoreError> {
        Ok(self.lock()?.bindings.values().cloned().collect())
    }
}

impl Database for MemoryStore {
    fn transaction<R, F>(&self, f: F) -> Result<R, InheritanceError>
    where
        F: FnOnce(&dyn Session) -> Result<R, InheritanceError>,
    {
        let failing = self
            .failing_categories
            .lock()
            .map_err(|_| poisoned())?
            .clone();
        let mut guard = self.lock()?;
        let session = MemorySession {
            state: RefCell::new(guard.clone()),
            savepoints: RefCell::new(Vec::new()),
            failing,
        };
        // an error drops the working copy, which is the rollback
        let out = f(&session)?;
        *guard = session.state.into_inner();
        Ok(out)
    }
}

struct MemorySession {
    state: RefCell<State>,
    savepoints: RefCell<Vec<(String, State)>>,
    failing: HashSet<CategoryId>,
}

impl MemorySession {
    fn check_writable(&self, category_id: CategoryId) -> Result<(), StoreError> {
        if self.failing.contains(&category_id) {
            return Err(StoreError::Other(format!(
                "injected write failure at category {category_id}"
            )));
        }
        Ok(())
    }

    fn live_row_by_id(&self, id: BindingId) -> Result<Binding, StoreError> {
        match self.state.borrow().bindings.get(&id) {
            Some(b) if b.is_live() => Ok(b.clone()),
            _ => Err(StoreError::Query(format!("binding {id} is not live"))),
        }
    }

    fn sorted_live<P>(&self, keep: P) -> Vec<Binding>
    where
        P: Fn(&Binding) -> bool,
    {
        let state = self.state.borrow();
        let mut rows: Vec<Binding> = state
            .bindings
            .values()
            .filter(|b| b.is_live() && keep(b))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (a.sort, a.created_at, a.id).cmp(&(b.sort, b.created_at, b.id)));
        rows
    }
}

impl Session for MemorySession {
    fn category(&self, id: CategoryId) -> Result<Option<Category>, StoreError> {
        Ok(self
            .state
            .borrow()
            .categories
            .get(&id)
            .filter(|c| c.is_live())
            .cloned())
    }

    fn children(&self, id: CategoryId) -> Result<Vec<Category>, StoreError> {
        Ok(self
            .state
            .borrow()
            .categories
            .values()
            .filter(|c| c.is_live() && c.parent_id == Some(id))
            .cloned()
            .collect())
    }

    fn descendants(&self, id: CategoryId, max_depth: usize) -> Result<Vec<Category>, StoreError> {
        let state = self.state.borrow();
        let mut seen: HashSet<CategoryId> = HashSet::from([id]);
        let mut frontier = vec![id];
        let mut out = Vec::new();

        for _ in 0..max_depth {
            // BTreeMap order keeps each level sorted by id
            let level: Vec<Category> = state
                .categories
                .values()
                .filter(|c| c.is_live() && c.parent_id.is_some_and(|p| frontier.contains(&p)))
                .filter(|c| !seen.contains(&c.id))
                .cloned()
                .collect();
            if level.is_empty() {
                break;
            }
            frontier = level.iter().map(|c| c.id).collect();
            seen.extend(frontier.iter().copied());
            out.extend(level);
        }
        Ok(out)
    }

    fn ancestor_path(&self, id: CategoryId, max_depth: usize) -> Result<Vec<Category>, StoreError> {
        let state = self.state.borrow();
        let mut path = Vec::new();
        let mut next = Some(id);
        while let Some(current) = next {
            let Some(category) = state.categories.get(&current).filter(|c| c.is_live()) else {
                break;
            };
            path.push(category.clone());
            if path.len() > max_depth {
                break;
            }
            next = category.parent_id;
        }
        path.reverse();
        Ok(path)
    }

    fn attribute(&self, id: AttributeId) -> Result<Option<Attribute>, StoreError> {
        Ok(self.state.borrow().attributes.get(&id).cloned())
    }

    fn live_binding(
        &self,
        category_id: CategoryId,
        attribute_id: AttributeId,
    ) -> Result<Option<Binding>, StoreError> {
        Ok(self
            .state
            .borrow()
            .live_row(category_id, attribute_id)
            .cloned())
    }

    fn live_bindings(&self, category_ids: &[CategoryId]) -> Result<Vec<Binding>, StoreError> {
        Ok(self.sorted_live(|b| category_ids.contains(&b.category_id)))
    }

    fn live_bindings_for_attribute(
        &self,
        category_ids: &[CategoryId],
        attribute_id: AttributeId,
    ) -> Result<Vec<Binding>, StoreError> {
        Ok(self.sorted_live(|b| {
            b.attribute_id == attribute_id && category_ids.contains(&b.category_id)
        }))
    }

    fn insert_binding(&self, new: &NewBinding) -> Result<Binding, StoreError> {
        self.check_writable(new.category_id)?;
        let mut state = self.state.borrow_mut();
        if !state.categories.contains_key(&new.category_id) {
            return Err(StoreError::Query(format!(
                "category {} does not exist",
                new.category_id
            )));
        }
        if !state.attributes.contains_key(&new.attribute_id) {
            return Err(StoreError::Query(format!(
                "attribute {} does not exist",
                new.attribute_id
            )));
        }
        if state.live_row(new.category_id, new.attribute_id).is_some() {
            return Err(StoreError::Query(format!(
                "live binding already exists for category {} attribute {}",
                new.category_id, new.attribute_id
            )));
        }

        state.next_binding_id += 1;
        let now = state.tick();
        let binding = Binding {
            id: state.next_binding_id,
            category_id: new.category_id,
            attribute_id: new.attribute_id,
            is_required: new.is_required,
            sort: new.sort,
            created_at: new.created_at.unwrap_or(now),
            updated_at: now,
            deleted_at: None,
        };
        state.bindings.insert(binding.id, binding.clone());
        Ok(binding)
    }

    fn soft_delete_binding(&self, id: BindingId) -> Result<Binding, StoreError> {
        let row = self.live_row_by_id(id)?;
        self.check_writable(row.category_id)?;
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        let stored = state
            .bindings
            .get_mut(&id)
            .ok_or_else(|| StoreError::Query(format!("binding {id} vanished")))?;
        stored.deleted_at = Some(now);
        stored.updated_at = now;
        Ok(stored.clone())
    }

    fn update_binding(&self, id: BindingId, patch: &BindingPatch) -> Result<Binding, StoreError> {
        let row = self.live_row_by_id(id)?;
        self.check_writable(row.category_id)?;
        let mut state = self.state.borrow_mut();
        let now = state.tick();
        let stored = state
            .bindings
            .get_mut(&id)
            .ok_or_else(|| StoreError::Query(format!("binding {id} vanished")))?;
        patch.apply(stored);
        stored.updated_at = now;
        Ok(stored.clone())
    }

    fn savepoint(&self, name: &str) -> Result<(), StoreError> {
        let snapshot = self.state.borrow().clone();
        self.savepoints
            .borrow_mut()
            .push((name.to_string(), snapshot));
        Ok(())
    }

    fn rollback_to_savepoint(&self, name: &str) -> Result<(), StoreError> {
        let mut savepoints = self.savepoints.borrow_mut();
        let pos = savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| StoreError::Transaction(format!("savepoint {name} does not exist")))?;
        // the savepoint itself survives a rollback to it
        savepoints.truncate(pos + 1);
        *self.state.borrow_mut() = savepoints[pos].1.clone();
        Ok(())
    }

    fn release_savepoint(&self, name: &str) -> Result<(), StoreError> {
        let mut savepoints = self.savepoints.borrow_mut();
        let pos = savepoints
            .iter()
            .rposition(|(n, _)| n == name)
            .ok_or_else(|| StoreError::Transaction(format!("savepoint {name} does not exist")))?;
        savepoints.truncate(pos);
        Ok(())
    }
}
