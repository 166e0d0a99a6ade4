//! Random trees and random bind / update / unbind sequences, checked against a
//! straightforward model: the effective entry of an attribute is the direct
//! binding nearest to the category on its root path.

use lineage::{
    Attribute, AttributeId, AttributeInheritanceService, AttributeType, CategoryId,
    InheritanceConfig, MemoryStore,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

const ATTRIBUTES: [AttributeId; 4] = [1, 2, 3, 4];

struct Model {
    parents: HashMap<CategoryId, Option<CategoryId>>,
    direct: HashMap<(CategoryId, AttributeId), (bool, i32)>,
}

impl Model {
    /// Nearest direct binding on the path: `(holder, is_required, sort)`.
    fn expected(&self, category_id: CategoryId, attribute_id: AttributeId) -> Option<(CategoryId, bool, i32)> {
        let mut current = Some(category_id);
        while let Some(c) = current {
            if let Some(&(is_required, sort)) = self.direct.get(&(c, attribute_id)) {
                return Some((c, is_required, sort));
            }
            current = self.parents.get(&c).copied().flatten();
        }
        None
    }
}

fn random_tree(rng: &mut StdRng, size: i64) -> (MemoryStore, Model) {
    let store = MemoryStore::new();
    let mut parents = HashMap::new();
    for id in 1..=size {
        // a couple of roots, everything else hangs below an earlier category
        let parent = if id <= 2 { None } else { Some(rng.gen_range(1..id)) };
        store
            .add_category(id, parent, &format!("category {id}"))
            .expect("category");
        parents.insert(id, parent);
    }
    for id in ATTRIBUTES {
        store
            .add_attribute(Attribute::new(id, format!("attribute {id}"), AttributeType::Text))
            .expect("attribute");
    }
    (
        store,
        Model {
            parents,
            direct: HashMap::new(),
        },
    )
}

fn check_against_model(svc: &AttributeInheritanceService<MemoryStore>, model: &Model, size: i64) {
    for category_id in 1..=size {
        let effective = svc
            .get_category_attributes_with_inheritance(category_id)
            .expect("resolve");
        for attribute_id in ATTRIBUTES {
            let got = effective.iter().find(|r| r.attribute_id == attribute_id);
            match (model.expected(category_id, attribute_id), got) {
                (None, None) => {}
                (Some((holder, is_required, sort)), Some(r)) => {
                    assert_eq!(r.is_required, is_required, "category {category_id} attribute {attribute_id}");
                    assert_eq!(r.sort, sort, "category {category_id} attribute {attribute_id}");
                    assert_eq!(r.is_inherited, holder != category_id);
                    assert_eq!(r.inherited_from, (holder != category_id).then_some(holder));
                }
                (want, got) => panic!(
                    "category {category_id} attribute {attribute_id}: expected {want:?}, got {got:?}"
                ),
            }
        }
    }
}

/// What the category holds for the attribute before an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Held {
    Nothing,
    Copy,
    Direct,
}

fn held(
    svc: &AttributeInheritanceService<MemoryStore>,
    model: &Model,
    category_id: CategoryId,
    attribute_id: AttributeId,
) -> Held {
    let has_row = svc
        .get_category_attributes(category_id)
        .expect("rows")
        .iter()
        .any(|b| b.attribute_id == attribute_id);
    match (has_row, model.direct.contains_key(&(category_id, attribute_id))) {
        (_, true) => Held::Direct,
        (true, false) => Held::Copy,
        (false, false) => Held::Nothing,
    }
}

fn run(seed: u64) {
    const SIZE: i64 = 20;
    let mut rng = StdRng::seed_from_u64(seed);
    let (store, mut model) = random_tree(&mut rng, SIZE);
    let svc = AttributeInheritanceService::new(store, InheritanceConfig::default());

    // settings come from a tiny range so direct rows often mirror their ancestors
    for _ in 0..160 {
        let category_id = rng.gen_range(1..=SIZE);
        let attribute_id = ATTRIBUTES[rng.gen_range(0..ATTRIBUTES.len())];
        let key = (category_id, attribute_id);
        let is_required = rng.gen_bool(0.5);
        let sort = rng.gen_range(0..2);

        match (held(&svc, &model, category_id, attribute_id), rng.gen_range(0..3)) {
            (Held::Direct, 0) => {
                let err = svc
                    .bind_attribute_to_category(category_id, attribute_id, is_required, sort)
                    .expect_err("already direct");
                assert!(err.is_conflict());
            }
            (_, 0) => {
                let outcome = svc
                    .bind_attribute_to_category(category_id, attribute_id, is_required, sort)
                    .expect("bind");
                assert!(!outcome.binding.is_inherited);
                model.direct.insert(key, (is_required, sort));
            }
            (Held::Nothing, _) => {
                let err = svc
                    .update_category_attribute(category_id, attribute_id, Some(is_required), Some(sort))
                    .expect_err("nothing to update");
                assert!(err.is_not_found());
            }
            (_, 1) => {
                // on a copy this turns it into a direct binding
                let outcome = svc
                    .update_category_attribute(category_id, attribute_id, Some(is_required), Some(sort))
                    .expect("update");
                assert!(!outcome.binding.is_inherited);
                model.direct.insert(key, (is_required, sort));
            }
            (_, _) => {
                // on a copy this only drops the materialized row
                svc.unbind_attribute_from_category(category_id, attribute_id)
                    .expect("unbind");
                model.direct.remove(&key);
            }
        }
        check_against_model(&svc, &model, SIZE);
    }

    for root in [1, 2] {
        svc.rebuild_subtree_inheritance(root).expect("rebuild");
    }
    for category_id in 1..=SIZE {
        let report = svc
            .validate_inheritance_consistency(category_id)
            .expect("validate");
        assert!(report.is_consistent, "{:?}", report.issues);
    }
    check_against_model(&svc, &model, SIZE);

    for root in [1, 2] {
        assert_eq!(svc.rebuild_subtree_inheritance(root).expect("again"), 0);
    }
}

#[test]
fn test_random_trees_match_model() {
    for seed in [7, 42, 1009, 31337] {
        run(seed);
    }
}

#[test]
fn test_random_trees_match_model_after_repair_from_scratch() {
    // same walk with cascades switched off: only rebuild materializes copies
    let mut rng = StdRng::seed_from_u64(5);
    let (store, mut model) = random_tree(&mut rng, 15);
    let svc = AttributeInheritanceService::new(
        store,
        InheritanceConfig {
            cascade_enabled: false,
            ..InheritanceConfig::default()
        },
    );
    for _ in 0..40 {
        let category_id = rng.gen_range(1..=15);
        let attribute_id = ATTRIBUTES[rng.gen_range(0..ATTRIBUTES.len())];
        if model.direct.contains_key(&(category_id, attribute_id)) {
            continue;
        }
        let settings = (rng.gen_bool(0.5), rng.gen_range(0..2));
        svc.bind_attribute_to_category(category_id, attribute_id, settings.0, settings.1)
            .expect("bind");
        model.direct.insert((category_id, attribute_id), settings);
    }
    check_against_model(&svc, &model, 15);
    for root in [1, 2] {
        svc.rebuild_subtree_inheritance(root).expect("rebuild");
    }
    for category_id in 1..=15 {
        assert!(svc
            .validate_inheritance_consistency(category_id)
            .expect("validate")
            .is_consistent);
    }
    check_against_model(&svc, &model, 15);
}
