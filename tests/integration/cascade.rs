use crate::common::*;
use lineage::{AttributeInheritanceService, CascadeOperation, InheritanceConfig};

fn live_rows(svc: &AttributeInheritanceService<lineage::MemoryStore>, category_id: i64) -> Vec<(i64, bool, i32)> {
    svc.get_category_attributes(category_id)
        .expect("rows")
        .into_iter()
        .map(|b| (b.attribute_id, b.is_required, b.sort))
        .collect()
}

#[test]
fn test_cascade_never_clobbers_direct_bindings() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(SMARTPHONES, WEIGHT, true, 9)
        .expect("direct at leaf");

    let outcome = svc
        .bind_attribute_to_category(ELECTRONICS, WEIGHT, false, 1)
        .expect("bind root");
    assert_eq!(outcome.cascade.operation, CascadeOperation::Bind);
    assert_eq!(outcome.cascade.skipped, 1);
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(WEIGHT, true, 9)]);

    svc.update_category_attribute(ELECTRONICS, WEIGHT, Some(true), Some(3))
        .expect("update root");
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(WEIGHT, true, 9)]);
    assert_eq!(live_rows(&svc, PHONES), vec![(WEIGHT, true, 3)]);

    svc.unbind_attribute_from_category(ELECTRONICS, WEIGHT)
        .expect("unbind root");
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(WEIGHT, true, 9)]);
    assert!(live_rows(&svc, PHONES).is_empty());
}

#[test]
fn test_unbind_keeps_rows_inherited_from_closer_ancestor() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, STORAGE, false, 0)
        .expect("root");
    svc.bind_attribute_to_category(PHONES, STORAGE, true, 4)
        .expect("phones");

    svc.unbind_attribute_from_category(ELECTRONICS, STORAGE)
        .expect("unbind root");
    assert!(live_rows(&svc, LAPTOPS).is_empty());
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(STORAGE, true, 4)]);
    assert_eq!(live_rows(&svc, FEATURE_PHONES), vec![(STORAGE, true, 4)]);
}

#[test]
fn test_failed_descendant_becomes_warning() {
    let store = catalogue();
    store.inject_write_failure(PHONES).expect("inject");
    let svc = service(store);

    let outcome = svc
        .bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("direct bind stands");
    let cascade = outcome.cascade;
    assert_eq!(cascade.attempted, 4);
    assert_eq!(cascade.applied, 3);
    assert_eq!(cascade.warnings.len(), 1);
    assert_eq!(cascade.warnings[0].category_id, PHONES);
    assert_eq!(cascade.warnings[0].operation, "bind");
    assert!(cascade.warnings[0].message.contains("injected write failure"));
    assert!(!cascade.is_complete());

    // siblings and grandchildren were still reached
    assert_eq!(live_rows(&svc, LAPTOPS).len(), 1);
    assert_eq!(live_rows(&svc, SMARTPHONES).len(), 1);
    assert!(live_rows(&svc, PHONES).is_empty());

    // the rebuilder repairs the gap once the store recovers
    assert!(!svc.validate_inheritance_consistency(PHONES).expect("check").is_consistent);
    svc.database().clear_write_failures().expect("clear");
    assert_eq!(svc.rebuild_category_inheritance(PHONES).expect("rebuild"), 1);
    assert!(svc.validate_inheritance_consistency(PHONES).expect("check").is_consistent);
}

#[test]
fn test_disabled_cascade_reports_nothing() {
    let svc = AttributeInheritanceService::new(
        catalogue(),
        InheritanceConfig {
            cascade_enabled: false,
            ..InheritanceConfig::default()
        },
    );
    let outcome = svc
        .bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("bind");
    assert_eq!(outcome.cascade.attempted, 0);
    assert!(outcome.cascade.is_complete());
    assert!(live_rows(&svc, PHONES).is_empty());

    let color = effective(&svc, SMARTPHONES, COLOR).expect("live resolution");
    assert_eq!(color.category_id, ELECTRONICS);
    assert_eq!(color.inherited_from, Some(ELECTRONICS));
}

#[test]
fn test_cascade_report_serializes() {
    let svc = service(catalogue());
    let outcome = svc
        .bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("bind");
    let json = serde_json::to_value(&outcome.cascade).expect("json");
    assert_eq!(json["operation"], "bind");
    assert_eq!(json["applied"], 4);
    assert!(json.get("warnings").is_none());
}

#[test]
fn test_identical_direct_bind_survives_ancestor_unbind() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("root");
    let phones = svc
        .bind_attribute_to_category(PHONES, COLOR, false, 0)
        .expect("same settings at phones");
    assert!(!phones.binding.is_inherited);
    assert_eq!(phones.binding.inherited_from, None);

    svc.unbind_attribute_from_category(ELECTRONICS, COLOR)
        .expect("unbind root");
    assert_eq!(live_rows(&svc, PHONES), vec![(COLOR, false, 0)]);
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(COLOR, false, 0)]);
    assert!(live_rows(&svc, LAPTOPS).is_empty());

    let color = effective(&svc, SMARTPHONES, COLOR).expect("still inherited");
    assert_eq!(color.inherited_from, Some(PHONES));
}

#[test]
fn test_second_identical_bind_is_duplicate() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("root");
    svc.bind_attribute_to_category(PHONES, COLOR, false, 0)
        .expect("first bind at phones");
    let err = svc
        .bind_attribute_to_category(PHONES, COLOR, false, 0)
        .expect_err("second bind at phones");
    assert!(err.is_conflict());
    assert_eq!(live_rows(&svc, PHONES).len(), 1);
}

#[test]
fn test_failed_cascade_update_is_detected_and_repaired() {
    let store = catalogue();
    let svc = service(store);
    svc.bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("root");
    svc.database().inject_write_failure(PHONES).expect("inject");

    let outcome = svc
        .update_category_attribute(ELECTRONICS, COLOR, Some(true), None)
        .expect("direct update stands");
    assert_eq!(outcome.cascade.warnings.len(), 1);
    assert_eq!(outcome.cascade.warnings[0].category_id, PHONES);
    assert_eq!(live_rows(&svc, PHONES), vec![(COLOR, false, 0)]);
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(COLOR, true, 0)]);

    // the stale copy still belongs to Electronics
    let phones = effective(&svc, PHONES, COLOR).expect("phones");
    assert!(phones.is_inherited);
    assert_eq!(phones.inherited_from, Some(ELECTRONICS));

    let report = svc.validate_inheritance_consistency(PHONES).expect("check");
    assert!(!report.is_consistent);
    assert!(report.issues[0].contains("out of date"));
    assert!(svc
        .validate_inheritance_consistency(SMARTPHONES)
        .expect("check")
        .is_consistent);

    svc.database().clear_write_failures().expect("clear");
    assert_eq!(svc.rebuild_category_inheritance(PHONES).expect("rebuild"), 1);
    assert_eq!(live_rows(&svc, PHONES), vec![(COLOR, true, 0)]);
    assert!(svc.validate_inheritance_consistency(PHONES).expect("check").is_consistent);
    assert_eq!(svc.rebuild_category_inheritance(PHONES).expect("again"), 0);

    svc.unbind_attribute_from_category(ELECTRONICS, COLOR)
        .expect("unbind root");
    assert!(live_rows(&svc, PHONES).is_empty());
    assert!(live_rows(&svc, SMARTPHONES).is_empty());
}

#[test]
fn test_update_of_inherited_copy_becomes_an_override() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, STORAGE, false, 0)
        .expect("root");

    let outcome = svc
        .update_category_attribute(PHONES, STORAGE, Some(true), None)
        .expect("update copy at phones");
    assert!(!outcome.binding.is_inherited);
    assert_eq!(outcome.cascade.operation, CascadeOperation::Update);
    assert_eq!(outcome.cascade.applied, 2);

    // later changes at the root no longer reach phones or below
    svc.update_category_attribute(ELECTRONICS, STORAGE, None, Some(8))
        .expect("update root");
    assert_eq!(live_rows(&svc, PHONES), vec![(STORAGE, true, 0)]);
    assert_eq!(live_rows(&svc, SMARTPHONES), vec![(STORAGE, true, 0)]);
    assert_eq!(live_rows(&svc, LAPTOPS), vec![(STORAGE, false, 8)]);
    assert_eq!(svc.rebuild_subtree_inheritance(ELECTRONICS).expect("rebuild"), 0);
}
