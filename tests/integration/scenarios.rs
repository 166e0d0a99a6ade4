use crate::common::*;

#[test]
fn test_closest_binding_wins() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("bind electronics");
    svc.bind_attribute_to_category(PHONES, COLOR, true, 0)
        .expect("bind phones");

    let color = effective(&svc, SMARTPHONES, COLOR).expect("color at smartphones");
    assert!(color.is_required);
    assert!(color.is_inherited);
    assert_eq!(color.inherited_from, Some(PHONES));

    // laptops still see the root binding
    let color = effective(&svc, LAPTOPS, COLOR).expect("color at laptops");
    assert!(!color.is_required);
    assert_eq!(color.inherited_from, Some(ELECTRONICS));
}

#[test]
fn test_bind_unbind_round_trip() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(LAPTOPS, WEIGHT, true, 7)
        .expect("bind");

    let rows = svc.get_category_attributes(LAPTOPS).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attribute_id, WEIGHT);
    assert!(rows[0].is_required);
    assert_eq!(rows[0].sort, 7);

    svc.unbind_attribute_from_category(LAPTOPS, WEIGHT)
        .expect("unbind");
    assert!(svc.get_category_attributes(LAPTOPS).expect("rows").is_empty());

    // the pair can be bound again after a soft delete
    svc.bind_attribute_to_category(LAPTOPS, WEIGHT, false, 1)
        .expect("rebind");
    assert_eq!(svc.get_category_attributes(LAPTOPS).expect("rows").len(), 1);
}

#[test]
fn test_electronics_phones_smartphones() {
    let svc = service(catalogue());

    svc.bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("bind electronics");
    let color = effective(&svc, SMARTPHONES, COLOR).expect("inherited color");
    assert!(color.is_inherited);
    assert_eq!(color.inherited_from, Some(ELECTRONICS));
    assert!(!color.is_required);

    let outcome = svc
        .bind_attribute_to_category(PHONES, COLOR, true, 0)
        .expect("bind phones");
    assert!(!outcome.binding.is_inherited);
    assert!(outcome.cascade.is_complete());
    let color = effective(&svc, SMARTPHONES, COLOR).expect("override");
    assert!(color.is_inherited);
    assert_eq!(color.inherited_from, Some(PHONES));
    assert!(color.is_required);

    let outcome = svc
        .unbind_attribute_from_category(PHONES, COLOR)
        .expect("unbind phones");
    assert_eq!(outcome.removed.category_id, PHONES);
    // the copies taken from Phones go with it
    assert_eq!(outcome.cascade.applied, 2);

    // live resolution falls back to Electronics at once
    let color = effective(&svc, SMARTPHONES, COLOR).expect("reverted");
    assert!(color.is_inherited);
    assert_eq!(color.inherited_from, Some(ELECTRONICS));
    assert!(!color.is_required);

    // the materialized copies are not recreated until a rebuild
    assert!(!svc
        .validate_inheritance_consistency(SMARTPHONES)
        .expect("validate")
        .is_consistent);
    assert_eq!(svc.rebuild_subtree_inheritance(PHONES).expect("rebuild"), 3);
    assert!(svc
        .validate_inheritance_consistency(SMARTPHONES)
        .expect("validate")
        .is_consistent);
}

#[test]
fn test_inheritance_path_shows_every_holder() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, STORAGE, false, 1)
        .expect("bind");
    svc.bind_attribute_to_category(PHONES, STORAGE, true, 2)
        .expect("override");

    let path = svc
        .get_attribute_inheritance_path(SMARTPHONES, STORAGE)
        .expect("path");
    let holders: Vec<_> = path.iter().map(|r| r.category_id).collect();
    assert_eq!(holders, vec![ELECTRONICS, PHONES, SMARTPHONES]);
    assert_eq!(path[2].inherited_from, Some(PHONES));

    assert!(svc
        .is_attribute_inherited_from_parent(SMARTPHONES, STORAGE, PHONES)
        .expect("phones"));
    assert!(!svc
        .is_attribute_inherited_from_parent(SMARTPHONES, STORAGE, ELECTRONICS)
        .expect("electronics"));
}

#[test]
fn test_errors_map_to_kinds() {
    let svc = service(catalogue());
    assert!(svc
        .bind_attribute_to_category(99, COLOR, false, 0)
        .expect_err("unknown category")
        .is_not_found());
    assert!(svc
        .bind_attribute_to_category(PHONES, 999, false, 0)
        .expect_err("unknown attribute")
        .is_not_found());
    assert!(svc
        .unbind_attribute_from_category(PHONES, COLOR)
        .expect_err("nothing bound")
        .is_not_found());

    svc.bind_attribute_to_category(PHONES, COLOR, false, 0)
        .expect("bind");
    assert!(svc
        .bind_attribute_to_category(PHONES, COLOR, true, 0)
        .expect_err("second bind")
        .is_conflict());
}
