use crate::common::*;
use lineage::{BindingRequest, InheritanceError};

#[test]
fn test_batch_binds_and_cascades_each_attribute() {
    let svc = service(catalogue());
    let outcome = svc
        .batch_bind_attributes_to_category(
            PHONES,
            &[
                BindingRequest::new(COLOR, true, 0),
                BindingRequest::new(STORAGE, false, 1),
            ],
        )
        .expect("batch");
    assert_eq!(outcome.bindings.len(), 2);
    assert_eq!(outcome.cascades.len(), 2);
    assert!(outcome.cascades.iter().all(|c| c.applied == 2));

    let summary = svc.get_binding_summary(SMARTPHONES).expect("summary");
    assert_eq!(summary.total, 2);
    assert_eq!(summary.inherited, 2);
    assert_eq!(summary.own, 0);
}

#[test]
fn test_batch_is_all_or_nothing() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(PHONES, WEIGHT, false, 0)
        .expect("existing");

    let err = svc
        .batch_bind_attributes_to_category(
            PHONES,
            &[
                BindingRequest::new(COLOR, false, 0),
                BindingRequest::new(WEIGHT, true, 1),
            ],
        )
        .expect_err("weight already bound");
    assert!(err.is_conflict());

    let rows = svc.get_category_attributes(PHONES).expect("rows");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].attribute_id, WEIGHT);
    // nothing cascaded from the failed batch either
    assert!(effective(&svc, SMARTPHONES, COLOR).is_none());
}

#[test]
fn test_batch_rejects_malformed_requests() {
    let svc = service(catalogue());
    for requests in [
        vec![],
        vec![BindingRequest::new(COLOR, false, 0), BindingRequest::new(COLOR, true, 0)],
        vec![BindingRequest::new(COLOR, false, 0), BindingRequest::new(12345, false, 0)],
        vec![BindingRequest::new(COLOR, false, -2)],
    ] {
        let err = svc
            .batch_bind_attributes_to_category(PHONES, &requests)
            .expect_err("malformed");
        assert!(matches!(err, InheritanceError::Validation(_)), "{err}");
    }
    assert!(svc.get_category_attributes(PHONES).expect("rows").is_empty());
}

#[test]
fn test_batch_promotes_inherited_copies() {
    let svc = service(catalogue());
    svc.bind_attribute_to_category(ELECTRONICS, COLOR, false, 0)
        .expect("root");
    let outcome = svc
        .batch_bind_attributes_to_category(PHONES, &[BindingRequest::new(COLOR, true, 5)])
        .expect("batch over copy");
    assert!(!outcome.bindings[0].is_inherited);

    let color = effective(&svc, SMARTPHONES, COLOR).expect("color");
    assert_eq!(color.inherited_from, Some(PHONES));
    assert_eq!(color.sort, 5);
}
