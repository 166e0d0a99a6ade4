use crate::common::*;
use std::sync::Arc;

#[test]
fn test_duplicate_binds_from_coroutines_yield_one_winner() {
    let svc = Arc::new(service(catalogue()));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let svc = Arc::clone(&svc);
            may::go!(move || svc.bind_attribute_to_category(PHONES, COLOR, i % 2 == 0, i))
        })
        .collect();

    let mut wins = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.join().expect("coroutine panicked") {
            Ok(_) => wins += 1,
            Err(err) if err.is_conflict() => conflicts += 1,
            Err(err) => panic!("unexpected error: {err}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(conflicts, 7);
    assert_eq!(svc.get_category_attributes(PHONES).expect("rows").len(), 1);
}

#[test]
fn test_binds_of_different_attributes_all_land() {
    let svc = Arc::new(service(catalogue()));

    let handles: Vec<_> = [(ELECTRONICS, COLOR), (PHONES, STORAGE), (LAPTOPS, WEIGHT)]
        .into_iter()
        .map(|(category_id, attribute_id)| {
            let svc = Arc::clone(&svc);
            may::go!(move || svc.bind_attribute_to_category(category_id, attribute_id, true, 0))
        })
        .collect();
    for handle in handles {
        let outcome = handle.join().expect("coroutine panicked").expect("bind");
        assert!(outcome.cascade.is_complete());
    }

    let smartphones = svc
        .get_category_attributes_with_inheritance(SMARTPHONES)
        .expect("resolve");
    let mut attributes: Vec<_> = smartphones.iter().map(|r| r.attribute_id).collect();
    attributes.sort();
    assert_eq!(attributes, vec![COLOR, STORAGE]);
    assert!(svc
        .validate_inheritance_consistency(SMARTPHONES)
        .expect("validate")
        .is_consistent);
}
