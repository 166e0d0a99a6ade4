use lineage::{
    Attribute, AttributeId, AttributeInheritanceService, AttributeOption, AttributeType,
    CategoryId, InheritanceConfig, MemoryStore, ResolvedBinding,
};

pub const ELECTRONICS: CategoryId = 1;
pub const PHONES: CategoryId = 2;
pub const SMARTPHONES: CategoryId = 3;
pub const LAPTOPS: CategoryId = 4;
pub const FEATURE_PHONES: CategoryId = 5;

pub const COLOR: AttributeId = 100;
pub const STORAGE: AttributeId = 101;
pub const WEIGHT: AttributeId = 102;

/// Electronics -> {Phones -> {Smartphones, Feature phones}, Laptops}
pub fn catalogue() -> MemoryStore {
    let store = MemoryStore::new();
    store.add_category(ELECTRONICS, None, "Electronics").expect("electronics");
    store.add_category(PHONES, Some(ELECTRONICS), "Phones").expect("phones");
    store
        .add_category(SMARTPHONES, Some(PHONES), "Smartphones")
        .expect("smartphones");
    store.add_category(LAPTOPS, Some(ELECTRONICS), "Laptops").expect("laptops");
    store
        .add_category(FEATURE_PHONES, Some(PHONES), "Feature phones")
        .expect("feature phones");

    store
        .add_attribute(
            Attribute::new(COLOR, "color", AttributeType::Select).with_options(vec![
                AttributeOption::new("black", "Black"),
                AttributeOption::new("white", "White"),
            ]),
        )
        .expect("color");
    store
        .add_attribute(Attribute::new(STORAGE, "storage_gb", AttributeType::Number))
        .expect("storage");
    store
        .add_attribute(Attribute::new(WEIGHT, "weight_g", AttributeType::Number))
        .expect("weight");
    store
}

pub fn service(store: MemoryStore) -> AttributeInheritanceService<MemoryStore> {
    AttributeInheritanceService::new(store, InheritanceConfig::default())
}

/// Effective entry for `attribute_id` at `category_id`, if any.
pub fn effective<D: lineage::Database>(
    svc: &AttributeInheritanceService<D>,
    category_id: CategoryId,
    attribute_id: AttributeId,
) -> Option<ResolvedBinding> {
    svc.get_category_attributes_with_inheritance(category_id)
        .expect("resolve")
        .into_iter()
        .find(|r| r.attribute_id == attribute_id)
}
