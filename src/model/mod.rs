//! Data model: categories, attribute definitions and binding rows.

pub mod attribute;
pub mod binding;
pub mod category;

pub use attribute::{
    Attribute, AttributeId, AttributeOption, AttributeType, AttributeValue, ValidationRule,
};
pub use binding::{
    Binding, BindingId, BindingPatch, BindingRequest, BindingSummary, CategoryAttributeBinding,
    NewBinding, ResolvedBinding,
};
pub use category::{Category, CategoryId};
