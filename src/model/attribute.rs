//! Attribute definitions and typed attribute values.
//!
//! The inheritance engine only needs an attribute's id. The rest of the
//! definition is used to validate values supplied for an entity in a category
//! (see [`Attribute::validate_value`]).

use crate::error::InheritanceError;
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AttributeId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttributeType {
    Text,
    Number,
    Select,
    MultiSelect,
    Boolean,
    Date,
    #[serde(rename = "datetime")]
    DateTime,
    Url,
    Email,
    Color,
    Currency,
}

impl AttributeType {
    pub fn as_str(self) -> &'static str {
        match self {
            AttributeType::Text => "text",
            AttributeType::Number => "number",
            AttributeType::Select => "select",
            AttributeType::MultiSelect => "multi_select",
            AttributeType::Boolean => "boolean",
            AttributeType::Date => "date",
            AttributeType::DateTime => "datetime",
            AttributeType::Url => "url",
            AttributeType::Email => "email",
            AttributeType::Color => "color",
            AttributeType::Currency => "currency",
        }
    }

    pub fn supports_options(self) -> bool {
        matches!(self, AttributeType::Select | AttributeType::MultiSelect)
    }
}

impl fmt::Display for AttributeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttributeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "text" => AttributeType::Text,
            "number" => AttributeType::Number,
            "select" => AttributeType::Select,
            "multi_select" => AttributeType::MultiSelect,
            "boolean" => AttributeType::Boolean,
            "date" => AttributeType::Date,
            "datetime" => AttributeType::DateTime,
            "url" => AttributeType::Url,
            "email" => AttributeType::Email,
            "color" => AttributeType::Color,
            "currency" => AttributeType::Currency,
            other => return Err(format!("unknown attribute type '{other}'")),
        })
    }
}

/// A selectable value of a select or multi-select attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeOption {
    pub value: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AttributeOption {
    pub fn new(value: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            color: None,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_length: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Attribute definition as owned by the attribute catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: AttributeId,
    pub name: String,
    pub display_name: String,
    #[serde(rename = "type")]
    pub attribute_type: AttributeType,
    pub unit: Option<String>,
    pub is_required: bool,
    pub default_value: Option<String>,
    #[serde(default)]
    pub options: Vec<AttributeOption>,
    #[serde(default)]
    pub validation: ValidationRule,
    pub sort: i32,
    pub is_active: bool,
}

/// A value supplied for an attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    Text(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<Utc>),
    Structured(serde_json::Value),
}

impl AttributeValue {
    fn kind(&self) -> &'static str {
        match self {
            AttributeValue::Text(_) => "text",
            AttributeValue::Number(_) => "number",
            AttributeValue::Boolean(_) => "boolean",
            AttributeValue::Date(_) => "date",
            AttributeValue::DateTime(_) => "datetime",
            AttributeValue::Structured(_) => "structured",
        }
    }

    /// Empty text or a JSON null / empty array.
    pub fn is_empty(&self) -> bool {
        match self {
            AttributeValue::Text(s) => s.is_empty(),
            AttributeValue::Structured(v) => {
                v.is_null() || v.as_array().is_some_and(|items| items.is_empty())
            }
            _ => false,
        }
    }
}

impl Attribute {
    pub fn new(id: AttributeId, name: impl Into<String>, attribute_type: AttributeType) -> Self {
        let name = name.into();
        Self {
            id,
            display_name: name.clone(),
            name,
            attribute_type,
            unit: None,
            is_required: false,
            default_value: None,
            options: Vec::new(),
            validation: ValidationRule::default(),
            sort: 0,
            is_active: true,
        }
    }

    pub fn required(mut self) -> Self {
        self.is_required = true;
        self
    }

    pub fn with_options(mut self, options: Vec<AttributeOption>) -> Self {
        self.options = options;
        self
    }

    pub fn with_validation(mut self, validation: ValidationRule) -> Self {
        self.validation = validation;
        self
    }

    /// Check `value` against this attribute's type, options and rules.
    ///
    /// # Errors
    ///
    /// Returns `InheritanceError::Validation` naming the attribute and the
    /// violated rule.
    pub fn validate_value(&self, value: &AttributeValue) -> Result<(), InheritanceError> {
        if value.is_empty() {
            if self.is_required {
                return Err(self.invalid("a value is required"));
            }
            return Ok(());
        }

        match (self.attribute_type, value) {
            (AttributeType::Text, AttributeValue::Text(s)) => self.check_text(s),
            (AttributeType::Number, AttributeValue::Number(n)) => self.check_number(*n),
            (AttributeType::Currency, AttributeValue::Number(n)) => {
                if *n < 0.0 {
                    return Err(self.invalid("currency amounts cannot be negative"));
                }
                self.check_number(*n)
            }
            (AttributeType::Select, AttributeValue::Text(s)) => self.check_option(s),
            (AttributeType::MultiSelect, AttributeValue::Structured(serde_json::Value::Array(items))) => {
                for item in items {
                    let s = item
                        .as_str()
                        .ok_or_else(|| self.invalid("multi-select values must be strings"))?;
                    self.check_option(s)?;
                }
                Ok(())
            }
            (AttributeType::Boolean, AttributeValue::Boolean(_))
            | (AttributeType::Date, AttributeValue::Date(_))
            | (AttributeType::DateTime, AttributeValue::DateTime(_)) => Ok(()),
            (AttributeType::Url, AttributeValue::Text(s)) => {
                if s.len() < 7 || !(s.starts_with("http://") || s.starts_with("https://")) {
                    return Err(self.invalid("URL must start with http:// or https://"));
                }
                self.check_text(s)
            }
            (AttributeType::Email, AttributeValue::Text(s)) => {
                if s.len() < 5 || !s.contains('@') || !s.contains('.') {
                    return Err(self.invalid("malformed email address"));
                }
                self.check_text(s)
            }
            (AttributeType::Color, AttributeValue::Text(s)) => {
                if !is_hex_color(s) {
                    return Err(self.invalid("color must be #rgb or #rrggbb"));
                }
                Ok(())
            }
            (expected, got) => Err(self.invalid(&format!(
                "expected a {expected} value, got {}",
                got.kind()
            ))),
        }
    }

    fn invalid(&self, reason: &str) -> InheritanceError {
        InheritanceError::Validation(format!("attribute '{}': {reason}", self.name))
    }

    fn check_text(&self, s: &str) -> Result<(), InheritanceError> {
        let len = s.chars().count();
        if let Some(min) = self.validation.min_length {
            if len < min {
                return Err(self.invalid(&format!("length must be at least {min}")));
            }
        }
        if let Some(max) = self.validation.max_length {
            if len > max {
                return Err(self.invalid(&format!("length must be at most {max}")));
            }
        }
        if let Some(pattern) = self.validation.pattern.as_deref().filter(|p| !p.is_empty()) {
            let re = Regex::new(pattern)
                .map_err(|e| self.invalid(&format!("invalid pattern '{pattern}': {e}")))?;
            if !re.is_match(s) {
                return Err(self.invalid(&format!("value does not match '{pattern}'")));
            }
        }
        Ok(())
    }

    fn check_number(&self, n: f64) -> Result<(), InheritanceError> {
        if !n.is_finite() {
            return Err(self.invalid("number must be finite"));
        }
        if let Some(min) = self.validation.min {
            if n < min {
                return Err(self.invalid(&format!("must be at least {min}")));
            }
        }
        if let Some(max) = self.validation.max {
            if n > max {
                return Err(self.invalid(&format!("must be at most {max}")));
            }
        }
        Ok(())
    }

    fn check_option(&self, s: &str) -> Result<(), InheritanceError> {
        // no options configured means any value is accepted
        if self.options.is_empty() || self.options.iter().any(|o| o.value == s) {
            return Ok(());
        }
        Err(self.invalid(&format!("'{s}' is not one of the allowed options")))
    }
}

fn is_hex_color(s: &str) -> bool {
    match s.strip_prefix('#') {
        Some(hex) => (hex.len() == 3 || hex.len() == 6) && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}
