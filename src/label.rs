//! Output types: the allergen / nutrition record and its closed vocabularies.
//!
//! Both vocabularies are enums rather than string keys so that a
//! [`LabelData`] can never carry a key outside the fixed set. Model output is
//! untrusted: [`LabelData::from_model_json`] walks the returned JSON, keeps
//! the keys it recognises and drops the rest.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Allergens tracked per label. Serialised as their snake_case key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Allergen {
    Gluten,
    Egg,
    Crustaceans,
    Fish,
    Peanut,
    Soy,
    Milk,
    TreeNuts,
    Celery,
    Mustard,
}

impl Allergen {
    pub const ALL: [Allergen; 10] = [
        Allergen::Gluten,
        Allergen::Egg,
        Allergen::Crustaceans,
        Allergen::Fish,
        Allergen::Peanut,
        Allergen::Soy,
        Allergen::Milk,
        Allergen::TreeNuts,
        Allergen::Celery,
        Allergen::Mustard,
    ];

    /// JSON key used in prompts and responses.
    pub fn key(self) -> &'static str {
        match self {
            Allergen::Gluten => "gluten",
            Allergen::Egg => "egg",
            Allergen::Crustaceans => "crustaceans",
            Allergen::Fish => "fish",
            Allergen::Peanut => "peanut",
            Allergen::Soy => "soy",
            Allergen::Milk => "milk",
            Allergen::TreeNuts => "tree_nuts",
            Allergen::Celery => "celery",
            Allergen::Mustard => "mustard",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|a| a.key() == key)
    }
}

impl fmt::Display for Allergen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Nutrients read from the nutrition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Nutrient {
    Energy,
    Fat,
    Carbohydrate,
    Sugar,
    Protein,
    Sodium,
}

impl Nutrient {
    pub const ALL: [Nutrient; 6] = [
        Nutrient::Energy,
        Nutrient::Fat,
        Nutrient::Carbohydrate,
        Nutrient::Sugar,
        Nutrient::Protein,
        Nutrient::Sodium,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Nutrient::Energy => "energy",
            Nutrient::Fat => "fat",
            Nutrient::Carbohydrate => "carbohydrate",
            Nutrient::Sugar => "sugar",
            Nutrient::Protein => "protein",
            Nutrient::Sodium => "sodium",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.key() == key)
    }
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Structured result of one label extraction.
///
/// A normal result has every vocabulary key present; `None` serialises as
/// `null` and means the label did not say. A degraded result (provider quota
/// exhausted) has `fallback: true`, a `message`, and empty maps.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct LabelData {
    pub allergens: BTreeMap<Allergen, Option<bool>>,
    pub nutritional_values: BTreeMap<Nutrient, Option<String>>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub fallback: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Why a model response could not be turned into a [`LabelData`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaViolation(pub String);

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl LabelData {
    /// Every key present, every value unknown.
    pub fn unknown() -> Self {
        Self {
            allergens: Allergen::ALL.into_iter().map(|a| (a, None)).collect(),
            nutritional_values: Nutrient::ALL.into_iter().map(|n| (n, None)).collect(),
            fallback: false,
            message: None,
        }
    }

    /// Degraded result returned when the provider refuses for quota reasons.
    pub fn quota_fallback(message: impl Into<String>) -> Self {
        Self {
            allergens: BTreeMap::new(),
            nutritional_values: BTreeMap::new(),
            fallback: true,
            message: Some(message.into()),
        }
    }

    /// Validate a parsed model response against the schema.
    ///
    /// Lenient about values (a non-boolean allergen or a non-string nutrient
    /// becomes unknown, a numeric nutrient is kept as its decimal text) but
    /// strict about shape: the root and both sections must be JSON objects
    /// when present. Missing sections leave every key unknown.
    pub fn from_model_json(value: &Value) -> Result<Self, SchemaViolation> {
        let root = value
            .as_object()
            .ok_or_else(|| SchemaViolation(format!("expected a JSON object, got {}", kind(value))))?;

        let mut data = Self::unknown();

        if let Some(section) = section(root, "allergens")? {
            for (key, v) in section {
                let Some(allergen) = Allergen::from_key(key) else {
                    debug!("Dropping unknown allergen key '{}'", key);
                    continue;
                };
                data.allergens.insert(allergen, v.as_bool());
            }
        }

        if let Some(section) = section(root, "nutritional_values")? {
            for (key, v) in section {
                let Some(nutrient) = Nutrient::from_key(key) else {
                    debug!("Dropping unknown nutrient key '{}'", key);
                    continue;
                };
                data.nutritional_values.insert(nutrient, nutrient_value(v));
            }
        }

        Ok(data)
    }

    /// Allergens the label declares as present.
    pub fn present_allergens(&self) -> impl Iterator<Item = Allergen> + '_ {
        self.allergens
            .iter()
            .filter(|(_, v)| **v == Some(true))
            .map(|(a, _)| *a)
    }
}

fn section<'a>(
    root: &'a serde_json::Map<String, Value>,
    name: &str,
) -> Result<Option<&'a serde_json::Map<String, Value>>, SchemaViolation> {
    match root.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(other) => Err(SchemaViolation(format!(
            "'{}' must be an object, got {}",
            name,
            kind(other)
        ))),
    }
}

fn nutrient_value(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
