//! Per-field prompt/model bindings for the extraction backend
//!
//! Each output field of [`ExtractionResult`](crate::ExtractionResult) names
//! the prompt template, the model, and the sampling parameters used to fill
//! it. Bindings are plain data so they can come from TOML and be tested
//! without any backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// An output field of the extraction result
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Field {
    /// Currency code
    Currency,
    /// Explicit total
    Spend,
    /// Line items
    Positions,
    /// Cashier name
    CashierName,
}

impl Field {
    /// All fields in result order
    pub const ALL: [Field; 4] = [Field::Currency, Field::Spend, Field::Positions, Field::CashierName];

    /// Key of this field in the serialized result
    pub fn json_key(&self) -> &'static str {
        match self {
            Field::Currency => "currency",
            Field::Spend => "spend",
            Field::Positions => "positions",
            Field::CashierName => "cachier",
        }
    }

    /// Short description handed to the model alongside the key
    pub fn describe(&self) -> &'static str {
        match self {
            Field::Currency => "ISO 4217 currency code of the purchase, e.g. \"THB\"",
            Field::Spend => "total amount paid as a number, 0 if not stated",
            Field::Positions => "array of purchased items as {\"name\": string, \"price\": number}",
            Field::CashierName => "name of the cashier if printed, otherwise an empty string",
        }
    }
}

/// Errors from parsing the compact binding form
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingParseError {
    /// Path part is not `prompt/<name>/model/<model>`
    InvalidPath(String),
    /// Query parameter is not recognized
    UnknownParameter(String),
    /// Query parameter value does not parse
    InvalidValue {
        /// Parameter name
        key: String,
        /// Offending value
        value: String,
    },
}

impl fmt::Display for BindingParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingParseError::InvalidPath(p) => {
                write!(f, "expected prompt/<name>/model/<model>, got '{}'", p)
            }
            BindingParseError::UnknownParameter(k) => write!(f, "unknown binding parameter '{}'", k),
            BindingParseError::InvalidValue { key, value } => {
                write!(f, "invalid value '{}' for binding parameter '{}'", value, key)
            }
        }
    }
}

impl std::error::Error for BindingParseError {}

/// Prompt, model, and sampling parameters for one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BindingRepr")]
pub struct FieldBinding {
    /// Prompt template name
    pub prompt: String,

    /// Model identifier
    pub model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Top-K sampling cutoff
    pub top_k: u32,
}

impl FieldBinding {
    /// Create a binding with deterministic sampling (temperature 0, top-K 1)
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            temperature: 0.0,
            top_k: 1,
        }
    }

    /// Override the sampling temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Override the top-K cutoff
    pub fn with_top_k(mut self, top_k: u32) -> Self {
        self.top_k = top_k;
        self
    }
}

impl FromStr for FieldBinding {
    type Err = BindingParseError;

    /// Parse `prompt/<name>/model/<model>?temperature=<f>&topK=<n>`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (path, query) = match s.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (s, None),
        };

        let parts: Vec<&str> = path.trim().split('/').collect();
        let mut binding = match parts.as_slice() {
            ["prompt", name, "model", model] if !name.is_empty() && !model.is_empty() => {
                FieldBinding::new(*name, *model)
            }
            _ => return Err(BindingParseError::InvalidPath(path.to_string())),
        };

        for pair in query.into_iter().flat_map(|q| q.split('&')).filter(|p| !p.is_empty()) {
            let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
            let invalid = || BindingParseError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            };
            match key {
                "temperature" => binding.temperature = value.parse().map_err(|_| invalid())?,
                "topK" | "top_k" => binding.top_k = value.parse().map_err(|_| invalid())?,
                _ => return Err(BindingParseError::UnknownParameter(key.to_string())),
            }
        }

        Ok(binding)
    }
}

impl fmt::Display for FieldBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "prompt/{}/model/{}?temperature={:?}&topK={}",
            self.prompt, self.model, self.temperature, self.top_k
        )
    }
}

/// Accepted TOML shapes: the compact string or a table
#[derive(Deserialize)]
#[serde(untagged)]
enum BindingRepr {
    Compact(String),
    Table {
        prompt: String,
        model: String,
        #[serde(default)]
        temperature: f32,
        #[serde(default = "default_top_k")]
        top_k: u32,
    },
}

fn default_top_k() -> u32 {
    1
}

impl TryFrom<BindingRepr> for FieldBinding {
    type Error = BindingParseError;

    fn try_from(repr: BindingRepr) -> Result<Self, Self::Error> {
        match repr {
            BindingRepr::Compact(s) => s.parse(),
            BindingRepr::Table {
                prompt,
                model,
                temperature,
                top_k,
            } => Ok(FieldBinding {
                prompt,
                model,
                temperature,
                top_k,
            }),
        }
    }
}

/// Mapping from output field to its binding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldBindings(BTreeMap<Field, FieldBinding>);

impl FieldBindings {
    /// Empty mapping
    pub fn empty() -> Self {
        Self(BTreeMap::new())
    }

    /// Set the binding for a field
    pub fn bind(mut self, field: Field, binding: FieldBinding) -> Self {
        self.0.insert(field, binding);
        self
    }

    /// Binding for a field, if any
    pub fn get(&self, field: Field) -> Option<&FieldBinding> {
        self.0.get(&field)
    }

    /// Number of bound fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if no field is bound
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Replace bindings with those present in `overrides`
    pub fn merge(mut self, overrides: FieldBindings) -> Self {
        self.0.extend(overrides.0);
        self
    }

    /// Fields grouped by identical binding, in field order.
    ///
    /// Fields that share a prompt, model, and sampling parameters can be
    /// filled by a single backend request.
    pub fn groups(&self) -> Vec<(&FieldBinding, Vec<Field>)> {
        let mut groups: Vec<(&FieldBinding, Vec<Field>)> = Vec::new();
        for (field, binding) in &self.0 {
            match groups.iter_mut().find(|(b, _)| *b == binding) {
                Some((_, fields)) => fields.push(*field),
                None => groups.push((binding, vec![*field])),
            }
        }
        groups
    }
}

impl Default for FieldBindings {
    /// Receipt fields on the large model, the short fields on the fast one
    fn default() -> Self {
        Self::empty()
            .bind(Field::Currency, FieldBinding::new("currency", "gemini-1.5-flash"))
            .bind(Field::Spend, FieldBinding::new("receipt", "gemini-2.5-pro"))
            .bind(Field::Positions, FieldBinding::new("receipt", "gemini-2.5-pro"))
            .bind(Field::CashierName, FieldBinding::new("cachier", "gemini-1.5-flash"))
    }
}
