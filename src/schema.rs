//! Request schemas and validation
//!
//! A [`SchemaDescriptor`] is the ordered list of input fields a model was
//! trained on. [`validate`] is the only place where an unordered request
//! record is turned into a positionally significant [`ValidatedRow`].

use crate::error::{PredictError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Untyped request record, field name to value. Unknown keys are ignored.
pub type RawRequest = Map<String, Value>;

/// Ordered set of numeric input fields expected by one model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaDescriptor {
    name: &'static str,
    fields: &'static [&'static str],
}

impl SchemaDescriptor {
    /// Declare a schema. Field order must match the training column order.
    pub const fn new(name: &'static str, fields: &'static [&'static str]) -> Self {
        Self { name, fields }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &'static [&'static str] {
        self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Whether `names` lists exactly this schema's fields in the same order
    pub fn matches<S: AsRef<str>>(&self, names: &[S]) -> bool {
        names.len() == self.fields.len()
            && names
                .iter()
                .zip(self.fields)
                .all(|(name, field)| name.as_ref() == *field)
    }
}

impl fmt::Display for SchemaDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.fields.join(", "))
    }
}

/// How field values are checked against the numeric domain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericPolicy {
    /// Only JSON numbers are accepted
    #[default]
    Strict,
    /// Numeric strings and booleans are coerced as well
    Lenient,
}

/// Schema-ordered numeric row, built fresh for every request
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRow {
    values: Vec<f64>,
}

impl ValidatedRow {
    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Pair each value with its schema field name, for logging
    pub fn labelled(&self, schema: &SchemaDescriptor) -> Map<String, Value> {
        schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| ((*field).to_string(), Value::from(*value)))
            .collect()
    }
}

impl From<Vec<f64>> for ValidatedRow {
    fn from(values: Vec<f64>) -> Self {
        Self { values }
    }
}

/// Check `raw` against `schema` and build the ordered row.
///
/// Presence is checked first and every missing field is reported at once.
/// Type checks only run once nothing is missing.
pub fn validate(
    raw: &RawRequest,
    schema: &SchemaDescriptor,
    policy: NumericPolicy,
) -> Result<ValidatedRow> {
    let missing: Vec<String> = schema
        .fields()
        .iter()
        .filter(|field| !raw.contains_key(**field))
        .map(|field| (*field).to_string())
        .collect();
    if !missing.is_empty() {
        return Err(PredictError::MissingFields { fields: missing });
    }

    let mut values = Vec::with_capacity(schema.len());
    let mut invalid = Vec::new();
    for field in schema.fields() {
        match raw.get(*field).and_then(|value| to_number(value, policy)) {
            Some(number) => values.push(number),
            None => invalid.push((*field).to_string()),
        }
    }
    if !invalid.is_empty() {
        return Err(PredictError::InvalidFields { fields: invalid });
    }

    Ok(ValidatedRow { values })
}

fn to_number(value: &Value, policy: NumericPolicy) -> Option<f64> {
    let number = match (value, policy) {
        (Value::Number(n), _) => n.as_f64(),
        (Value::String(s), NumericPolicy::Lenient) => s.trim().parse::<f64>().ok(),
        (Value::Bool(b), NumericPolicy::Lenient) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    number.filter(|n| n.is_finite())
}
