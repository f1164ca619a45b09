//! Fixed POI field vocabulary and normalized field sets.
//!
//! The correctable surface of a POI is a closed schema: every field has a
//! wire name (what submitters send), a destination predicate (where the
//! value lands in the canonical graph), and a literal kind. Unknown wire
//! names are dropped silently; a wrong type for a known field is a
//! validation error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Vocabulary
// ============================================================================

/// The closed set of correctable POI fields.
///
/// Variants are declared in wire-name alphabetical order so the derived
/// `Ord` matches lexicographic wire-name order (the fingerprint and the
/// statement compiler both iterate `FieldSet` in that order).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum PoiField {
    AccessibleToilet,
    Email,
    Note,
    OpeningHours,
    PriceLevel,
    Telephone,
    Website,
    WheelchairAccess,
}

/// Literal kind of a field, exhaustive over [`PoiField`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Free-form string literal.
    Text,
    /// String literal restricted to a fixed set of values.
    Choice(&'static [&'static str]),
    /// Boolean literal.
    Flag,
    /// Integer literal.
    Number,
}

const WHEELCHAIR_LEVELS: &[&str] = &["yes", "no", "limited"];

impl PoiField {
    pub const ALL: [PoiField; 8] = [
        PoiField::AccessibleToilet,
        PoiField::Email,
        PoiField::Note,
        PoiField::OpeningHours,
        PoiField::PriceLevel,
        PoiField::Telephone,
        PoiField::Website,
        PoiField::WheelchairAccess,
    ];

    /// Name used in submissions and in the canonical fingerprint string.
    pub fn wire_name(self) -> &'static str {
        match self {
            PoiField::AccessibleToilet => "accessible_toilet",
            PoiField::Email => "email",
            PoiField::Note => "note",
            PoiField::OpeningHours => "opening_hours",
            PoiField::PriceLevel => "price_level",
            PoiField::Telephone => "telephone",
            PoiField::Website => "website",
            PoiField::WheelchairAccess => "wheelchair_access",
        }
    }

    pub fn from_wire_name(name: &str) -> Option<Self> {
        PoiField::ALL.iter().copied().find(|f| f.wire_name() == name)
    }

    /// Destination predicate in the canonical graph vocabulary (CURIE form;
    /// the statement compiler emits the matching PREFIX declarations).
    pub fn predicate(self) -> &'static str {
        match self {
            PoiField::AccessibleToilet => "mm:accessibleToilet",
            PoiField::Email => "schema:email",
            PoiField::Note => "mm:note",
            PoiField::OpeningHours => "schema:openingHours",
            PoiField::PriceLevel => "mm:priceLevel",
            PoiField::Telephone => "schema:telephone",
            PoiField::Website => "schema:url",
            PoiField::WheelchairAccess => "mm:wheelchairAccess",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            PoiField::AccessibleToilet => FieldKind::Flag,
            PoiField::Email => FieldKind::Text,
            PoiField::Note => FieldKind::Text,
            PoiField::OpeningHours => FieldKind::Text,
            PoiField::PriceLevel => FieldKind::Number,
            PoiField::Telephone => FieldKind::Text,
            PoiField::Website => FieldKind::Text,
            PoiField::WheelchairAccess => FieldKind::Choice(WHEELCHAIR_LEVELS),
        }
    }
}

impl fmt::Display for PoiField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

// ============================================================================
// Values
// ============================================================================

/// A typed field value. `Choice` fields are carried as `Text` after
/// validation against the allowed set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Flag(bool),
    Number(i64),
    Text(String),
}

impl FieldValue {
    /// Canonical rendering used by the fingerprint: `true`/`false`, decimal
    /// integers, raw text. Stable across processes.
    pub fn render(&self) -> String {
        match self {
            FieldValue::Flag(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
        }
    }
}

/// Errors raised while normalizing submitted field pairs.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FieldError {
    #[error("field '{field}' expects a {expected} value, got {got}")]
    TypeMismatch {
        field: &'static str,
        expected: &'static str,
        got: String,
    },
    #[error("field '{field}' does not accept '{value}' (allowed: {allowed})")]
    InvalidChoice {
        field: &'static str,
        value: String,
        allowed: String,
    },
}

// ============================================================================
// Field sets
// ============================================================================

/// An ordered, normalized mapping from fields to values.
///
/// Construction via [`FieldSet::from_pairs`] guarantees: no unknown fields,
/// no null/empty values, every value matches its field's kind. Iteration
/// order is wire-name lexicographic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldSet(BTreeMap<PoiField, FieldValue>);

impl FieldSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize raw submitted pairs into a field set.
    ///
    /// Unknown names and absent/empty values are dropped, never errors;
    /// a known field with a value of the wrong type is rejected.
    pub fn from_pairs<I>(pairs: I) -> Result<Self, FieldError>
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let mut set = BTreeMap::new();
        for (name, raw) in pairs {
            let Some(field) = PoiField::from_wire_name(&name) else {
                continue;
            };
            if let Some(value) = normalize_value(field, raw)? {
                set.insert(field, value);
            }
        }
        Ok(FieldSet(set))
    }

    pub fn insert(&mut self, field: PoiField, value: FieldValue) {
        self.0.insert(field, value);
    }

    pub fn get(&self, field: PoiField) -> Option<&FieldValue> {
        self.0.get(&field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoiField, &FieldValue)> {
        self.0.iter().map(|(f, v)| (*f, v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn normalize_value(
    field: PoiField,
    raw: serde_json::Value,
) -> Result<Option<FieldValue>, FieldError> {
    use serde_json::Value;

    // Absent values never reach the fingerprint or the compiled statements.
    match &raw {
        Value::Null => return Ok(None),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        _ => {}
    }

    let rendered = raw.to_string();
    let mismatch = move |expected: &'static str| FieldError::TypeMismatch {
        field: field.wire_name(),
        expected,
        got: rendered,
    };

    match field.kind() {
        FieldKind::Text => match raw {
            Value::String(s) => Ok(Some(FieldValue::Text(s.trim().to_string()))),
            _ => Err(mismatch("string")),
        },
        FieldKind::Choice(allowed) => match raw {
            Value::String(s) => {
                let s = s.trim().to_string();
                if allowed.contains(&s.as_str()) {
                    Ok(Some(FieldValue::Text(s)))
                } else {
                    Err(FieldError::InvalidChoice {
                        field: field.wire_name(),
                        value: s,
                        allowed: allowed.join(", "),
                    })
                }
            }
            _ => Err(mismatch("string")),
        },
        FieldKind::Flag => match raw {
            Value::Bool(b) => Ok(Some(FieldValue::Flag(b))),
            _ => Err(mismatch("boolean")),
        },
        FieldKind::Number => match raw {
            Value::Number(n) => n
                .as_i64()
                .map(|n| Some(FieldValue::Number(n)))
                .ok_or_else(|| mismatch("integer")),
            _ => Err(mismatch("integer")),
        },
    }
}
