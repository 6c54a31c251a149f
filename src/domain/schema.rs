//! Record schema: field specifications and typed field values
//!
//! The ordered list of [`FieldSpec`]s defines the shape of every record.
//! Specs are static configuration and are only read at run time.

use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::DomainError;

/// Keys every record carries in addition to the schema fields
pub const RESERVED_KEYS: [&str; 2] = ["id", "url"];

/// How the matched text of a field is normalized into a value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    IntegerFromText,
    Boolean,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => write!(f, "Text"),
            Self::IntegerFromText => write!(f, "IntegerFromText"),
            Self::Boolean => write!(f, "Boolean"),
        }
    }
}

/// A typed field value as it appears in the output artifact
///
/// `Null` is the single "unknown" marker for numeric fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Integer(i64),
    Text(String),
    Null,
}

impl FieldValue {
    /// Returns true if this value is a legal fallback for `kind`
    #[must_use]
    pub const fn is_fallback_for(&self, kind: FieldKind) -> bool {
        matches!(
            (kind, self),
            (FieldKind::Text, Self::Text(_))
                | (FieldKind::IntegerFromText, Self::Null)
                | (FieldKind::Boolean, Self::Boolean(_))
        )
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

/// Describes how to locate and normalize one output field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Output key
    pub name: String,

    /// CSS selector evaluated against the loaded document
    pub selector: String,

    pub kind: FieldKind,

    /// Value substituted when the field cannot be extracted
    pub fallback: FieldValue,

    /// Read this attribute of the matched element instead of its text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,

    /// `IntegerFromText` only: consider the text after the first occurrence of this marker
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,

    /// `Boolean` only: case-insensitive keyword whose presence yields `true`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,
}

impl FieldSpec {
    /// Text field with a string fallback
    pub fn text(name: &str, selector: &str, fallback: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::Text,
            fallback: FieldValue::from(fallback),
            attribute: None,
            after: None,
            keyword: None,
        }
    }

    /// Integer field; missing values are reported as `null`
    pub fn integer(name: &str, selector: &str) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::IntegerFromText,
            fallback: FieldValue::Null,
            attribute: None,
            after: None,
            keyword: None,
        }
    }

    /// Boolean keyword field
    pub fn boolean(name: &str, selector: &str, keyword: &str, fallback: bool) -> Self {
        Self {
            name: name.to_string(),
            selector: selector.to_string(),
            kind: FieldKind::Boolean,
            fallback: FieldValue::Boolean(fallback),
            attribute: None,
            after: None,
            keyword: Some(keyword.to_string()),
        }
    }

    #[must_use]
    pub fn with_attribute(mut self, attribute: &str) -> Self {
        self.attribute = Some(attribute.to_string());
        self
    }

    #[must_use]
    pub fn with_after(mut self, marker: &str) -> Self {
        self.after = Some(marker.to_string());
        self
    }

    /// Check a single spec in isolation
    pub fn validate(&self) -> Result<(), DomainError> {
        let invalid = |reason: &str| DomainError::InvalidFieldSpec {
            field: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if RESERVED_KEYS.contains(&self.name.as_str()) {
            return Err(invalid("name collides with a reserved record key"));
        }
        if self.selector.trim().is_empty() {
            return Err(invalid("selector must not be empty"));
        }
        if !self.fallback.is_fallback_for(self.kind) {
            return Err(invalid(match self.kind {
                FieldKind::Text => "Text fallback must be a string",
                FieldKind::IntegerFromText => "IntegerFromText fallback must be null",
                FieldKind::Boolean => "Boolean fallback must be a boolean",
            }));
        }
        if self.kind == FieldKind::Boolean
            && self.keyword.as_deref().is_none_or(|k| k.trim().is_empty())
        {
            return Err(invalid("Boolean field requires a keyword"));
        }
        Ok(())
    }
}

/// Validate an ordered schema: every spec valid, names unique
pub fn validate_schema(schema: &[FieldSpec]) -> Result<(), DomainError> {
    if schema.is_empty() {
        return Err(DomainError::EmptySchema);
    }

    let mut seen = HashSet::new();
    for spec in schema {
        spec.validate()?;
        if !seen.insert(spec.name.as_str()) {
            return Err(DomainError::InvalidFieldSpec {
                field: spec.name.clone(),
                reason: "duplicate field name".to_string(),
            });
        }
    }
    Ok(())
}
