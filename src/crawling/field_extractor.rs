//! # Field Extractor
//!
//! Locates and normalizes one field of a loaded document. Every failure
//! (no match, a failing query, text that does not coerce) is a
//! [`FieldMiss`] and resolves to the field's fallback value; nothing
//! escapes [`extract`].

use tracing::debug;

use crate::domain::{FieldKind, FieldSpec, FieldValue};
use crate::infrastructure::session::{DocumentQuery, SessionError};

/// Why a field resolved to its fallback
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldMiss {
    /// Selector matched nothing (or the first match lacks the attribute)
    NotFound,
    /// The query itself failed
    Query(SessionError),
    /// `after` marker absent from the matched text
    MissingMarker,
    /// No decimal digits left after filtering
    NoDigits,
    /// Digits do not fit an `i64`
    Overflow,
}

/// Extract one field, substituting the fallback on any miss
pub fn extract<D: DocumentQuery + ?Sized>(document: &D, spec: &FieldSpec) -> FieldValue {
    match try_extract(document, spec) {
        Ok(value) => value,
        Err(miss) => {
            debug!(field = %spec.name, selector = %spec.selector, ?miss, "Field fell back");
            spec.fallback.clone()
        }
    }
}

/// Extract one field, reporting why it missed
pub fn try_extract<D: DocumentQuery + ?Sized>(
    document: &D,
    spec: &FieldSpec,
) -> Result<FieldValue, FieldMiss> {
    let raw = match spec.attribute.as_deref() {
        Some(attribute) => document.select_attribute(&spec.selector, attribute),
        None => document.select_text(&spec.selector),
    }
    .map_err(FieldMiss::Query)?
    .ok_or(FieldMiss::NotFound)?;

    let text = normalize_whitespace(&raw);
    match spec.kind {
        FieldKind::Text => Ok(FieldValue::Text(text)),
        FieldKind::IntegerFromText => {
            parse_integer(&text, spec.after.as_deref()).map(FieldValue::Integer)
        }
        FieldKind::Boolean => Ok(FieldValue::Boolean(contains_keyword(
            &text,
            spec.keyword.as_deref().unwrap_or_default(),
        ))),
    }
}

/// Collapse whitespace runs to single spaces and trim both ends
#[must_use]
pub fn normalize_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Keep the decimal digits of `text` (after `after`, if given) and parse them
pub fn parse_integer(text: &str, after: Option<&str>) -> Result<i64, FieldMiss> {
    let scope = match after {
        Some(marker) => {
            text.split_once(marker)
                .ok_or(FieldMiss::MissingMarker)?
                .1
        }
        None => text,
    };

    let digits: String = scope.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        return Err(FieldMiss::NoDigits);
    }
    digits.parse().map_err(|_| FieldMiss::Overflow)
}

/// Case-insensitive substring test; an empty keyword never matches
#[must_use]
pub fn contains_keyword(text: &str, keyword: &str) -> bool {
    !keyword.is_empty() && text.to_lowercase().contains(&keyword.to_lowercase())
}
