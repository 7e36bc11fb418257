//! Per-retailer field mapping and conflict rules.
//!
//! A [`FieldMapping`] translates a source's own column names onto the four
//! canonical roles. [`ConflictRules`] names the catalog fields that external
//! input must never overwrite.

use serde::{Deserialize, Serialize};

/// The four canonical roles a source column can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CanonicalField {
    Sku,
    Stock,
    Price,
    Name,
}

impl CanonicalField {
    /// Detection order. Earlier roles claim headers first.
    pub const ALL: [CanonicalField; 4] = [
        CanonicalField::Sku,
        CanonicalField::Stock,
        CanonicalField::Price,
        CanonicalField::Name,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            CanonicalField::Sku => "sku",
            CanonicalField::Stock => "stock",
            CanonicalField::Price => "price",
            CanonicalField::Name => "name",
        }
    }
}

impl std::fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Canonical role → external header name. Absent roles are `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldMapping {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stock: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl FieldMapping {
    #[must_use]
    pub fn get(&self, field: CanonicalField) -> Option<&str> {
        match field {
            CanonicalField::Sku => self.sku.as_deref(),
            CanonicalField::Stock => self.stock.as_deref(),
            CanonicalField::Price => self.price.as_deref(),
            CanonicalField::Name => self.name.as_deref(),
        }
    }

    pub fn set(&mut self, field: CanonicalField, header: impl Into<String>) {
        let header = Some(header.into());
        match field {
            CanonicalField::Sku => self.sku = header,
            CanonicalField::Stock => self.stock = header,
            CanonicalField::Price => self.price = header,
            CanonicalField::Name => self.name = header,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Whether a stored mapping must be re-derived for a batch with `headers`.
    ///
    /// True when the mapping is empty, lacks the stock role, or its SKU header
    /// no longer appears among the batch's headers (template drift).
    #[must_use]
    pub fn needs_detection<S: AsRef<str>>(&self, headers: &[S]) -> bool {
        if self.is_empty() || self.stock.is_none() {
            return true;
        }
        match self.sku.as_deref() {
            Some(sku) => !headers.iter().any(|h| h.as_ref() == sku),
            None => true,
        }
    }
}

/// Conflict rules stored on a sync profile.
///
/// `master_source` is persisted and returned to callers but not consulted by
/// the fusion policy.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub master_source: Option<String>,
    #[serde(default)]
    pub locked_fields: Vec<String>,
}

impl ConflictRules {
    /// Case-insensitive membership test against `locked_fields`.
    #[must_use]
    pub fn is_locked(&self, field: &str) -> bool {
        self.locked_fields
            .iter()
            .any(|f| f.trim().eq_ignore_ascii_case(field))
    }
}
