//! Static vocabulary tables.
//!
//! Each source family names its fields differently; these tables are the only
//! place those names live.

use serde_json::Value;
use smartsync_core::{CanonicalField, FieldMapping};

use crate::RawRow;

/// Literal SKU keys tried, in order, after the mapped SKU header.
pub const SKU_ALIASES: &[&str] = &[
    "sku", "SKU", "Sku", "item_code", "ItemCode", "itemCode", "id", "ID", "Id", "code", "barcode",
];

/// Fields the desktop agent reports in its own snapshot vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentField {
    Sku,
    Stock,
    Price,
    Name,
    Mrp,
    IsActive,
}

/// Agent field → candidate keys, first present key wins.
pub const AGENT_VOCABULARY: &[(AgentField, &[&str])] = &[
    (AgentField::Sku, &["sku", "externalProductId"]),
    (AgentField::Stock, &["quantity", "qty"]),
    (AgentField::Price, &["sellingPrice", "price"]),
    (AgentField::Name, &["name", "productName"]),
    (AgentField::Mrp, &["mrp"]),
    (AgentField::IsActive, &["isActive"]),
];

/// Returns the candidate keys for an agent field.
#[must_use]
pub fn agent_keys(field: AgentField) -> &'static [&'static str] {
    AGENT_VOCABULARY
        .iter()
        .find(|(f, _)| *f == field)
        .map_or(&[], |(_, keys)| *keys)
}

/// The agent vocabulary's primary key per canonical role, recorded as the
/// mapping used for agent snapshots.
#[must_use]
pub fn agent_field_mapping() -> FieldMapping {
    let mut mapping = FieldMapping::default();
    for (canonical, field) in [
        (CanonicalField::Sku, AgentField::Sku),
        (CanonicalField::Stock, AgentField::Stock),
        (CanonicalField::Price, AgentField::Price),
        (CanonicalField::Name, AgentField::Name),
    ] {
        if let Some(key) = agent_keys(field).first() {
            mapping.set(canonical, *key);
        }
    }
    mapping
}

/// First non-null value among `keys`, in order.
#[must_use]
pub fn first_present<'a>(row: &'a RawRow, keys: &[&str]) -> Option<&'a Value> {
    keys.iter()
        .filter_map(|k| row.get(*k))
        .find(|v| !v.is_null())
}
