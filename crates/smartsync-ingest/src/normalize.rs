//! Row normalization: raw rows in, draft records and row-level failures out.
//!
//! A row only fails when no SKU can be resolved. Every other field is coerced
//! tolerantly and never rejects the row.

use rust_decimal::Decimal;
use serde::Serialize;
use smartsync_core::{CanonicalField, FieldMapping};

use crate::parse::{coerce_decimal, coerce_flag, value_to_text};
use crate::vocab::{agent_keys, first_present, AgentField, SKU_ALIASES};
use crate::RawRow;

/// A normalized candidate for fusion, still carrying its source row.
#[derive(Debug, Clone, PartialEq)]
pub struct DraftRecord {
    pub sku: String,
    pub stock: Decimal,
    pub price: Decimal,
    pub name: String,
    /// Only the agent vocabulary reports MRP.
    pub mrp: Option<Decimal>,
    /// Only the agent vocabulary reports an active flag.
    pub is_active: Option<bool>,
    pub raw_row: RawRow,
}

/// A rejected row. `row` is 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowError {
    pub row: usize,
    pub reason: String,
}

impl std::fmt::Display for RowError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Row {}: {}", self.row, self.reason)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Normalized {
    pub drafts: Vec<DraftRecord>,
    pub errors: Vec<RowError>,
}

/// Normalizes tabular rows through a field mapping.
///
/// The SKU comes from the mapped header first, then from the literal
/// [`SKU_ALIASES`]. Stock and price are coerced to decimals (zero when
/// absent); name is the trimmed text or empty.
#[must_use]
pub fn normalize_rows(rows: &[RawRow], mapping: &FieldMapping) -> Normalized {
    let mut out = Normalized::default();

    for (idx, row) in rows.iter().enumerate() {
        let Some(sku) = resolve_tabular_sku(row, mapping) else {
            out.errors.push(missing_sku(
                idx,
                mapping.sku.as_deref().unwrap_or("unmapped"),
            ));
            continue;
        };
        let mapped = |field: CanonicalField| mapping.get(field).and_then(|h| row.get(h));

        out.drafts.push(DraftRecord {
            sku,
            stock: coerce_decimal(mapped(CanonicalField::Stock)),
            price: coerce_decimal(mapped(CanonicalField::Price)),
            name: mapped(CanonicalField::Name)
                .and_then(value_to_text)
                .unwrap_or_default(),
            mrp: None,
            is_active: None,
            raw_row: row.clone(),
        });
    }

    out
}

/// Normalizes agent snapshot products through the fixed agent vocabulary.
#[must_use]
pub fn normalize_agent_products(rows: &[RawRow]) -> Normalized {
    let mut out = Normalized::default();
    let sku_keys = agent_keys(AgentField::Sku);

    for (idx, row) in rows.iter().enumerate() {
        let sku = sku_keys
            .iter()
            .filter_map(|k| row.get(*k))
            .find_map(value_to_text);
        let Some(sku) = sku else {
            out.errors.push(missing_sku(idx, &sku_keys.join("/")));
            continue;
        };

        let field = |f: AgentField| first_present(row, agent_keys(f));

        out.drafts.push(DraftRecord {
            sku,
            stock: coerce_decimal(field(AgentField::Stock)),
            price: coerce_decimal(field(AgentField::Price)),
            name: field(AgentField::Name)
                .and_then(value_to_text)
                .unwrap_or_default(),
            mrp: field(AgentField::Mrp).map(|v| coerce_decimal(Some(v))),
            is_active: field(AgentField::IsActive).and_then(coerce_flag),
            raw_row: row.clone(),
        });
    }

    out
}

fn resolve_tabular_sku(row: &RawRow, mapping: &FieldMapping) -> Option<String> {
    mapping
        .sku
        .as_deref()
        .into_iter()
        .chain(SKU_ALIASES.iter().copied())
        .filter_map(|key| row.get(key))
        .find_map(value_to_text)
}

fn missing_sku(idx: usize, header: &str) -> RowError {
    RowError {
        row: idx + 1,
        reason: format!("Missing SKU (mapping: sku \u{2192} {header})"),
    }
}
