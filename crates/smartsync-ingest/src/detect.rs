//! Format intelligence: infer which header plays which canonical role.
//!
//! The rule table is static and evaluated in a fixed order, so the same header
//! list always yields the same mapping.

use std::sync::LazyLock;

use regex::Regex;
use smartsync_core::{CanonicalField, FieldMapping};

/// `(role, case-insensitive pattern)` in detection order.
const ROLE_PATTERNS: [(CanonicalField, &str); 4] = [
    (
        CanonicalField::Sku,
        r"(?i)sku|item[\s_-]*(code|no|num|number|id)|product[\s_-]*(code|id)|barcode|(^|[\s_-])(upc|ean)($|[\s_-])|^\s*(code|id)\s*$",
    ),
    (
        CanonicalField::Stock,
        r"(?i)qty|quantity|stock|qoh|available|inventory|on[\s_-]*hand",
    ),
    (CanonicalField::Price, r"(?i)price|mrp|rate|cost|amount"),
    (CanonicalField::Name, r"(?i)name|desc|title|product|item"),
];

static COMPILED: LazyLock<Vec<(CanonicalField, Regex)>> = LazyLock::new(|| {
    ROLE_PATTERNS
        .iter()
        .map(|(field, pattern)| (*field, Regex::new(pattern).expect("valid detector pattern")))
        .collect()
});

/// Infers a partial [`FieldMapping`] from an ordered header list.
///
/// For each role in table order, the first header (in the given order) that
/// matches the role's pattern and has not been claimed by an earlier role wins.
/// Roles with no match stay `None`.
#[must_use]
pub fn detect_mapping<S: AsRef<str>>(headers: &[S]) -> FieldMapping {
    let mut mapping = FieldMapping::default();
    let mut claimed = vec![false; headers.len()];

    for (field, pattern) in COMPILED.iter() {
        let hit = headers
            .iter()
            .enumerate()
            .find(|(idx, header)| !claimed[*idx] && pattern.is_match(header.as_ref()));

        if let Some((idx, header)) = hit {
            claimed[idx] = true;
            mapping.set(*field, header.as_ref());
        }
    }

    mapping
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pos_export_headers() {
        let mapping = detect_mapping(&["ItemCode", "QOH", "MRP", "Description"]);
        assert_eq!(mapping.sku.as_deref(), Some("ItemCode"));
        assert_eq!(mapping.stock.as_deref(), Some("QOH"));
        assert_eq!(mapping.price.as_deref(), Some("MRP"));
        assert_eq!(mapping.name.as_deref(), Some("Description"));
    }

    #[test]
    fn detects_plain_english_headers() {
        let mapping = detect_mapping(&["SKU", "Product Name", "Selling Price", "Quantity"]);
        assert_eq!(mapping.sku.as_deref(), Some("SKU"));
        assert_eq!(mapping.stock.as_deref(), Some("Quantity"));
        assert_eq!(mapping.price.as_deref(), Some("Selling Price"));
        assert_eq!(mapping.name.as_deref(), Some("Product Name"));
    }

    #[test]
    fn exact_id_header_is_a_sku() {
        let mapping = detect_mapping(&["id", "name", "stock", "price"]);
        assert_eq!(mapping.sku.as_deref(), Some("id"));
        assert_eq!(mapping.name.as_deref(), Some("name"));
    }

    #[test]
    fn id_inside_a_word_is_not_a_sku() {
        let mapping = detect_mapping(&["Paid", "Valid"]);
        assert!(mapping.sku.is_none());
    }

    #[test]
    fn first_matching_header_wins() {
        let mapping = detect_mapping(&["sku", "qty_available", "stock_on_hand"]);
        assert_eq!(mapping.stock.as_deref(), Some("qty_available"));
    }

    #[test]
    fn claimed_header_is_not_reused_by_later_roles() {
        // "Item Code" satisfies both the sku and the name pattern.
        let mapping = detect_mapping(&["Item Code", "Qty", "Item"]);
        assert_eq!(mapping.sku.as_deref(), Some("Item Code"));
        assert_eq!(mapping.name.as_deref(), Some("Item"));
    }

    #[test]
    fn matching_is_case_insensitive() {
        let mapping = detect_mapping(&["BARCODE", "INVENTORY", "PRICE"]);
        assert_eq!(mapping.sku.as_deref(), Some("BARCODE"));
        assert_eq!(mapping.stock.as_deref(), Some("INVENTORY"));
        assert_eq!(mapping.price.as_deref(), Some("PRICE"));
    }

    #[test]
    fn unknown_headers_yield_empty_mapping() {
        let mapping = detect_mapping(&["foo", "bar"]);
        assert!(mapping.is_empty());
    }

    #[test]
    fn detection_is_deterministic() {
        let headers = ["EAN", "Stock", "Cost", "Title"];
        assert_eq!(detect_mapping(&headers), detect_mapping(&headers));
        assert_eq!(detect_mapping(&headers).sku.as_deref(), Some("EAN"));
    }
}
