//! Conflict-resilient fusion: decides which fields of a draft may overwrite
//! the catalog.
//!
//! `None` in a [`CatalogPatch`] means "keep the stored value". The record-level
//! lock (`is_locked` on the stored row) is enforced by the bulk statement,
//! since only the store knows it.

use std::collections::HashMap;

use rust_decimal::Decimal;
use smartsync_core::ConflictRules;

use crate::hash::row_hash;
use crate::normalize::DraftRecord;

/// Field-level write intent for one SKU.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogPatch {
    pub sku: String,
    pub stock: Option<Decimal>,
    pub price: Option<Decimal>,
    pub name: Option<String>,
    pub mrp: Option<Decimal>,
    pub is_active: Option<bool>,
    /// SHA-256 of the draft's raw row. Always stamped.
    pub source_hash: String,
}

/// Applies the overwrite policy to a single draft.
///
/// - stock: written unless locked.
/// - price: written unless locked, and only when positive.
/// - name: written unless locked, and only when non-blank.
/// - mrp: written unless locked, and only when supplied and positive.
/// - is_active: written unless locked, and only when supplied.
#[must_use]
pub fn plan_patch(draft: &DraftRecord, rules: &ConflictRules) -> CatalogPatch {
    let open = |field: &str| !rules.is_locked(field);
    let name = draft.name.trim();

    CatalogPatch {
        sku: draft.sku.clone(),
        stock: open("stock").then_some(draft.stock),
        price: (open("price") && draft.price > Decimal::ZERO).then_some(draft.price),
        name: (open("name") && !name.is_empty()).then(|| name.to_owned()),
        mrp: draft
            .mrp
            .filter(|m| open("mrp") && *m > Decimal::ZERO),
        is_active: draft.is_active.filter(|_| open("isActive")),
        source_hash: row_hash(&draft.raw_row),
    }
}

/// Plans a whole batch, collapsing repeated SKUs into one patch.
///
/// One bulk statement cannot touch the same row twice, so later occurrences
/// are folded onto earlier ones in submission order: a later written field
/// replaces an earlier one, a later skipped field leaves it alone. The result
/// equals applying each draft in turn. Output order follows first appearance.
#[must_use]
pub fn plan_batch(drafts: &[DraftRecord], rules: &ConflictRules) -> Vec<CatalogPatch> {
    let mut patches: Vec<CatalogPatch> = Vec::with_capacity(drafts.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(drafts.len());

    for draft in drafts {
        let patch = plan_patch(draft, rules);
        match index.get(&patch.sku) {
            Some(&at) => merge_into(&mut patches[at], patch),
            None => {
                index.insert(patch.sku.clone(), patches.len());
                patches.push(patch);
            }
        }
    }

    if patches.len() < drafts.len() {
        tracing::debug!(
            drafts = drafts.len(),
            patches = patches.len(),
            "collapsed duplicate SKUs in batch"
        );
    }

    patches
}

fn merge_into(target: &mut CatalogPatch, later: CatalogPatch) {
    target.stock = later.stock.or(target.stock);
    target.price = later.price.or(target.price);
    target.name = later.name.or(target.name.take());
    target.mrp = later.mrp.or(target.mrp);
    target.is_active = later.is_active.or(target.is_active);
    target.source_hash = later.source_hash;
}

#[cfg(test)]
#[path = "fusion_test.rs"]
mod tests;
