//! Database operations for `catalog_products`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use smartsync_ingest::CatalogPatch;
use sqlx::PgPool;
use uuid::Uuid;

use crate::DbError;

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// A row from the `catalog_products` table.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CatalogProductRow {
    pub id: i64,
    pub retailer_id: Uuid,
    pub sku: String,
    pub name: String,
    pub price: Decimal,
    pub mrp: Decimal,
    pub stock: Decimal,
    pub is_active: bool,
    pub tax_rate: Decimal,
    pub unit: String,
    pub image_status: String,
    pub barcode: Option<String>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub external_id: Option<String>,
    pub source_hash: Option<String>,
    pub is_locked: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a delta push for one SKU that exists in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct DeltaOutcome {
    pub sku: String,
    /// `false` when the record-level lock kept the stock unchanged.
    pub applied: bool,
}

const PRODUCT_COLUMNS: &str = "id, retailer_id, sku, name, price, mrp, stock, is_active, \
     tax_rate, unit, image_status, barcode, last_synced_at, external_id, source_hash, \
     is_locked, created_at, updated_at";

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

/// Applies a batch of fusion patches in a single `INSERT ... ON CONFLICT`
/// statement.
///
/// New SKUs are created with defaults (`unit = 'pcs'`, `image_status =
/// 'pending'`, `barcode = sku`) plus whatever the patch carries. Existing SKUs
/// only take the fields the patch sets; a record with `is_locked` keeps every
/// field. Provenance (`last_synced_at`, `external_id`, `source_hash`) is
/// always stamped.
///
/// Patches must have unique SKUs; [`smartsync_ingest::plan_batch`]
/// guarantees that. Rows are written in SKU order so that concurrent batches
/// over the same SKUs take row locks in the same order.
///
/// Returns the number of rows inserted or updated.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the statement fails.
pub async fn bulk_upsert_catalog(
    pool: &PgPool,
    retailer_id: Uuid,
    patches: &[CatalogPatch],
) -> Result<u64, DbError> {
    if patches.is_empty() {
        return Ok(0);
    }

    let skus: Vec<&str> = patches.iter().map(|p| p.sku.as_str()).collect();
    let stocks: Vec<Option<Decimal>> = patches.iter().map(|p| p.stock).collect();
    let prices: Vec<Option<Decimal>> = patches.iter().map(|p| p.price).collect();
    let names: Vec<Option<&str>> = patches.iter().map(|p| p.name.as_deref()).collect();
    let mrps: Vec<Option<Decimal>> = patches.iter().map(|p| p.mrp).collect();
    let actives: Vec<Option<bool>> = patches.iter().map(|p| p.is_active).collect();
    let hashes: Vec<&str> = patches.iter().map(|p| p.source_hash.as_str()).collect();

    // The conflict branch reads the nullable intent from `incoming`, since
    // EXCLUDED only carries the defaulted insert values.
    let result = sqlx::query(
        "WITH incoming AS ( \
             SELECT * FROM UNNEST($2::text[], $3::numeric[], $4::numeric[], $5::text[], \
                                  $6::numeric[], $7::boolean[], $8::text[]) \
               AS t(sku, stock, price, name, mrp, is_active, source_hash) \
         ) \
         INSERT INTO catalog_products \
             (retailer_id, sku, name, price, mrp, stock, is_active, unit, image_status, \
              barcode, last_synced_at, external_id, source_hash) \
         SELECT $1, i.sku, COALESCE(i.name, ''), COALESCE(i.price, 0), COALESCE(i.mrp, 0), \
                COALESCE(i.stock, 0), COALESCE(i.is_active, TRUE), 'pcs', 'pending', \
                i.sku, NOW(), i.sku, i.source_hash \
         FROM incoming i \
         ORDER BY i.sku \
         ON CONFLICT (retailer_id, sku) DO UPDATE SET \
             stock = CASE WHEN catalog_products.is_locked THEN catalog_products.stock \
                 ELSE COALESCE((SELECT i.stock FROM incoming i WHERE i.sku = EXCLUDED.sku), \
                               catalog_products.stock) END, \
             price = CASE WHEN catalog_products.is_locked THEN catalog_products.price \
                 ELSE COALESCE((SELECT i.price FROM incoming i WHERE i.sku = EXCLUDED.sku), \
                               catalog_products.price) END, \
             name = CASE WHEN catalog_products.is_locked THEN catalog_products.name \
                 ELSE COALESCE((SELECT i.name FROM incoming i WHERE i.sku = EXCLUDED.sku), \
                               catalog_products.name) END, \
             mrp = CASE WHEN catalog_products.is_locked THEN catalog_products.mrp \
                 ELSE COALESCE((SELECT i.mrp FROM incoming i WHERE i.sku = EXCLUDED.sku), \
                               catalog_products.mrp) END, \
             is_active = CASE WHEN catalog_products.is_locked THEN catalog_products.is_active \
                 ELSE COALESCE((SELECT i.is_active FROM incoming i WHERE i.sku = EXCLUDED.sku), \
                               catalog_products.is_active) END, \
             last_synced_at = NOW(), \
             external_id = EXCLUDED.sku, \
             source_hash = EXCLUDED.source_hash, \
             updated_at = NOW()",
    )
    .bind(retailer_id)
    .bind(&skus)
    .bind(&stocks)
    .bind(&prices)
    .bind(&names)
    .bind(&mrps)
    .bind(&actives)
    .bind(&hashes)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Adds signed stock deltas atomically (`stock = stock + delta`).
///
/// Repeated SKUs are summed. Only SKUs that exist for the retailer come back;
/// callers treat the rest as unknown. A record-level lock leaves the stock
/// untouched and is reported with `applied = false`. Target rows are locked in
/// SKU order before the update.
///
/// # Errors
///
/// Returns [`DbError::Sqlx`] if the update fails.
pub async fn apply_stock_deltas(
    pool: &PgPool,
    retailer_id: Uuid,
    deltas: &[(String, Decimal)],
) -> Result<Vec<DeltaOutcome>, DbError> {
    if deltas.is_empty() {
        return Ok(Vec::new());
    }

    let skus: Vec<&str> = deltas.iter().map(|(sku, _)| sku.as_str()).collect();
    let amounts: Vec<Decimal> = deltas.iter().map(|(_, d)| *d).collect();

    let mut tx = pool.begin().await?;

    sqlx::query(
        "SELECT id FROM catalog_products \
         WHERE retailer_id = $1 AND sku = ANY($2::text[]) \
         ORDER BY sku \
         FOR UPDATE",
    )
    .bind(retailer_id)
    .bind(&skus)
    .fetch_all(&mut *tx)
    .await?;

    let rows = sqlx::query_as::<_, DeltaOutcome>(
        "UPDATE catalog_products c \
         SET stock = CASE WHEN c.is_locked THEN c.stock ELSE c.stock + d.delta END, \
             last_synced_at = NOW(), \
             updated_at = NOW() \
         FROM ( \
             SELECT sku, SUM(delta) AS delta \
             FROM UNNEST($2::text[], $3::numeric[]) AS t(sku, delta) \
             GROUP BY sku \
         ) d \
         WHERE c.retailer_id = $1 AND c.sku = d.sku \
         RETURNING c.sku, NOT c.is_locked AS applied",
    )
    .bind(retailer_id)
    .bind(&skus)
    .bind(&amounts)
    .fetch_all(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(rows)
}

/// Sets or clears the record-level lock on one product.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if the SKU does not exist for the retailer,
/// or [`DbError::Sqlx`] if the update fails.
pub async fn set_record_lock(
    pool: &PgPool,
    retailer_id: Uuid,
    sku: &str,
    locked: bool,
) -> Result<(), DbError> {
    let result = sqlx::query(
        "UPDATE catalog_products SET is_locked = $3, updated_at = NOW() \
         WHERE retailer_id = $1 AND sku = $2",
    )
    .bind(retailer_id)
    .bind(sku)
    .bind(locked)
    .execute(pool)
    .await?;

    if result.rows_affected() == 0 {
        return Err(DbError::NotFound);
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Fetches one product by its natural key.
///
/// # Errors
///
/// Returns [`DbError::NotFound`] if no row matches, or [`DbError::Sqlx`] on
/// query failure.
pub async fn get_catalog_product(
    pool: &PgPool,
    retailer_id: Uuid,
    sku: &str,
) -> Result<CatalogProductRow, DbError> {
    sqlx::query_as::<_, CatalogProductRow>(&format!(
        "SELECT {PRODUCT_COLUMNS} FROM catalog_products WHERE retailer_id = $1 AND sku = $2"
    ))
    .bind(retailer_id)
    .bind(sku)
    .fetch_optional(pool)
    .await?
    .ok_or(DbError::NotFound)
}
