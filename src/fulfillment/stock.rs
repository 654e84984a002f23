//! Stock ledger: per-variant inventory movements.
//!
//! Both directions are best-effort per line. A stock shortfall must never
//! roll back a paid order, so these functions log and keep going instead of
//! returning errors; a variant stuck at zero surfaces in admin review.

use rusqlite::Connection;

use crate::db::queries;

/// One stock movement: quantity of a specific variant.
#[derive(Debug, Clone)]
pub struct StockLine {
    pub product_id: String,
    pub variant_id: String,
    pub quantity: i64,
}

/// Deduct stock for every line of a paid order.
pub fn deduct(conn: &Connection, lines: &[StockLine]) {
    for line in lines {
        match queries::deduct_variant_stock(conn, &line.variant_id, line.quantity) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    "Stock deduction skipped for variant {} (product {}): unknown variant or fewer than {} in stock",
                    line.variant_id,
                    line.product_id,
                    line.quantity
                );
            }
            Err(e) => {
                tracing::error!(
                    "Stock deduction failed for variant {}: {}",
                    line.variant_id,
                    e
                );
            }
        }
    }
}

/// Restore stock for every line of a refunded order.
pub fn restore(conn: &Connection, lines: &[StockLine]) {
    for line in lines {
        match queries::restore_variant_stock(conn, &line.variant_id, line.quantity) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(
                    "Stock restore skipped for variant {}: variant no longer exists",
                    line.variant_id
                );
            }
            Err(e) => {
                tracing::error!(
                    "Stock restore failed for variant {}: {}",
                    line.variant_id,
                    e
                );
            }
        }
    }
}
