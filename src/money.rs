use log::{debug, info, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::error::MigrateError;

/// Table → monetary columns stored as decimal currency units.
pub const MONEY_COLUMNS: &[(&str, &[&str])] = &[
    ("products", &["cost"]),
    ("product_pricing", &["sell_price", "competitor_price"]),
    ("purchases", &["total_amount_paid", "total_amount_paid_sgd"]),
    (
        "purchase_items",
        &[
            "unit_cost",
            "unit_cost_sgd",
            "total_cost",
            "total_cost_sgd",
            "shipping_fee",
            "shipping_fee_sgd",
            "other_fee",
            "other_fee_sgd",
        ],
    ),
    ("finance_entries", &["amount"]),
    ("vouchers", &["min_spend", "discount", "max_discount"]),
];

/// Columns that were rescaled twice and need dividing back down.
pub const REPAIR_COLUMNS: &[(&str, &[&str])] = &[
    ("products", &["cost"]),
    ("product_pricing", &["sell_price", "competitor_price"]),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rescale {
    /// Multiply by 100: currency units to cents
    ToCents,
    /// Divide by 100: undoes a duplicated `ToCents`
    FromCents,
}

impl Rescale {
    fn expression(&self, column: &str) -> String {
        match self {
            Rescale::ToCents => format!("CAST(ROUND({column} * 100, 0) AS INTEGER)"),
            Rescale::FromCents => format!("CAST(ROUND({column} / 100.0, 0) AS INTEGER)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescaleMode {
    /// Every non-null value is rescaled
    All,
    /// Only values with a fractional part are rescaled; whole numbers are
    /// taken to be cents already
    FractionalOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRescale {
    pub table: &'static str,
    pub column: &'static str,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RescaleSummary {
    pub columns: Vec<ColumnRescale>,
}

impl RescaleSummary {
    pub fn total_rows(&self) -> usize {
        self.columns.iter().map(|c| c.rows).sum()
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Builds the single-statement update for one column. Nulls are never touched.
pub fn update_sql(table: &str, column: &str, rescale: Rescale, mode: RescaleMode) -> String {
    let table = quote_ident(table);
    let column = quote_ident(column);
    let expression = rescale.expression(&column);

    let mut sql = format!("UPDATE {table} SET {column} = {expression} WHERE {column} IS NOT NULL");
    if mode == RescaleMode::FractionalOnly {
        sql.push_str(&format!(" AND {column} <> CAST({column} AS INTEGER)"));
    }
    sql
}

/// Applies `rescale` to every (table, column) pair in `mapping`.
///
/// All updates share one transaction which is committed only after the last
/// column succeeds. Any failure (missing table or column, locked file)
/// returns early and the dropped transaction rolls back every prior update.
///
/// Not idempotent: running `ToCents` twice in `All` mode scales by 10000.
pub fn rescale_columns(
    conn: &mut Connection,
    mapping: &[(&'static str, &'static [&'static str])],
    rescale: Rescale,
    mode: RescaleMode,
) -> Result<RescaleSummary, MigrateError> {
    let _tmr = timer!(Level::Info; "rescale_columns", "{:?} {:?}", rescale, mode);

    let tx = conn.transaction()?;
    let mut summary = RescaleSummary::default();

    for &(table, columns) in mapping {
        for &column in columns {
            let sql = update_sql(table, column, rescale, mode);
            debug!("{}", sql);

            let rows = tx.execute(&sql, [])?;
            info!("{:?} {}.{}: {} rows updated", rescale, table, column, rows);

            summary.columns.push(ColumnRescale {
                table,
                column,
                rows,
            });
        }
    }

    tx.commit()?;

    info!(
        "{:?} committed: {} rows across {} columns",
        rescale,
        summary.total_rows(),
        summary.columns.len()
    );

    Ok(summary)
}

/// Rescales every monetary column from currency units to integer cents.
pub fn convert_to_cents(
    conn: &mut Connection,
    mode: RescaleMode,
) -> Result<RescaleSummary, MigrateError> {
    rescale_columns(conn, MONEY_COLUMNS, Rescale::ToCents, mode)
}

/// Divides the product cost and pricing columns by 100.
pub fn repair_downscale(conn: &mut Connection) -> Result<RescaleSummary, MigrateError> {
    rescale_columns(conn, REPAIR_COLUMNS, Rescale::FromCents, RescaleMode::All)
}

/// `voucher_discount_types.key` of discounts expressed as a percentage.
pub const PERCENTAGE_DISCOUNT_KEY: &str = "percentage";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VoucherRescaleSummary {
    pub vouchers: usize,
    pub percentage_discounts: usize,
}

fn has_fraction(value: f64) -> bool {
    value.fract() != 0.0
}

/// Fractional amounts are taken to be currency units and become cents;
/// whole amounts are taken to be cents already.
pub fn normalize_money(value: Option<f64>) -> Option<i64> {
    let value = value.filter(|v| v.is_finite())?;
    if has_fraction(value) {
        Some((value * 100.0).round() as i64)
    } else {
        Some(value as i64)
    }
}

/// Percentage discounts up to 100 (or fractional) become basis points.
/// Larger whole percentages are taken to be basis points already. Every
/// other discount is money and goes through `normalize_money`.
pub fn normalize_discount(value: Option<f64>, discount_key: Option<&str>) -> Option<i64> {
    if discount_key != Some(PERCENTAGE_DISCOUNT_KEY) {
        return normalize_money(value);
    }

    let value = value.filter(|v| v.is_finite())?;
    if has_fraction(value) || value <= 100.0 {
        Some((value * 100.0).round() as i64)
    } else {
        Some(value as i64)
    }
}

struct VoucherRow {
    id: i64,
    min_spend: Option<f64>,
    discount: Option<f64>,
    max_discount: Option<f64>,
    discount_key: Option<String>,
}

/// Rewrites every voucher's amounts as cents and its percentage discount as
/// basis points, in one transaction.
pub fn convert_vouchers_to_cents_bps(
    conn: &mut Connection,
) -> Result<VoucherRescaleSummary, MigrateError> {
    let _tmr = timer!(Level::Info; "convert_vouchers_to_cents_bps");

    let tx = conn.transaction()?;
    let mut summary = VoucherRescaleSummary::default();

    {
        let mut select_stmt = tx.prepare(
            "SELECT v.id, v.min_spend, v.discount, v.max_discount, dt.key
             FROM vouchers v
             LEFT JOIN voucher_discount_types dt ON dt.id = v.voucher_discount_type_id
             ORDER BY v.id",
        )?;

        let rows: Vec<VoucherRow> = select_stmt
            .query_map([], |row| {
                Ok(VoucherRow {
                    id: row.get(0)?,
                    min_spend: row.get(1)?,
                    discount: row.get(2)?,
                    max_discount: row.get(3)?,
                    discount_key: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut update_stmt = tx.prepare(
            "UPDATE vouchers SET min_spend = ?1, discount = ?2, max_discount = ?3 WHERE id = ?4",
        )?;

        for row in &rows {
            let discount_key = row.discount_key.as_deref();
            if discount_key == Some(PERCENTAGE_DISCOUNT_KEY) {
                summary.percentage_discounts += 1;
            }

            update_stmt.execute(rusqlite::params![
                normalize_money(row.min_spend),
                normalize_discount(row.discount, discount_key),
                normalize_money(row.max_discount),
                row.id
            ])?;
        }

        summary.vouchers = rows.len();
    }

    tx.commit()?;

    info!(
        "Updated {} voucher rows to cents/basis points ({} percentage discounts)",
        summary.vouchers, summary.percentage_discounts
    );

    Ok(summary)
}
