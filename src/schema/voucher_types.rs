use log::info;
use rusqlite::Connection;

use crate::error::MigrateError;

use super::{run_migration, Migration};

/// Voucher type split
///
/// The old `voucher_types` table described how a discount is computed, so it
/// becomes `voucher_discount_types` (and `vouchers.voucher_type_id` becomes
/// `voucher_discount_type_id`). A new `voucher_types` table then records why
/// a voucher was issued, and every voucher starts out as 'Welcome'.
///
/// Adding a REFERENCES column with a non-NULL default is only allowed with
/// foreign keys off.
pub const SPLIT_VOUCHER_TYPES: Migration = Migration {
    code_fn: Some(log_voucher_type_counts),
    disable_foreign_keys: true,
    fk_check_table: Some("vouchers"),
    ..Migration::sql_only(SPLIT_VOUCHER_TYPES_SQL)
};

pub const SPLIT_VOUCHER_TYPES_SQL: &str = r#"
ALTER TABLE voucher_types RENAME TO voucher_discount_types;
ALTER TABLE vouchers RENAME COLUMN voucher_type_id TO voucher_discount_type_id;

CREATE TABLE voucher_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
);

INSERT INTO voucher_types (name) VALUES
    ('Welcome'),
    ('Repeat'),
    ('Points Redemption'),
    ('Sorry');

ALTER TABLE vouchers
    ADD COLUMN voucher_type_id INTEGER NOT NULL DEFAULT 1 REFERENCES voucher_types(id);
"#;

pub fn split_voucher_types(conn: &mut Connection) -> Result<(), MigrateError> {
    run_migration(conn, "split voucher types", &SPLIT_VOUCHER_TYPES)
}

fn log_voucher_type_counts(conn: &Connection) -> Result<(), MigrateError> {
    let discount_types: i64 =
        conn.query_row("SELECT COUNT(*) FROM voucher_discount_types", [], |row| row.get(0))?;
    let vouchers: i64 = conn.query_row("SELECT COUNT(*) FROM vouchers", [], |row| row.get(0))?;

    info!(
        "Voucher types split: {} discount types kept, {} vouchers set to 'Welcome'",
        discount_types, vouchers
    );

    Ok(())
}
