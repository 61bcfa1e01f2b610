use rusqlite::Connection;

use crate::error::MigrateError;

use super::{run_migration, Migration};

/// Renames `platform_pricing` to `product_pricing`. Foreign keys are off for
/// the rename; the check afterwards reports any dangling `product_sku`.
pub const RENAME_PLATFORM_PRICING: Migration = Migration {
    disable_foreign_keys: true,
    fk_check_table: Some("product_pricing"),
    ..Migration::sql_only(RENAME_PLATFORM_PRICING_SQL)
};

pub const RENAME_PLATFORM_PRICING_SQL: &str = r#"
ALTER TABLE platform_pricing RENAME TO product_pricing;
"#;

pub fn rename_platform_pricing(conn: &mut Connection) -> Result<(), MigrateError> {
    run_migration(conn, "rename platform pricing", &RENAME_PLATFORM_PRICING)
}
