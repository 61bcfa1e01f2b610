mod platform_pricing;
mod product_statuses;
mod voucher_types;

use log::{error, info, warn, Level};
use logging_timer::timer;
use rusqlite::Connection;

use crate::database::Database;
use crate::error::MigrateError;

pub use platform_pricing::rename_platform_pricing;
pub use product_statuses::normalize_product_statuses;
pub use voucher_types::split_voucher_types;

/// Function type for migration code that inspects or transforms data between
/// the SQL phases.
pub type MigrationFn = fn(&Connection) -> Result<(), MigrateError>;

/// Migration descriptor supporting 3-phase migrations:
/// - pre_sql: SQL batch to run before Rust code (optional)
/// - code_fn: Rust function for checks or transformations (optional)
/// - post_sql: SQL batch to run after Rust code (optional)
///
/// All three phases share one transaction. `disable_foreign_keys` turns
/// enforcement off around the transaction (SQLite ignores the pragma inside
/// one) so tables can be dropped and renamed. `fk_check_table` names a
/// table whose foreign keys are checked, and reported, before commit.
pub struct Migration {
    pub pre_sql: Option<&'static str>,
    pub code_fn: Option<MigrationFn>,
    pub post_sql: Option<&'static str>,
    pub disable_foreign_keys: bool,
    pub fk_check_table: Option<&'static str>,
}

impl Migration {
    /// Create a SQL-only migration (no Rust code needed)
    pub const fn sql_only(sql: &'static str) -> Self {
        Self {
            pre_sql: Some(sql),
            code_fn: None,
            post_sql: None,
            disable_foreign_keys: false,
            fk_check_table: None,
        }
    }
}

/// Runs `migration` in a single transaction.
///
/// An error in any phase drops the transaction, which rolls everything back.
/// Foreign-key enforcement is re-enabled afterwards whether or not the
/// migration succeeded.
pub fn run_migration(
    conn: &mut Connection,
    name: &str,
    migration: &Migration,
) -> Result<(), MigrateError> {
    let _tmr = timer!(Level::Info; "run_migration", "{}", name);

    if migration.disable_foreign_keys {
        Database::set_foreign_keys(conn, false)?;
    }

    let result = run_phases(conn, name, migration);

    if migration.disable_foreign_keys {
        if let Err(restore_err) = Database::set_foreign_keys(conn, true) {
            error!(
                "Migration '{}': failed to re-enable foreign keys: {}",
                name, restore_err
            );
            // The migration's own error is the one worth reporting
            result?;
            return Err(restore_err);
        }
    }

    match &result {
        Ok(()) => info!("Migration '{}' committed", name),
        Err(err) => error!("Migration '{}' rolled back: {}", name, err),
    }

    result
}

fn run_phases(conn: &mut Connection, name: &str, migration: &Migration) -> Result<(), MigrateError> {
    let tx = conn.transaction()?;

    if let Some(sql) = migration.pre_sql {
        info!("Migration '{}': running pre-SQL", name);
        tx.execute_batch(sql)?;
    }

    if let Some(code_fn) = migration.code_fn {
        info!("Migration '{}': running code phase", name);
        code_fn(&tx)?;
    }

    if let Some(sql) = migration.post_sql {
        info!("Migration '{}': running post-SQL", name);
        tx.execute_batch(sql)?;
    }

    if let Some(table) = migration.fk_check_table {
        report_foreign_key_violations(&tx, table)?;
    }

    tx.commit()?;

    Ok(())
}

/// Logs every row of `table` whose foreign key has no parent. Violations are
/// reported, not fatal: data that was dangling before the migration still is.
pub fn report_foreign_key_violations(conn: &Connection, table: &str) -> Result<usize, MigrateError> {
    const MAX_LOGGED: usize = 20;

    let mut stmt = conn.prepare(&format!(
        "PRAGMA foreign_key_check(\"{}\")",
        table.replace('"', "\"\"")
    ))?;

    let violations: Vec<(String, Option<i64>, String)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (child, rowid, parent) in violations.iter().take(MAX_LOGGED) {
        warn!(
            "Foreign key check: {} rowid={:?} has no matching row in {}",
            child, rowid, parent
        );
    }

    if violations.len() > MAX_LOGGED {
        warn!(
            "Foreign key check: ... and {} more violations (only first {} shown)",
            violations.len() - MAX_LOGGED,
            MAX_LOGGED
        );
    }

    Ok(violations.len())
}
