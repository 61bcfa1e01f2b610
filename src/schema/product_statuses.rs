use log::{error, info};
use rusqlite::Connection;

use crate::error::MigrateError;
use crate::statuses::ProductStatus;

use super::{run_migration, Migration};

/// Products status normalization
///
/// Replaces the free-text `products.status` column with `status_id`, a
/// foreign key into a new `product_statuses` lookup table.
///
/// Phase 1 (pre-SQL):
///   - Creates and seeds `product_statuses` (insert-or-ignore, so re-seeding
///     is harmless).
///   - Builds `products_new` with the target schema and copies every row,
///     mapping the old status text case-insensitively.
///
/// Phase 2 (Rust code):
///   - Verifies `products_new` holds exactly the rows of `products`.
///
/// Phase 3 (post-SQL):
///   - Swaps `products_new` into place.
///
/// There is no version guard. Once `status` is gone, a second run fails in
/// phase 1 and rolls back.
pub const NORMALIZE_PRODUCT_STATUSES: Migration = Migration {
    pre_sql: Some(NORMALIZE_PRODUCT_STATUSES_PRE_SQL),
    code_fn: Some(validate_products_rebuild),
    post_sql: Some(NORMALIZE_PRODUCT_STATUSES_POST_SQL),
    disable_foreign_keys: true,
    fk_check_table: Some("products"),
};

macro_rules! product_statuses_sql {
    () => {
        r#"
CREATE TABLE IF NOT EXISTS product_statuses (
    id INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

INSERT OR IGNORE INTO product_statuses (id, name) VALUES
    (1, 'Active'),
    (2, 'Active Decoy'),
    (3, 'Inactive');
"#
    };
}

pub const NORMALIZE_PRODUCT_STATUSES_PRE_SQL: &str = concat!(
    product_statuses_sql!(),
    r#"
-- Leftover from an earlier failed attempt
DROP TABLE IF EXISTS products_new;

CREATE TABLE products_new (
    id INTEGER PRIMARY KEY,
    sku TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status_id INTEGER NOT NULL DEFAULT 1,
    cost INTEGER,
    supplier TEXT,
    supplier_link TEXT,
    purchase_remarks TEXT,
    supplier_id INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    FOREIGN KEY (status_id) REFERENCES product_statuses(id)
);

INSERT INTO products_new (
    id, sku, name, status_id, cost,
    supplier, supplier_link, purchase_remarks, supplier_id,
    created_at, updated_at
)
SELECT
    id, sku, name,
    CASE LOWER(status)
        WHEN 'active decoy' THEN 2
        WHEN 'inactive' THEN 3
        ELSE 1
    END,
    cost,
    supplier, supplier_link, purchase_remarks, supplier_id,
    created_at, updated_at
FROM products;
"#
);

pub const NORMALIZE_PRODUCT_STATUSES_POST_SQL: &str = r#"
DROP TABLE products;
ALTER TABLE products_new RENAME TO products;
"#;

pub fn normalize_product_statuses(conn: &mut Connection) -> Result<(), MigrateError> {
    run_migration(conn, "normalize product statuses", &NORMALIZE_PRODUCT_STATUSES)
}

/// Checks that the copy into `products_new` kept every row and primary key
/// of `products`, that every `status_id` resolves, and that each row's
/// `status_id` is what `ProductStatus::from_legacy` makes of its old status.
pub fn validate_products_rebuild(conn: &Connection) -> Result<(), MigrateError> {
    let mut errors: Vec<String> = Vec::new();

    let old_count: i64 = conn.query_row("SELECT COUNT(*) FROM products", [], |row| row.get(0))?;
    let new_count: i64 =
        conn.query_row("SELECT COUNT(*) FROM products_new", [], |row| row.get(0))?;

    if old_count != new_count {
        errors.push(format!(
            "row count mismatch: products has {} rows, products_new has {}",
            old_count, new_count
        ));
    }

    let missing_ids: i64 = conn.query_row(
        "SELECT COUNT(*) FROM products p
         WHERE NOT EXISTS (SELECT 1 FROM products_new n WHERE n.id = p.id)",
        [],
        |row| row.get(0),
    )?;

    if missing_ids > 0 {
        errors.push(format!("{} product ids missing from products_new", missing_ids));
    }

    let unresolved: i64 = conn.query_row(
        "SELECT COUNT(*) FROM products_new
         WHERE status_id NOT IN (SELECT id FROM product_statuses)",
        [],
        |row| row.get(0),
    )?;

    if unresolved > 0 {
        errors.push(format!(
            "{} rows in products_new have a status_id with no product_statuses entry",
            unresolved
        ));
    }

    let mismatched = count_status_mismatches(conn)?;
    if mismatched > 0 {
        errors.push(format!(
            "{} rows have a status_id that disagrees with their old status text",
            mismatched
        ));
    }

    if !errors.is_empty() {
        for err in &errors {
            error!("Products rebuild validation error: {}", err);
        }
        return Err(MigrateError::Error(format!(
            "Products rebuild validation failed with {} error(s). See log for details. Transaction will be rolled back.",
            errors.len()
        )));
    }

    let mut stmt = conn.prepare(
        "SELECT status_id, COUNT(*) FROM products_new GROUP BY status_id ORDER BY status_id",
    )?;
    let counts: Vec<(i64, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    for (status_id, count) in counts {
        let name = ProductStatus::from_id(status_id).map_or("?", |s| s.name());
        info!("Products rebuild: {} rows -> {} ({})", count, name, status_id);
    }

    info!("Products rebuild validated: {} rows copied", new_count);

    Ok(())
}

fn count_status_mismatches(conn: &Connection) -> Result<usize, MigrateError> {
    const MAX_LOGGED: usize = 20;

    let mut stmt = conn.prepare(
        "SELECT p.id, CAST(p.status AS TEXT), n.status_id
         FROM products p
         JOIN products_new n ON n.id = p.id",
    )?;
    let rows: Vec<(i64, Option<String>, i64)> = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
        .collect::<Result<Vec<_>, _>>()?;

    let mut mismatched = 0;
    for (id, status, status_id) in &rows {
        let expected = ProductStatus::from_legacy(status.as_deref());
        if expected.id() != *status_id {
            mismatched += 1;
            if mismatched <= MAX_LOGGED {
                error!(
                    "Products rebuild: id={} status={:?} got status_id={} expected {} ({})",
                    id,
                    status,
                    status_id,
                    expected.id(),
                    expected
                );
            }
        }
    }

    Ok(mismatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::schema::report_foreign_key_violations;
    use pretty_assertions::assert_eq;
    use rusqlite::params;
    use strum::IntoEnumIterator;
    use tempfile::TempDir;

    fn seed_product_statuses(conn: &Connection) -> Result<(), MigrateError> {
        conn.execute_batch(product_statuses_sql!())?;
        Ok(())
    }

    const LEGACY_SCHEMA_SQL: &str = r#"
CREATE TABLE products (
    id INTEGER PRIMARY KEY,
    sku TEXT NOT NULL UNIQUE,
    name TEXT NOT NULL,
    status TEXT,
    cost INTEGER,
    supplier TEXT,
    supplier_link TEXT,
    purchase_remarks TEXT,
    supplier_id INTEGER,
    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
    updated_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP
);

CREATE TABLE product_pricing (
    id INTEGER PRIMARY KEY,
    product_sku TEXT NOT NULL REFERENCES products(sku),
    sell_price NUMERIC
);
"#;

    fn legacy_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(LEGACY_SCHEMA_SQL).unwrap();
        conn
    }

    fn insert_product(conn: &Connection, id: i64, status: Option<&str>) {
        conn.execute(
            "INSERT INTO products (id, sku, name, status, cost, supplier, supplier_link,
                                   purchase_remarks, supplier_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 'Acme', 'https://acme.test', 'bulk', 4,
                     '2024-01-02 03:04:05', '2024-02-03 04:05:06')",
            params![id, format!("SKU-{id}"), format!("Product {id}"), status, id * 100],
        )
        .unwrap();
    }

    fn status_ids(conn: &Connection) -> Vec<(i64, i64)> {
        let mut stmt = conn
            .prepare("SELECT id, status_id FROM products ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    fn lookup_rows(conn: &Connection) -> Vec<(i64, String)> {
        let mut stmt = conn
            .prepare("SELECT id, name FROM product_statuses ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    fn column_names(conn: &Connection, table: &str) -> Vec<String> {
        let mut stmt = conn
            .prepare(&format!("SELECT name FROM pragma_table_info('{table}') ORDER BY cid"))
            .unwrap();
        let names = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        names
    }

    #[test]
    fn test_status_mapping() {
        let mut conn = legacy_db();
        insert_product(&conn, 1, Some("active"));
        insert_product(&conn, 2, Some("Active Decoy"));
        insert_product(&conn, 3, Some("INACTIVE"));
        insert_product(&conn, 4, Some("unknown_value"));
        insert_product(&conn, 5, None);
        insert_product(&conn, 6, Some("aCtIvE dEcOy"));
        insert_product(&conn, 7, Some("inactive "));

        normalize_product_statuses(&mut conn).unwrap();

        assert_eq!(
            status_ids(&conn),
            vec![(1, 1), (2, 2), (3, 3), (4, 1), (5, 1), (6, 2), (7, 1)]
        );
    }

    #[test]
    fn test_sql_mapping_agrees_with_from_legacy() {
        let inputs = [
            None,
            Some("Active"),
            Some("ACTIVE DECOY"),
            Some("Inactive"),
            Some("in-active"),
            Some(""),
            Some("active  decoy"),
        ];

        let mut conn = legacy_db();
        for (i, status) in inputs.iter().enumerate() {
            insert_product(&conn, i as i64 + 1, *status);
        }

        normalize_product_statuses(&mut conn).unwrap();

        let expected: Vec<(i64, i64)> = inputs
            .iter()
            .enumerate()
            .map(|(i, status)| (i as i64 + 1, ProductStatus::from_legacy(*status).id()))
            .collect();
        assert_eq!(status_ids(&conn), expected);
    }

    #[test]
    fn test_lookup_table_contents() {
        let mut conn = legacy_db();
        insert_product(&conn, 1, Some("active"));

        normalize_product_statuses(&mut conn).unwrap();

        let expected: Vec<(i64, String)> = ProductStatus::iter()
            .map(|s| (s.id(), s.name().to_string()))
            .collect();
        assert_eq!(lookup_rows(&conn), expected);
        assert_eq!(
            lookup_rows(&conn),
            vec![
                (1, "Active".to_string()),
                (2, "Active Decoy".to_string()),
                (3, "Inactive".to_string())
            ]
        );
    }

    #[test]
    fn test_seeding_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        seed_product_statuses(&conn).unwrap();
        seed_product_statuses(&conn).unwrap();
        assert_eq!(lookup_rows(&conn).len(), 3);

        // A renamed row is left alone rather than duplicated or overwritten
        conn.execute("UPDATE product_statuses SET name = 'Live' WHERE id = 1", [])
            .unwrap();
        seed_product_statuses(&conn).unwrap();
        let rows = lookup_rows(&conn);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], (1, "Live".to_string()));
    }

    #[test]
    fn test_rebuild_preserves_rows_and_columns() {
        let mut conn = legacy_db();
        for id in [3, 10, 42] {
            insert_product(&conn, id, Some("inactive"));
        }

        normalize_product_statuses(&mut conn).unwrap();

        assert_eq!(
            column_names(&conn, "products"),
            vec![
                "id",
                "sku",
                "name",
                "status_id",
                "cost",
                "supplier",
                "supplier_link",
                "purchase_remarks",
                "supplier_id",
                "created_at",
                "updated_at"
            ]
        );

        let row: (String, String, i64, String, String, String, i64, String, String) = conn
            .query_row(
                "SELECT sku, name, cost, supplier, supplier_link, purchase_remarks,
                        supplier_id, created_at, updated_at
                 FROM products WHERE id = 42",
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                        row.get(7)?,
                        row.get(8)?,
                    ))
                },
            )
            .unwrap();
        assert_eq!(
            row,
            (
                "SKU-42".to_string(),
                "Product 42".to_string(),
                4200,
                "Acme".to_string(),
                "https://acme.test".to_string(),
                "bulk".to_string(),
                4,
                "2024-01-02 03:04:05".to_string(),
                "2024-02-03 04:05:06".to_string()
            )
        );

        let ids: Vec<i64> = status_ids(&conn).into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![3, 10, 42]);
        assert!(!Database::table_exists(&conn, "products_new").unwrap());
    }

    #[test]
    fn test_foreign_keys_restored_and_valid() {
        let mut conn = legacy_db();
        insert_product(&conn, 1, Some("active"));
        conn.execute(
            "INSERT INTO product_pricing (product_sku, sell_price) VALUES ('SKU-1', 12.5)",
            [],
        )
        .unwrap();
        Database::set_foreign_keys(&conn, true).unwrap();

        normalize_product_statuses(&mut conn).unwrap();

        assert!(Database::foreign_keys_enabled(&conn).unwrap());
        assert_eq!(report_foreign_key_violations(&conn, "products").unwrap(), 0);
        assert_eq!(
            report_foreign_key_violations(&conn, "product_pricing").unwrap(),
            0
        );

        // The new foreign key is enforced
        let bad = conn.execute("UPDATE products SET status_id = 9 WHERE id = 1", []);
        assert!(bad.is_err());
    }

    #[test]
    fn test_stale_staging_table_is_replaced() {
        let mut conn = legacy_db();
        insert_product(&conn, 1, Some("inactive"));
        conn.execute_batch("CREATE TABLE products_new (junk TEXT); INSERT INTO products_new VALUES ('x');")
            .unwrap();

        normalize_product_statuses(&mut conn).unwrap();

        assert_eq!(status_ids(&conn), vec![(1, 3)]);
    }

    #[test]
    fn test_second_run_fails_and_rolls_back() {
        let mut conn = legacy_db();
        insert_product(&conn, 1, Some("inactive"));
        normalize_product_statuses(&mut conn).unwrap();

        let result = normalize_product_statuses(&mut conn);

        assert!(matches!(result, Err(MigrateError::DatabaseError(_))));
        assert_eq!(status_ids(&conn), vec![(1, 3)]);
        assert!(!Database::table_exists(&conn, "products_new").unwrap());
        assert!(Database::foreign_keys_enabled(&conn).unwrap());
    }

    #[test]
    fn test_missing_products_table_leaves_database_untouched() {
        let mut conn = Connection::open_in_memory().unwrap();

        assert!(normalize_product_statuses(&mut conn).is_err());
        assert!(!Database::table_exists(&conn, "product_statuses").unwrap());
    }

    #[test]
    fn test_validation_detects_missing_rows() {
        let conn = legacy_db();
        insert_product(&conn, 1, Some("active"));
        insert_product(&conn, 2, Some("active"));
        seed_product_statuses(&conn).unwrap();
        conn.execute_batch(
            "CREATE TABLE products_new (id INTEGER PRIMARY KEY, status_id INTEGER);
             INSERT INTO products_new VALUES (1, 1), (99, 7);",
        )
        .unwrap();

        let result = validate_products_rebuild(&conn);
        match result {
            Err(MigrateError::Error(msg)) => assert!(msg.contains("2 error(s)"), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn test_validation_detects_wrong_status_mapping() {
        let conn = legacy_db();
        insert_product(&conn, 1, Some("Inactive"));
        insert_product(&conn, 2, Some("active decoy"));
        insert_product(&conn, 3, None);
        seed_product_statuses(&conn).unwrap();
        conn.execute_batch(
            "CREATE TABLE products_new (id INTEGER PRIMARY KEY, status_id INTEGER);
             INSERT INTO products_new VALUES (1, 3), (2, 1), (3, 1);",
        )
        .unwrap();

        assert_eq!(count_status_mismatches(&conn).unwrap(), 1);
        match validate_products_rebuild(&conn) {
            Err(MigrateError::Error(msg)) => assert!(msg.contains("1 error(s)"), "{msg}"),
            other => panic!("expected validation error, got {other:?}"),
        }

        conn.execute("UPDATE products_new SET status_id = 2 WHERE id = 2", [])
            .unwrap();
        validate_products_rebuild(&conn).unwrap();
    }

    #[test]
    fn test_migration_persists_to_file() {
        let dir = TempDir::new().unwrap();
        let db_path = dir.path().join("gentech.sqlite");
        {
            let conn = Connection::open(&db_path).unwrap();
            conn.execute_batch(LEGACY_SCHEMA_SQL).unwrap();
            insert_product(&conn, 1, Some("INACTIVE"));
            insert_product(&conn, 2, Some("unknown_value"));
        }

        let mut db = Database::open(&db_path).unwrap();
        normalize_product_statuses(db.conn_mut()).unwrap();
        drop(db);

        let conn = Connection::open(&db_path).unwrap();
        assert_eq!(status_ids(&conn), vec![(1, 3), (2, 1)]);
    }
}
