//! Embedded schema migrations.
//!
//! `schema_version` records every applied step. Each step runs in its own
//! transaction together with its version row, so a failed step leaves the
//! database at the previous version.

use rusqlite::{Connection, DatabaseName};

/// Ordered `(version, sql)` pairs. Versions are dense and start at 1.
const MIGRATIONS: &[(i32, &str)] = &[
    (1, include_str!("migrations/001_baseline.sql")),
    (2, include_str!("migrations/002_reminder_delivery.sql")),
];

fn latest_known() -> i32 {
    MIGRATIONS.last().map_or(0, |(version, _)| *version)
}

fn applied_version(conn: &Connection) -> Result<i32, String> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(|e| format!("Failed to create schema_version table: {}", e))?;

    conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_version", [], |row| {
        row.get(0)
    })
    .map_err(|e| format!("Failed to read schema version: {}", e))
}

/// Hot copy of a file-backed database to `<path>.pre-migration.bak`.
/// In-memory databases have no path and are skipped.
fn snapshot(conn: &Connection) -> Result<(), String> {
    let path: String = conn
        .query_row("PRAGMA database_list", [], |row| row.get(2))
        .map_err(|e| format!("Failed to get database path: {}", e))?;
    if path.is_empty() {
        return Ok(());
    }
    let target = format!("{path}.pre-migration.bak");
    conn.backup(DatabaseName::Main, &target, None)
        .map_err(|e| format!("Pre-migration backup to {} failed: {}", target, e))?;
    log::info!("Pre-migration backup written to {}", target);
    Ok(())
}

fn apply(conn: &Connection, version: i32, sql: &str) -> Result<(), String> {
    let tx = conn
        .unchecked_transaction()
        .map_err(|e| format!("Migration v{} could not start: {}", version, e))?;
    tx.execute_batch(sql)
        .map_err(|e| format!("Migration v{} failed: {}", version, e))?;
    tx.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])
        .map_err(|e| format!("Failed to record migration v{}: {}", version, e))?;
    tx.commit()
        .map_err(|e| format!("Migration v{} could not commit: {}", version, e))
}

/// Bring the schema up to date. Returns how many steps ran.
///
/// A database stamped with a version this build does not know is refused
/// untouched.
pub fn run_migrations(conn: &Connection) -> Result<usize, String> {
    let current = applied_version(conn)?;
    if current > latest_known() {
        return Err(format!(
            "Database schema version ({}) is newer than this version of contactbook supports ({}). \
             Please update contactbook.",
            current,
            latest_known()
        ));
    }

    let pending: Vec<_> = MIGRATIONS.iter().filter(|(v, _)| *v > current).collect();
    if pending.is_empty() {
        return Ok(0);
    }

    snapshot(conn)?;
    for (version, sql) in &pending {
        apply(conn, *version, sql)?;
        log::info!("Applied migration v{}", version);
    }
    Ok(pending.len())
}
