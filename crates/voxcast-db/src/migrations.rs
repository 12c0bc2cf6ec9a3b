//! Embedded SQL migration runner.
//!
//! Migrations are SQL files embedded at compile time. They run sequentially
//! on startup, tracked by the `_voxcast_migrations` table. Each migration
//! runs exactly once — if it has already been applied, it is skipped.

use rusqlite::Connection;
use thiserror::Error;

/// A single embedded migration.
struct Migration {
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. New migrations are appended here.
const MIGRATIONS: &[Migration] = &[
    Migration {
        name: "000_broadcasts",
        sql: include_str!("migrations/000_broadcasts.sql"),
    },
    Migration {
        name: "001_calls",
        sql: include_str!("migrations/001_calls.sql"),
    },
    Migration {
        name: "002_audio_assets",
        sql: include_str!("migrations/002_audio_assets.sql"),
    },
    Migration {
        name: "003_opt_outs",
        sql: include_str!("migrations/003_opt_outs.sql"),
    },
];

/// Errors that can occur during migration execution.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// A SQL statement within a migration failed.
    #[error("migration '{name}' failed: {source}")]
    ExecutionFailed {
        /// The name of the migration that failed.
        name: String,
        /// The underlying SQLite error.
        source: rusqlite::Error,
    },

    /// Failed to query migration state.
    #[error("failed to check migration state: {0}")]
    StateQuery(rusqlite::Error),
}

/// Runs all pending migrations against the given connection.
///
/// Migrations that have already been applied (tracked in
/// `_voxcast_migrations`) are skipped. New migrations are applied in order
/// and recorded. Returns the number of migrations applied.
///
/// # Errors
///
/// Returns `MigrationError` if any migration fails to execute or if the
/// migration tracking table cannot be queried.
pub fn run_migrations(conn: &Connection) -> Result<usize, MigrationError> {
    run_migrations_from_list(conn, MIGRATIONS)
}

fn run_migrations_from_list(
    conn: &Connection,
    migrations: &[Migration],
) -> Result<usize, MigrationError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _voxcast_migrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .map_err(MigrationError::StateQuery)?;

    let mut applied = 0usize;
    for migration in migrations {
        let already: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM _voxcast_migrations WHERE name = ?1)",
                [migration.name],
                |row| row.get(0),
            )
            .map_err(MigrationError::StateQuery)?;
        if already {
            continue;
        }

        conn.execute_batch(migration.sql)
            .map_err(|source| MigrationError::ExecutionFailed {
                name: migration.name.to_string(),
                source,
            })?;
        conn.execute(
            "INSERT INTO _voxcast_migrations (name) VALUES (?1)",
            [migration.name],
        )
        .map_err(MigrationError::StateQuery)?;

        tracing::debug!(name = migration.name, "applied migration");
        applied += 1;
    }

    Ok(applied)
}
