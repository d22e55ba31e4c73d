//! Version-tracked database migrations for the libSQL backend.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones sequentially.

use libsql::Connection;

use crate::error::DatabaseError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial_schema",
        sql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                email TEXT NOT NULL UNIQUE,
                created_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS applications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                company TEXT NOT NULL,
                -- Unicode-lowercased company, written by the application.
                company_key TEXT NOT NULL,
                role_title TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'OTHER'
                    CHECK (status IN ('APPLIED', 'INTERVIEWING', 'REJECTED', 'OFFER', 'OTHER')),
                last_activity_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_applications_user_updated
                ON applications(user_id, updated_at);
            CREATE INDEX IF NOT EXISTS idx_applications_user_company
                ON applications(user_id, company_key, updated_at);

            CREATE TABLE IF NOT EXISTS emails (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
                application_id TEXT REFERENCES applications(id) ON DELETE SET NULL,
                provider TEXT,
                provider_message_id TEXT,
                message_id TEXT,
                in_reply_to TEXT,
                from_name TEXT,
                from_email TEXT,
                to_emails TEXT NOT NULL DEFAULT '[]',
                cc_emails TEXT NOT NULL DEFAULT '[]',
                sent_at TEXT NOT NULL,
                subject TEXT NOT NULL,
                snippet TEXT,
                body_text TEXT,
                body_html TEXT,
                headers TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_emails_user_message
                ON emails(user_id, message_id);
            CREATE UNIQUE INDEX IF NOT EXISTS idx_emails_user_provider_message
                ON emails(user_id, provider_message_id);
            CREATE INDEX IF NOT EXISTS idx_emails_application ON emails(application_id);

            CREATE TABLE IF NOT EXISTS status_events (
                id TEXT PRIMARY KEY,
                application_id TEXT NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
                from_status TEXT,
                to_status TEXT NOT NULL,
                reason TEXT NOT NULL CHECK (reason IN ('auto', 'manual')),
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_status_events_application
                ON status_events(application_id);
        "#,
    },
    Migration {
        version: 2,
        name: "email_thread_lookup",
        sql: r#"
            CREATE INDEX IF NOT EXISTS idx_emails_user_thread
                ON emails(user_id, json_extract(headers, '$.providerThreadId'));
            CREATE INDEX IF NOT EXISTS idx_emails_user_in_reply_to
                ON emails(user_id, in_reply_to);
        "#,
    },
];

/// Run all pending migrations.
pub async fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );",
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = get_current_version(conn).await?;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                version = migration.version,
                name = migration.name,
                "Applying migration"
            );
            conn.execute_batch(migration.sql).await.map_err(|e| {
                DatabaseError::Migration(format!(
                    "Migration V{} ({}) failed: {e}",
                    migration.version, migration.name
                ))
            })?;
            seed_version(conn, migration.version, migration.name).await?;
        }
    }

    let version = get_current_version(conn).await?;
    tracing::info!(version, "Database migrations complete");
    Ok(())
}

/// Get the highest applied migration version, or 0 if none.
async fn get_current_version(conn: &Connection) -> Result<i64, DatabaseError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to query migration version: {e}")))?;

    let row = rows
        .next()
        .await
        .map_err(|e| DatabaseError::Migration(format!("Failed to read migration version: {e}")))?;

    match row {
        Some(row) => {
            let version: i64 = row.get(0).map_err(|e| {
                DatabaseError::Migration(format!("Failed to parse migration version: {e}"))
            })?;
            Ok(version)
        }
        None => Ok(0),
    }
}

/// Insert a version record into `_migrations`.
async fn seed_version(conn: &Connection, version: i64, name: &str) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT OR IGNORE INTO _migrations (version, name) VALUES (?1, ?2)",
        libsql::params![version, name],
    )
    .await
    .map_err(|e| DatabaseError::Migration(format!("Failed to record migration V{version}: {e}")))?;
    Ok(())
}
