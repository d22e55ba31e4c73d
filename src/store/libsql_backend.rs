//! libSQL backend: async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. All statements share one
//! connection; writes are serialized by an async lock so that explicit
//! transactions never interleave with another request's statements.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::Database;
use crate::tracker::model::{
    AppStatus, Application, Email, StatusEvent, StatusReason, UserIdentity,
};
use crate::tracker::normalize::company_key;

/// libSQL database backend.
pub struct LibSqlBackend {
    _db: LibSqlDatabase,
    conn: Connection,
    write_lock: Mutex<()>,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            _db: db,
            conn,
            write_lock: Mutex::new(()),
        })
    }

    async fn begin(&self, op: &str) -> Result<(), DatabaseError> {
        self.conn
            .execute("BEGIN IMMEDIATE", ())
            .await
            .map_err(|e| query_err(op, e))?;
        Ok(())
    }

    /// Commit on success, roll back and return the original error otherwise.
    /// The caller must hold `write_lock`.
    async fn finish<T>(&self, op: &str, result: Result<T, DatabaseError>) -> Result<T, DatabaseError> {
        match result {
            Ok(value) => {
                self.conn
                    .execute("COMMIT", ())
                    .await
                    .map_err(|e| query_err(op, e))?;
                Ok(value)
            }
            Err(e) => {
                if let Err(rollback) = self.conn.execute("ROLLBACK", ()).await {
                    warn!(op, error = %rollback, "Rollback failed");
                }
                Err(e)
            }
        }
    }

    async fn insert_status_event(&self, event: &StatusEvent) -> Result<(), DatabaseError> {
        self.conn
            .execute(
                "INSERT INTO status_events (id, application_id, from_status, to_status, reason, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    event.id.to_string(),
                    event.application_id.to_string(),
                    opt_text(event.from_status.map(AppStatus::as_str)),
                    event.to_status.as_str(),
                    event.reason.as_str(),
                    ts(&event.created_at),
                ],
            )
            .await
            .map_err(|e| query_err("insert_status_event", e))?;
        Ok(())
    }

    /// Fetch an application regardless of owner. Internal use only.
    async fn fetch_application(&self, id: Uuid) -> Result<Option<Application>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1"),
                params![id.to_string()],
            )
            .await
            .map_err(|e| query_err("fetch_application", e))?;
        first_row(rows, "fetch_application", row_to_application).await
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Canonical write format: fixed-width RFC 3339 in UTC, so that string
/// comparison in SQL matches chronological order.
fn ts(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::Serialization(format!("bad uuid {s:?}: {e}")))
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, DatabaseError> {
    serde_json::to_string(value).map_err(|e| DatabaseError::Serialization(e.to_string()))
}

fn query_err(op: &str, e: libsql::Error) -> DatabaseError {
    let msg = e.to_string();
    if msg.contains("UNIQUE constraint failed") || msg.contains("FOREIGN KEY constraint failed") {
        DatabaseError::Constraint(format!("{op}: {msg}"))
    } else {
        DatabaseError::Query(format!("{op}: {msg}"))
    }
}

fn row_err(e: libsql::Error) -> DatabaseError {
    DatabaseError::Query(format!("row parse: {e}"))
}

async fn first_row<T>(
    mut rows: libsql::Rows,
    op: &str,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Option<T>, DatabaseError> {
    match rows.next().await.map_err(|e| query_err(op, e))? {
        Some(row) => map(&row).map(Some),
        None => Ok(None),
    }
}

async fn collect_rows<T>(
    mut rows: libsql::Rows,
    op: &str,
    map: fn(&libsql::Row) -> Result<T, DatabaseError>,
) -> Result<Vec<T>, DatabaseError> {
    let mut out = Vec::new();
    while let Some(row) = rows.next().await.map_err(|e| query_err(op, e))? {
        match map(&row) {
            Ok(item) => out.push(item),
            Err(e) => warn!(op, error = %e, "Skipping row"),
        }
    }
    Ok(out)
}

const APPLICATION_COLUMNS: &str =
    "id, user_id, company, role_title, status, last_activity_at, created_at, updated_at";

const EMAIL_COLUMNS: &str = "id, user_id, application_id, provider, provider_message_id, message_id, in_reply_to, from_name, from_email, to_emails, cc_emails, sent_at, subject, snippet, body_text, body_html, headers, created_at, updated_at";

const EVENT_COLUMNS: &str = "id, application_id, from_status, to_status, reason, created_at";

fn row_to_user(row: &libsql::Row) -> Result<UserIdentity, DatabaseError> {
    let id: String = row.get(0).map_err(row_err)?;
    Ok(UserIdentity {
        id: parse_uuid(&id)?,
        email: row.get(1).map_err(row_err)?,
    })
}

/// Column order matches APPLICATION_COLUMNS.
fn row_to_application(row: &libsql::Row) -> Result<Application, DatabaseError> {
    let id: String = row.get(0).map_err(row_err)?;
    let user_id: String = row.get(1).map_err(row_err)?;
    let status: String = row.get(4).map_err(row_err)?;
    let last_activity: Option<String> = row.get::<String>(5).ok();
    let created: String = row.get(6).map_err(row_err)?;
    let updated: String = row.get(7).map_err(row_err)?;

    Ok(Application {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        company: row.get(2).map_err(row_err)?,
        role_title: row.get(3).map_err(row_err)?,
        status: status.parse().map_err(DatabaseError::Serialization)?,
        last_activity_at: last_activity.as_deref().map(parse_datetime),
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Column order matches EMAIL_COLUMNS.
fn row_to_email(row: &libsql::Row) -> Result<Email, DatabaseError> {
    let id: String = row.get(0).map_err(row_err)?;
    let user_id: String = row.get(1).map_err(row_err)?;
    let application_id: Option<String> = row.get::<String>(2).ok();
    let to_emails: String = row.get(9).map_err(row_err)?;
    let cc_emails: String = row.get(10).map_err(row_err)?;
    let sent: String = row.get(11).map_err(row_err)?;
    let headers: String = row.get(16).map_err(row_err)?;
    let created: String = row.get(17).map_err(row_err)?;
    let updated: String = row.get(18).map_err(row_err)?;

    Ok(Email {
        id: parse_uuid(&id)?,
        user_id: parse_uuid(&user_id)?,
        application_id: application_id.as_deref().map(parse_uuid).transpose()?,
        provider: row.get::<String>(3).ok(),
        provider_message_id: row.get::<String>(4).ok(),
        message_id: row.get::<String>(5).ok(),
        in_reply_to: row.get::<String>(6).ok(),
        from_name: row.get::<String>(7).ok(),
        from_email: row.get::<String>(8).ok(),
        to_emails: serde_json::from_str(&to_emails)
            .map_err(|e| DatabaseError::Serialization(format!("to_emails: {e}")))?,
        cc_emails: serde_json::from_str(&cc_emails)
            .map_err(|e| DatabaseError::Serialization(format!("cc_emails: {e}")))?,
        sent_at: parse_datetime(&sent),
        subject: row.get(12).map_err(row_err)?,
        snippet: row.get::<String>(13).ok(),
        body_text: row.get::<String>(14).ok(),
        body_html: row.get::<String>(15).ok(),
        headers: serde_json::from_str(&headers)
            .map_err(|e| DatabaseError::Serialization(format!("headers: {e}")))?,
        created_at: parse_datetime(&created),
        updated_at: parse_datetime(&updated),
    })
}

/// Column order matches EVENT_COLUMNS.
fn row_to_event(row: &libsql::Row) -> Result<StatusEvent, DatabaseError> {
    let id: String = row.get(0).map_err(row_err)?;
    let application_id: String = row.get(1).map_err(row_err)?;
    let from_status: Option<String> = row.get::<String>(2).ok();
    let to_status: String = row.get(3).map_err(row_err)?;
    let reason: String = row.get(4).map_err(row_err)?;
    let created: String = row.get(5).map_err(row_err)?;

    Ok(StatusEvent {
        id: parse_uuid(&id)?,
        application_id: parse_uuid(&application_id)?,
        from_status: from_status
            .as_deref()
            .map(str::parse::<AppStatus>)
            .transpose()
            .map_err(DatabaseError::Serialization)?,
        to_status: to_status.parse().map_err(DatabaseError::Serialization)?,
        reason: reason.parse().map_err(DatabaseError::Serialization)?,
        created_at: parse_datetime(&created),
    })
}

// ── Trait implementation ────────────────────────────────────────────

#[async_trait]
impl Database for LibSqlBackend {
    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn ensure_user(&self, email: &str) -> Result<UserIdentity, DatabaseError> {
        {
            let _guard = self.write_lock.lock().await;
            let inserted = self
                .conn
                .execute(
                    "INSERT INTO users (id, email, created_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(email) DO NOTHING",
                    params![Uuid::new_v4().to_string(), email, ts(&Utc::now())],
                )
                .await
                .map_err(|e| query_err("ensure_user", e))?;
            if inserted > 0 {
                info!(email, "User created");
            }
        }

        let rows = self
            .conn
            .query("SELECT id, email FROM users WHERE email = ?1", params![email])
            .await
            .map_err(|e| query_err("ensure_user", e))?;
        first_row(rows, "ensure_user", row_to_user)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "user".into(),
                id: email.to_string(),
            })
    }

    // ── Applications ────────────────────────────────────────────────

    async fn create_application(
        &self,
        app: &Application,
        reason: StatusReason,
    ) -> Result<StatusEvent, DatabaseError> {
        let event = StatusEvent {
            created_at: app.created_at,
            ..StatusEvent::new(app.id, None, app.status, reason)
        };

        let _guard = self.write_lock.lock().await;
        self.begin("create_application").await?;
        let result: Result<(), DatabaseError> = async {
            self.conn
                .execute(
                    "INSERT INTO applications (id, user_id, company, company_key, role_title, status, last_activity_at, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                    params![
                        app.id.to_string(),
                        app.user_id.to_string(),
                        app.company.as_str(),
                        company_key(&app.company),
                        app.role_title.as_str(),
                        app.status.as_str(),
                        opt_text(app.last_activity_at.map(|d| ts(&d)).as_deref()),
                        ts(&app.created_at),
                        ts(&app.updated_at),
                    ],
                )
                .await
                .map_err(|e| query_err("create_application", e))?;
            self.insert_status_event(&event).await
        }
        .await;
        self.finish("create_application", result).await?;

        debug!(id = %app.id, company = %app.company, status = %app.status, "Application created");
        Ok(event)
    }

    async fn get_application(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Application>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = ?1 AND user_id = ?2"
                ),
                params![id.to_string(), user_id.to_string()],
            )
            .await
            .map_err(|e| query_err("get_application", e))?;
        first_row(rows, "get_application", row_to_application).await
    }

    async fn list_applications(&self, user_id: Uuid) -> Result<Vec<Application>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications WHERE user_id = ?1 ORDER BY updated_at DESC"
                ),
                params![user_id.to_string()],
            )
            .await
            .map_err(|e| query_err("list_applications", e))?;
        collect_rows(rows, "list_applications", row_to_application).await
    }

    async fn find_recent_application_by_company(
        &self,
        user_id: Uuid,
        company: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Application>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {APPLICATION_COLUMNS} FROM applications
                     WHERE user_id = ?1 AND company_key = ?2 AND updated_at >= ?3
                     ORDER BY updated_at DESC LIMIT 1"
                ),
                params![user_id.to_string(), company_key(company), ts(&since)],
            )
            .await
            .map_err(|e| query_err("find_recent_application_by_company", e))?;
        first_row(rows, "find_recent_application_by_company", row_to_application).await
    }

    async fn touch_application(
        &self,
        id: Uuid,
        last_activity_at: DateTime<Utc>,
    ) -> Result<Application, DatabaseError> {
        let updated = {
            let _guard = self.write_lock.lock().await;
            self.conn
                .execute(
                    "UPDATE applications SET last_activity_at = ?1, updated_at = ?2 WHERE id = ?3",
                    params![ts(&last_activity_at), ts(&Utc::now()), id.to_string()],
                )
                .await
                .map_err(|e| query_err("touch_application", e))?
        };
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "application".into(),
                id: id.to_string(),
            });
        }

        debug!(id = %id, "Application activity updated");
        self.fetch_application(id)
            .await?
            .ok_or_else(|| DatabaseError::NotFound {
                entity: "application".into(),
                id: id.to_string(),
            })
    }

    async fn apply_status_change(
        &self,
        app: &Application,
        to: AppStatus,
        reason: StatusReason,
        last_activity_at: DateTime<Utc>,
    ) -> Result<(Application, StatusEvent), DatabaseError> {
        let event = StatusEvent::new(app.id, Some(app.status), to, reason);
        let now = event.created_at;

        let _guard = self.write_lock.lock().await;
        self.begin("apply_status_change").await?;
        let result: Result<(), DatabaseError> = async {
            self.insert_status_event(&event).await?;
            let updated = self
                .conn
                .execute(
                    "UPDATE applications SET status = ?1, last_activity_at = ?2, updated_at = ?3 WHERE id = ?4",
                    params![to.as_str(), ts(&last_activity_at), ts(&now), app.id.to_string()],
                )
                .await
                .map_err(|e| query_err("apply_status_change", e))?;
            if updated == 0 {
                return Err(DatabaseError::NotFound {
                    entity: "application".into(),
                    id: app.id.to_string(),
                });
            }
            Ok(())
        }
        .await;
        self.finish("apply_status_change", result).await?;

        info!(
            application_id = %app.id,
            from = %app.status,
            to = %to,
            reason = reason.as_str(),
            "Application status changed"
        );

        let updated = Application {
            status: to,
            last_activity_at: Some(last_activity_at),
            updated_at: now,
            ..app.clone()
        };
        Ok((updated, event))
    }

    async fn list_status_events(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<StatusEvent>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM status_events WHERE application_id = ?1
                     ORDER BY created_at DESC, rowid DESC"
                ),
                params![application_id.to_string()],
            )
            .await
            .map_err(|e| query_err("list_status_events", e))?;
        collect_rows(rows, "list_status_events", row_to_event).await
    }

    // ── Emails ──────────────────────────────────────────────────────

    async fn insert_email(&self, email: &Email) -> Result<(), DatabaseError> {
        let to_emails = to_json(&email.to_emails)?;
        let cc_emails = to_json(&email.cc_emails)?;
        let headers = to_json(&email.headers)?;
        let application_id = email.application_id.map(|id| id.to_string());

        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                &format!(
                    "INSERT INTO emails ({EMAIL_COLUMNS})
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)"
                ),
                params![
                    email.id.to_string(),
                    email.user_id.to_string(),
                    opt_text(application_id.as_deref()),
                    opt_text(email.provider.as_deref()),
                    opt_text(email.provider_message_id.as_deref()),
                    opt_text(email.message_id.as_deref()),
                    opt_text(email.in_reply_to.as_deref()),
                    opt_text(email.from_name.as_deref()),
                    opt_text(email.from_email.as_deref()),
                    to_emails,
                    cc_emails,
                    ts(&email.sent_at),
                    email.subject.as_str(),
                    opt_text(email.snippet.as_deref()),
                    opt_text(email.body_text.as_deref()),
                    opt_text(email.body_html.as_deref()),
                    headers,
                    ts(&email.created_at),
                    ts(&email.updated_at),
                ],
            )
            .await
            .map_err(|e| query_err("insert_email", e))?;

        debug!(id = %email.id, message_id = ?email.message_id, "Email inserted");
        Ok(())
    }

    async fn update_email(&self, email: &Email) -> Result<(), DatabaseError> {
        let to_emails = to_json(&email.to_emails)?;
        let cc_emails = to_json(&email.cc_emails)?;
        let headers = to_json(&email.headers)?;

        let _guard = self.write_lock.lock().await;
        let updated = self
            .conn
            .execute(
                "UPDATE emails SET provider = ?1, provider_message_id = ?2, message_id = ?3,
                    in_reply_to = ?4, from_name = ?5, from_email = ?6, to_emails = ?7,
                    cc_emails = ?8, sent_at = ?9, subject = ?10, snippet = ?11, body_text = ?12,
                    body_html = ?13, headers = ?14, updated_at = ?15
                 WHERE id = ?16",
                params![
                    opt_text(email.provider.as_deref()),
                    opt_text(email.provider_message_id.as_deref()),
                    opt_text(email.message_id.as_deref()),
                    opt_text(email.in_reply_to.as_deref()),
                    opt_text(email.from_name.as_deref()),
                    opt_text(email.from_email.as_deref()),
                    to_emails,
                    cc_emails,
                    ts(&email.sent_at),
                    email.subject.as_str(),
                    opt_text(email.snippet.as_deref()),
                    opt_text(email.body_text.as_deref()),
                    opt_text(email.body_html.as_deref()),
                    headers,
                    ts(&email.updated_at),
                    email.id.to_string(),
                ],
            )
            .await
            .map_err(|e| query_err("update_email", e))?;
        if updated == 0 {
            return Err(DatabaseError::NotFound {
                entity: "email".into(),
                id: email.id.to_string(),
            });
        }

        debug!(id = %email.id, "Email updated");
        Ok(())
    }

    async fn get_email_by_message_id(
        &self,
        user_id: Uuid,
        message_id: &str,
    ) -> Result<Option<Email>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!("SELECT {EMAIL_COLUMNS} FROM emails WHERE user_id = ?1 AND message_id = ?2"),
                params![user_id.to_string(), message_id],
            )
            .await
            .map_err(|e| query_err("get_email_by_message_id", e))?;
        first_row(rows, "get_email_by_message_id", row_to_email).await
    }

    async fn get_email_by_provider_message_id(
        &self,
        user_id: Uuid,
        provider_message_id: &str,
    ) -> Result<Option<Email>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails WHERE user_id = ?1 AND provider_message_id = ?2"
                ),
                params![user_id.to_string(), provider_message_id],
            )
            .await
            .map_err(|e| query_err("get_email_by_provider_message_id", e))?;
        first_row(rows, "get_email_by_provider_message_id", row_to_email).await
    }

    async fn find_email_replied_to(
        &self,
        user_id: Uuid,
        in_reply_to: &str,
    ) -> Result<Option<Email>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails
                     WHERE user_id = ?1 AND (message_id = ?2 OR provider_message_id = ?2)
                     LIMIT 1"
                ),
                params![user_id.to_string(), in_reply_to],
            )
            .await
            .map_err(|e| query_err("find_email_replied_to", e))?;
        first_row(rows, "find_email_replied_to", row_to_email).await
    }

    async fn find_email_in_references(
        &self,
        user_id: Uuid,
        references: &[String],
    ) -> Result<Option<Email>, DatabaseError> {
        if references.is_empty() {
            return Ok(None);
        }
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails
                     WHERE user_id = ?1 AND message_id IN (SELECT value FROM json_each(?2))
                     LIMIT 1"
                ),
                params![user_id.to_string(), to_json(&references)?],
            )
            .await
            .map_err(|e| query_err("find_email_in_references", e))?;
        first_row(rows, "find_email_in_references", row_to_email).await
    }

    async fn find_email_by_provider_thread(
        &self,
        user_id: Uuid,
        thread_id: &str,
    ) -> Result<Option<Email>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails
                     WHERE user_id = ?1 AND json_extract(headers, '$.providerThreadId') = ?2
                     LIMIT 1"
                ),
                params![user_id.to_string(), thread_id],
            )
            .await
            .map_err(|e| query_err("find_email_by_provider_thread", e))?;
        first_row(rows, "find_email_by_provider_thread", row_to_email).await
    }

    async fn link_email(&self, email_id: Uuid, application_id: Uuid) -> Result<(), DatabaseError> {
        let _guard = self.write_lock.lock().await;
        self.conn
            .execute(
                "UPDATE emails SET application_id = ?1, updated_at = ?2 WHERE id = ?3",
                params![application_id.to_string(), ts(&Utc::now()), email_id.to_string()],
            )
            .await
            .map_err(|e| query_err("link_email", e))?;

        debug!(email_id = %email_id, application_id = %application_id, "Email linked");
        Ok(())
    }

    async fn list_emails_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Email>, DatabaseError> {
        let rows = self
            .conn
            .query(
                &format!(
                    "SELECT {EMAIL_COLUMNS} FROM emails WHERE application_id = ?1 ORDER BY sent_at DESC"
                ),
                params![application_id.to_string()],
            )
            .await
            .map_err(|e| query_err("list_emails_for_application", e))?;
        collect_rows(rows, "list_emails_for_application", row_to_email).await
    }
}
