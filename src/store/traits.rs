//! `Database` trait: single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::tracker::model::{
    AppStatus, Application, Email, StatusEvent, StatusReason, UserIdentity,
};

/// Backend-agnostic database trait covering users, applications, emails and
/// status history.
///
/// Every read that takes a `user_id` only sees rows owned by that user.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn init_schema(&self) -> Result<(), DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Look up a user by email, creating the row on first sight.
    async fn ensure_user(&self, email: &str) -> Result<UserIdentity, DatabaseError>;

    // ── Applications ────────────────────────────────────────────────

    /// Insert a new application together with its first status event
    /// (`from_status = None`). Both rows are written or neither is.
    async fn create_application(
        &self,
        app: &Application,
        reason: StatusReason,
    ) -> Result<StatusEvent, DatabaseError>;

    /// Get an application by ID, scoped to its owner.
    async fn get_application(
        &self,
        user_id: Uuid,
        id: Uuid,
    ) -> Result<Option<Application>, DatabaseError>;

    /// All applications of a user, most recently updated first.
    async fn list_applications(&self, user_id: Uuid) -> Result<Vec<Application>, DatabaseError>;

    /// Most recently updated application whose company matches
    /// case-insensitively and whose `updated_at >= since`.
    async fn find_recent_application_by_company(
        &self,
        user_id: Uuid,
        company: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<Application>, DatabaseError>;

    /// Set `last_activity_at` (and bump `updated_at`). Returns the updated row.
    async fn touch_application(
        &self,
        id: Uuid,
        last_activity_at: DateTime<Utc>,
    ) -> Result<Application, DatabaseError>;

    /// Append a status event from `app.status` to `to` and update the
    /// application's status and last activity, in one transaction.
    async fn apply_status_change(
        &self,
        app: &Application,
        to: AppStatus,
        reason: StatusReason,
        last_activity_at: DateTime<Utc>,
    ) -> Result<(Application, StatusEvent), DatabaseError>;

    /// Status history of an application, newest first.
    async fn list_status_events(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<StatusEvent>, DatabaseError>;

    // ── Emails ──────────────────────────────────────────────────────

    /// Insert a new email row.
    async fn insert_email(&self, email: &Email) -> Result<(), DatabaseError>;

    /// Overwrite an existing email row (matched by `email.id`).
    async fn update_email(&self, email: &Email) -> Result<(), DatabaseError>;

    /// Look up an email by its client-generated Message-ID.
    async fn get_email_by_message_id(
        &self,
        user_id: Uuid,
        message_id: &str,
    ) -> Result<Option<Email>, DatabaseError>;

    /// Look up an email by its provider-assigned id.
    async fn get_email_by_provider_message_id(
        &self,
        user_id: Uuid,
        provider_message_id: &str,
    ) -> Result<Option<Email>, DatabaseError>;

    /// Any email whose Message-ID or provider message id equals `in_reply_to`.
    async fn find_email_replied_to(
        &self,
        user_id: Uuid,
        in_reply_to: &str,
    ) -> Result<Option<Email>, DatabaseError>;

    /// Any email whose Message-ID is one of `references`.
    async fn find_email_in_references(
        &self,
        user_id: Uuid,
        references: &[String],
    ) -> Result<Option<Email>, DatabaseError>;

    /// Any email whose stored `providerThreadId` header equals `thread_id`.
    async fn find_email_by_provider_thread(
        &self,
        user_id: Uuid,
        thread_id: &str,
    ) -> Result<Option<Email>, DatabaseError>;

    /// Point an email at an application.
    async fn link_email(&self, email_id: Uuid, application_id: Uuid) -> Result<(), DatabaseError>;

    /// Emails linked to an application, newest `sent_at` first.
    async fn list_emails_for_application(
        &self,
        application_id: Uuid,
    ) -> Result<Vec<Email>, DatabaseError>;
}
