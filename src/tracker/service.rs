//! The tracker service: email ingestion and the operations behind the API.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{DatabaseError, IngestError};
use crate::store::Database;
use crate::tracker::ingest::EmailIngested;
use crate::tracker::model::{
    AppStatus, Application, ApplicationDetail, Email, StatusBoard, StatusReason, UserIdentity,
};
use crate::tracker::normalize::company_key;
use crate::tracker::resolver::{self, ThreadMatch};
use crate::tracker::transition::record_transition;

/// How an ingested email found its application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchedBy {
    InReplyTo,
    References,
    ProviderThread,
    /// No thread match, but the email was ingested before and is still linked.
    PreviousLink,
    /// Same company, recently active.
    Recency,
    /// No match; a new application was created.
    Created,
}

impl From<ThreadMatch> for MatchedBy {
    fn from(m: ThreadMatch) -> Self {
        match m {
            ThreadMatch::InReplyTo => Self::InReplyTo,
            ThreadMatch::References => Self::References,
            ThreadMatch::ProviderThread => Self::ProviderThread,
        }
    }
}

/// Result of one ingestion.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
    pub application: Application,
    pub email_id: Uuid,
    pub status_changed: bool,
    pub matched_by: MatchedBy,
}

/// Per-(user, company) locks around the match-or-create step.
#[derive(Default)]
struct CompanyLocks {
    inner: Mutex<HashMap<(Uuid, String), Arc<AsyncMutex<()>>>>,
}

impl CompanyLocks {
    async fn acquire(&self, user_id: Uuid, company: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Drop entries nobody is holding or waiting on.
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            map.entry((user_id, company_key(company)))
                .or_default()
                .clone()
        };
        lock.lock_owned().await
    }
}

/// Job application tracker.
pub struct Tracker {
    db: Arc<dyn Database>,
    recency_window: Duration,
    company_locks: CompanyLocks,
}

impl Tracker {
    pub fn new(db: Arc<dyn Database>, recency_window: Duration) -> Self {
        Self {
            db,
            recency_window,
            company_locks: CompanyLocks::default(),
        }
    }

    pub fn db(&self) -> &Arc<dyn Database> {
        &self.db
    }

    /// Store an inbound email and attach it to an application.
    ///
    /// Resolution order: the email's thread, the application the email is
    /// already linked to, a recently active application of the same company,
    /// and finally a new application.
    pub async fn ingest_email(
        &self,
        user: &UserIdentity,
        payload: EmailIngested,
    ) -> Result<IngestOutcome, IngestError> {
        let sent_at = payload.validate()?;
        let email = self.upsert_email(user.id, &payload, sent_at).await?;
        let desired = payload.desired_status();

        if let Some((app, how)) =
            resolver::resolve_thread(self.db.as_ref(), user.id, &payload.thread_hints()).await?
        {
            return self.finish(app, &email, desired, sent_at, how.into()).await;
        }

        if let Some(app) = self.previously_linked(user.id, &email).await? {
            return self
                .finish(app, &email, desired, sent_at, MatchedBy::PreviousLink)
                .await;
        }

        let company = payload.company_guess();
        let _guard = self.company_locks.acquire(user.id, &company).await;

        let recent = resolver::find_recent_by_company(
            self.db.as_ref(),
            user.id,
            &company,
            Utc::now(),
            self.recency_window,
        )
        .await?;
        if let Some(app) = recent {
            return self
                .finish(app, &email, desired, sent_at, MatchedBy::Recency)
                .await;
        }

        let app = Application::new(user.id, company, payload.role_guess(), desired)
            .with_last_activity(sent_at);
        self.db.create_application(&app, StatusReason::Auto).await?;
        self.db.link_email(email.id, app.id).await?;
        info!(
            user = %user.email,
            application_id = %app.id,
            company = %app.company,
            status = %app.status,
            "Application created from email"
        );

        Ok(IngestOutcome {
            application: app,
            email_id: email.id,
            status_changed: true,
            matched_by: MatchedBy::Created,
        })
    }

    /// Link the email if needed, then apply the desired status.
    async fn finish(
        &self,
        app: Application,
        email: &Email,
        desired: AppStatus,
        sent_at: DateTime<Utc>,
        matched_by: MatchedBy,
    ) -> Result<IngestOutcome, IngestError> {
        if email.application_id != Some(app.id) {
            self.db.link_email(email.id, app.id).await?;
        }

        let from = app.status;
        let transition =
            record_transition(self.db.as_ref(), app, desired, StatusReason::Auto, sent_at).await?;
        if transition.changed() {
            info!(
                application_id = %transition.application.id,
                from = %from,
                to = %desired,
                ?matched_by,
                "Status changed from email"
            );
        } else {
            debug!(application_id = %transition.application.id, ?matched_by, "Email linked");
        }

        Ok(IngestOutcome {
            status_changed: transition.changed(),
            application: transition.application,
            email_id: email.id,
            matched_by,
        })
    }

    /// Update the row already stored for this message, else insert a new one.
    async fn upsert_email(
        &self,
        user_id: Uuid,
        payload: &EmailIngested,
        sent_at: DateTime<Utc>,
    ) -> Result<Email, DatabaseError> {
        if let Some(existing) = self.existing_email(user_id, payload).await? {
            let email = payload.to_email(user_id, sent_at, Some(&existing));
            self.db.update_email(&email).await?;
            debug!(email_id = %email.id, "Email updated");
            return Ok(email);
        }

        let email = payload.to_email(user_id, sent_at, None);
        match self.db.insert_email(&email).await {
            Ok(()) => Ok(email),
            // Lost an insert race with the same message; update the winner.
            Err(DatabaseError::Constraint(_)) => {
                let existing = self.existing_email(user_id, payload).await?.ok_or_else(|| {
                    DatabaseError::NotFound {
                        entity: "email".into(),
                        id: payload.message_id().unwrap_or_default().to_string(),
                    }
                })?;
                let email = payload.to_email(user_id, sent_at, Some(&existing));
                self.db.update_email(&email).await?;
                Ok(email)
            }
            Err(e) => Err(e),
        }
    }

    async fn existing_email(
        &self,
        user_id: Uuid,
        payload: &EmailIngested,
    ) -> Result<Option<Email>, DatabaseError> {
        if let Some(message_id) = payload.message_id() {
            let found = self.db.get_email_by_message_id(user_id, message_id).await?;
            if found.is_some() {
                return Ok(found);
            }
        }
        match payload.provider_message_id() {
            Some(id) => self.db.get_email_by_provider_message_id(user_id, id).await,
            None => Ok(None),
        }
    }

    async fn previously_linked(
        &self,
        user_id: Uuid,
        email: &Email,
    ) -> Result<Option<Application>, DatabaseError> {
        match email.application_id {
            Some(id) => self.db.get_application(user_id, id).await,
            None => Ok(None),
        }
    }

    /// The caller's applications, most recently updated first.
    pub async fn list_applications(
        &self,
        user: &UserIdentity,
    ) -> Result<Vec<Application>, DatabaseError> {
        self.db.list_applications(user.id).await
    }

    pub async fn status_board(&self, user: &UserIdentity) -> Result<StatusBoard, DatabaseError> {
        let apps = self.db.list_applications(user.id).await?;
        Ok(StatusBoard::from_applications(apps))
    }

    /// One application with its emails and status history, if the caller owns it.
    pub async fn application_detail(
        &self,
        user: &UserIdentity,
        id: Uuid,
    ) -> Result<Option<ApplicationDetail>, DatabaseError> {
        let Some(application) = self.db.get_application(user.id, id).await? else {
            return Ok(None);
        };
        let emails = self.db.list_emails_for_application(id).await?;
        let status_events = self.db.list_status_events(id).await?;
        Ok(Some(ApplicationDetail {
            application,
            emails,
            status_events,
        }))
    }

    /// Manually set an application's status. `None` if the caller does not
    /// own an application with this id.
    pub async fn set_status(
        &self,
        user: &UserIdentity,
        id: Uuid,
        status: AppStatus,
    ) -> Result<Option<Application>, DatabaseError> {
        let Some(app) = self.db.get_application(user.id, id).await? else {
            return Ok(None);
        };
        let from = app.status;
        let transition =
            record_transition(self.db.as_ref(), app, status, StatusReason::Manual, Utc::now())
                .await?;
        if transition.changed() {
            info!(application_id = %id, from = %from, to = %status, "Status set manually");
        }
        Ok(Some(transition.application))
    }
}
