//! Status transitions and the status history they leave behind.

use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::store::Database;
use crate::tracker::model::{AppStatus, Application, StatusEvent, StatusReason};

/// Result of applying a desired status to an application.
#[derive(Debug, Clone)]
pub struct Transition {
    /// The application as stored after the transition.
    pub application: Application,
    /// The history entry, when the status actually changed.
    pub event: Option<StatusEvent>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.event.is_some()
    }
}

/// Move `app` to `desired`.
///
/// A real change appends exactly one `StatusEvent` and updates the status and
/// last activity atomically. When the status is already `desired`, no event is
/// written: an automatic transition still records `activity_at` as the latest
/// activity, a manual one leaves the row untouched.
pub async fn record_transition(
    db: &dyn Database,
    app: Application,
    desired: AppStatus,
    reason: StatusReason,
    activity_at: DateTime<Utc>,
) -> Result<Transition, DatabaseError> {
    if app.status == desired {
        let application = match reason {
            StatusReason::Auto => db.touch_application(app.id, activity_at).await?,
            StatusReason::Manual => app,
        };
        return Ok(Transition {
            application,
            event: None,
        });
    }

    let (application, event) = db
        .apply_status_change(&app, desired, reason, activity_at)
        .await?;
    Ok(Transition {
        application,
        event: Some(event),
    })
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::store::LibSqlBackend;

    async fn setup(status: AppStatus) -> (LibSqlBackend, Application) {
        let db = LibSqlBackend::new_memory().await.unwrap();
        let user = db.ensure_user("me@example.com").await.unwrap();
        let mut app = Application::new(user.id, "acme", "Engineer", status);
        app.updated_at = Utc::now() - Duration::days(1);
        db.create_application(&app, StatusReason::Auto).await.unwrap();
        (db, app)
    }

    #[tokio::test]
    async fn change_appends_one_event() {
        let (db, app) = setup(AppStatus::Applied).await;
        let at = Utc::now();

        let t = record_transition(&db, app.clone(), AppStatus::Rejected, StatusReason::Auto, at)
            .await
            .unwrap();
        assert!(t.changed());
        assert_eq!(t.application.status, AppStatus::Rejected);
        let event = t.event.unwrap();
        assert_eq!(event.from_status, Some(AppStatus::Applied));
        assert_eq!(event.to_status, AppStatus::Rejected);
        assert_eq!(event.reason, StatusReason::Auto);

        // Initial event plus the change.
        assert_eq!(db.list_status_events(app.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn auto_noop_touches_activity() {
        let (db, app) = setup(AppStatus::Applied).await;
        let at = Utc::now() - Duration::minutes(5);

        let t = record_transition(&db, app.clone(), AppStatus::Applied, StatusReason::Auto, at)
            .await
            .unwrap();
        assert!(!t.changed());
        assert_eq!(t.application.last_activity_at.unwrap().timestamp(), at.timestamp());
        assert!(t.application.updated_at > app.updated_at);
        assert_eq!(db.list_status_events(app.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn manual_noop_writes_nothing() {
        let (db, app) = setup(AppStatus::Offer).await;

        let t = record_transition(&db, app.clone(), AppStatus::Offer, StatusReason::Manual, Utc::now())
            .await
            .unwrap();
        assert!(!t.changed());
        assert_eq!(t.application, app);

        let user_id = app.user_id;
        let stored = db.get_application(user_id, app.id).await.unwrap().unwrap();
        assert!(stored.last_activity_at.is_none());
        assert_eq!(db.list_status_events(app.id).await.unwrap().len(), 1);
    }
}
