//! Finding the application an inbound email belongs to.
//!
//! Thread linkage is tried first (reply chain, then references, then the
//! provider's thread id). If the email is not part of a known thread, the
//! most recently active application for the same company is used, provided
//! it was updated within the recency window.

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::store::Database;
use crate::tracker::model::{Application, Email};
use crate::tracker::normalize::non_blank;

/// Threading identifiers carried by an inbound email.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadHints<'a> {
    pub in_reply_to: Option<&'a str>,
    pub references: &'a [String],
    pub provider_thread_id: Option<&'a str>,
}

/// Which thread identifier produced a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadMatch {
    InReplyTo,
    References,
    ProviderThread,
}

/// Resolve an application through the user's own emails.
///
/// Lookups run in strict priority order and the first linked hit wins.
/// Blank identifiers are skipped. A hit on an email that was never linked
/// falls through to the next lookup.
pub async fn resolve_thread(
    db: &dyn Database,
    user_id: Uuid,
    hints: &ThreadHints<'_>,
) -> Result<Option<(Application, ThreadMatch)>, DatabaseError> {
    if let Some(in_reply_to) = non_blank(hints.in_reply_to) {
        let hit = db.find_email_replied_to(user_id, in_reply_to).await?;
        if let Some(app) = linked_application(db, user_id, hit).await? {
            return Ok(Some((app, ThreadMatch::InReplyTo)));
        }
    }

    let references: Vec<String> = hints
        .references
        .iter()
        .filter_map(|r| non_blank(Some(r.as_str())))
        .map(str::to_string)
        .collect();
    if !references.is_empty() {
        let hit = db.find_email_in_references(user_id, &references).await?;
        if let Some(app) = linked_application(db, user_id, hit).await? {
            return Ok(Some((app, ThreadMatch::References)));
        }
    }

    if let Some(thread_id) = non_blank(hints.provider_thread_id) {
        let hit = db.find_email_by_provider_thread(user_id, thread_id).await?;
        if let Some(app) = linked_application(db, user_id, hit).await? {
            return Ok(Some((app, ThreadMatch::ProviderThread)));
        }
    }

    Ok(None)
}

/// Most recently updated application of the user for `company`
/// (case-insensitive), if it was updated no earlier than `now - window`.
/// A window reaching past the earliest representable time covers everything.
pub async fn find_recent_by_company(
    db: &dyn Database,
    user_id: Uuid,
    company: &str,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<Option<Application>, DatabaseError> {
    let since = now
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC);
    db.find_recent_application_by_company(user_id, company, since)
        .await
}

async fn linked_application(
    db: &dyn Database,
    user_id: Uuid,
    hit: Option<Email>,
) -> Result<Option<Application>, DatabaseError> {
    match hit.and_then(|email| email.application_id) {
        Some(application_id) => db.get_application(user_id, application_id).await,
        None => Ok(None),
    }
}
