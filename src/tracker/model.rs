//! Tracker data model: applications, emails, status history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Where an application stands. Also the column set of the status board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AppStatus {
    Applied,
    Interviewing,
    Rejected,
    Offer,
    Other,
}

impl AppStatus {
    /// Board column order.
    pub const ALL: [AppStatus; 5] = [
        AppStatus::Applied,
        AppStatus::Interviewing,
        AppStatus::Rejected,
        AppStatus::Offer,
        AppStatus::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            AppStatus::Applied => "APPLIED",
            AppStatus::Interviewing => "INTERVIEWING",
            AppStatus::Rejected => "REJECTED",
            AppStatus::Offer => "OFFER",
            AppStatus::Other => "OTHER",
        }
    }

    /// Map a free-text classification hint onto a status.
    ///
    /// Matching is case-insensitive. `OTHER` is never matched by name: it is
    /// only the fallback for absent or unrecognised hints.
    pub fn from_classification(hint: Option<&str>) -> Self {
        match hint.unwrap_or_default().to_uppercase().as_str() {
            "APPLIED" => AppStatus::Applied,
            "INTERVIEWING" => AppStatus::Interviewing,
            "REJECTED" => AppStatus::Rejected,
            "OFFER" => AppStatus::Offer,
            _ => AppStatus::Other,
        }
    }
}

impl fmt::Display for AppStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AppStatus {
    type Err = String;

    /// Strict parse of the stored form.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AppStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown application status: {s}"))
    }
}

/// Why a status changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusReason {
    /// Inferred from an ingested email.
    Auto,
    /// Set directly by the user.
    Manual,
}

impl StatusReason {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusReason::Auto => "auto",
            StatusReason::Manual => "manual",
        }
    }
}

impl FromStr for StatusReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(StatusReason::Auto),
            "manual" => Ok(StatusReason::Manual),
            other => Err(format!("unknown status reason: {other}")),
        }
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserIdentity {
    pub id: Uuid,
    pub email: String,
}

/// A tracked job application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    pub id: Uuid,
    /// Owner of this application.
    pub user_id: Uuid,
    pub company: String,
    pub role_title: String,
    pub status: AppStatus,
    /// Sent time of the latest email, or the time of the last manual change.
    pub last_activity_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Application {
    pub fn new(
        user_id: Uuid,
        company: impl Into<String>,
        role_title: impl Into<String>,
        status: AppStatus,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id,
            company: company.into(),
            role_title: role_title.into(),
            status,
            last_activity_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Builder: set last activity.
    pub fn with_last_activity(mut self, at: DateTime<Utc>) -> Self {
        self.last_activity_at = Some(at);
        self
    }
}

/// A stored inbound email.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Email {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Null until the email has been linked.
    pub application_id: Option<Uuid>,
    pub provider: Option<String>,
    pub provider_message_id: Option<String>,
    /// RFC 5322 Message-ID as set by the sending client.
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub from_name: Option<String>,
    pub from_email: Option<String>,
    pub to_emails: Vec<String>,
    pub cc_emails: Vec<String>,
    pub sent_at: DateTime<Utc>,
    pub subject: String,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    /// Raw headers plus `providerThreadId` and `references`.
    pub headers: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One entry of an application's append-only status history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub id: Uuid,
    pub application_id: Uuid,
    /// `None` for the first event of an application.
    pub from_status: Option<AppStatus>,
    pub to_status: AppStatus,
    pub reason: StatusReason,
    pub created_at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(
        application_id: Uuid,
        from_status: Option<AppStatus>,
        to_status: AppStatus,
        reason: StatusReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            application_id,
            from_status,
            to_status,
            reason,
            created_at: Utc::now(),
        }
    }
}

/// An application with its email timeline and status history.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationDetail {
    #[serde(flatten)]
    pub application: Application,
    /// Newest first.
    pub emails: Vec<Email>,
    /// Newest first.
    pub status_events: Vec<StatusEvent>,
}

/// Applications grouped into one column per status, newest update first.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatusBoard {
    #[serde(rename = "APPLIED")]
    pub applied: Vec<Application>,
    #[serde(rename = "INTERVIEWING")]
    pub interviewing: Vec<Application>,
    #[serde(rename = "REJECTED")]
    pub rejected: Vec<Application>,
    #[serde(rename = "OFFER")]
    pub offer: Vec<Application>,
    #[serde(rename = "OTHER")]
    pub other: Vec<Application>,
}

impl StatusBoard {
    pub fn from_applications(apps: impl IntoIterator<Item = Application>) -> Self {
        let mut board = Self::default();
        for app in apps {
            board.column_mut(app.status).push(app);
        }
        for status in AppStatus::ALL {
            board
                .column_mut(status)
                .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        }
        board
    }

    pub fn column(&self, status: AppStatus) -> &[Application] {
        match status {
            AppStatus::Applied => &self.applied,
            AppStatus::Interviewing => &self.interviewing,
            AppStatus::Rejected => &self.rejected,
            AppStatus::Offer => &self.offer,
            AppStatus::Other => &self.other,
        }
    }

    fn column_mut(&mut self, status: AppStatus) -> &mut Vec<Application> {
        match status {
            AppStatus::Applied => &mut self.applied,
            AppStatus::Interviewing => &mut self.interviewing,
            AppStatus::Rejected => &mut self.rejected,
            AppStatus::Offer => &mut self.offer,
            AppStatus::Other => &mut self.other,
        }
    }
}
