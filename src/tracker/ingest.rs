//! Inbound email payload: validation and mapping onto stored rows.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ValidationError;
use crate::tracker::model::{AppStatus, Email};
use crate::tracker::normalize::{company_from_sender, non_blank};
use crate::tracker::resolver::ThreadHints;

/// Company and role used when nothing better is known.
pub const UNKNOWN: &str = "Unknown";

/// Sender of an inbound email.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Sender {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

/// A parsed email as posted by the mail integration.
///
/// Every field is optional on the wire; `validate` enforces what is required.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EmailIngested {
    pub provider: Option<String>,
    pub provider_message_id: Option<String>,
    pub provider_thread_id: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub references: Option<Vec<String>>,
    pub from: Option<Sender>,
    pub to: Option<Vec<String>>,
    pub cc: Option<Vec<String>>,
    pub sent_at: Option<String>,
    pub subject: Option<String>,
    pub snippet: Option<String>,
    pub body_text: Option<String>,
    pub body_html: Option<String>,
    pub headers: Option<serde_json::Map<String, serde_json::Value>>,
    /// Free-text status hint, e.g. "interviewing".
    pub classification: Option<String>,
    pub inferred_company: Option<String>,
    pub inferred_role: Option<String>,
}

impl EmailIngested {
    /// Check required fields and return the parsed send time.
    ///
    /// An email needs a `messageId` or a `provider` + `providerMessageId`
    /// pair, and always a `provider`, `sentAt` and `subject`.
    pub fn validate(&self) -> Result<DateTime<Utc>, ValidationError> {
        let provider = non_blank(self.provider.as_deref());
        let has_message_id = non_blank(self.message_id.as_deref()).is_some();
        let has_provider_id =
            provider.is_some() && non_blank(self.provider_message_id.as_deref()).is_some();
        if !has_message_id && !has_provider_id {
            return Err(ValidationError::MissingIdentifier);
        }

        let sent_at = non_blank(self.sent_at.as_deref());
        let subject = non_blank(self.subject.as_deref());
        let (Some(_), Some(sent_at), Some(_)) = (provider, sent_at, subject) else {
            return Err(ValidationError::MissingRequired);
        };

        parse_sent_at(sent_at).ok_or(ValidationError::InvalidSentAt)
    }

    pub fn message_id(&self) -> Option<&str> {
        non_blank(self.message_id.as_deref())
    }

    pub fn provider_message_id(&self) -> Option<&str> {
        non_blank(self.provider_message_id.as_deref())
    }

    pub fn thread_hints(&self) -> ThreadHints<'_> {
        ThreadHints {
            in_reply_to: self.in_reply_to.as_deref(),
            references: self.references.as_deref().unwrap_or_default(),
            provider_thread_id: self.provider_thread_id.as_deref(),
        }
    }

    /// Explicit company, else the sender's domain, else "Unknown".
    pub fn company_guess(&self) -> String {
        non_blank(self.inferred_company.as_deref())
            .map(str::to_string)
            .or_else(|| company_from_sender(self.sender_email()))
            .unwrap_or_else(|| UNKNOWN.to_string())
    }

    /// Explicit role, else "Unknown".
    pub fn role_guess(&self) -> String {
        non_blank(self.inferred_role.as_deref())
            .unwrap_or(UNKNOWN)
            .to_string()
    }

    pub fn desired_status(&self) -> AppStatus {
        AppStatus::from_classification(self.classification.as_deref())
    }

    fn sender_email(&self) -> Option<&str> {
        self.from.as_ref().and_then(|f| f.email.as_deref())
    }

    /// Headers as stored: the posted headers plus `providerThreadId` and,
    /// when present, `references`.
    pub fn stored_headers(&self) -> serde_json::Value {
        let mut headers = self.headers.clone().unwrap_or_default();
        headers.insert(
            "providerThreadId".into(),
            match non_blank(self.provider_thread_id.as_deref()) {
                Some(id) => serde_json::Value::String(id.to_string()),
                None => serde_json::Value::Null,
            },
        );
        let references = self.thread_hints().references;
        if !references.is_empty() {
            headers.insert("references".into(), serde_json::json!(references));
        }
        serde_json::Value::Object(headers)
    }

    /// Build the email row. When `existing` is given the row keeps its id,
    /// application link and creation time.
    pub fn to_email(&self, user_id: Uuid, sent_at: DateTime<Utc>, existing: Option<&Email>) -> Email {
        let now = Utc::now();
        Email {
            id: existing.map_or_else(Uuid::new_v4, |e| e.id),
            user_id,
            application_id: existing.and_then(|e| e.application_id),
            provider: owned(&self.provider),
            provider_message_id: owned(&self.provider_message_id),
            message_id: owned(&self.message_id),
            in_reply_to: owned(&self.in_reply_to),
            from_name: self.from.as_ref().and_then(|f| owned(&f.name)),
            from_email: self.from.as_ref().and_then(|f| owned(&f.email)),
            to_emails: self.to.clone().unwrap_or_default(),
            cc_emails: self.cc.clone().unwrap_or_default(),
            sent_at,
            subject: self.subject.as_deref().unwrap_or_default().trim().to_string(),
            snippet: self.snippet.clone(),
            body_text: self.body_text.clone(),
            body_html: self.body_html.clone(),
            headers: self.stored_headers(),
            created_at: existing.map_or(now, |e| e.created_at),
            updated_at: now,
        }
    }
}

fn owned(value: &Option<String>) -> Option<String> {
    non_blank(value.as_deref()).map(str::to_string)
}

/// Accepts RFC 3339 (`2024-01-01T00:00:00Z`) and RFC 2822 email dates.
fn parse_sent_at(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .or_else(|_| DateTime::parse_from_rfc2822(raw))
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> EmailIngested {
        serde_json::from_value(serde_json::json!({
            "provider": "gmail",
            "messageId": "m1",
            "sentAt": "2024-01-01T00:00:00Z",
            "subject": "App received",
            "from": { "name": "HR", "email": "hr@airbnb.com" },
            "classification": "applied"
        }))
        .unwrap()
    }

    #[test]
    fn valid_payload_parses_sent_at() {
        let sent_at = valid().validate().unwrap();
        assert_eq!(sent_at.to_rfc3339(), "2024-01-01T00:00:00+00:00");
    }

    #[test]
    fn rfc2822_dates_are_accepted() {
        let mut payload = valid();
        payload.sent_at = Some("Mon, 1 Jan 2024 09:30:00 +0100".into());
        assert_eq!(payload.validate().unwrap().to_rfc3339(), "2024-01-01T08:30:00+00:00");
    }

    #[test]
    fn needs_some_message_identifier() {
        let mut payload = valid();
        payload.message_id = None;
        assert_eq!(payload.validate(), Err(ValidationError::MissingIdentifier));

        payload.provider_message_id = Some("pm-1".into());
        assert!(payload.validate().is_ok());

        // providerMessageId alone is not enough without a provider.
        payload.provider = None;
        assert_eq!(payload.validate(), Err(ValidationError::MissingIdentifier));
    }

    #[test]
    fn needs_provider_sent_at_and_subject() {
        for strip in ["provider", "sentAt", "subject"] {
            let mut payload = valid();
            match strip {
                "provider" => payload.provider = None,
                "sentAt" => payload.sent_at = Some(String::new()),
                _ => payload.subject = Some("  ".into()),
            }
            assert_eq!(payload.validate(), Err(ValidationError::MissingRequired), "{strip}");
        }
    }

    #[test]
    fn bad_sent_at_is_rejected() {
        let mut payload = valid();
        payload.sent_at = Some("yesterday".into());
        assert_eq!(payload.validate(), Err(ValidationError::InvalidSentAt));
    }

    #[test]
    fn company_guess_prefers_explicit_value() {
        let mut payload = valid();
        assert_eq!(payload.company_guess(), "airbnb");

        payload.inferred_company = Some("  Airbnb Inc. ".into());
        assert_eq!(payload.company_guess(), "Airbnb Inc.");

        payload.inferred_company = Some("   ".into());
        payload.from = None;
        assert_eq!(payload.company_guess(), "Unknown");
    }

    #[test]
    fn role_guess_defaults_to_unknown() {
        let mut payload = valid();
        assert_eq!(payload.role_guess(), "Unknown");
        payload.inferred_role = Some(" Backend Engineer ".into());
        assert_eq!(payload.role_guess(), "Backend Engineer");
    }

    #[test]
    fn stored_headers_carry_thread_metadata() {
        let mut payload = valid();
        assert_eq!(payload.stored_headers(), serde_json::json!({ "providerThreadId": null }));

        payload.provider_thread_id = Some("t-1".into());
        payload.references = Some(vec!["a".into(), "b".into()]);
        payload.headers = Some(
            serde_json::json!({ "X-Mailer": "x" })
                .as_object()
                .cloned()
                .unwrap(),
        );
        assert_eq!(
            payload.stored_headers(),
            serde_json::json!({ "X-Mailer": "x", "providerThreadId": "t-1", "references": ["a", "b"] })
        );
    }

    #[test]
    fn to_email_keeps_identity_of_existing_row() {
        let payload = valid();
        let user_id = Uuid::new_v4();
        let sent_at = payload.validate().unwrap();
        let first = payload.to_email(user_id, sent_at, None);
        assert_eq!(first.from_email.as_deref(), Some("hr@airbnb.com"));
        assert_eq!(first.subject, "App received");

        let mut linked = first.clone();
        linked.application_id = Some(Uuid::new_v4());
        let again = payload.to_email(user_id, sent_at, Some(&linked));
        assert_eq!(again.id, first.id);
        assert_eq!(again.application_id, linked.application_id);
        assert_eq!(again.created_at, first.created_at);
    }

    #[test]
    fn unknown_fields_are_ignored() {
        let payload: EmailIngested = serde_json::from_value(serde_json::json!({
            "provider": "gmail",
            "messageId": "m1",
            "sentAt": "2024-01-01T00:00:00Z",
            "subject": "s",
            "labels": ["INBOX"]
        }))
        .unwrap();
        assert!(payload.validate().is_ok());
    }
}
