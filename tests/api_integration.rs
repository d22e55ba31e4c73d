//! Integration tests for the job tracker HTTP API.
//!
//! Each test spins up an Axum server on a random port backed by a fresh
//! on-disk database and drives it over HTTP with reqwest.

use std::time::Duration;

use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use job_tracker::config::ServerConfig;
use job_tracker::error::Error;

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

struct TestServer {
    base: String,
    client: reqwest::Client,
    _dir: tempfile::TempDir,
}

impl TestServer {
    /// Start an Axum server on a random port.
    async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            db_path: dir.path().join("tracker.db"),
            ..ServerConfig::default()
        };
        let app = job_tracker::build_app(&config).await.unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting connections.
        tokio::time::sleep(Duration::from_millis(50)).await;

        Self {
            base: format!("http://127.0.0.1:{port}"),
            client: reqwest::Client::new(),
            _dir: dir,
        }
    }

    async fn ingest(&self, user: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}/events/email-ingested", self.base))
            .header("x-user-email", user)
            .json(&body)
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn get(&self, user: Option<&str>, path: &str) -> (u16, Value) {
        let mut req = self.client.get(format!("{}{path}", self.base));
        if let Some(user) = user {
            req = req.header("x-user-email", user);
        }
        let resp = req.send().await.unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }

    async fn patch_status(&self, user: &str, id: &str, status: &str) -> (u16, Value) {
        let resp = self
            .client
            .patch(format!("{}/applications/{id}/status", self.base))
            .header("x-user-email", user)
            .json(&json!({ "status": status }))
            .send()
            .await
            .unwrap();
        (resp.status().as_u16(), resp.json().await.unwrap())
    }
}

fn applied_email() -> Value {
    json!({
        "messageId": "m1",
        "provider": "gmail",
        "providerMessageId": "gm-1",
        "providerThreadId": "thread-1",
        "sentAt": "2024-01-01T00:00:00Z",
        "subject": "App received",
        "from": { "name": "Airbnb Recruiting", "email": "hr@airbnb.com" },
        "to": ["me@example.com"],
        "classification": "applied"
    })
}

#[tokio::test]
async fn email_thread_drives_status() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let me = "me@example.com";

        let (status, first) = server.ingest(me, applied_email()).await;
        assert_eq!(status, 200);
        assert_eq!(first["statusChanged"], true);
        assert_eq!(first["newStatus"], "APPLIED");
        let app_id = first["applicationId"].as_str().unwrap().to_string();

        // Reply in the same thread.
        let (status, reply) = server
            .ingest(
                me,
                json!({
                    "messageId": "m2",
                    "inReplyTo": "m1",
                    "references": ["m1"],
                    "provider": "gmail",
                    "sentAt": "2024-01-08T10:00:00Z",
                    "subject": "Re: App received",
                    "classification": "interviewing"
                }),
            )
            .await;
        assert_eq!(status, 200);
        assert_eq!(reply["applicationId"], app_id.as_str());
        assert_eq!(reply["statusChanged"], true);
        assert_eq!(reply["newStatus"], "INTERVIEWING");

        // Same reply again: nothing changes.
        let (_, again) = server
            .ingest(
                me,
                json!({
                    "messageId": "m2",
                    "inReplyTo": "m1",
                    "provider": "gmail",
                    "sentAt": "2024-01-08T10:00:00Z",
                    "subject": "Re: App received",
                    "classification": "interviewing"
                }),
            )
            .await;
        assert_eq!(again["emailId"], reply["emailId"]);
        assert_eq!(again["statusChanged"], false);

        let (status, detail) = server.get(Some(me), &format!("/applications/{app_id}")).await;
        assert_eq!(status, 200);
        assert_eq!(detail["status"], "INTERVIEWING");
        assert_eq!(detail["emails"].as_array().unwrap().len(), 2);
        assert_eq!(detail["emails"][0]["messageId"], "m2");
        assert_eq!(detail["emails"][1]["headers"]["providerThreadId"], "thread-1");
        let events = detail["statusEvents"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["fromStatus"], "APPLIED");
        assert_eq!(events[0]["toStatus"], "INTERVIEWING");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn manual_status_changes() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let me = "me@example.com";
        let (_, first) = server.ingest(me, applied_email()).await;
        let app_id = first["applicationId"].as_str().unwrap().to_string();

        let (status, app) = server.patch_status(me, &app_id, "APPLIED").await;
        assert_eq!(status, 200);
        assert_eq!(app["status"], "APPLIED");

        let (status, app) = server.patch_status(me, &app_id, "REJECTED").await;
        assert_eq!(status, 200);
        assert_eq!(app["status"], "REJECTED");

        let (status, body) = server.patch_status(me, &app_id, "GHOSTED").await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "Invalid status");

        let (_, detail) = server.get(Some(me), &format!("/applications/{app_id}")).await;
        let events = detail["statusEvents"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["reason"], "manual");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn users_only_see_their_own_applications() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let (_, first) = server.ingest("alice@example.com", applied_email()).await;
        let app_id = first["applicationId"].as_str().unwrap().to_string();

        let (status, list) = server.get(Some("bob@example.com"), "/applications").await;
        assert_eq!(status, 200);
        assert_eq!(list, json!([]));

        let (status, body) = server
            .get(Some("bob@example.com"), &format!("/applications/{app_id}"))
            .await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "Not found");

        let (status, _) = server.patch_status("bob@example.com", &app_id, "OFFER").await;
        assert_eq!(status, 404);

        let (status, body) = server.get(None, "/applications").await;
        assert_eq!(status, 401);
        assert_eq!(body["error"], "Missing x-user-email");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn health_check() {
    timeout(TEST_TIMEOUT, async {
        let server = TestServer::start().await;
        let (status, body) = server.get(None, "/health").await;
        assert_eq!(status, 200);
        assert_eq!(body["ok"], true);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn serve_reports_a_taken_port() {
    timeout(TEST_TIMEOUT, async {
        let taken = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            bind: "127.0.0.1".parse().unwrap(),
            port: taken.local_addr().unwrap().port(),
            db_path: dir.path().join("tracker.db"),
            ..ServerConfig::default()
        };

        let err = job_tracker::serve(&config).await.unwrap_err();
        assert!(matches!(err, Error::Io { addr, .. } if addr == config.listen_addr()));
    })
    .await
    .expect("test timed out");
}
