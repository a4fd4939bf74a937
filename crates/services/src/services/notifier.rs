use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::Utc;
use db::models::etl_run::EtlRun;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use super::config::AlertConfig;

const ALERT_TITLE: &str = "ETL Monitor Alert";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const MAX_ATTEMPTS: usize = 3;

#[derive(Debug, Error)]
pub enum NotifierError {
    #[error("Webhook request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Webhook rejected alert with status {0}")]
    Rejected(reqwest::StatusCode),
}

impl NotifierError {
    fn is_transient(&self) -> bool {
        match self {
            NotifierError::Request(err) => err.is_timeout() || err.is_connect(),
            NotifierError::Rejected(status) => {
                status.is_server_error() || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl AlertLevel {
    pub fn color(self) -> &'static str {
        match self {
            AlertLevel::Info => "#36a64f",
            AlertLevel::Warning => "#ffcc02",
            AlertLevel::Error => "#f44336",
            AlertLevel::Success => "#28a745",
        }
    }
}

#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    attachments: [Attachment<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Attachment<'a> {
    color: &'static str,
    title: &'static str,
    text: &'a str,
    fields: [Field<'a>; 2],
}

#[derive(Debug, Serialize)]
struct Field<'a> {
    title: &'static str,
    value: std::borrow::Cow<'a, str>,
    short: bool,
}

/// Posts Slack-style attachments to a webhook. Disabled when no webhook is configured.
#[derive(Clone)]
pub struct AlertNotifier {
    client: reqwest::Client,
    webhook: Option<Url>,
    environment: String,
}

impl AlertNotifier {
    pub fn new(config: &AlertConfig, environment: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|err| {
                tracing::warn!(error = %err, "Failed to build webhook client; using defaults");
                reqwest::Client::new()
            });
        Self {
            client,
            webhook: config.active_webhook().cloned(),
            environment: environment.into(),
        }
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook: None,
            environment: String::new(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.webhook.is_some()
    }

    /// Sends one alert, retrying transient failures.
    pub async fn send(&self, level: AlertLevel, message: &str) -> Result<(), NotifierError> {
        let Some(webhook) = &self.webhook else {
            return Ok(());
        };

        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();
        let payload = WebhookPayload {
            attachments: [Attachment {
                color: level.color(),
                title: ALERT_TITLE,
                text: message,
                fields: [
                    Field {
                        title: "Timestamp",
                        value: timestamp.into(),
                        short: true,
                    },
                    Field {
                        title: "Environment",
                        value: self.environment.as_str().into(),
                        short: true,
                    },
                ],
            }],
        };

        let post = || async {
            let response = self
                .client
                .post(webhook.clone())
                .json(&payload)
                .send()
                .await?;
            let status = response.status();
            if status.is_success() {
                Ok(())
            } else {
                Err(NotifierError::Rejected(status))
            }
        };

        post.retry(
            ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(200))
                .with_max_delay(Duration::from_secs(2))
                .with_max_times(MAX_ATTEMPTS - 1),
        )
        .when(NotifierError::is_transient)
        .notify(|err, delay| {
            tracing::debug!(
                error = %err,
                delay_ms = delay.as_millis() as u64,
                "retrying webhook alert"
            );
        })
        .await
    }

    /// Fire-and-forget variant: failures are logged, never returned.
    pub async fn notify(&self, level: AlertLevel, message: &str) {
        if let Err(err) = self.send(level, message).await {
            tracing::warn!(error = %err, "Failed to deliver alert");
        }
    }

    pub async fn notify_run_failed(&self, run: &EtlRun) {
        let message = format!(
            "ETL job `{}` failed (run {}): {}",
            run.job_name,
            run.run_id,
            run.error_message.as_deref().unwrap_or("no error message recorded")
        );
        self.notify(AlertLevel::Error, &message).await;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    };

    use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
    use chrono::Utc;
    use db::types::RunStatus;
    use serde_json::Value;
    use tokio::sync::Mutex;

    use super::*;

    #[derive(Clone, Default)]
    struct Receiver {
        bodies: Arc<Mutex<Vec<Value>>>,
        failures_left: Arc<AtomicUsize>,
    }

    async fn receive(State(receiver): State<Receiver>, Json(body): Json<Value>) -> StatusCode {
        if receiver
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return StatusCode::SERVICE_UNAVAILABLE;
        }
        receiver.bodies.lock().await.push(body);
        StatusCode::OK
    }

    async fn spawn_receiver(receiver: Receiver) -> Url {
        let app = Router::new()
            .route("/hook", post(receive))
            .with_state(receiver);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{addr}/hook")).unwrap()
    }

    fn notifier_for(url: Url) -> AlertNotifier {
        AlertNotifier::new(
            &AlertConfig {
                webhook_url: Some(url),
                enabled: true,
                threshold_failures: 5,
            },
            "dbcp",
        )
    }

    fn failed_run() -> EtlRun {
        EtlRun {
            run_id: 42,
            job_name: "job_b".to_string(),
            start_time: Utc::now(),
            end_time: Some(Utc::now()),
            status: RunStatus::Failed,
            rows_processed: 0,
            memory_used_mb: 0.0,
            error_message: Some("timeout".to_string()),
            duration_minutes: Some(0.0),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn level_colors() {
        assert_eq!(AlertLevel::Info.color(), "#36a64f");
        assert_eq!(AlertLevel::Warning.color(), "#ffcc02");
        assert_eq!(AlertLevel::Error.color(), "#f44336");
        assert_eq!(AlertLevel::Success.color(), "#28a745");
    }

    #[tokio::test]
    async fn posts_attachment_payload() {
        let receiver = Receiver::default();
        let url = spawn_receiver(receiver.clone()).await;

        notifier_for(url).notify_run_failed(&failed_run()).await;

        let bodies = receiver.bodies.lock().await;
        assert_eq!(bodies.len(), 1);
        let attachment = &bodies[0]["attachments"][0];
        assert_eq!(attachment["color"], "#f44336");
        assert_eq!(attachment["title"], ALERT_TITLE);
        let text = attachment["text"].as_str().unwrap();
        assert!(text.contains("job_b"));
        assert!(text.contains("timeout"));
        assert_eq!(attachment["fields"][1]["title"], "Environment");
        assert_eq!(attachment["fields"][1]["value"], "dbcp");
    }

    #[tokio::test]
    async fn retries_transient_rejections() {
        let receiver = Receiver::default();
        receiver.failures_left.store(1, Ordering::SeqCst);
        let url = spawn_receiver(receiver.clone()).await;

        notifier_for(url)
            .send(AlertLevel::Warning, "3 failed runs in the last 24h")
            .await
            .unwrap();

        assert_eq!(receiver.bodies.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn disabled_notifier_sends_nothing() {
        let notifier = AlertNotifier::new(
            &AlertConfig {
                webhook_url: Some(Url::parse("http://127.0.0.1:9/hook").unwrap()),
                enabled: false,
                threshold_failures: 5,
            },
            "dbcp",
        );
        assert!(!notifier.is_enabled());
        notifier.send(AlertLevel::Info, "ignored").await.unwrap();
        assert!(!AlertNotifier::disabled().is_enabled());
    }
}
