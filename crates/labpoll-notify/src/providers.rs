use crate::message::{NotifyLevel, NotifyMessage};
use crate::notifier::{Notifier, NotifyResult};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{error, info, warn};

// ============================================================================
// 日志通知
// ============================================================================

/// 通过 tracing 输出通知，无界面运行时的默认渠道
#[derive(Debug, Default)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        match message.level {
            NotifyLevel::Info => info!(title = %message.title, "{}", message.content),
            NotifyLevel::Warning => warn!(title = %message.title, "{}", message.content),
            NotifyLevel::Error | NotifyLevel::Critical => {
                error!(title = %message.title, level = %message.level, "{}", message.content)
            }
        }
        Ok(NotifyResult::success())
    }

    fn name(&self) -> &str {
        "log"
    }
}

// ============================================================================
// Webhook 通知
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    pub url: String,
    pub headers: Option<HashMap<String, String>>,
    /// 请求超时（秒）
    #[serde(default = "default_webhook_timeout")]
    pub timeout_secs: u64,
}

fn default_webhook_timeout() -> u64 {
    5
}

impl WebhookConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: None,
            timeout_secs: default_webhook_timeout(),
        }
    }
}

/// 以 JSON POST 推送通知
pub struct WebhookNotifier {
    config: WebhookConfig,
    client: reqwest::Client,
    enabled: bool,
}

impl WebhookNotifier {
    pub fn new(config: WebhookConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self {
            enabled: !config.url.is_empty(),
            config,
            client,
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult> {
        let mut request = self.client.post(&self.config.url);

        if let Some(headers) = &self.config.headers {
            for (key, value) in headers {
                request = request.header(key, value);
            }
        }

        let response = request.json(message).send().await?;

        if response.status().is_success() {
            Ok(NotifyResult::success())
        } else {
            Ok(NotifyResult::failure(format!(
                "Webhook failed with status: {}",
                response.status()
            )))
        }
    }

    fn name(&self) -> &str {
        "webhook"
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::{Json, Router};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    type Received = Arc<Mutex<Vec<serde_json::Value>>>;

    async fn capture(State(received): State<Received>, Json(body): Json<serde_json::Value>) -> StatusCode {
        received.lock().unwrap().push(body);
        StatusCode::NO_CONTENT
    }

    fn spawn_hook(status_route: bool) -> (String, Received) {
        let received: Received = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/hook", post(capture))
            .route("/broken", post(|| async { StatusCode::INTERNAL_SERVER_ERROR }))
            .with_state(received.clone());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::Server::from_tcp(listener)
                .unwrap()
                .serve(app.into_make_service())
                .await
                .unwrap();
        });

        let path = if status_route { "broken" } else { "hook" };
        (format!("http://{}/{}", addr, path), received)
    }

    #[tokio::test]
    async fn test_webhook_posts_json() {
        let (url, received) = spawn_hook(false);
        let notifier = WebhookNotifier::new(WebhookConfig::new(url)).unwrap();

        let result = notifier
            .send(&NotifyMessage::warning("Device in backoff", "127.0.0.1:56000"))
            .await
            .unwrap();
        assert!(result.is_delivered());

        let bodies = received.lock().unwrap();
        assert_eq!(bodies.len(), 1);
        assert_eq!(bodies[0]["title"], "Device in backoff");
        assert_eq!(bodies[0]["level"], "warning");
    }

    #[tokio::test]
    async fn test_webhook_reports_http_failure() {
        let (url, _) = spawn_hook(true);
        let notifier = WebhookNotifier::new(WebhookConfig::new(url)).unwrap();

        let result = notifier
            .send(&NotifyMessage::error("Flush failed", "database locked"))
            .await
            .unwrap();
        match result {
            NotifyResult::Rejected { reason } => assert!(reason.contains("500")),
            other => panic!("expected rejection, got {other}"),
        }
    }

    #[test]
    fn test_empty_url_disables_webhook() {
        let notifier = WebhookNotifier::new(WebhookConfig::new("")).unwrap();
        assert!(!notifier.is_enabled());
    }

    #[tokio::test]
    async fn test_log_notifier_always_succeeds() {
        let result = LogNotifier::new()
            .send(&NotifyMessage::critical("Store unavailable", "commit failed"))
            .await
            .unwrap();
        assert!(result.is_delivered());
    }
}
