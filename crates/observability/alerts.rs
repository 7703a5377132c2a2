use std::{collections::BTreeMap, sync::Arc, time::Duration};

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{Level, warn};
use url::Url;

const ALERT_QUEUE_CAPACITY: usize = 256;
const MESSAGE_LIMIT: usize = 2000;

#[derive(Debug, Clone)]
pub(crate) struct AlertEvent {
    pub(crate) level: Level,
    pub(crate) timestamp: DateTime<Utc>,
    pub(crate) service_name: String,
    pub(crate) stage: String,
    pub(crate) component: String,
    pub(crate) target: String,
    pub(crate) location: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) fields: BTreeMap<String, String>,
    pub(crate) spans: Vec<String>,
}

impl AlertEvent {
    pub(crate) fn render(&self) -> String {
        let mut lines = vec![format!(
            "**{}** `{}` `{}` `{}`",
            self.service_name, self.stage, self.component, self.level
        )];

        let mut origin = format!(
            "`{}` `{}`",
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.target
        );
        if let Some(location) = &self.location {
            origin.push_str(&format!(" `{location}`"));
        }
        lines.push(origin);

        if let Some(message) = self.message.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            lines.push(format!("> {message}"));
        }
        if !self.spans.is_empty() {
            lines.push(format!("spans: `{}`", self.spans.join(" > ")));
        }
        for (key, value) in &self.fields {
            lines.push(format!("- `{key}` = `{value}`"));
        }

        truncate(lines.join("\n"))
    }
}

fn truncate(content: String) -> String {
    const SUFFIX: &str = "\n... (truncated)";
    if content.chars().count() <= MESSAGE_LIMIT {
        return content;
    }
    let keep = MESSAGE_LIMIT - SUFFIX.len();
    let mut truncated: String = content.chars().take(keep).collect();
    truncated.push_str(SUFFIX);
    truncated
}

#[async_trait]
pub(crate) trait AlertSink: Send + Sync {
    async fn deliver(&self, event: &AlertEvent) -> Result<()>;
    fn name(&self) -> &'static str;
}

/// Chat webhook accepting `{"content": "..."}`.
pub(crate) struct ChatWebhookSink {
    webhook_url: Url,
    client: Client,
}

impl ChatWebhookSink {
    pub(crate) fn new(webhook_url: Url) -> Result<Self> {
        let client = Client::builder().timeout(Duration::from_secs(3)).build()?;
        Ok(Self {
            webhook_url,
            client,
        })
    }
}

#[async_trait]
impl AlertSink for ChatWebhookSink {
    async fn deliver(&self, event: &AlertEvent) -> Result<()> {
        let response = self
            .client
            .post(self.webhook_url.clone())
            .json(&json!({ "content": event.render() }))
            .send()
            .await
            // reqwest errors echo the URL, which carries the webhook credential.
            .map_err(|err| {
                if err.is_timeout() {
                    anyhow!("alert webhook request timed out")
                } else {
                    anyhow!("alert webhook request failed")
                }
            })?;

        if !response.status().is_success() {
            return Err(anyhow!("alert webhook returned status {}", response.status()));
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "chat_webhook"
    }
}

/// Bounded queue drained by one background task; full queues drop events.
#[derive(Clone)]
pub(crate) struct AlertQueue {
    tx: mpsc::Sender<AlertEvent>,
}

impl AlertQueue {
    pub(crate) fn spawn(sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        let (tx, mut rx) = mpsc::channel::<AlertEvent>(ALERT_QUEUE_CAPACITY);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                for sink in &sinks {
                    if let Err(error) = sink.deliver(&event).await {
                        warn!(sink = sink.name(), error = %error, "alert delivery failed");
                    }
                }
            }
        });

        Self { tx }
    }

    pub(crate) fn push(&self, event: AlertEvent) {
        if let Err(err) = self.tx.try_send(event) {
            let reason = match err {
                mpsc::error::TrySendError::Full(_) => "full",
                mpsc::error::TrySendError::Closed(_) => "closed",
            };
            warn!(reason, "alert queue unavailable; dropping event");
        }
    }
}
