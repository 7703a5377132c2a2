use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tracing::{error, info};

use crate::domain::{
    repositories::notifications::EmailSender, value_objects::notifications::EmailMessage,
};

#[derive(Debug, Clone)]
pub struct EmailSettings {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}

/// Transactional email over an HTTP JSON API authenticated with a bearer key.
pub struct HttpEmailClient {
    http: reqwest::Client,
    settings: EmailSettings,
}

#[derive(Debug, Serialize)]
struct SendEmailBody<'a> {
    from: &'a str,
    to: [&'a str; 1],
    subject: &'a str,
    html: &'a str,
}

impl HttpEmailClient {
    pub fn new(settings: EmailSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("failed to build email http client")?;
        Ok(Self { http, settings })
    }
}

async fn ensure_success(resp: reqwest::Response, to: &str) -> Result<reqwest::Response> {
    if resp.status().is_success() {
        return Ok(resp);
    }

    let status = resp.status();
    let body = match resp.text().await {
        Ok(text) if !text.is_empty() => text,
        Ok(_) => "<empty response body>".to_string(),
        Err(err) => format!("<failed to read response body: {err}>"),
    };

    error!(
        status = %status,
        response_body = %body,
        to = %to,
        "email api request failed"
    );

    anyhow::bail!("email delivery to {} failed (status {})", to, status);
}

#[async_trait]
impl EmailSender for HttpEmailClient {
    async fn send(&self, message: EmailMessage) -> Result<()> {
        let resp = self
            .http
            .post(&self.settings.api_url)
            .bearer_auth(&self.settings.api_key)
            .json(&SendEmailBody {
                from: &self.settings.from,
                to: [&message.to],
                subject: &message.subject,
                html: &message.html,
            })
            .send()
            .await
            .context("email api unreachable")?;
        ensure_success(resp, &message.to).await?;

        info!(to = %message.to, subject = %message.subject, "notifications: email sent");
        Ok(())
    }
}
