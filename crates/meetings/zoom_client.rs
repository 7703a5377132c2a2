use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use super::token_cache::{IssuedToken, TokenCache, TokenSource};
use crate::domain::{
    repositories::meetings::MeetingLinkProvider,
    value_objects::{
        clock::PlatformClock,
        meetings::{MEETING_DURATION_MINUTES, MeetingLink, MeetingRequest},
    },
};

const DEFAULT_OAUTH_URL: &str = "https://zoom.us/oauth/token";
const DEFAULT_API_BASE: &str = "https://api.zoom.us/v2";
const SCHEDULED_MEETING: u8 = 2;

#[derive(Debug, Clone)]
pub struct ZoomCredentials {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
}

/// Server-to-server OAuth (`account_credentials` grant).
pub struct ZoomOAuth {
    http: reqwest::Client,
    oauth_url: String,
    credentials: ZoomCredentials,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[async_trait]
impl TokenSource for ZoomOAuth {
    async fn issue_token(&self) -> Result<IssuedToken> {
        let resp = self
            .http
            .post(&self.oauth_url)
            .query(&[
                ("grant_type", "account_credentials"),
                ("account_id", self.credentials.account_id.as_str()),
            ])
            .basic_auth(
                &self.credentials.client_id,
                Some(&self.credentials.client_secret),
            )
            .send()
            .await?;
        let resp = ensure_success(resp, "issue access token").await?;
        let token: TokenResponse = resp.json().await?;

        Ok(IssuedToken {
            value: token.access_token,
            expires_in_secs: token.expires_in,
        })
    }
}

#[derive(Debug, Serialize)]
struct MeetingSettings {
    host_video: bool,
    participant_video: bool,
    join_before_host: bool,
    mute_upon_entry: bool,
    waiting_room: bool,
}

#[derive(Debug, Serialize)]
struct CreateMeetingBody<'a> {
    topic: &'a str,
    #[serde(rename = "type")]
    type_: u8,
    start_time: String,
    timezone: &'a str,
    duration: u32,
    settings: MeetingSettings,
}

#[derive(Debug, Deserialize)]
struct MeetingResponse {
    id: i64,
    join_url: String,
    start_url: String,
}

async fn ensure_success(resp: reqwest::Response, context: &str) -> Result<reqwest::Response> {
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
        context = %context,
        "zoom api request failed"
    );

    anyhow::bail!("Zoom API request failed: {} (status {})", context, status);
}

pub struct ZoomClient {
    http: reqwest::Client,
    api_base: String,
    timezone: String,
    clock: PlatformClock,
    tokens: TokenCache<ZoomOAuth>,
}

impl ZoomClient {
    pub fn new(credentials: ZoomCredentials, timezone: String, clock: PlatformClock) -> Self {
        let http = reqwest::Client::new();
        let oauth = ZoomOAuth {
            http: http.clone(),
            oauth_url: DEFAULT_OAUTH_URL.to_string(),
            credentials,
        };

        Self {
            http,
            api_base: DEFAULT_API_BASE.to_string(),
            timezone,
            clock,
            tokens: TokenCache::new(oauth),
        }
    }
}

#[async_trait]
impl MeetingLinkProvider for ZoomClient {
    async fn create_meeting(&self, request: MeetingRequest) -> Result<MeetingLink> {
        let token = self.tokens.get_token().await?;
        let start_time = self
            .clock
            .to_utc(request.date, request.time_slot.start)
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let resp = self
            .http
            .post(format!(
                "{}/users/{}/meetings",
                self.api_base,
                urlencode_path(&request.host_email)
            ))
            .header(AUTHORIZATION, format!("Bearer {token}"))
            .json(&CreateMeetingBody {
                topic: &request.topic,
                type_: SCHEDULED_MEETING,
                start_time,
                timezone: &self.timezone,
                duration: MEETING_DURATION_MINUTES,
                settings: MeetingSettings {
                    host_video: true,
                    participant_video: true,
                    join_before_host: false,
                    mute_upon_entry: true,
                    waiting_room: true,
                },
            })
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            self.tokens.invalidate().await;
        }
        let resp = ensure_success(resp, "create meeting").await?;
        let meeting: MeetingResponse = resp.json().await.context("malformed meeting response")?;

        info!(
            meeting_id = meeting.id,
            date = %request.date,
            time_slot = %request.time_slot.label(),
            "meetings: meeting created"
        );

        Ok(MeetingLink {
            meeting_id: meeting.id.to_string(),
            join_url: meeting.join_url,
            start_url: meeting.start_url,
        })
    }
}

fn urlencode_path(segment: &str) -> String {
    url::form_urlencoded::byte_serialize(segment.as_bytes()).collect()
}
