use crate::config::{config_model::AuthSecret, stage::Stage};
use anyhow::{Context, Result};

use super::config_model::{
    BackendServer, Database, DotEnvyConfig, Email, Razorpay, Schedule, Zoom,
};

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is invalid"))
}

fn optional(key: &str, default: &str) -> String {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| default.to_string())
}

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let backend_server = BackendServer {
        port: required("SERVER_PORT_BACKEND")?
            .parse()
            .context("SERVER_PORT_BACKEND is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: optional("DATABASE_MAX_CONNECTIONS", "10")
            .parse()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?,
    };

    let schedule = Schedule {
        utc_offset_minutes: optional("SCHEDULE_UTC_OFFSET_MINUTES", "330")
            .parse()
            .context("SCHEDULE_UTC_OFFSET_MINUTES is invalid")?,
        timezone: optional("SCHEDULE_TIMEZONE", "Asia/Kolkata"),
    };

    let razorpay = Razorpay {
        key_id: required("RAZORPAY_KEY_ID")?,
        key_secret: required("RAZORPAY_KEY_SECRET")?,
        webhook_secret: required("RAZORPAY_WEBHOOK_SECRET")?,
        currency: optional("PAYMENT_CURRENCY", "INR").to_ascii_uppercase(),
    };

    let zoom = Zoom {
        account_id: required("ZOOM_ACCOUNT_ID")?,
        client_id: required("ZOOM_CLIENT_ID")?,
        client_secret: required("ZOOM_CLIENT_SECRET")?,
        host_email: required("ZOOM_HOST_EMAIL")?,
    };

    let email = Email {
        api_url: required("EMAIL_API_URL")?,
        api_key: required("EMAIL_API_KEY")?,
        from: required("EMAIL_FROM")?,
    };

    Ok(DotEnvyConfig {
        backend_server,
        database,
        auth: get_auth_secret()?,
        schedule,
        razorpay,
        zoom,
        email,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}

pub fn get_auth_secret() -> Result<AuthSecret> {
    dotenvy::dotenv().ok();

    Ok(AuthSecret {
        jwt_secret: required("JWT_SECRET")?,
    })
}
