#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub backend_server: BackendServer,
    pub database: Database,
    pub auth: AuthSecret,
    pub schedule: Schedule,
    pub razorpay: Razorpay,
    pub zoom: Zoom,
    pub email: Email,
}

#[derive(Debug, Clone)]
pub struct BackendServer {
    pub port: u16,
    pub body_limit: u64,
    pub timeout: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct AuthSecret {
    pub jwt_secret: String,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub utc_offset_minutes: i32,
    /// IANA name handed to the meeting provider, e.g. `Asia/Kolkata`.
    pub timezone: String,
}

#[derive(Debug, Clone)]
pub struct Razorpay {
    pub key_id: String,
    pub key_secret: String,
    pub webhook_secret: String,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct Zoom {
    pub account_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub host_email: String,
}

#[derive(Debug, Clone)]
pub struct Email {
    pub api_url: String,
    pub api_key: String,
    pub from: String,
}
