#[derive(Debug, Clone)]
pub struct DotEnvyConfig {
    pub worker_server: WorkerServer,
    pub database: Database,
    pub schedule: Schedule,
    pub cron: Cron,
}

#[derive(Debug, Clone)]
pub struct WorkerServer {
    pub port: u16,
    pub timeout: u64,
    pub body_limit: u64,
}

#[derive(Debug, Clone)]
pub struct Database {
    pub url: String,
    pub max_connections: u32,
}

#[derive(Debug, Clone)]
pub struct Schedule {
    pub utc_offset_minutes: i32,
}

#[derive(Debug, Clone)]
pub struct Cron {
    /// Shared secret the scheduler sends in `x-cron-secret`. Unset disables the cron routes.
    pub secret: Option<String>,
    pub rolling_generation_days: u32,
}
