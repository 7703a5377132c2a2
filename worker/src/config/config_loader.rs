use anyhow::{Context, Result};
use backend::config::stage::Stage;

use super::config_model::{Cron, Database, DotEnvyConfig, Schedule, WorkerServer};

pub const DEFAULT_ROLLING_GENERATION_DAYS: u32 = 7;

fn required(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("{key} is invalid"))
}

fn non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| {
        let trimmed = v.trim().to_string();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}

pub fn load() -> Result<DotEnvyConfig> {
    dotenvy::dotenv().ok();

    let worker_server = WorkerServer {
        port: required("SERVER_PORT_WORKER")?
            .parse()
            .context("SERVER_PORT_WORKER is invalid")?,
        body_limit: required("SERVER_BODY_LIMIT")?
            .parse()
            .context("SERVER_BODY_LIMIT is invalid")?,
        timeout: required("SERVER_TIMEOUT")?
            .parse()
            .context("SERVER_TIMEOUT is invalid")?,
    };

    let database = Database {
        url: required("DATABASE_URL")?,
        max_connections: non_empty("DATABASE_MAX_CONNECTIONS")
            .map(|v| v.parse())
            .transpose()
            .context("DATABASE_MAX_CONNECTIONS is invalid")?
            .unwrap_or(10),
    };

    let schedule = Schedule {
        utc_offset_minutes: non_empty("SCHEDULE_UTC_OFFSET_MINUTES")
            .map(|v| v.parse())
            .transpose()
            .context("SCHEDULE_UTC_OFFSET_MINUTES is invalid")?
            .unwrap_or(330),
    };

    let cron = Cron {
        secret: non_empty("CRON_SECRET"),
        rolling_generation_days: non_empty("ROLLING_GENERATION_DAYS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(DEFAULT_ROLLING_GENERATION_DAYS),
    };

    Ok(DotEnvyConfig {
        worker_server,
        database,
        schedule,
        cron,
    })
}

pub fn get_stage() -> Stage {
    dotenvy::dotenv().ok();

    let stage_str = std::env::var("STAGE").unwrap_or("".to_string());
    Stage::try_from(&stage_str).unwrap_or_default()
}
