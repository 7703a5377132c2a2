use anyhow::{Context, Result};
use booking_core::{
    domain::value_objects::clock::PlatformClock,
    infra::db::{
        postgres::postgres_connection,
        repositories::{
            appointments::AppointmentPostgres, counsellors::CounsellorPostgres,
            time_slots::TimeSlotPostgres,
        },
    },
};
use std::sync::Arc;
use tracing::{error, info, warn};
use worker::{
    axum_http, config,
    usecases::{
        expire_pending_appointments::ExpirePendingAppointmentsUseCase,
        rolling_slot_generation::RollingSlotGenerationUseCase,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        error!("Worker exited with error: {}", error);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    dotenvy::dotenv().ok();
    booking_core::observability::init_observability("worker")?;

    let dotenvy_env = Arc::new(config::config_loader::load()?);
    info!(stage = %config::config_loader::get_stage(), "ENV has been loaded");
    if dotenvy_env.cron.secret.is_none() {
        warn!("CRON_SECRET is not set; cron routes will answer 503");
    }

    let postgres_pool = Arc::new(postgres_connection::establish_connection(
        &dotenvy_env.database.url,
        dotenvy_env.database.max_connections,
    )?);
    info!("Postgres connection has been established");

    let clock = PlatformClock::from_offset_minutes(dotenvy_env.schedule.utc_offset_minutes)
        .context("invalid SCHEDULE_UTC_OFFSET_MINUTES")?;

    let rolling = Arc::new(RollingSlotGenerationUseCase::new(
        Arc::new(CounsellorPostgres::new(Arc::clone(&postgres_pool))),
        Arc::new(TimeSlotPostgres::new(Arc::clone(&postgres_pool))),
        clock,
        dotenvy_env.cron.rolling_generation_days,
    ));
    let expiry = Arc::new(ExpirePendingAppointmentsUseCase::new(Arc::new(
        AppointmentPostgres::new(Arc::clone(&postgres_pool)),
    )));

    info!("Worker started");
    axum_http::http_serve::start(dotenvy_env, rolling, expiry).await?;

    Ok(())
}
