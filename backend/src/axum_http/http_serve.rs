use crate::{
    axum_http::{default_routers, routers},
    config::config_model::DotEnvyConfig,
    usecases::{bookings::BookingSettings, payments::PaymentSettings},
};
use anyhow::{Context, Result};
use axum::{
    Router,
    http::{
        Method,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::get,
};
use booking_core::{
    domain::value_objects::clock::PlatformClock,
    infra::db::postgres::postgres_connection::PgPoolSquad,
    meetings::zoom_client::{ZoomClient, ZoomCredentials},
    notifications::{
        dispatcher::NotificationDispatcher,
        email_client::{EmailSettings, HttpEmailClient},
    },
    payments::razorpay_client::RazorpayClient,
};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{error, info};

pub async fn start(config: Arc<DotEnvyConfig>, db_pool: Arc<PgPoolSquad>) -> Result<()> {
    let clock = PlatformClock::from_offset_minutes(config.schedule.utc_offset_minutes)
        .context("invalid SCHEDULE_UTC_OFFSET_MINUTES")?;

    let meetings = Arc::new(ZoomClient::new(
        ZoomCredentials {
            account_id: config.zoom.account_id.clone(),
            client_id: config.zoom.client_id.clone(),
            client_secret: config.zoom.client_secret.clone(),
        },
        config.schedule.timezone.clone(),
        clock,
    ));
    let razorpay = Arc::new(RazorpayClient::new(
        config.razorpay.key_id.clone(),
        config.razorpay.key_secret.clone(),
        config.razorpay.webhook_secret.clone(),
    ));
    let email_client = HttpEmailClient::new(EmailSettings {
        api_url: config.email.api_url.clone(),
        api_key: config.email.api_key.clone(),
        from: config.email.from.clone(),
    })?;
    let dispatcher = NotificationDispatcher::new(Arc::new(email_client));

    let counsellors = routers::schedule::routes(Arc::clone(&db_pool))
        .merge(routers::time_slots::routes(Arc::clone(&db_pool), clock));

    let app = Router::new()
        .fallback(default_routers::not_found)
        .nest("/api/v1/counsellors", counsellors)
        .nest(
            "/api/v1/appointments",
            routers::appointments::routes(
                Arc::clone(&db_pool),
                clock,
                meetings,
                BookingSettings {
                    currency: config.razorpay.currency.clone(),
                    meeting_host_email: config.zoom.host_email.clone(),
                },
            ),
        )
        .nest(
            "/api/v1/payments",
            routers::payments::routes(
                Arc::clone(&db_pool),
                razorpay,
                dispatcher,
                PaymentSettings {
                    currency: config.razorpay.currency.clone(),
                    key_id: config.razorpay.key_id.clone(),
                },
            ),
        )
        .route("/api/v1/health-check", get(default_routers::health_check))
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.backend_server.timeout,
        )))
        .layer(RequestBodyLimitLayer::new(
            (config.backend_server.body_limit * 1024 * 1024).try_into()?,
        ))
        .layer(
            CorsLayer::new()
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PATCH,
                    Method::PUT,
                    Method::DELETE,
                ])
                .allow_headers([AUTHORIZATION, CONTENT_TYPE])
                .allow_origin(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], config.backend_server.port));
    let listener = TcpListener::bind(addr).await?;

    info!("Server is running on port {}", config.backend_server.port);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = ?err, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!(error = ?err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received ctrl+C signal"),
        _ = terminate => info!("Received terminate signal"),
    }
}
