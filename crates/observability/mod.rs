mod alerts;
mod config;
mod layer;

use std::sync::Arc;

use alerts::{AlertQueue, ChatWebhookSink};
use anyhow::Result;
use config::ObservabilityConfig;
use layer::AlertLayer;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt,
};

/// Installs the fmt subscriber (RUST_LOG, default `info`, local RFC 3339 timestamps) plus the
/// optional error alert layer. Must run inside a tokio runtime.
pub fn init_observability(component: &str) -> Result<()> {
    let mut config = ObservabilityConfig::from_env(component);

    let alert_layer = match config.alerts.as_ref() {
        Some(alerts) => match ChatWebhookSink::new(alerts.webhook_url.clone()) {
            Ok(sink) => {
                let queue = AlertQueue::spawn(vec![Arc::new(sink)]);
                Some(
                    AlertLayer::new(queue, config.service_context.clone(), alerts.min_level)
                        .with_filter(LevelFilter::from_level(alerts.min_level)),
                )
            }
            Err(err) => {
                config
                    .warnings
                    .push(format!("alert webhook client could not be built: {err}"));
                None
            }
        },
        None => None,
    };
    let alerts_enabled = alert_layer.is_some();

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(alert_layer)
        .with(env_filter)
        .try_init()?;

    let context = &config.service_context;
    for warning in &config.warnings {
        warn!(
            service = %context.service_name,
            stage = %context.stage,
            component = %context.component,
            warning = %warning,
            "observability config warning"
        );
    }
    info!(
        service = %context.service_name,
        stage = %context.stage,
        component = %context.component,
        alerts_enabled,
        "observability initialised"
    );

    Ok(())
}
