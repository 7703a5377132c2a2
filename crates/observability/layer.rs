use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{
    Event, Level, Subscriber,
    field::{Field, Visit},
};
use tracing_subscriber::{Layer, layer::Context, registry::LookupSpan};

use super::{
    alerts::{AlertEvent, AlertQueue},
    config::ServiceContext,
};

const REDACTED: &str = "[REDACTED]";

/// Forwards events at or above `min_level` to the alert queue.
pub(crate) struct AlertLayer {
    queue: AlertQueue,
    service_context: ServiceContext,
    min_level: Level,
}

impl AlertLayer {
    pub(crate) fn new(queue: AlertQueue, service_context: ServiceContext, min_level: Level) -> Self {
        Self {
            queue,
            service_context,
            min_level,
        }
    }
}

#[derive(Default)]
struct FieldCollector {
    values: BTreeMap<String, String>,
}

impl FieldCollector {
    fn put(&mut self, field: &Field, value: String) {
        let name = field.name();
        let value = if is_sensitive_field(name) {
            REDACTED.to_string()
        } else {
            value
        };
        self.values.insert(name.to_string(), value);
    }
}

impl Visit for FieldCollector {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.put(field, format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.put(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.put(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.put(field, value.to_string());
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.put(field, value.to_string());
    }
}

impl<S> Layer<S> for AlertLayer
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_event(&self, event: &Event<'_>, ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if *metadata.level() > self.min_level {
            return;
        }

        let mut collector = FieldCollector::default();
        event.record(&mut collector);
        let message = collector
            .values
            .remove("message")
            .map(|raw| raw.trim().trim_matches('"').to_string());

        let spans = ctx
            .event_span(event)
            .map(|span| {
                span.scope()
                    .from_root()
                    .map(|s| s.metadata().name().to_string())
                    .collect()
            })
            .unwrap_or_default();

        self.queue.push(AlertEvent {
            level: *metadata.level(),
            timestamp: Utc::now(),
            service_name: self.service_context.service_name.clone(),
            stage: self.service_context.stage.clone(),
            component: self.service_context.component.clone(),
            target: metadata.target().to_string(),
            location: metadata
                .file()
                .zip(metadata.line())
                .map(|(file, line)| format!("{file}:{line}")),
            message,
            fields: collector.values,
            spans,
        });
    }
}

/// Credentials and host meeting links never leave the process.
fn is_sensitive_field(name: &str) -> bool {
    let name = name.to_ascii_lowercase();
    ["secret", "signature", "token", "password", "authorization", "webhook", "start_url"]
        .iter()
        .any(|marker| name.contains(marker))
}
