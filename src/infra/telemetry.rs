use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_gauge!(
            "corrente_requests_active",
            Unit::Count,
            "Requests currently in flight in this worker."
        );
        describe_histogram!(
            "corrente_request_duration_ms",
            Unit::Milliseconds,
            "Total request time, labeled by response status."
        );
        describe_histogram!(
            "corrente_lifecycle_stage_ms",
            Unit::Milliseconds,
            "Per-stage lifecycle time, labeled by stage."
        );
        describe_histogram!(
            "corrente_first_flush_ms",
            Unit::Milliseconds,
            "Time from request start to the first network flush."
        );
        describe_histogram!(
            "corrente_element_render_ms",
            Unit::Milliseconds,
            "Individual element render time."
        );
        describe_histogram!(
            "corrente_render_total_ms",
            Unit::Milliseconds,
            "Total time spent rendering elements per request."
        );
        describe_histogram!(
            "corrente_late_arrival_ms",
            Unit::Milliseconds,
            "Time from request start to each late-arrival emission."
        );
        describe_histogram!(
            "corrente_bytes_written",
            Unit::Bytes,
            "Response bytes written through the sink per request."
        );
        describe_counter!(
            "corrente_data_requests_total",
            Unit::Count,
            "Total data fetches tracked across requests."
        );
        describe_counter!(
            "corrente_late_arrivals_total",
            Unit::Count,
            "Total data fetches that missed the main document body."
        );
    });
}
