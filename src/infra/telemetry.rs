use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
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
///
/// Logs go to stderr so `kiln content` output stays clean on stdout.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed(),
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
        describe_counter!(
            "kiln_cache_hit_total",
            Unit::Count,
            "Total number of cache lookups served from a fresh entry."
        );
        describe_counter!(
            "kiln_cache_regenerate_total",
            Unit::Count,
            "Total number of cache entries regenerated from source."
        );
        describe_counter!(
            "kiln_cache_placeholder_total",
            Unit::Count,
            "Total number of empty placeholder entries created."
        );
        describe_counter!(
            "kiln_minify_fallback_total",
            Unit::Count,
            "Total number of minify failures that fell back to original content."
        );
        describe_counter!(
            "kiln_cache_clear_total",
            Unit::Count,
            "Total number of cache tree removals."
        );
        describe_histogram!(
            "kiln_cache_regenerate_ms",
            Unit::Milliseconds,
            "Cache entry regeneration latency in milliseconds."
        );
    });
}
