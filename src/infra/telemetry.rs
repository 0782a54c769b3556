use std::{io, sync::Once};

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
/// Logs go to stderr; stdout carries command output.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "varcache_runtime_hit_total",
            Unit::Count,
            "Variant lookups answered by the in-process runtime layer."
        );
        describe_counter!(
            "varcache_persistent_hit_total",
            Unit::Count,
            "Variant lookups answered by a durable chunk."
        );
        describe_counter!(
            "varcache_miss_total",
            Unit::Count,
            "Variant lookups answered by neither layer."
        );
        describe_counter!(
            "varcache_write_total",
            Unit::Count,
            "Variants persisted to a durable chunk."
        );
        describe_counter!(
            "varcache_invalidation_total",
            Unit::Count,
            "Invalidations performed, labelled by scope."
        );
        describe_counter!(
            "varcache_warm_generated_total",
            Unit::Count,
            "Responsive variants generated by the warmer."
        );
        describe_histogram!(
            "varcache_consistency_check_ms",
            Unit::Milliseconds,
            "Consistency check latency in milliseconds."
        );
        describe_histogram!(
            "varcache_rebuild_ms",
            Unit::Milliseconds,
            "Rebuild-from-filesystem latency in milliseconds."
        );
        describe_histogram!(
            "varcache_warm_ms",
            Unit::Milliseconds,
            "Per-image breakpoint warming latency in milliseconds."
        );
    });
}
