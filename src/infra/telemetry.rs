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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "aggregator_cache_hit_total",
            Unit::Count,
            "Reads served from the fast cache."
        );
        describe_counter!(
            "aggregator_cache_miss_total",
            Unit::Count,
            "Reads that found no cache entry and went to the store."
        );
        describe_counter!(
            "aggregator_cache_error_total",
            Unit::Count,
            "Cache lookups, decodes or write-backs that failed and were bypassed."
        );
        describe_counter!(
            "aggregator_views_recorded_total",
            Unit::Count,
            "Views counted in the fast cache."
        );
        describe_counter!(
            "aggregator_views_reconciled_total",
            Unit::Count,
            "Views moved from the fast cache into the store."
        );
        describe_counter!(
            "aggregator_views_reconcile_failed_total",
            Unit::Count,
            "Reconciliation cycles that failed and kept their pending counts."
        );
        describe_histogram!(
            "aggregator_views_reconcile_ms",
            Unit::Milliseconds,
            "Reconciliation cycle latency in milliseconds."
        );
    });
}
