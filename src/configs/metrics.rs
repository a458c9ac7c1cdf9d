use crate::metrics::METRICS_PREFIX;
use const_format::concatcp;
use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_histogram_vec, CounterVec, HistogramVec};

const CONFIG_METRICS_PREFIX: &str = concatcp!(METRICS_PREFIX, "config_");

lazy_static! {
    pub static ref CONFIG_RECONCILE_COUNTER: CounterVec = register_counter_vec!(
        concatcp!(CONFIG_METRICS_PREFIX, "reconcile_counter"),
        "Number of reconciliations by the Config controller.",
        &["name"]
    )
    .unwrap();
    pub static ref CONFIG_ACTION_COUNTER: CounterVec = register_counter_vec!(
        concatcp!(CONFIG_METRICS_PREFIX, "action_counter"),
        "Number of actions taken by the Config controller.",
        &["name", "action"]
    )
    .unwrap();
    pub static ref CONFIG_PHASE_FAILURE_COUNTER: CounterVec = register_counter_vec!(
        concatcp!(CONFIG_METRICS_PREFIX, "phase_failure_counter"),
        "Number of failed installation phases.",
        &["phase"]
    )
    .unwrap();
    pub static ref CONFIG_READ_HISTOGRAM: HistogramVec = register_histogram_vec!(
        concatcp!(CONFIG_METRICS_PREFIX, "read_duration_seconds"),
        "Amount of time taken by the read phase of the Config controller.",
        &["name", "action"]
    )
    .unwrap();
    pub static ref CONFIG_WRITE_HISTOGRAM: HistogramVec = register_histogram_vec!(
        concatcp!(CONFIG_METRICS_PREFIX, "write_duration_seconds"),
        "Amount of time taken by the write phase of the Config controller.",
        &["name", "action"]
    )
    .unwrap();
}
