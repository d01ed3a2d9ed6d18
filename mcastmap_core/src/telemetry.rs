//! Minimal run-time metrics sink.
//!
//! No exporter ships with the crate. A host registers one callback that
//! receives `(name, value)` pairs; labels are folded into the name as
//! `metric{k=v,...}`.

use metrics::{Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit};
use once_cell::sync::OnceCell;
use std::sync::Arc;

/// Signature for external collectors.
pub type StatsCallback = Box<dyn Fn(&str, f64) + Send + Sync + 'static>;

static CALLBACK: OnceCell<StatsCallback> = OnceCell::new();

/// Register the process-wide collector. Only the first call wins; returns
/// `false` when a callback was already set.
pub fn register_stats_callback<F>(cb: F) -> bool
where
    F: Fn(&str, f64) + Send + Sync + 'static,
{
    CALLBACK.set(Box::new(cb)).is_ok()
}

fn emit(name: &str, value: f64) {
    if let Some(cb) = CALLBACK.get() {
        cb(name, value);
    }
}

fn render(key: &Key) -> String {
    let mut labels = key.labels().peekable();
    if labels.peek().is_none() {
        return key.name().to_string();
    }
    let body: Vec<String> = labels.map(|l| format!("{}={}", l.key(), l.value())).collect();
    format!("{}{{{}}}", key.name(), body.join(","))
}

/// Forwarding recorder. Uses the callback **if** it was registered.
struct CallbackRecorder;

struct Forward {
    name: String,
}

impl Recorder for CallbackRecorder {
    fn describe_counter(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_gauge(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}
    fn describe_histogram(&self, _key: KeyName, _unit: Option<Unit>, _description: SharedString) {}

    fn register_counter(&self, key: &Key, _metadata: &Metadata<'_>) -> Counter {
        Counter::from_arc(Arc::new(Forward { name: render(key) }))
    }
    fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
        Gauge::from_arc(Arc::new(Forward { name: render(key) }))
    }
    fn register_histogram(&self, key: &Key, _metadata: &Metadata<'_>) -> Histogram {
        Histogram::from_arc(Arc::new(Forward { name: render(key) }))
    }
}

impl metrics::CounterFn for Forward {
    fn increment(&self, value: u64) {
        emit(&self.name, value as f64);
    }
    fn absolute(&self, value: u64) {
        emit(&self.name, value as f64);
    }
}

impl metrics::GaugeFn for Forward {
    fn increment(&self, value: f64) {
        emit(&self.name, value);
    }
    fn decrement(&self, value: f64) {
        emit(&self.name, -value);
    }
    fn set(&self, value: f64) {
        emit(&self.name, value);
    }
}

impl metrics::HistogramFn for Forward {
    fn record(&self, value: f64) {
        emit(&self.name, value);
    }
}

/// Install exactly once. A recorder installed earlier by the host is kept.
pub fn init() {
    static INIT: std::sync::Once = std::sync::Once::new();
    INIT.call_once(|| {
        let _ = metrics::set_global_recorder(CallbackRecorder);
    });
}
