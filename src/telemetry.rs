/* src/telemetry.rs */
//! Tracing-backed metric handles.
//!
//! Metrics are emitted as structured `tracing` events rather than exported, so any
//! subscriber (console, JSON, rolling file) picks them up without extra plumbing.
/*▫~•◦────────────────────────────────────────────────────────────────────────────────────‣
 * © 2025 ArcMoon Studios ◦ SPDX-License-Identifier MIT OR Apache-2.0 ◦ Author: Lord Xyn ✶
 *///◦────────────────────────────────────────────────────────────────────────────────────‣

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

/// A counter metric that emits structured logs with `tracing`.
#[derive(Debug)]
pub struct Counter {
    name: &'static str,
    value: AtomicU64,
}

impl Counter {
    /// Creates a new `Counter` with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self { name, value: AtomicU64::new(0) }
    }

    /// Increments the counter by a given delta.
    pub fn increment(&self, delta: u64) {
        let new_value = self.value.fetch_add(delta, Ordering::Relaxed) + delta;
        trace!(
            metric_type = "counter",
            metric_name = self.name,
            value = new_value,
            delta,
            "Counter incremented"
        );
    }

    /// Current value.
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

/// A gauge metric that emits structured logs with `tracing`.
#[derive(Debug)]
pub struct Gauge {
    name: &'static str,
    bits: AtomicU64,
}

impl Gauge {
    /// Creates a new `Gauge` with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self { name, bits: AtomicU64::new(0) }
    }

    /// Sets the gauge to a new value.
    pub fn set(&self, value: f64) {
        self.bits.store(value.to_bits(), Ordering::Relaxed);
        debug!(metric_type = "gauge", metric_name = self.name, value, "Gauge updated");
    }

    /// Last value set.
    pub fn get(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }
}

/// A histogram metric that emits structured logs with `tracing`.
#[derive(Debug)]
pub struct Histogram {
    name: &'static str,
}

impl Histogram {
    /// Creates a new `Histogram` with the given name.
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Records a single observation.
    pub fn record(&self, value: f64) {
        debug!(metric_type = "histogram", metric_name = self.name, value, "Histogram value recorded");
    }
}

/// Creates or retrieves a static `Counter` instance.
#[macro_export]
macro_rules! counter {
    ($name:expr) => {{
        static COUNTER: $crate::telemetry::Counter = $crate::telemetry::Counter::new($name);
        &COUNTER
    }};
}

/// Creates or retrieves a static `Gauge` instance.
#[macro_export]
macro_rules! gauge {
    ($name:expr) => {{
        static GAUGE: $crate::telemetry::Gauge = $crate::telemetry::Gauge::new($name);
        &GAUGE
    }};
}

/// Creates or retrieves a static `Histogram` instance.
#[macro_export]
macro_rules! histogram {
    ($name:expr) => {{
        static HISTOGRAM: $crate::telemetry::Histogram = $crate::telemetry::Histogram::new($name);
        &HISTOGRAM
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_counter_macro_is_static_per_call_site() {
        fn bump() -> u64 {
            let c = counter!("lumistab.test.bump");
            c.increment(2);
            c.get()
        }
        let first = bump();
        let second = bump();
        assert_eq!(second, first + 2);
    }

    #[test]
    fn test_gauge_keeps_last_value() {
        let g = gauge!("lumistab.test.gauge");
        g.set(1.5);
        g.set(-0.25);
        assert_eq!(g.get(), -0.25);
        histogram!("lumistab.test.histogram").record(3.0);
    }
}
