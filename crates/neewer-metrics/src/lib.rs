//! Metrics for the Neewer serial link.
//!
//! Every metric the link records is declared here as a [`Metric`] constant so
//! names, units and label keys live in one place. Recording goes through the
//! re-exported `metrics` crate and is a no-op until the host installs a
//! recorder.
//!
//! # Example
//!
//! ```rust,ignore
//! use neewer_metrics::{describe_metrics, metric_defs, LinkLabels};
//!
//! describe_metrics();
//!
//! let labels = LinkLabels::new("/dev/cu.usbserial-1410");
//! metrics::counter!(metric_defs::FRAMES_DECODED.name, &labels.to_labels()).increment(1);
//! ```

pub use metrics;

use metrics::{describe_counter, describe_gauge, describe_histogram, Unit};

/// The kind of metric (counter, gauge, or histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
    /// A histogram for recording distributions.
    Histogram,
}

impl MetricKind {
    /// Returns the kind as a lowercase string.
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Histogram => "histogram",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
///
/// ```rust
/// use neewer_metrics::{Metric, MetricKind};
/// use metrics::Unit;
///
/// const WRITES: Metric = Metric::counter("neewer.link.frames_written")
///     .with_description("Frames written to the panel")
///     .with_unit(Unit::Count)
///     .with_labels(&["port"]);
///
/// assert_eq!(WRITES.kind, MetricKind::Counter);
/// ```
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name.
    pub name: &'static str,
    /// The kind of metric.
    pub kind: MetricKind,
    /// Human-readable description.
    pub description: &'static str,
    /// The unit of measurement, if any.
    pub unit: Option<Unit>,
    /// Expected label keys.
    pub labels: &'static [&'static str],
}

impl Metric {
    const fn new(name: &'static str, kind: MetricKind) -> Self {
        Self {
            name,
            kind,
            description: "",
            unit: None,
            labels: &[],
        }
    }

    /// Creates a new counter metric with the given name.
    pub const fn counter(name: &'static str) -> Self {
        Self::new(name, MetricKind::Counter)
    }

    /// Creates a new gauge metric with the given name.
    pub const fn gauge(name: &'static str) -> Self {
        Self::new(name, MetricKind::Gauge)
    }

    /// Creates a new histogram metric with the given name.
    pub const fn histogram(name: &'static str) -> Self {
        Self::new(name, MetricKind::Histogram)
    }

    /// Sets the description for the metric.
    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    /// Sets the unit for the metric.
    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Sets the expected label keys for the metric.
    pub const fn with_labels(mut self, labels: &'static [&'static str]) -> Self {
        self.labels = labels;
        self
    }

    /// Registers this metric's description with the installed recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
            (MetricKind::Histogram, Some(unit)) => {
                describe_histogram!(self.name, unit, self.description)
            }
            (MetricKind::Histogram, None) => describe_histogram!(self.name, self.description),
        }
    }
}

/// All metric definitions for the link.
pub mod metric_defs {
    use super::{Metric, Unit};

    /// Labels present on all port-scoped metrics.
    pub const PORT_LABELS: &[&str] = &["port"];

    // ========================================================================
    // Inbound
    // ========================================================================

    /// Valid frames decoded from the serial stream.
    pub const FRAMES_DECODED: Metric = Metric::counter("neewer.link.frames_decoded")
        .with_description("Valid frames decoded from the serial stream")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    /// Bytes dropped as noise or while resynchronizing after a bad checksum.
    pub const BYTES_DISCARDED: Metric = Metric::counter("neewer.link.bytes_discarded")
        .with_description("Bytes dropped as noise or during resync")
        .with_unit(Unit::Bytes)
        .with_labels(PORT_LABELS);

    /// Inbound frames recognized as echoes of our own writes.
    pub const ECHOES_SUPPRESSED: Metric = Metric::counter("neewer.link.echoes_suppressed")
        .with_description("Inbound frames suppressed as echoes of our writes")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    /// Status changes originating from the panel's own controls.
    pub const STATUS_EVENTS: Metric = Metric::counter("neewer.link.status_events")
        .with_description("Status changes reported by the panel")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    // ========================================================================
    // Outbound
    // ========================================================================

    /// Frames written to the panel.
    pub const FRAMES_WRITTEN: Metric = Metric::counter("neewer.link.frames_written")
        .with_description("Frames written to the panel")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    /// Light intents dropped because a newer one arrived within the debounce window.
    pub const INTENTS_COALESCED: Metric = Metric::counter("neewer.link.intents_coalesced")
        .with_description("Light intents replaced by a newer one before sending")
        .with_unit(Unit::Count);

    /// Failed writes (each one drops the connection).
    pub const WRITE_FAILURES: Metric = Metric::counter("neewer.link.write_failures")
        .with_description("Writes that failed and dropped the connection")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    /// Time for the OS to accept a frame.
    pub const WRITE_DURATION: Metric = Metric::histogram("neewer.link.write_duration_us")
        .with_description("Time to write and flush one frame in microseconds")
        .with_unit(Unit::Microseconds)
        .with_labels(PORT_LABELS);

    // ========================================================================
    // Connection
    // ========================================================================

    /// Port open attempts, labeled by outcome.
    pub const CONNECT_ATTEMPTS: Metric = Metric::counter("neewer.link.connect_attempts")
        .with_description("Port open attempts")
        .with_unit(Unit::Count)
        .with_labels(&["port", "outcome"]);

    /// Connections lost to I/O errors or unplug.
    pub const DISCONNECTS: Metric = Metric::counter("neewer.link.disconnects")
        .with_description("Connections lost to I/O errors or device removal")
        .with_unit(Unit::Count)
        .with_labels(PORT_LABELS);

    /// 1 while a port is open, 0 otherwise.
    pub const CONNECTED: Metric = Metric::gauge("neewer.link.connected")
        .with_description("Whether a port is currently open");

    /// Every metric in this module.
    pub const ALL: &[&Metric] = &[
        &FRAMES_DECODED,
        &BYTES_DISCARDED,
        &ECHOES_SUPPRESSED,
        &STATUS_EVENTS,
        &FRAMES_WRITTEN,
        &INTENTS_COALESCED,
        &WRITE_FAILURES,
        &WRITE_DURATION,
        &CONNECT_ATTEMPTS,
        &DISCONNECTS,
        &CONNECTED,
    ];
}

/// Labels attached to port-scoped metrics.
#[derive(Debug, Clone)]
pub struct LinkLabels {
    /// Serial port path.
    pub port: String,
}

impl LinkLabels {
    /// Labels for the given port.
    pub fn new(port: impl Into<String>) -> Self {
        Self { port: port.into() }
    }

    /// Convert to the label list the `metrics` macros accept.
    pub fn to_labels(&self) -> Vec<(&'static str, String)> {
        vec![("port", self.port.clone())]
    }

    /// Labels plus extra key/value pairs.
    pub fn with(&self, extra: &[(&'static str, String)]) -> Vec<(&'static str, String)> {
        let mut labels = self.to_labels();
        labels.extend_from_slice(extra);
        labels
    }
}

/// Register descriptions for every metric in [`metric_defs::ALL`].
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_link_labels() {
        let labels = LinkLabels::new("/dev/ttyUSB0");
        assert_eq!(labels.to_labels(), vec![("port", "/dev/ttyUSB0".to_string())]);

        let extended = labels.with(&[("outcome", "ok".to_string())]);
        assert_eq!(extended.len(), 2);
        assert!(extended.contains(&("outcome", "ok".to_string())));
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::FRAMES_DECODED.name, "neewer.link.frames_decoded");
        assert_eq!(metric_defs::FRAMES_DECODED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::BYTES_DISCARDED.unit, Some(Unit::Bytes));
        assert_eq!(metric_defs::CONNECTED.kind, MetricKind::Gauge);
        assert_eq!(metric_defs::WRITE_DURATION.kind, MetricKind::Histogram);
        assert_eq!(metric_defs::CONNECT_ATTEMPTS.labels, &["port", "outcome"]);
    }

    #[test]
    fn test_metric_names_are_unique() {
        let mut names: Vec<&str> = metric_defs::ALL.iter().map(|m| m.name).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed: describing must be a harmless no-op
        describe_metrics();
    }

    #[test]
    fn test_metric_kind_display() {
        assert_eq!(MetricKind::Counter.to_string(), "counter");
        assert_eq!(MetricKind::Histogram.as_str(), "histogram");
    }
}
