//! Metric declarations.
//!
//! Every metric the server emits is declared once as a [`Metric`] constant so
//! names and descriptions stay in one place. Emission goes through the
//! [`metrics`] facade; without an installed recorder it is a no-op.
//!
//! ```rust
//! use atserver::metrics::{describe_metrics, metric_defs};
//!
//! describe_metrics();
//! metrics::counter!(metric_defs::LINES_RECEIVED.name).increment(1);
//! ```

use metrics::{describe_counter, describe_gauge, Unit};

/// The kind of metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    /// A monotonically increasing counter.
    Counter,
    /// A gauge that can go up and down.
    Gauge,
}

impl MetricKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
        }
    }
}

impl std::fmt::Display for MetricKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A metric declaration with its metadata.
#[derive(Debug, Clone)]
pub struct Metric {
    /// The metric name (e.g., "atserver.lines.received").
    pub name: &'static str,
    pub kind: MetricKind,
    pub description: &'static str,
    pub unit: Option<Unit>,
}

impl Metric {
    pub const fn counter(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Counter,
            description: "",
            unit: None,
        }
    }

    pub const fn gauge(name: &'static str) -> Self {
        Self {
            name,
            kind: MetricKind::Gauge,
            description: "",
            unit: None,
        }
    }

    pub const fn with_description(mut self, description: &'static str) -> Self {
        self.description = description;
        self
    }

    pub const fn with_unit(mut self, unit: Unit) -> Self {
        self.unit = Some(unit);
        self
    }

    /// Registers this metric's description with the metrics recorder.
    pub fn describe(&self) {
        match (self.kind, self.unit) {
            (MetricKind::Counter, Some(unit)) => describe_counter!(self.name, unit, self.description),
            (MetricKind::Counter, None) => describe_counter!(self.name, self.description),
            (MetricKind::Gauge, Some(unit)) => describe_gauge!(self.name, unit, self.description),
            (MetricKind::Gauge, None) => describe_gauge!(self.name, self.description),
        }
    }
}

/// All metric definitions for the server.
pub mod metric_defs {
    use super::{Metric, Unit};

    // ========================================================================
    // Input
    // ========================================================================

    pub const LINES_RECEIVED: Metric = Metric::counter("atserver.lines.received")
        .with_description("Complete command lines captured from devices")
        .with_unit(Unit::Count);

    /// Lines answered with ERROR before parsing: device busy or line too long.
    pub const LINES_REJECTED: Metric = Metric::counter("atserver.lines.rejected")
        .with_description("Command lines rejected before parsing")
        .with_unit(Unit::Count);

    pub const PARSE_FAILURES: Metric = Metric::counter("atserver.parse.failures")
        .with_description("Command lines that failed to parse or resolve")
        .with_unit(Unit::Count);

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub const COMMANDS_DISPATCHED: Metric = Metric::counter("atserver.commands.dispatched")
        .with_description("Handler invocations")
        .with_unit(Unit::Count);

    // ========================================================================
    // Responses
    // ========================================================================

    pub const FINAL_OK: Metric = Metric::counter("atserver.responses.final_ok")
        .with_description("Final responses reporting success")
        .with_unit(Unit::Count);

    pub const FINAL_ERROR: Metric = Metric::counter("atserver.responses.final_error")
        .with_description("Final responses reporting failure")
        .with_unit(Unit::Count);

    pub const UNSOLICITED_SENT: Metric = Metric::counter("atserver.unsolicited.sent")
        .with_description("Unsolicited responses written to a device")
        .with_unit(Unit::Count);

    pub const UNSOLICITED_QUEUED: Metric = Metric::counter("atserver.unsolicited.queued")
        .with_description("Unsolicited responses deferred until the device is idle")
        .with_unit(Unit::Count);

    // ========================================================================
    // Sessions
    // ========================================================================

    pub const OPEN_DEVICES: Metric = Metric::gauge("atserver.devices.open")
        .with_description("Open device sessions")
        .with_unit(Unit::Count);

    /// All metrics, for bulk description.
    pub const ALL: &[Metric] = &[
        LINES_RECEIVED,
        LINES_REJECTED,
        PARSE_FAILURES,
        COMMANDS_DISPATCHED,
        FINAL_OK,
        FINAL_ERROR,
        UNSOLICITED_SENT,
        UNSOLICITED_QUEUED,
        OPEN_DEVICES,
    ];
}

/// Register descriptions of every server metric. Call once after installing a recorder.
pub fn describe_metrics() {
    for metric in metric_defs::ALL {
        metric.describe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_metric_names_unique() {
        let names: HashSet<_> = metric_defs::ALL.iter().map(|m| m.name).collect();
        assert_eq!(names.len(), metric_defs::ALL.len());
    }

    #[test]
    fn test_metric_definitions() {
        assert_eq!(metric_defs::LINES_RECEIVED.kind, MetricKind::Counter);
        assert_eq!(metric_defs::OPEN_DEVICES.kind, MetricKind::Gauge);
        for metric in metric_defs::ALL {
            assert!(metric.name.starts_with("atserver."));
            assert!(!metric.description.is_empty());
        }
    }

    #[test]
    fn test_describe_without_recorder() {
        describe_metrics();
    }
}
