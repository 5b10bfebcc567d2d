use crate::{exposition::MetricType, labels::Labels};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObservationKind {
    Gauge,
    CounterIncrement,
    HistogramSample,
}

impl ObservationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gauge => "gauge",
            Self::CounterIncrement => "counter",
            Self::HistogramSample => "histogram",
        }
    }

    pub fn metric_type(&self) -> MetricType {
        match self {
            Self::Gauge => MetricType::Gauge,
            Self::CounterIncrement => MetricType::Counter,
            Self::HistogramSample => MetricType::Histogram,
        }
    }
}

/// One value produced during a collection pass, addressed to a sink by name.
/// Applied exactly once when the pass is published.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricObservation {
    pub metric: String,
    pub labels: Labels,
    pub value: f64,
    pub kind: ObservationKind,
}

impl MetricObservation {
    pub fn gauge(metric: impl Into<String>, labels: Labels, value: f64) -> Self {
        Self {
            metric: metric.into(),
            labels,
            value,
            kind: ObservationKind::Gauge,
        }
    }

    pub fn counter(metric: impl Into<String>, labels: Labels, value: f64) -> Self {
        Self {
            metric: metric.into(),
            labels,
            value,
            kind: ObservationKind::CounterIncrement,
        }
    }

    pub fn histogram(metric: impl Into<String>, labels: Labels, value: f64) -> Self {
        Self {
            metric: metric.into(),
            labels,
            value,
            kind: ObservationKind::HistogramSample,
        }
    }
}
