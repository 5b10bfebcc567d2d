use std::{collections::HashMap, time::Duration};

use chrono::{DateTime, Utc};
use pdexp_common::{error::Result, time::unix_value};

use crate::{
    labels::Labels,
    observation::{MetricObservation, ObservationKind},
    registry::{CounterMetric, GaugeMetric, HistogramMetric},
};

/// Ordered buffer of label/value pairs collected during one pass.
///
/// Nothing reaches a sink until one of the `flush_*` methods is called.
#[derive(Debug, Clone, Default)]
pub struct MetricList {
    entries: Vec<(Labels, f64)>,
}

impl MetricList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_gauge(&mut self, labels: Labels, value: f64) {
        self.entries.push((labels, value));
    }

    pub fn add_info(&mut self, labels: Labels) {
        self.add_gauge(labels, 1.0);
    }

    pub fn add_time(&mut self, labels: Labels, time: Option<DateTime<Utc>>) {
        self.add_gauge(labels, unix_value(time));
    }

    pub fn add_duration(&mut self, labels: Labels, duration: Duration) {
        self.add_gauge(labels, duration.as_secs_f64());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Labels, f64)> {
        self.entries.iter()
    }

    /// Sets every entry in order; a repeated label set keeps the last value.
    pub fn flush_gauge(&self, sink: &GaugeMetric) -> Result<()> {
        for (labels, value) in &self.entries {
            sink.set(labels, *value)?;
        }
        Ok(())
    }

    pub fn flush_counter_add(&self, sink: &CounterMetric) -> Result<()> {
        for (labels, value) in &self.entries {
            sink.add(labels, *value)?;
        }
        Ok(())
    }

    pub fn flush_histogram(&self, sink: &HistogramMetric) -> Result<()> {
        for (labels, value) in &self.entries {
            sink.observe(labels, *value)?;
        }
        Ok(())
    }

    pub fn into_observations(
        self,
        metric: &str,
        kind: ObservationKind,
    ) -> Vec<MetricObservation> {
        into_observations(self.entries, metric, kind)
    }
}

/// Accumulator keyed by the canonical label set.
///
/// Repeated increments of the same labels are summed in place, so a flush
/// writes each distinct label set exactly once. Entries keep first-seen order.
#[derive(Debug, Clone, Default)]
pub struct HashedMetricList {
    index: HashMap<Labels, usize>,
    entries: Vec<(Labels, f64)>,
}

impl HashedMetricList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&mut self, labels: Labels) {
        self.add(labels, 1.0);
    }

    pub fn add(&mut self, labels: Labels, value: f64) {
        if let Some(position) = self.index.get(&labels) {
            self.entries[*position].1 += value;
            return;
        }

        self.index.insert(labels.clone(), self.entries.len());
        self.entries.push((labels, value));
    }

    pub fn get(&self, labels: &Labels) -> Option<f64> {
        self.index
            .get(labels)
            .map(|position| self.entries[*position].1)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn flush_gauge(&self, sink: &GaugeMetric) -> Result<()> {
        for (labels, value) in &self.entries {
            sink.set(labels, *value)?;
        }
        Ok(())
    }

    pub fn flush_counter_add(&self, sink: &CounterMetric) -> Result<()> {
        for (labels, value) in &self.entries {
            sink.add(labels, *value)?;
        }
        Ok(())
    }

    pub fn into_observations(
        self,
        metric: &str,
        kind: ObservationKind,
    ) -> Vec<MetricObservation> {
        into_observations(self.entries, metric, kind)
    }
}

fn into_observations(
    entries: Vec<(Labels, f64)>,
    metric: &str,
    kind: ObservationKind,
) -> Vec<MetricObservation> {
    entries
        .into_iter()
        .map(|(labels, value)| MetricObservation {
            metric: metric.to_string(),
            labels,
            value,
            kind,
        })
        .collect()
}
