use std::{collections::HashMap, sync::Arc};

use pdexp_common::error::{PdexpError, Result};
use pdexp_metrics::{
    CounterMetric, GaugeMetric, HashedMetricList, HistogramMetric, MetricList, MetricObservation,
    MetricsRegistry, ObservationKind,
};

/// Live metric vector a collector publishes into.
#[derive(Clone)]
pub enum Sink {
    Gauge(Arc<GaugeMetric>),
    Counter(Arc<CounterMetric>),
    Histogram(Arc<HistogramMetric>),
}

impl Sink {
    pub fn name(&self) -> &str {
        match self {
            Self::Gauge(metric) => metric.name(),
            Self::Counter(metric) => metric.name(),
            Self::Histogram(metric) => metric.name(),
        }
    }

    pub fn kind(&self) -> ObservationKind {
        match self {
            Self::Gauge(_) => ObservationKind::Gauge,
            Self::Counter(_) => ObservationKind::CounterIncrement,
            Self::Histogram(_) => ObservationKind::HistogramSample,
        }
    }

    pub fn reset(&self) {
        match self {
            Self::Gauge(metric) => metric.reset(),
            Self::Counter(metric) => metric.reset(),
            Self::Histogram(metric) => metric.reset(),
        }
    }

    fn validate(&self, observation: &MetricObservation) -> Result<()> {
        if observation.kind != self.kind() {
            return Err(PdexpError::KindMismatch {
                metric: observation.metric.clone(),
                actual: self.kind().as_str(),
                requested: observation.kind.as_str(),
            });
        }

        match self {
            Self::Gauge(metric) => metric.validate(&observation.labels),
            Self::Counter(metric) => metric.validate(&observation.labels),
            Self::Histogram(metric) => metric.validate(&observation.labels),
        }
    }
}

/// Sinks owned by one collector, addressed by metric name.
#[derive(Clone, Default)]
pub struct SinkSet {
    sinks: HashMap<String, Sink>,
}

enum Batch {
    Gauges(MetricList),
    Counters(HashedMetricList),
    Histograms(MetricList),
}

impl Batch {
    fn for_kind(kind: ObservationKind) -> Self {
        match kind {
            ObservationKind::Gauge => Self::Gauges(MetricList::new()),
            ObservationKind::CounterIncrement => Self::Counters(HashedMetricList::new()),
            ObservationKind::HistogramSample => Self::Histograms(MetricList::new()),
        }
    }

    fn push(&mut self, observation: MetricObservation) {
        match self {
            Self::Gauges(list) | Self::Histograms(list) => {
                list.add_gauge(observation.labels, observation.value)
            }
            Self::Counters(list) => list.add(observation.labels, observation.value),
        }
    }
}

impl SinkSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Sink> {
        self.sinks.get(name)
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    fn insert(&mut self, sink: Sink) -> Result<()> {
        let name = sink.name().to_string();
        if self.sinks.contains_key(&name) {
            return Err(PdexpError::DuplicateMetric(name));
        }
        self.sinks.insert(name, sink);
        Ok(())
    }

    /// Checks every observation against its sink's kind and label schema
    /// without writing anything.
    pub fn validate(&self, observations: &[MetricObservation]) -> Result<()> {
        for observation in observations {
            self.get(&observation.metric)
                .ok_or_else(|| PdexpError::UnknownMetric(observation.metric.clone()))?
                .validate(observation)?;
        }
        Ok(())
    }

    /// Writes a validated pass into the sinks. Gauges keep the last value per
    /// label set, counter increments are summed per label set before adding,
    /// histogram samples are observed one by one.
    pub fn apply(&self, observations: Vec<MetricObservation>) -> Result<()> {
        let mut batches: HashMap<String, Batch> = HashMap::new();
        for observation in observations {
            batches
                .entry(observation.metric.clone())
                .or_insert_with(|| Batch::for_kind(observation.kind))
                .push(observation);
        }

        for (metric, batch) in batches {
            let sink = self
                .get(&metric)
                .ok_or_else(|| PdexpError::UnknownMetric(metric.clone()))?;
            match (sink, batch) {
                (Sink::Gauge(sink), Batch::Gauges(list)) => list.flush_gauge(sink)?,
                (Sink::Counter(sink), Batch::Counters(list)) => list.flush_counter_add(sink)?,
                (Sink::Histogram(sink), Batch::Histograms(list)) => list.flush_histogram(sink)?,
                (sink, _) => {
                    return Err(PdexpError::KindMismatch {
                        metric,
                        actual: sink.kind().as_str(),
                        requested: "mixed",
                    });
                }
            }
        }

        Ok(())
    }
}

/// Handed to `Processor::setup`; every sink created through it is registered
/// globally and attached to the collector that owns the processor.
pub struct SinkRegistrar<'a> {
    registry: &'a MetricsRegistry,
    sinks: &'a mut SinkSet,
}

impl<'a> SinkRegistrar<'a> {
    pub fn new(registry: &'a MetricsRegistry, sinks: &'a mut SinkSet) -> Self {
        Self { registry, sinks }
    }

    pub fn gauge(&mut self, name: &str, help: &str, labels: &[&str]) -> Result<Arc<GaugeMetric>> {
        let metric = self.registry.register_gauge(name, help, labels)?;
        self.sinks.insert(Sink::Gauge(metric.clone()))?;
        Ok(metric)
    }

    pub fn counter(
        &mut self,
        name: &str,
        help: &str,
        labels: &[&str],
    ) -> Result<Arc<CounterMetric>> {
        let metric = self.registry.register_counter(name, help, labels)?;
        self.sinks.insert(Sink::Counter(metric.clone()))?;
        Ok(metric)
    }

    pub fn histogram(
        &mut self,
        name: &str,
        help: &str,
        labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<HistogramMetric>> {
        let metric = self
            .registry
            .register_histogram(name, help, labels, buckets)?;
        self.sinks.insert(Sink::Histogram(metric.clone()))?;
        Ok(metric)
    }
}

/// Sinks a processor clears in `reset`.
#[derive(Clone, Default)]
pub struct ResetGroup {
    sinks: Vec<Sink>,
}

impl ResetGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gauge(&mut self, metric: Arc<GaugeMetric>) -> &mut Self {
        self.sinks.push(Sink::Gauge(metric));
        self
    }

    pub fn histogram(&mut self, metric: Arc<HistogramMetric>) -> &mut Self {
        self.sinks.push(Sink::Histogram(metric));
        self
    }

    pub fn reset(&self) {
        for sink in &self.sinks {
            sink.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use pdexp_metrics::labels;

    use super::*;

    fn registered() -> (MetricsRegistry, SinkSet) {
        let registry = MetricsRegistry::new();
        let mut sinks = SinkSet::new();
        {
            let mut registrar = SinkRegistrar::new(&registry, &mut sinks);
            registrar
                .gauge("pagerduty_team_info", "team", &["teamID"])
                .unwrap();
            registrar
                .counter("pagerduty_summary_statuschange_count", "changes", &["status"])
                .unwrap();
        }
        (registry, sinks)
    }

    #[test]
    fn duplicate_sink_names_are_rejected() {
        let (registry, mut sinks) = registered();
        let mut registrar = SinkRegistrar::new(&registry, &mut sinks);
        let err = registrar
            .gauge("pagerduty_team_info", "team", &["teamID"])
            .err()
            .unwrap();
        assert!(matches!(err, PdexpError::DuplicateMetric(_)));
    }

    #[test]
    fn validate_rejects_unknown_wrong_kind_and_wrong_labels() {
        let (_registry, sinks) = registered();

        let unknown = vec![MetricObservation::gauge("pagerduty_nope", labels! {}, 1.0)];
        assert!(matches!(
            sinks.validate(&unknown),
            Err(PdexpError::UnknownMetric(_))
        ));

        let wrong_kind = vec![MetricObservation::counter(
            "pagerduty_team_info",
            labels! { "teamID" => "P1" },
            1.0,
        )];
        assert!(matches!(
            sinks.validate(&wrong_kind),
            Err(PdexpError::KindMismatch { .. })
        ));

        let wrong_labels = vec![MetricObservation::gauge(
            "pagerduty_team_info",
            labels! { "team" => "P1" },
            1.0,
        )];
        assert!(matches!(
            sinks.validate(&wrong_labels),
            Err(PdexpError::LabelMismatch { .. })
        ));
    }

    #[test]
    fn apply_groups_observations_per_sink() {
        let (_registry, sinks) = registered();
        let observations = vec![
            MetricObservation::gauge("pagerduty_team_info", labels! { "teamID" => "P1" }, 1.0),
            MetricObservation::counter(
                "pagerduty_summary_statuschange_count",
                labels! { "status" => "resolved" },
                1.0,
            ),
            MetricObservation::counter(
                "pagerduty_summary_statuschange_count",
                labels! { "status" => "resolved" },
                1.0,
            ),
        ];
        sinks.validate(&observations).unwrap();
        sinks.apply(observations).unwrap();

        let Some(Sink::Counter(counter)) = sinks.get("pagerduty_summary_statuschange_count")
        else {
            panic!("counter sink missing");
        };
        assert_eq!(counter.get(&labels! { "status" => "resolved" }), Some(2.0));
        let Some(Sink::Gauge(gauge)) = sinks.get("pagerduty_team_info") else {
            panic!("gauge sink missing");
        };
        assert_eq!(gauge.get(&labels! { "teamID" => "P1" }), Some(1.0));
    }
}
