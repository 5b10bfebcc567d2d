use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex, PoisonError, RwLock, RwLockWriteGuard,
        atomic::{AtomicU64, Ordering},
    },
};

use pdexp_common::error::{PdexpError, Result};

use crate::{
    exposition::{CollectedMetric, MetricDescriptor, MetricSample, MetricType, SampleValue},
    labels::{Labels, label_names},
};

type LabelValues = Vec<String>;

trait RegisteredMetric: Send + Sync {
    fn descriptor(&self) -> MetricDescriptor;
    fn collect(&self) -> Vec<MetricSample>;
}

/// Process-wide set of metric vectors.
///
/// Besides the metrics themselves the registry owns the publish lock: a
/// collector holds it exclusively while it resets and rewrites its sinks,
/// and rendering holds it shared, so a scrape sees either the previous or
/// the next complete pass of every collector.
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Arc<dyn RegisteredMetric>>>,
    publish: RwLock<()>,
}

/// Exclusive publish section, released on drop.
pub struct PublishGuard<'a> {
    _guard: RwLockWriteGuard<'a, ()>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
            publish: RwLock::new(()),
        }
    }

    pub fn register_counter(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<CounterMetric>> {
        let metric = Arc::new(CounterMetric::new(name, help, variable_labels));
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn register_gauge(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<GaugeMetric>> {
        let metric = Arc::new(GaugeMetric::new(name, help, variable_labels));
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<HistogramMetric>> {
        let metric = Arc::new(HistogramMetric::new(name, help, variable_labels, buckets));
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn publish(&self) -> PublishGuard<'_> {
        PublishGuard {
            _guard: self.publish.write().unwrap_or_else(PoisonError::into_inner),
        }
    }

    pub fn collect_all(&self) -> Vec<CollectedMetric> {
        let _published = self.publish.read().unwrap_or_else(PoisonError::into_inner);
        let metrics = match self.metrics.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let mut collected = metrics
            .values()
            .map(|metric| CollectedMetric {
                descriptor: metric.descriptor(),
                samples: metric.collect(),
            })
            .collect::<Vec<_>>();

        collected.sort_by(|left, right| left.descriptor.name.cmp(&right.descriptor.name));
        collected
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();
        for metric in self.collect_all() {
            metric.write_text(&mut output);
        }
        output
    }

    fn register<M: RegisteredMetric + 'static>(&self, metric: Arc<M>) -> Result<()> {
        let name = metric.descriptor().name;
        let mut metrics = self.metrics.write().map_err(|_| {
            PdexpError::InternalError("failed to acquire metrics registry lock".to_string())
        })?;

        if metrics.contains_key(&name) {
            return Err(PdexpError::DuplicateMetric(name));
        }

        metrics.insert(name, metric);
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct SeriesMap<T> {
    descriptor: MetricDescriptor,
    entries: RwLock<HashMap<LabelValues, Arc<T>>>,
}

impl<T> SeriesMap<T> {
    fn new(name: &str, help: &str, metric_type: MetricType, variable_labels: &[&str]) -> Self {
        Self {
            descriptor: MetricDescriptor {
                name: name.to_string(),
                help: help.to_string(),
                metric_type,
                variable_labels: variable_labels.iter().map(|label| (*label).to_string()).collect(),
            },
            entries: RwLock::new(HashMap::new()),
        }
    }

    fn label_values(&self, labels: &Labels) -> Result<LabelValues> {
        let expected = &self.descriptor.variable_labels;
        let matches = labels.len() == expected.len()
            && expected.iter().all(|name| labels.contains_key(name));
        if !matches {
            return Err(PdexpError::LabelMismatch {
                metric: self.descriptor.name.clone(),
                expected: expected.clone(),
                actual: label_names(labels),
            });
        }

        Ok(expected
            .iter()
            .map(|name| labels.get(name).cloned().unwrap_or_default())
            .collect())
    }

    fn get_or_create(&self, label_values: LabelValues, init: impl FnOnce() -> T) -> Arc<T> {
        if let Ok(guard) = self.entries.read()
            && let Some(existing) = guard.get(&label_values)
        {
            return existing.clone();
        }

        let mut guard = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        guard
            .entry(label_values)
            .or_insert_with(|| Arc::new(init()))
            .clone()
    }

    fn get(&self, labels: &Labels) -> Option<Arc<T>> {
        let label_values = self.label_values(labels).ok()?;
        self.entries.read().ok()?.get(&label_values).cloned()
    }

    fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    fn len(&self) -> usize {
        self.entries.read().map(|guard| guard.len()).unwrap_or_default()
    }

    fn snapshot(&self) -> Vec<(Vec<(String, String)>, Arc<T>)> {
        let entries = match self.entries.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let mut snapshot = entries
            .iter()
            .map(|(label_values, value)| (label_values.clone(), value.clone()))
            .collect::<Vec<_>>();
        snapshot.sort_by(|left, right| left.0.cmp(&right.0));

        snapshot
            .into_iter()
            .map(|(label_values, value)| (self.materialize(&label_values), value))
            .collect()
    }

    fn materialize(&self, values: &[String]) -> Vec<(String, String)> {
        self.descriptor
            .variable_labels
            .iter()
            .zip(values.iter())
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect()
    }
}

pub struct CounterMetric {
    series: SeriesMap<AtomicU64>,
}

impl CounterMetric {
    fn new(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self {
            series: SeriesMap::new(name, help, MetricType::Counter, variable_labels),
        }
    }

    pub fn name(&self) -> &str {
        &self.series.descriptor.name
    }

    pub fn validate(&self, labels: &Labels) -> Result<()> {
        self.series.label_values(labels).map(|_| ())
    }

    /// Counters only move forward; a negative or NaN delta is rejected.
    pub fn add(&self, labels: &Labels, delta: f64) -> Result<()> {
        if delta.is_nan() || delta < 0.0 {
            return Err(PdexpError::InvalidArgument(format!(
                "counter {} cannot add {delta}",
                self.name()
            )));
        }

        let label_values = self.series.label_values(labels)?;
        let cell = self
            .series
            .get_or_create(label_values, || AtomicU64::new(0_f64.to_bits()));
        let _ = cell.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
            Some((f64::from_bits(bits) + delta).to_bits())
        });
        Ok(())
    }

    pub fn inc(&self, labels: &Labels) -> Result<()> {
        self.add(labels, 1.0)
    }

    pub fn get(&self, labels: &Labels) -> Option<f64> {
        self.series
            .get(labels)
            .map(|cell| f64::from_bits(cell.load(Ordering::Relaxed)))
    }

    pub fn reset(&self) {
        self.series.clear();
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegisteredMetric for CounterMetric {
    fn descriptor(&self) -> MetricDescriptor {
        self.series.descriptor.clone()
    }

    fn collect(&self) -> Vec<MetricSample> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(labels, cell)| MetricSample {
                labels,
                value: SampleValue::Scalar(f64::from_bits(cell.load(Ordering::Relaxed))),
            })
            .collect()
    }
}

pub struct GaugeMetric {
    series: SeriesMap<AtomicU64>,
}

impl GaugeMetric {
    fn new(name: &str, help: &str, variable_labels: &[&str]) -> Self {
        Self {
            series: SeriesMap::new(name, help, MetricType::Gauge, variable_labels),
        }
    }

    pub fn name(&self) -> &str {
        &self.series.descriptor.name
    }

    pub fn validate(&self, labels: &Labels) -> Result<()> {
        self.series.label_values(labels).map(|_| ())
    }

    pub fn set(&self, labels: &Labels, value: f64) -> Result<()> {
        let label_values = self.series.label_values(labels)?;
        self.series
            .get_or_create(label_values, || AtomicU64::new(0_f64.to_bits()))
            .store(value.to_bits(), Ordering::Relaxed);
        Ok(())
    }

    pub fn get(&self, labels: &Labels) -> Option<f64> {
        self.series
            .get(labels)
            .map(|cell| f64::from_bits(cell.load(Ordering::Relaxed)))
    }

    pub fn reset(&self) {
        self.series.clear();
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegisteredMetric for GaugeMetric {
    fn descriptor(&self) -> MetricDescriptor {
        self.series.descriptor.clone()
    }

    fn collect(&self) -> Vec<MetricSample> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(labels, cell)| MetricSample {
                labels,
                value: SampleValue::Scalar(f64::from_bits(cell.load(Ordering::Relaxed))),
            })
            .collect()
    }
}

pub struct HistogramMetric {
    buckets: Vec<f64>,
    series: SeriesMap<HistogramSeries>,
}

struct HistogramSeries {
    bucket_counts: Vec<AtomicU64>,
    count: AtomicU64,
    sum: Mutex<f64>,
}

impl HistogramSeries {
    fn new(bucket_len: usize) -> Self {
        Self {
            bucket_counts: (0..bucket_len + 1).map(|_| AtomicU64::new(0)).collect(),
            count: AtomicU64::new(0),
            sum: Mutex::new(0.0),
        }
    }
}

impl HistogramMetric {
    fn new(name: &str, help: &str, variable_labels: &[&str], buckets: &[f64]) -> Self {
        let mut sorted_buckets = buckets.to_vec();
        sorted_buckets.sort_by(|left, right| left.total_cmp(right));

        Self {
            buckets: sorted_buckets,
            series: SeriesMap::new(name, help, MetricType::Histogram, variable_labels),
        }
    }

    pub fn name(&self) -> &str {
        &self.series.descriptor.name
    }

    pub fn validate(&self, labels: &Labels) -> Result<()> {
        self.series.label_values(labels).map(|_| ())
    }

    pub fn observe(&self, labels: &Labels, value: f64) -> Result<()> {
        let label_values = self.series.label_values(labels)?;
        let bucket_len = self.buckets.len();
        let series = self
            .series
            .get_or_create(label_values, || HistogramSeries::new(bucket_len));

        let bucket_index = self
            .buckets
            .iter()
            .position(|bucket| value <= *bucket)
            .unwrap_or(bucket_len);

        if let Some(bucket) = series.bucket_counts.get(bucket_index) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }

        series.count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sum) = series.sum.lock() {
            *sum += value;
        }
        Ok(())
    }

    /// Sample count of one series.
    pub fn count(&self, labels: &Labels) -> Option<u64> {
        self.series
            .get(labels)
            .map(|series| series.count.load(Ordering::Relaxed))
    }

    pub fn reset(&self) {
        self.series.clear();
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RegisteredMetric for HistogramMetric {
    fn descriptor(&self) -> MetricDescriptor {
        self.series.descriptor.clone()
    }

    fn collect(&self) -> Vec<MetricSample> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(labels, entry)| {
                let mut buckets = self
                    .buckets
                    .iter()
                    .zip(entry.bucket_counts.iter())
                    .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
                    .collect::<Vec<_>>();

                let inf_count = entry
                    .bucket_counts
                    .last()
                    .map(|count| count.load(Ordering::Relaxed))
                    .unwrap_or_default();
                buckets.push((f64::INFINITY, inf_count));

                let sum = match entry.sum.lock() {
                    Ok(value) => *value,
                    Err(_) => 0.0,
                };

                MetricSample {
                    labels,
                    value: SampleValue::Histogram {
                        buckets,
                        count: entry.count.load(Ordering::Relaxed),
                        sum,
                    },
                }
            })
            .collect()
    }
}
