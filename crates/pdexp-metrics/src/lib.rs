pub mod accumulator;
pub mod exposition;
pub mod labels;
pub mod observation;
pub mod registry;

pub use accumulator::{HashedMetricList, MetricList};
pub use exposition::{MetricDescriptor, MetricType, SampleValue};
pub use labels::Labels;
pub use observation::{MetricObservation, ObservationKind};
pub use registry::{CounterMetric, GaugeMetric, HistogramMetric, MetricsRegistry, PublishGuard};
