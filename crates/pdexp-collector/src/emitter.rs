use pdexp_common::error::{PdexpError, Result};
use pdexp_metrics::{HashedMetricList, MetricList, MetricObservation, ObservationKind};
use tokio::sync::mpsc;

/// Capacity of the observation channel between a processor and the drain.
pub const OBSERVATION_BUFFER: usize = 1024;

/// Sending half handed to `Processor::collect`.
///
/// Cloning is cheap; sub-tasks may hold their own copy. The pass ends for the
/// drain once every clone has been dropped.
#[derive(Debug, Clone)]
pub struct Emitter {
    tx: mpsc::Sender<MetricObservation>,
}

impl Emitter {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<MetricObservation>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    pub async fn emit(&self, observation: MetricObservation) -> Result<()> {
        self.tx
            .send(observation)
            .await
            .map_err(|_| PdexpError::InternalError("observation channel closed".to_string()))
    }

    pub async fn emit_all(
        &self,
        observations: impl IntoIterator<Item = MetricObservation>,
    ) -> Result<()> {
        for observation in observations {
            self.emit(observation).await?;
        }
        Ok(())
    }

    pub async fn gauges(&self, metric: &str, list: MetricList) -> Result<()> {
        self.emit_all(list.into_observations(metric, ObservationKind::Gauge))
            .await
    }

    pub async fn histograms(&self, metric: &str, list: MetricList) -> Result<()> {
        self.emit_all(list.into_observations(metric, ObservationKind::HistogramSample))
            .await
    }

    pub async fn hashed_gauges(&self, metric: &str, list: HashedMetricList) -> Result<()> {
        self.emit_all(list.into_observations(metric, ObservationKind::Gauge))
            .await
    }

    pub async fn counters(&self, metric: &str, list: HashedMetricList) -> Result<()> {
        self.emit_all(list.into_observations(metric, ObservationKind::CounterIncrement))
            .await
    }
}
