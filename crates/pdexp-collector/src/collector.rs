use std::{
    any::Any,
    panic::AssertUnwindSafe,
    sync::{Arc, PoisonError, RwLock},
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use pdexp_common::{
    error::{PdexpError, Result},
    time::now,
};
use pdexp_metrics::{MetricObservation, MetricsRegistry};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    emitter::{Emitter, OBSERVATION_BUFFER},
    processor::{CollectContext, Processor},
    sinks::{SinkRegistrar, SinkSet},
};

pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;
pub const DEFAULT_COLLECT_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectorState {
    Disabled,
    Idle,
    Running,
    Success,
    Failed,
}

impl CollectorState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone)]
pub struct CollectorOptions {
    /// Consecutive failures tolerated before the collector gives up.
    pub error_threshold: u32,
    pub timeout: Option<Duration>,
}

impl Default for CollectorOptions {
    fn default() -> Self {
        Self {
            error_threshold: DEFAULT_ERROR_THRESHOLD,
            timeout: Some(DEFAULT_COLLECT_TIMEOUT),
        }
    }
}

#[derive(Debug)]
struct RuntimeState {
    state: CollectorState,
    last_scrape_duration: Option<Duration>,
    last_success: Option<DateTime<Utc>>,
    consecutive_failures: u32,
}

/// Identity and observable runtime state of a registered collector.
#[derive(Debug)]
pub struct CollectorDescriptor {
    name: String,
    interval: Duration,
    hidden: bool,
    runtime: RwLock<RuntimeState>,
}

impl CollectorDescriptor {
    pub fn new(name: impl Into<String>, interval: Duration, hidden: bool) -> Self {
        let state = if interval.is_zero() {
            CollectorState::Disabled
        } else {
            CollectorState::Idle
        };

        Self {
            name: name.into(),
            interval,
            hidden,
            runtime: RwLock::new(RuntimeState {
                state,
                last_scrape_duration: None,
                last_success: None,
                consecutive_failures: 0,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn state(&self) -> CollectorState {
        self.read(|runtime| runtime.state)
    }

    pub fn last_scrape_duration(&self) -> Option<Duration> {
        self.read(|runtime| runtime.last_scrape_duration)
    }

    pub fn last_success(&self) -> Option<DateTime<Utc>> {
        self.read(|runtime| runtime.last_success)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.read(|runtime| runtime.consecutive_failures)
    }

    fn set_state(&self, state: CollectorState) {
        self.write(|runtime| runtime.state = state);
    }

    fn record_success(&self, duration: Duration, started_at: DateTime<Utc>) {
        self.write(|runtime| {
            runtime.state = CollectorState::Success;
            runtime.last_scrape_duration = Some(duration);
            runtime.last_success = Some(started_at);
            runtime.consecutive_failures = 0;
        });
    }

    fn record_failure(&self) -> u32 {
        self.write(|runtime| {
            runtime.state = CollectorState::Failed;
            runtime.consecutive_failures = runtime.consecutive_failures.saturating_add(1);
            runtime.consecutive_failures
        })
    }

    fn read<T>(&self, f: impl FnOnce(&RuntimeState) -> T) -> T {
        let runtime = self.runtime.read().unwrap_or_else(PoisonError::into_inner);
        f(&runtime)
    }

    fn write<T>(&self, f: impl FnOnce(&mut RuntimeState) -> T) -> T {
        let mut runtime = self.runtime.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut runtime)
    }
}

/// Scheduling unit: one processor, one interval, one task.
pub struct Collector {
    descriptor: Arc<CollectorDescriptor>,
    processor: Box<dyn Processor>,
    sinks: SinkSet,
    registry: Arc<MetricsRegistry>,
    options: CollectorOptions,
}

impl Collector {
    /// Builds the collector and runs the processor's `setup`.
    pub fn new(
        descriptor: CollectorDescriptor,
        mut processor: Box<dyn Processor>,
        registry: Arc<MetricsRegistry>,
        options: CollectorOptions,
    ) -> Result<Self> {
        if descriptor.interval().is_zero() {
            return Err(PdexpError::InvalidArgument(format!(
                "collector {} is disabled and cannot be scheduled",
                descriptor.name()
            )));
        }

        let mut sinks = SinkSet::new();
        processor.setup(&mut SinkRegistrar::new(&registry, &mut sinks))?;

        Ok(Self {
            descriptor: Arc::new(descriptor),
            processor,
            sinks,
            registry,
            options,
        })
    }

    pub fn descriptor(&self) -> Arc<CollectorDescriptor> {
        self.descriptor.clone()
    }

    pub fn name(&self) -> &str {
        self.descriptor.name()
    }

    /// Fixed-delay loop: the first cycle starts immediately, the next one
    /// `interval` after the previous one finished.
    ///
    /// Returns `Ok` on cancellation, and an error once failures exceed the
    /// threshold or a programming error shows up.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        info!(
            collector = %self.name(),
            interval = ?self.descriptor.interval(),
            "starting collector"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_cycle(&cancel).await {
                Ok(elapsed) => {
                    info!(collector = %self.name(), duration = ?elapsed, "collection finished");
                    self.descriptor.set_state(CollectorState::Idle);
                }
                Err(PdexpError::Cancelled(_)) if cancel.is_cancelled() => break,
                Err(err) if err.is_fatal() => {
                    error!(collector = %self.name(), error = %err, "collector stopped");
                    return Err(err);
                }
                Err(err) => {
                    let failures = self.descriptor.consecutive_failures();
                    warn!(
                        collector = %self.name(),
                        failures,
                        error = %err,
                        "collection failed"
                    );
                    if failures > self.options.error_threshold {
                        let err = PdexpError::ThresholdExceeded {
                            collector: self.name().to_string(),
                            failures,
                            threshold: self.options.error_threshold,
                        };
                        error!(collector = %self.name(), error = %err, "collector stopped");
                        return Err(err);
                    }
                    self.descriptor.set_state(CollectorState::Idle);
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.descriptor.interval()) => {}
            }
        }

        debug!(collector = %self.name(), "collector cancelled");
        Ok(())
    }

    /// One collect-then-publish pass.
    ///
    /// Sinks are only touched when `collect` returned `Ok` and every
    /// observation matches its sink; otherwise the previous pass stays
    /// visible.
    pub async fn run_cycle(&self, cancel: &CancellationToken) -> Result<Duration> {
        self.descriptor.set_state(CollectorState::Running);
        let started = Instant::now();
        let started_at = now();

        let ctx = CollectContext {
            collector: self.name().to_string(),
            cancel: cancel.child_token(),
            last_success: self.descriptor.last_success(),
        };
        let (emitter, mut rx) = Emitter::channel(OBSERVATION_BUFFER);

        let produce = async {
            let guarded = AssertUnwindSafe(self.processor.collect(&ctx, emitter)).catch_unwind();
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(PdexpError::Cancelled(self.name().to_string())),
                outcome = with_timeout(self.options.timeout, guarded) => outcome,
            };

            match outcome {
                Some(Ok(result)) => result,
                Some(Err(payload)) => Err(PdexpError::Panicked {
                    collector: self.name().to_string(),
                    message: panic_message(payload.as_ref()),
                }),
                None => Err(PdexpError::Timeout {
                    collector: self.name().to_string(),
                    after: self.options.timeout.unwrap_or_default(),
                }),
            }
        };
        let drain = async {
            let mut observations = Vec::new();
            while let Some(observation) = rx.recv().await {
                observations.push(observation);
            }
            observations
        };

        let (outcome, observations) = tokio::join!(produce, drain);
        if let Err(err) = outcome {
            if matches!(err, PdexpError::Cancelled(_)) {
                self.descriptor.set_state(CollectorState::Failed);
            } else {
                self.descriptor.record_failure();
            }
            return Err(err);
        }

        let count = observations.len();
        self.publish(observations)?;

        let elapsed = started.elapsed();
        self.descriptor.record_success(elapsed, started_at);
        debug!(collector = %self.name(), observations = count, "published collection");
        Ok(elapsed)
    }

    fn publish(&self, observations: Vec<MetricObservation>) -> Result<()> {
        self.sinks.validate(&observations)?;

        let _published = self.registry.publish();
        self.processor.reset();
        self.sinks.apply(observations)
    }
}

async fn with_timeout<F: std::future::Future>(
    timeout: Option<Duration>,
    future: F,
) -> Option<F::Output> {
    match timeout {
        Some(after) => tokio::time::timeout(after, future).await.ok(),
        None => Some(future.await),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Mutex,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use async_trait::async_trait;
    use pdexp_metrics::{GaugeMetric, MetricObservation, labels};
    use tokio::sync::Notify;

    use super::*;
    use crate::sinks::ResetGroup;

    const TEAM_INFO: &str = "pagerduty_team_info";

    #[derive(Debug, Clone)]
    enum Step {
        Emit(Vec<&'static str>),
        EmitThenFail(Vec<&'static str>),
        WrongLabels,
        Panic,
        Hang,
        Block(Arc<Notify>),
    }

    #[derive(Default)]
    struct Tally {
        calls: AtomicUsize,
        active: AtomicUsize,
        max_active: AtomicUsize,
    }

    struct ScriptedProcessor {
        steps: Mutex<VecDeque<Step>>,
        fallback: Step,
        tally: Arc<Tally>,
        group: ResetGroup,
        gauge: Arc<Mutex<Option<Arc<GaugeMetric>>>>,
    }

    impl ScriptedProcessor {
        fn new(steps: Vec<Step>, fallback: Step) -> Self {
            Self {
                steps: Mutex::new(steps.into()),
                fallback,
                tally: Arc::new(Tally::default()),
                group: ResetGroup::new(),
                gauge: Arc::new(Mutex::new(None)),
            }
        }

        async fn emit_teams(emitter: &Emitter, teams: &[&str]) -> Result<()> {
            for team in teams {
                emitter
                    .emit(MetricObservation::gauge(
                        TEAM_INFO,
                        labels! { "teamID" => team },
                        1.0,
                    ))
                    .await?;
            }
            Ok(())
        }
    }

    #[async_trait]
    impl Processor for ScriptedProcessor {
        fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
            let gauge = registrar.gauge(TEAM_INFO, "team", &["teamID"])?;
            self.group.gauge(gauge.clone());
            *self.gauge.lock().unwrap() = Some(gauge);
            Ok(())
        }

        fn reset(&self) {
            self.group.reset();
        }

        async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
            let step = self
                .steps
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| self.fallback.clone());

            self.tally.calls.fetch_add(1, Ordering::SeqCst);
            let active = self.tally.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.tally.max_active.fetch_max(active, Ordering::SeqCst);

            let result = match step {
                Step::Emit(teams) => {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Self::emit_teams(&emitter, &teams).await
                }
                Step::EmitThenFail(teams) => {
                    Self::emit_teams(&emitter, &teams).await?;
                    Err(PdexpError::upstream("ListTeams", "503"))
                }
                Step::WrongLabels => {
                    emitter
                        .emit(MetricObservation::gauge(
                            TEAM_INFO,
                            labels! { "serviceID" => "S1" },
                            1.0,
                        ))
                        .await
                }
                Step::Panic => panic!("processor exploded"),
                Step::Hang => {
                    tokio::time::sleep(Duration::from_secs(3_600)).await;
                    Ok(())
                }
                Step::Block(release) => {
                    Self::emit_teams(&emitter, &["P9"]).await?;
                    release.notified().await;
                    Ok(())
                }
            };

            self.tally.active.fetch_sub(1, Ordering::SeqCst);
            result
        }
    }

    fn collector(processor: ScriptedProcessor, options: CollectorOptions) -> Collector {
        Collector::new(
            CollectorDescriptor::new("team", Duration::from_millis(10), false),
            Box::new(processor),
            Arc::new(MetricsRegistry::new()),
            options,
        )
        .unwrap()
    }

    fn team_gauge(processor: &ScriptedProcessor) -> Arc<Mutex<Option<Arc<GaugeMetric>>>> {
        processor.gauge.clone()
    }

    fn teams(gauge: &Arc<Mutex<Option<Arc<GaugeMetric>>>>) -> Vec<&'static str> {
        let guard = gauge.lock().unwrap();
        let gauge = guard.as_ref().unwrap();
        ["P1", "P2", "P3", "P9"]
            .into_iter()
            .filter(|team| gauge.get(&labels! { "teamID" => team }).is_some())
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn successful_pass_replaces_previous_set() {
        let processor = ScriptedProcessor::new(
            vec![Step::Emit(vec!["P1", "P2"]), Step::Emit(vec!["P2", "P3"])],
            Step::Emit(vec![]),
        );
        let gauge = team_gauge(&processor);
        let collector = collector(processor, CollectorOptions::default());
        let cancel = CancellationToken::new();

        collector.run_cycle(&cancel).await.unwrap();
        assert_eq!(teams(&gauge), vec!["P1", "P2"]);
        let descriptor = collector.descriptor();
        assert_eq!(descriptor.state(), CollectorState::Success);
        assert!(descriptor.last_scrape_duration().is_some());
        assert!(descriptor.last_success().is_some());

        collector.run_cycle(&cancel).await.unwrap();
        assert_eq!(teams(&gauge), vec!["P2", "P3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_keeps_last_known_good() {
        let processor = ScriptedProcessor::new(
            vec![Step::Emit(vec!["P1"]), Step::EmitThenFail(vec!["P3"])],
            Step::Emit(vec![]),
        );
        let gauge = team_gauge(&processor);
        let collector = collector(processor, CollectorOptions::default());
        let cancel = CancellationToken::new();

        collector.run_cycle(&cancel).await.unwrap();
        let duration = collector.descriptor().last_scrape_duration();

        let err = collector.run_cycle(&cancel).await.unwrap_err();
        assert!(matches!(err, PdexpError::Upstream { .. }));
        assert_eq!(teams(&gauge), vec!["P1"]);
        let descriptor = collector.descriptor();
        assert_eq!(descriptor.state(), CollectorState::Failed);
        assert_eq!(descriptor.consecutive_failures(), 1);
        assert_eq!(descriptor.last_scrape_duration(), duration);
    }

    #[tokio::test(start_paused = true)]
    async fn scrape_during_collection_sees_previous_pass() {
        let release = Arc::new(Notify::new());
        let processor = ScriptedProcessor::new(
            vec![Step::Emit(vec!["P1"]), Step::Block(release.clone())],
            Step::Emit(vec![]),
        );
        let gauge = team_gauge(&processor);
        let registry = Arc::new(MetricsRegistry::new());
        let collector = Arc::new(
            Collector::new(
                CollectorDescriptor::new("team", Duration::from_millis(10), false),
                Box::new(processor),
                registry.clone(),
                CollectorOptions::default(),
            )
            .unwrap(),
        );
        let cancel = CancellationToken::new();
        collector.run_cycle(&cancel).await.unwrap();

        let running = collector.clone();
        let token = cancel.clone();
        let cycle = tokio::spawn(async move { running.run_cycle(&token).await });

        tokio::time::sleep(Duration::from_millis(5)).await;
        let rendered = registry.render_prometheus();
        assert!(rendered.contains("teamID=\"P1\""));
        assert!(!rendered.contains("teamID=\"P9\""));

        release.notify_one();
        cycle.await.unwrap().unwrap();
        assert_eq!(teams(&gauge), vec!["P9"]);
    }

    #[tokio::test(start_paused = true)]
    async fn threshold_is_exceeded_on_sixth_consecutive_failure() {
        let processor = ScriptedProcessor::new(vec![], Step::EmitThenFail(vec![]));
        let tally = processor.tally.clone();
        let collector = collector(processor, CollectorOptions::default());

        let err = collector.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(
            err,
            PdexpError::ThresholdExceeded {
                failures: 6,
                threshold: 5,
                ..
            }
        ));
        assert_eq!(tally.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_counter() {
        let fail = Step::EmitThenFail(vec![]);
        let processor = ScriptedProcessor::new(
            vec![
                fail.clone(),
                fail.clone(),
                fail.clone(),
                fail.clone(),
                fail.clone(),
                Step::Emit(vec!["P1"]),
                fail.clone(),
                fail.clone(),
                fail.clone(),
                fail.clone(),
                fail.clone(),
            ],
            Step::Emit(vec!["P1"]),
        );
        let tally = processor.tally.clone();
        let collector = collector(processor, CollectorOptions::default());
        let descriptor = collector.descriptor();
        let cancel = CancellationToken::new();

        let token = cancel.clone();
        let task = tokio::spawn(collector.run(token));
        while tally.calls.load(Ordering::SeqCst) < 13 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        task.await.unwrap().unwrap();
        assert_eq!(descriptor.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_idle_between_passes() {
        let processor = ScriptedProcessor::new(vec![], Step::Emit(vec!["P1"]));
        let tally = processor.tally.clone();
        let collector = Collector::new(
            CollectorDescriptor::new("team", Duration::from_secs(60), false),
            Box::new(processor),
            Arc::new(MetricsRegistry::new()),
            CollectorOptions::default(),
        )
        .unwrap();
        let descriptor = collector.descriptor();
        let cancel = CancellationToken::new();

        let task = tokio::spawn(collector.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(tally.calls.load(Ordering::SeqCst), 1);
        assert_eq!(descriptor.state(), CollectorState::Idle);
        assert!(descriptor.last_success().is_some());

        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cycles_never_overlap() {
        let processor = ScriptedProcessor::new(vec![], Step::Emit(vec!["P1"]));
        let tally = processor.tally.clone();
        let collector = collector(processor, CollectorOptions::default());
        let cancel = CancellationToken::new();

        let task = tokio::spawn(collector.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();

        assert!(tally.calls.load(Ordering::SeqCst) > 5);
        assert_eq!(tally.max_active.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn panics_are_contained_and_counted() {
        let processor = ScriptedProcessor::new(vec![Step::Panic], Step::Emit(vec![]));
        let collector = collector(processor, CollectorOptions::default());

        let err = collector
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        match err {
            PdexpError::Panicked { collector, message } => {
                assert_eq!(collector, "team");
                assert_eq!(message, "processor exploded");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(collector.descriptor().consecutive_failures(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_collect_times_out() {
        let processor = ScriptedProcessor::new(vec![Step::Hang], Step::Emit(vec![]));
        let collector = collector(
            processor,
            CollectorOptions {
                error_threshold: 5,
                timeout: Some(Duration::from_secs(1)),
            },
        );

        let err = collector
            .run_cycle(&CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, PdexpError::Timeout { .. }));
        assert_eq!(collector.descriptor().state(), CollectorState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn label_mismatch_is_fatal_and_not_counted() {
        let processor = ScriptedProcessor::new(
            vec![Step::Emit(vec!["P1"]), Step::WrongLabels],
            Step::Emit(vec![]),
        );
        let gauge = team_gauge(&processor);
        let collector = collector(processor, CollectorOptions::default());
        let descriptor = collector.descriptor();

        let err = collector.run(CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PdexpError::LabelMismatch { .. }));
        assert_eq!(teams(&gauge), vec!["P1"]);
        assert_eq!(descriptor.consecutive_failures(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_a_running_cycle() {
        let processor = ScriptedProcessor::new(vec![], Step::Hang);
        let collector = collector(
            processor,
            CollectorOptions {
                error_threshold: 5,
                timeout: None,
            },
        );
        let cancel = CancellationToken::new();

        let task = tokio::spawn(collector.run(cancel.clone()));
        tokio::time::sleep(Duration::from_secs(1)).await;
        cancel.cancel();
        task.await.unwrap().unwrap();
    }

    #[test]
    fn zero_interval_cannot_be_scheduled() {
        let result = Collector::new(
            CollectorDescriptor::new("system", Duration::ZERO, false),
            Box::new(ScriptedProcessor::new(vec![], Step::Emit(vec![]))),
            Arc::new(MetricsRegistry::new()),
            CollectorOptions::default(),
        );
        assert!(matches!(result, Err(PdexpError::InvalidArgument(_))));
        assert_eq!(
            CollectorDescriptor::new("system", Duration::ZERO, false).state(),
            CollectorState::Disabled
        );
    }
}
