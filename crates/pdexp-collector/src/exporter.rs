use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use pdexp_common::error::{PdexpError, Result};
use pdexp_metrics::MetricsRegistry;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    collector::{Collector, CollectorDescriptor, CollectorOptions},
    processor::Processor,
    stats::StatsProcessor,
};

pub const STATS_COLLECTOR: &str = "collector";

/// Shared, append-only list of registered collector descriptors.
#[derive(Clone, Default)]
pub struct CollectorDirectory {
    descriptors: Arc<RwLock<Vec<Arc<CollectorDescriptor>>>>,
}

impl CollectorDirectory {
    pub fn list(&self) -> Vec<Arc<CollectorDescriptor>> {
        self.descriptors
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn get(&self, name: &str) -> Option<Arc<CollectorDescriptor>> {
        self.list()
            .into_iter()
            .find(|descriptor| descriptor.name() == name)
    }

    fn insert(&self, descriptor: Arc<CollectorDescriptor>) -> Result<()> {
        let mut descriptors = self
            .descriptors
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if descriptors
            .iter()
            .any(|existing| existing.name() == descriptor.name())
        {
            return Err(PdexpError::DuplicateCollector(descriptor.name().to_string()));
        }
        descriptors.push(descriptor);
        Ok(())
    }
}

/// Owns every collector of the process and runs them to completion.
pub struct Exporter {
    registry: Arc<MetricsRegistry>,
    options: CollectorOptions,
    directory: CollectorDirectory,
    collectors: Vec<Collector>,
}

impl Exporter {
    pub fn new(registry: Arc<MetricsRegistry>, options: CollectorOptions) -> Self {
        Self {
            registry,
            options,
            directory: CollectorDirectory::default(),
            collectors: Vec::new(),
        }
    }

    pub fn directory(&self) -> CollectorDirectory {
        self.directory.clone()
    }

    pub fn registry(&self) -> Arc<MetricsRegistry> {
        self.registry.clone()
    }

    /// Registers a collector. A zero interval means disabled: nothing is
    /// registered and `Ok(false)` is returned.
    pub fn register(
        &mut self,
        name: &str,
        interval: Duration,
        processor: impl Processor + 'static,
    ) -> Result<bool> {
        self.add(CollectorDescriptor::new(name, interval, false), Box::new(processor))
    }

    pub fn register_hidden(
        &mut self,
        name: &str,
        interval: Duration,
        processor: impl Processor + 'static,
    ) -> Result<bool> {
        self.add(CollectorDescriptor::new(name, interval, true), Box::new(processor))
    }

    /// Adds the hidden collector that reports the other collectors' last
    /// scrape duration.
    pub fn enable_self_observability(&mut self, interval: Duration) -> Result<bool> {
        let processor = StatsProcessor::new(self.directory());
        self.register_hidden(STATS_COLLECTOR, interval, processor)
    }

    fn add(&mut self, descriptor: CollectorDescriptor, processor: Box<dyn Processor>) -> Result<bool> {
        if descriptor.interval().is_zero() {
            info!(collector = %descriptor.name(), "collector disabled");
            return Ok(false);
        }
        if self.directory.get(descriptor.name()).is_some() {
            return Err(PdexpError::DuplicateCollector(descriptor.name().to_string()));
        }

        let collector = Collector::new(
            descriptor,
            processor,
            self.registry.clone(),
            self.options.clone(),
        )?;
        self.directory.insert(collector.descriptor())?;
        self.collectors.push(collector);
        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.collectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.collectors.is_empty()
    }

    /// Spawns one task per collector and waits for them.
    ///
    /// The first collector error cancels all the others and is returned.
    pub async fn run(self, cancel: CancellationToken) -> Result<()> {
        let mut tasks = JoinSet::new();
        for collector in self.collectors {
            tasks.spawn(collector.run(cancel.clone()));
        }

        let mut outcome = Ok(());
        while let Some(joined) = tasks.join_next().await {
            let result = joined.unwrap_or_else(|err| {
                Err(PdexpError::InternalError(format!("collector task failed: {err}")))
            });
            if let Err(err) = result
                && outcome.is_ok()
            {
                error!(error = %err, "stopping all collectors");
                cancel.cancel();
                outcome = Err(err);
            }
        }

        outcome
    }
}
