use std::sync::Arc;

use async_trait::async_trait;
use pdexp_common::error::Result;
use pdexp_metrics::{MetricList, labels};

use crate::{
    emitter::Emitter,
    exporter::CollectorDirectory,
    processor::{CollectContext, Processor},
    sinks::{ResetGroup, SinkRegistrar},
};

pub const STATS_METRIC: &str = "pagerduty_stats";
pub const COLLECTOR_DURATION: &str = "collectorDuration";

/// Reports how long each visible collector's last successful pass took.
pub struct StatsProcessor {
    directory: CollectorDirectory,
    group: ResetGroup,
}

impl StatsProcessor {
    pub fn new(directory: CollectorDirectory) -> Self {
        Self {
            directory,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for StatsProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let stats = registrar.gauge(
            STATS_METRIC,
            "PagerDuty exporter collector statistics",
            &["name", "type"],
        )?;
        self.group.gauge(Arc::clone(&stats));
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let mut list = MetricList::new();
        for descriptor in self.directory.list() {
            if descriptor.is_hidden() {
                continue;
            }
            if let Some(duration) = descriptor.last_scrape_duration() {
                list.add_duration(
                    labels! { "name" => descriptor.name(), "type" => COLLECTOR_DURATION },
                    duration,
                );
            }
        }

        emitter.gauges(STATS_METRIC, list).await
    }
}
