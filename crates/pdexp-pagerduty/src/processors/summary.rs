use std::time::Duration;

use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, PagingGuard, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::{
    error::Result,
    time::{now, parse_api_time, shift},
};
use pdexp_metrics::{HashedMetricList, MetricList, labels};

use crate::client::{IncidentQuery, PagerDutyClient};

pub const SUMMARY_INCIDENT_COUNT: &str = "pagerduty_summary_incident_count";
pub const SUMMARY_RESOLVE_DURATION: &str = "pagerduty_summary_incident_resolve_duration";
pub const SUMMARY_STATUS_CHANGE_COUNT: &str = "pagerduty_summary_incident_statuschange_count";

const HOUR: f64 = 3600.0;
const DAY: f64 = 24.0 * HOUR;

/// Resolve duration buckets in seconds, from five minutes up to a month.
pub const RESOLVE_BUCKETS: [f64; 12] = [
    300.0,
    900.0,
    1800.0,
    HOUR,
    3.0 * HOUR,
    6.0 * HOUR,
    12.0 * HOUR,
    DAY,
    5.0 * DAY,
    7.0 * DAY,
    14.0 * DAY,
    31.0 * DAY,
];

#[derive(Debug, Clone)]
pub struct SummarySettings {
    /// Incidents created within this window are summarised.
    pub since: Duration,
    pub team_filter: Vec<String>,
}

/// Aggregates recent incidents per service, urgency and priority.
pub struct SummaryProcessor {
    client: PagerDutyClient,
    settings: SummarySettings,
    group: ResetGroup,
}

impl SummaryProcessor {
    pub fn new(client: PagerDutyClient, settings: SummarySettings) -> Self {
        Self {
            client,
            settings,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for SummaryProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let count = registrar.gauge(
            SUMMARY_INCIDENT_COUNT,
            "PagerDuty incident count by service",
            &["serviceID", "status", "urgency", "priority"],
        )?;
        let resolve = registrar.histogram(
            SUMMARY_RESOLVE_DURATION,
            "PagerDuty incident resolve duration in seconds",
            &["serviceID", "urgency", "priority"],
            &RESOLVE_BUCKETS,
        )?;
        // Counter keeps its totals across passes.
        registrar.counter(
            SUMMARY_STATUS_CHANGE_COUNT,
            "PagerDuty incident status changes",
            &["serviceID", "status", "urgency", "priority"],
        )?;
        self.group.gauge(count).histogram(resolve);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let until = now();
        let query = IncidentQuery {
            statuses: Vec::new(),
            team_ids: self.settings.team_filter.clone(),
            since: Some(shift(until, self.settings.since, false)),
            until: Some(until),
        };
        let incidents = self
            .client
            .list_incidents(&query, PagingGuard::new())
            .await?;

        let mut counts = HashedMetricList::new();
        let mut changes = HashedMetricList::new();
        let mut resolve = MetricList::new();
        for incident in &incidents {
            let service = incident.service.id.as_str();
            let urgency = incident.urgency.as_str();
            let priority = incident.priority_name();
            let created_at = parse_api_time(&incident.created_at);
            let changed_at = parse_api_time(&incident.last_status_change_at);

            counts.inc(labels! {
                "serviceID" => service,
                "status" => incident.status,
                "urgency" => urgency,
                "priority" => priority,
            });

            if incident.status == "resolved"
                && let (Some(created_at), Some(changed_at)) = (created_at, changed_at)
            {
                let seconds = (changed_at - created_at).num_milliseconds() as f64 / 1000.0;
                resolve.add_gauge(
                    labels! { "serviceID" => service, "urgency" => urgency, "priority" => priority },
                    seconds.max(0.0),
                );
            }

            if let Some(last_success) = ctx.last_success {
                let status = if created_at.is_some_and(|time| time > last_success) {
                    Some("created")
                } else if changed_at.is_some_and(|time| time > last_success) {
                    Some(incident.status.as_str())
                } else {
                    None
                };
                if let Some(status) = status {
                    changes.inc(labels! {
                        "serviceID" => service,
                        "status" => status,
                        "urgency" => urgency,
                        "priority" => priority,
                    });
                }
            }
        }

        emitter.hashed_gauges(SUMMARY_INCIDENT_COUNT, counts).await?;
        emitter.histograms(SUMMARY_RESOLVE_DURATION, resolve).await?;
        emitter.counters(SUMMARY_STATUS_CHANGE_COUNT, changes).await
    }
}
