use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::{
    error::Result,
    time::{format_label_time, now, parse_api_time, shift},
};
use pdexp_metrics::{MetricList, labels};
use tracing::debug;

use crate::{client::PagerDutyClient, models::ScheduleEntry};

pub const SCHEDULE_INFO: &str = "pagerduty_schedule_info";
pub const SCHEDULE_LAYER_INFO: &str = "pagerduty_schedule_layer_info";
pub const SCHEDULE_LAYER_ENTRY: &str = "pagerduty_schedule_layer_entry";
pub const SCHEDULE_LAYER_COVERAGE: &str = "pagerduty_schedule_layer_coverage";
pub const SCHEDULE_FINAL_ENTRY: &str = "pagerduty_schedule_final_entry";
pub const SCHEDULE_FINAL_COVERAGE: &str = "pagerduty_schedule_final_coverage";
pub const SCHEDULE_OVERRIDE: &str = "pagerduty_schedule_override";

#[derive(Debug, Clone)]
pub struct ScheduleSettings {
    /// How far back rendered entries and overrides are requested.
    pub lookback: Duration,
    pub entry_timeframe: Duration,
    pub override_timeframe: Duration,
    pub entry_time_format: String,
}

pub struct ScheduleProcessor {
    client: PagerDutyClient,
    settings: ScheduleSettings,
    group: ResetGroup,
}

impl ScheduleProcessor {
    pub fn new(client: PagerDutyClient, settings: ScheduleSettings) -> Self {
        Self {
            client,
            settings,
            group: ResetGroup::new(),
        }
    }

    async fn collect_schedule(
        &self,
        schedule_id: &str,
        started: DateTime<Utc>,
        emitter: &Emitter,
    ) -> Result<()> {
        debug!(schedule = %schedule_id, "fetching schedule detail");
        tokio::try_join!(
            self.collect_detail(schedule_id, started, emitter),
            self.collect_overrides(schedule_id, started, emitter),
        )?;
        Ok(())
    }

    async fn collect_detail(
        &self,
        schedule_id: &str,
        started: DateTime<Utc>,
        emitter: &Emitter,
    ) -> Result<()> {
        let since = shift(started, self.settings.lookback, false);
        let until = shift(started, self.settings.entry_timeframe, true);
        let schedule = self.client.get_schedule(schedule_id, since, until).await?;

        let mut layers = MetricList::new();
        let mut layer_entries = MetricList::new();
        let mut layer_coverage = MetricList::new();
        for layer in &schedule.schedule_layers {
            layers.add_info(labels! {
                "scheduleID" => schedule_id,
                "scheduleLayerID" => layer.id,
                "scheduleLayerName" => layer.name,
            });

            for entry in &layer.rendered_schedule_entries {
                for (kind, time) in self.entry_times(entry) {
                    layer_entries.add_time(
                        labels! {
                            "scheduleLayerID" => layer.id,
                            "scheduleID" => schedule_id,
                            "userID" => entry.user.id,
                            "time" => self.format_time(time),
                            "type" => kind,
                        },
                        time,
                    );
                }
            }

            layer_coverage.add_gauge(
                labels! { "scheduleLayerID" => layer.id, "scheduleID" => schedule_id },
                layer.rendered_coverage_percentage,
            );
        }

        let mut final_entries = MetricList::new();
        for entry in &schedule.final_schedule.rendered_schedule_entries {
            for (kind, time) in self.entry_times(entry) {
                final_entries.add_time(
                    labels! {
                        "scheduleID" => schedule_id,
                        "userID" => entry.user.id,
                        "time" => self.format_time(time),
                        "type" => kind,
                    },
                    time,
                );
            }
        }

        let mut final_coverage = MetricList::new();
        final_coverage.add_gauge(
            labels! { "scheduleID" => schedule_id },
            schedule.final_schedule.rendered_coverage_percentage,
        );

        emitter.gauges(SCHEDULE_LAYER_INFO, layers).await?;
        emitter.gauges(SCHEDULE_LAYER_ENTRY, layer_entries).await?;
        emitter.gauges(SCHEDULE_LAYER_COVERAGE, layer_coverage).await?;
        emitter.gauges(SCHEDULE_FINAL_ENTRY, final_entries).await?;
        emitter.gauges(SCHEDULE_FINAL_COVERAGE, final_coverage).await
    }

    async fn collect_overrides(
        &self,
        schedule_id: &str,
        started: DateTime<Utc>,
        emitter: &Emitter,
    ) -> Result<()> {
        let since = shift(started, self.settings.lookback, false);
        let until = shift(started, self.settings.override_timeframe, true);

        let mut overrides = MetricList::new();
        for item in self.client.list_overrides(schedule_id, since, until).await? {
            let times = [
                ("startTime", parse_api_time(&item.start)),
                ("endTime", parse_api_time(&item.end)),
            ];
            for (kind, time) in times {
                overrides.add_time(
                    labels! {
                        "overrideID" => item.id,
                        "scheduleID" => schedule_id,
                        "userID" => item.user.id,
                        "type" => kind,
                    },
                    time,
                );
            }
        }

        emitter.gauges(SCHEDULE_OVERRIDE, overrides).await
    }

    fn entry_times(&self, entry: &ScheduleEntry) -> [(&'static str, Option<DateTime<Utc>>); 2] {
        [
            ("startTime", parse_api_time(&entry.start)),
            ("endTime", parse_api_time(&entry.end)),
        ]
    }

    fn format_time(&self, time: Option<DateTime<Utc>>) -> String {
        format_label_time(time, &self.settings.entry_time_format)
    }
}

#[async_trait]
impl Processor for ScheduleProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let schedule = registrar.gauge(
            SCHEDULE_INFO,
            "PagerDuty schedule",
            &["scheduleID", "scheduleName", "scheduleTimeZone"],
        )?;
        let layer = registrar.gauge(
            SCHEDULE_LAYER_INFO,
            "PagerDuty schedule layer informations",
            &["scheduleID", "scheduleLayerID", "scheduleLayerName"],
        )?;
        let layer_entry = registrar.gauge(
            SCHEDULE_LAYER_ENTRY,
            "PagerDuty schedule layer entries",
            &["scheduleLayerID", "scheduleID", "userID", "time", "type"],
        )?;
        let layer_coverage = registrar.gauge(
            SCHEDULE_LAYER_COVERAGE,
            "PagerDuty schedule layer entry coverage",
            &["scheduleLayerID", "scheduleID"],
        )?;
        let final_entry = registrar.gauge(
            SCHEDULE_FINAL_ENTRY,
            "PagerDuty schedule final entries",
            &["scheduleID", "userID", "time", "type"],
        )?;
        let final_coverage = registrar.gauge(
            SCHEDULE_FINAL_COVERAGE,
            "PagerDuty schedule final entry coverage",
            &["scheduleID"],
        )?;
        let overrides = registrar.gauge(
            SCHEDULE_OVERRIDE,
            "PagerDuty schedule override",
            &["overrideID", "scheduleID", "userID", "type"],
        )?;

        self.group
            .gauge(schedule)
            .gauge(layer)
            .gauge(layer_entry)
            .gauge(layer_coverage)
            .gauge(final_entry)
            .gauge(final_coverage)
            .gauge(overrides);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let started = now();
        let schedules = self.client.list_schedules().await?;

        let mut info = MetricList::new();
        for schedule in &schedules {
            info.add_info(labels! {
                "scheduleID" => schedule.id,
                "scheduleName" => schedule.name,
                "scheduleTimeZone" => schedule.time_zone,
            });
        }
        emitter.gauges(SCHEDULE_INFO, info).await?;

        try_join_all(
            schedules
                .iter()
                .map(|schedule| self.collect_schedule(&schedule.id, started, &emitter)),
        )
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, ResponseTemplate,
        matchers::{method, path},
    };

    use super::*;
    use crate::processors::testing::Harness;

    fn settings() -> ScheduleSettings {
        ScheduleSettings {
            lookback: Duration::from_secs(300),
            entry_timeframe: Duration::from_secs(72 * 3_600),
            override_timeframe: Duration::from_secs(48 * 3_600),
            entry_time_format: "%Y-%m-%d %H:%M".to_string(),
        }
    }

    async fn mount_schedules(harness: &Harness, override_status: u16) {
        Mock::given(method("GET"))
            .and(path("/schedules"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schedules": [{ "id": "S1", "name": "Primary", "time_zone": "UTC" }],
                "offset": 0, "limit": 100, "more": false
            })))
            .mount(&harness.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/schedules/S1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "schedule": {
                    "id": "S1",
                    "name": "Primary",
                    "time_zone": "UTC",
                    "schedule_layers": [{
                        "id": "L1",
                        "name": "Layer 1",
                        "rendered_coverage_percentage": 87.5,
                        "rendered_schedule_entries": [{
                            "start": "2024-03-01T08:00:00Z",
                            "end": "2024-03-01T20:00:00Z",
                            "user": { "id": "U1" }
                        }]
                    }],
                    "final_schedule": {
                        "rendered_coverage_percentage": 100.0,
                        "rendered_schedule_entries": [{
                            "start": "2024-03-01T08:00:00Z",
                            "end": "2024-03-01T20:00:00Z",
                            "user": { "id": "U2" }
                        }]
                    }
                }
            })))
            .mount(&harness.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/schedules/S1/overrides"))
            .respond_with(ResponseTemplate::new(override_status).set_body_json(json!({
                "overrides": [{
                    "id": "O1",
                    "start": "2024-03-02T00:00:00Z",
                    "end": "2024-03-02T06:00:00Z",
                    "user": { "id": "U3" }
                }],
                "offset": 0, "limit": 100, "more": false
            })))
            .mount(&harness.server)
            .await;
    }

    #[tokio::test]
    async fn publishes_layers_entries_and_overrides() {
        let harness = Harness::start().await;
        mount_schedules(&harness, 200).await;

        let processor = ScheduleProcessor::new(harness.client(), settings());
        let rendered = harness.collect_once(processor).await.unwrap();

        assert!(rendered.contains(
            "pagerduty_schedule_info{scheduleID=\"S1\",scheduleName=\"Primary\",scheduleTimeZone=\"UTC\"} 1"
        ));
        assert!(rendered.contains(
            "pagerduty_schedule_layer_coverage{scheduleLayerID=\"L1\",scheduleID=\"S1\"} 87.5"
        ));
        assert!(rendered.contains(
            "pagerduty_schedule_layer_entry{scheduleLayerID=\"L1\",scheduleID=\"S1\",userID=\"U1\",time=\"2024-03-01 08:00\",type=\"startTime\"} 1709280000"
        ));
        assert!(rendered.contains(
            "pagerduty_schedule_final_entry{scheduleID=\"S1\",userID=\"U2\",time=\"2024-03-01 20:00\",type=\"endTime\"} 1709323200"
        ));
        assert!(rendered.contains("pagerduty_schedule_final_coverage{scheduleID=\"S1\"} 100"));
        assert!(rendered.contains(
            "pagerduty_schedule_override{overrideID=\"O1\",scheduleID=\"S1\",userID=\"U3\",type=\"startTime\"} 1709337600"
        ));
    }

    #[tokio::test]
    async fn failing_sub_fetch_fails_the_whole_pass() {
        let harness = Harness::start().await;
        mount_schedules(&harness, 500).await;

        let processor = ScheduleProcessor::new(harness.client(), settings());
        assert!(harness.collect_once(processor).await.is_err());
        assert!(!harness.registry.render_prometheus().contains("scheduleID=\"S1\""));
    }
}
