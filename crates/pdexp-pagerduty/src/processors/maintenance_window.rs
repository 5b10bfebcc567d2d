use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::{
    error::Result,
    time::{now, parse_api_time},
};
use pdexp_metrics::{MetricList, labels};

use crate::client::PagerDutyClient;

pub const MAINTENANCE_WINDOW_INFO: &str = "pagerduty_maintenancewindow_info";
pub const MAINTENANCE_WINDOW_STATUS: &str = "pagerduty_maintenancewindow_status";

pub struct MaintenanceWindowProcessor {
    client: PagerDutyClient,
    team_filter: Vec<String>,
    group: ResetGroup,
}

impl MaintenanceWindowProcessor {
    pub fn new(client: PagerDutyClient, team_filter: Vec<String>) -> Self {
        Self {
            client,
            team_filter,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for MaintenanceWindowProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let info = registrar.gauge(
            MAINTENANCE_WINDOW_INFO,
            "PagerDuty MaintenanceWindow",
            &["windowID", "serviceID"],
        )?;
        let status = registrar.gauge(
            MAINTENANCE_WINDOW_STATUS,
            "PagerDuty MaintenanceWindow",
            &["windowID", "serviceID", "type"],
        )?;
        self.group.gauge(info).gauge(status);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let windows = self.client.list_maintenance_windows(&self.team_filter).await?;
        let current = now();

        let mut info = MetricList::new();
        let mut status = MetricList::new();
        for window in windows {
            let start = parse_api_time(&window.start_time);
            let end = parse_api_time(&window.end_time);
            if end.is_some_and(|end| end < current) {
                continue;
            }

            for service in &window.services {
                info.add_info(labels! { "windowID" => window.id, "serviceID" => service.id });
                status.add_time(
                    labels! { "windowID" => window.id, "serviceID" => service.id, "type" => "startTime" },
                    start,
                );
                status.add_time(
                    labels! { "windowID" => window.id, "serviceID" => service.id, "type" => "endTime" },
                    end,
                );
            }
        }

        emitter.gauges(MAINTENANCE_WINDOW_INFO, info).await?;
        emitter.gauges(MAINTENANCE_WINDOW_STATUS, status).await
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

    #[tokio::test]
    async fn skips_ended_windows() {
        let harness = Harness::start().await;
        Mock::given(method("GET"))
            .and(path("/maintenance_windows"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "maintenance_windows": [
                    {
                        "id": "W1",
                        "start_time": "2020-01-01T00:00:00Z",
                        "end_time": "2020-01-01T02:00:00Z",
                        "services": [{ "id": "S1" }]
                    },
                    {
                        "id": "W2",
                        "start_time": "2099-01-01T00:00:00Z",
                        "end_time": "2099-01-01T02:00:00Z",
                        "services": [{ "id": "S2" }]
                    }
                ],
                "offset": 0, "limit": 100, "more": false
            })))
            .mount(&harness.server)
            .await;

        let processor = MaintenanceWindowProcessor::new(harness.client(), Vec::new());
        let rendered = harness.collect_once(processor).await.unwrap();
        assert!(!rendered.contains("windowID=\"W1\""));
        assert!(rendered.contains("pagerduty_maintenancewindow_info{windowID=\"W2\",serviceID=\"S2\"} 1"));
        assert!(rendered.contains(
            "pagerduty_maintenancewindow_status{windowID=\"W2\",serviceID=\"S2\",type=\"endTime\"} 4070916000"
        ));
    }
}
