use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::error::Result;
use pdexp_metrics::{MetricList, labels};

use crate::client::PagerDutyClient;

pub const SERVICE_INFO: &str = "pagerduty_service_info";

pub struct ServiceProcessor {
    client: PagerDutyClient,
    team_filter: Vec<String>,
    group: ResetGroup,
}

impl ServiceProcessor {
    pub fn new(client: PagerDutyClient, team_filter: Vec<String>) -> Self {
        Self {
            client,
            team_filter,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for ServiceProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let service = registrar.gauge(
            SERVICE_INFO,
            "PagerDuty service",
            &["serviceID", "teamID", "serviceName", "serviceUrl"],
        )?;
        self.group.gauge(service);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let mut services = MetricList::new();
        for service in self.client.list_services(&self.team_filter).await? {
            // one row per owning team; unowned services get an empty teamID
            let teams = if service.teams.is_empty() {
                vec![String::new()]
            } else {
                service.teams.iter().map(|team| team.id.clone()).collect()
            };

            for team in teams {
                services.add_info(labels! {
                    "serviceID" => service.id,
                    "teamID" => team,
                    "serviceName" => service.name,
                    "serviceUrl" => service.html_url,
                });
            }
        }

        emitter.gauges(SERVICE_INFO, services).await
    }
}
