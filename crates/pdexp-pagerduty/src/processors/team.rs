use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::error::Result;
use pdexp_metrics::{MetricList, labels};

use crate::client::PagerDutyClient;

pub const TEAM_INFO: &str = "pagerduty_team_info";

pub struct TeamProcessor {
    client: PagerDutyClient,
    group: ResetGroup,
}

impl TeamProcessor {
    pub fn new(client: PagerDutyClient) -> Self {
        Self {
            client,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for TeamProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let team = registrar.gauge(TEAM_INFO, "PagerDuty team", &["teamID", "teamName", "teamUrl"])?;
        self.group.gauge(team);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let mut teams = MetricList::new();
        for team in self.client.list_teams().await? {
            teams.add_info(labels! {
                "teamID" => team.id,
                "teamName" => team.name,
                "teamUrl" => team.html_url,
            });
        }

        emitter.gauges(TEAM_INFO, teams).await
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
    async fn publishes_team_info() {
        let harness = Harness::start().await;
        Mock::given(method("GET"))
            .and(path("/teams"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": [
                    { "id": "P1", "name": "Ops", "html_url": "https://acme.pagerduty.com/teams/P1" }
                ],
                "offset": 0, "limit": 100, "more": false
            })))
            .mount(&harness.server)
            .await;

        let rendered = harness.collect_once(TeamProcessor::new(harness.client())).await.unwrap();
        assert!(rendered.contains(
            "pagerduty_team_info{teamID=\"P1\",teamName=\"Ops\",teamUrl=\"https://acme.pagerduty.com/teams/P1\"} 1"
        ));
    }
}
