use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::{error::Result, time::parse_api_time};
use pdexp_metrics::{MetricList, labels};

use crate::client::PagerDutyClient;

pub const SCHEDULE_ONCALL: &str = "pagerduty_schedule_oncall";

pub struct OnCallProcessor {
    client: PagerDutyClient,
    group: ResetGroup,
}

impl OnCallProcessor {
    pub fn new(client: PagerDutyClient) -> Self {
        Self {
            client,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for OnCallProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let oncall = registrar.gauge(
            SCHEDULE_ONCALL,
            "PagerDuty schedule oncall",
            &["scheduleID", "userID", "escalationLevel", "type"],
        )?;
        self.group.gauge(oncall);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let mut oncalls = MetricList::new();
        for oncall in self.client.list_oncalls().await? {
            let times = [
                ("startTime", parse_api_time(&oncall.start)),
                ("endTime", parse_api_time(&oncall.end)),
            ];
            for (kind, time) in times {
                oncalls.add_time(
                    labels! {
                        "scheduleID" => oncall.schedule.id,
                        "userID" => oncall.user.id,
                        "escalationLevel" => oncall.escalation_level,
                        "type" => kind,
                    },
                    time,
                );
            }
        }

        emitter.gauges(SCHEDULE_ONCALL, oncalls).await
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, ResponseTemplate,
        matchers::{method, path, query_param},
    };

    use super::*;
    use crate::processors::testing::Harness;

    #[tokio::test]
    async fn permanent_oncall_is_clamped_to_one() {
        let harness = Harness::start().await;
        Mock::given(method("GET"))
            .and(path("/oncalls"))
            .and(query_param("earliest", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "oncalls": [
                    {
                        "schedule": { "id": "S1" },
                        "user": { "id": "U1" },
                        "escalation_level": 1,
                        "start": "2024-03-01T08:00:00Z",
                        "end": "2024-03-01T20:00:00Z"
                    },
                    {
                        "schedule": null,
                        "user": { "id": "U2" },
                        "escalation_level": 2,
                        "start": null,
                        "end": null
                    }
                ],
                "offset": 0, "limit": 100, "more": false
            })))
            .mount(&harness.server)
            .await;

        let rendered = harness
            .collect_once(OnCallProcessor::new(harness.client()))
            .await
            .unwrap();
        assert!(rendered.contains(
            "pagerduty_schedule_oncall{scheduleID=\"S1\",userID=\"U1\",escalationLevel=\"1\",type=\"startTime\"} 1709280000"
        ));
        assert!(rendered.contains(
            "pagerduty_schedule_oncall{scheduleID=\"\",userID=\"U2\",escalationLevel=\"2\",type=\"endTime\"} 1"
        ));
    }
}
