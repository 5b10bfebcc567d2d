use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::error::Result;
use pdexp_metrics::{MetricList, labels};

use crate::client::PagerDutyClient;

pub const USER_INFO: &str = "pagerduty_user_info";

pub struct UserProcessor {
    client: PagerDutyClient,
    team_filter: Vec<String>,
    group: ResetGroup,
}

impl UserProcessor {
    pub fn new(client: PagerDutyClient, team_filter: Vec<String>) -> Self {
        Self {
            client,
            team_filter,
            group: ResetGroup::new(),
        }
    }
}

#[async_trait]
impl Processor for UserProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let user = registrar.gauge(
            USER_INFO,
            "PagerDuty user",
            &[
                "userID",
                "userName",
                "userMail",
                "userAvatar",
                "userColor",
                "userJobTitle",
                "userRole",
                "userTimezone",
            ],
        )?;
        self.group.gauge(user);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let mut users = MetricList::new();
        for user in self.client.list_users(&self.team_filter).await? {
            users.add_info(labels! {
                "userID" => user.id,
                "userName" => user.name,
                "userMail" => user.email,
                "userAvatar" => user.avatar_url,
                "userColor" => user.color,
                "userJobTitle" => user.job_title,
                "userRole" => user.role,
                "userTimezone" => user.time_zone,
            });
        }

        emitter.gauges(USER_INFO, users).await
    }
}
