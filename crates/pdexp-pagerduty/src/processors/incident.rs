use async_trait::async_trait;
use pdexp_collector::{CollectContext, Emitter, PagingGuard, Processor, ResetGroup, SinkRegistrar};
use pdexp_common::{
    error::Result,
    format::bool_label,
    time::{format_label_time, parse_api_time},
};
use pdexp_metrics::{MetricList, labels};

use crate::client::{IncidentQuery, PagerDutyClient};

pub const INCIDENT_INFO: &str = "pagerduty_incident_info";
pub const INCIDENT_STATUS: &str = "pagerduty_incident_status";

pub const INCIDENT_STATUSES: [&str; 3] = ["triggered", "acknowledged", "resolved"];

/// Expands `all` into every incident status and drops duplicates.
pub fn expand_statuses(statuses: &[String]) -> Vec<String> {
    let mut expanded: Vec<String> = Vec::new();
    for status in statuses {
        let status = status.trim().to_lowercase();
        let items = if status == "all" {
            INCIDENT_STATUSES.iter().map(|item| item.to_string()).collect()
        } else {
            vec![status]
        };
        for item in items {
            if !item.is_empty() && !expanded.contains(&item) {
                expanded.push(item);
            }
        }
    }
    expanded
}

#[derive(Debug, Clone)]
pub struct IncidentSettings {
    pub statuses: Vec<String>,
    pub team_filter: Vec<String>,
    pub time_format: String,
    pub limit: u64,
}

pub struct IncidentProcessor {
    client: PagerDutyClient,
    settings: IncidentSettings,
    group: ResetGroup,
}

impl IncidentProcessor {
    pub fn new(client: PagerDutyClient, settings: IncidentSettings) -> Self {
        Self {
            client,
            settings,
            group: ResetGroup::new(),
        }
    }

    /// Stops before the page starting at `limit`, so at most `limit`
    /// incidents are requested.
    fn paging_guard(&self) -> PagingGuard {
        PagingGuard::with_ceiling(self.settings.limit.saturating_sub(1))
    }
}

#[async_trait]
impl Processor for IncidentProcessor {
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()> {
        let info = registrar.gauge(
            INCIDENT_INFO,
            "PagerDuty incident",
            &[
                "incidentID",
                "serviceID",
                "incidentUrl",
                "incidentNumber",
                "title",
                "status",
                "urgency",
                "acknowledged",
                "assigned",
                "type",
                "time",
            ],
        )?;
        let status = registrar.gauge(
            INCIDENT_STATUS,
            "PagerDuty incident status",
            &["incidentID", "userID", "time", "type"],
        )?;
        self.group.gauge(info).gauge(status);
        Ok(())
    }

    fn reset(&self) {
        self.group.reset();
    }

    async fn collect(&self, _ctx: &CollectContext, emitter: Emitter) -> Result<()> {
        let query = IncidentQuery {
            statuses: self.settings.statuses.clone(),
            team_ids: self.settings.team_filter.clone(),
            ..IncidentQuery::default()
        };
        let incidents = self
            .client
            .list_incidents(&query, self.paging_guard())
            .await?;

        let format = self.settings.time_format.as_str();
        let mut info = MetricList::new();
        let mut status = MetricList::new();
        for incident in incidents {
            let created_at = parse_api_time(&incident.created_at);
            info.add_time(
                labels! {
                    "incidentID" => incident.id,
                    "serviceID" => incident.service.id,
                    "incidentUrl" => incident.html_url,
                    "incidentNumber" => incident.incident_number,
                    "title" => incident.title,
                    "status" => incident.status,
                    "urgency" => incident.urgency,
                    "acknowledged" => bool_label(!incident.acknowledgements.is_empty()),
                    "assigned" => bool_label(!incident.assignments.is_empty()),
                    "type" => incident.kind,
                    "time" => format_label_time(created_at, format),
                },
                created_at,
            );

            for acknowledgement in &incident.acknowledgements {
                let at = parse_api_time(&acknowledgement.at);
                status.add_time(
                    labels! {
                        "incidentID" => incident.id,
                        "userID" => acknowledgement.acknowledger.id,
                        "time" => format_label_time(at, format),
                        "type" => "acknowledgement",
                    },
                    at,
                );
            }

            for assignment in &incident.assignments {
                let at = parse_api_time(&assignment.at);
                status.add_time(
                    labels! {
                        "incidentID" => incident.id,
                        "userID" => assignment.assignee.id,
                        "time" => format_label_time(at, format),
                        "type" => "assignment",
                    },
                    at,
                );
            }

            let changed_at = parse_api_time(&incident.last_status_change_at);
            status.add_time(
                labels! {
                    "incidentID" => incident.id,
                    "userID" => incident.last_status_change_by.id,
                    "time" => format_label_time(changed_at, format),
                    "type" => "lastChange",
                },
                changed_at,
            );
        }

        emitter.gauges(INCIDENT_INFO, info).await?;
        emitter.gauges(INCIDENT_STATUS, status).await
    }
}
