use std::sync::Arc;

use pdexp_collector::Exporter;
use pdexp_common::error::Result;
use pdexp_metrics::MetricsRegistry;
use pdexp_pagerduty::{
    PagerDutyClient,
    processors::{
        IncidentProcessor, MaintenanceWindowProcessor, OnCallProcessor, ScheduleProcessor,
        ServiceProcessor, SummaryProcessor, SystemProcessor, TeamProcessor, UserProcessor,
    },
};
use tracing::info;

use crate::config::Cli;

/// Builds the exporter with every configured collector registered.
///
/// Collectors whose interval resolves to zero are skipped by the exporter.
pub fn build_exporter(cli: &Cli, registry: Arc<MetricsRegistry>) -> Result<Exporter> {
    let client = PagerDutyClient::new(cli.client_config()?, &registry)?;
    let scrape = cli.scrape_times();
    let team_filter = cli.team_filter();
    let mut exporter = Exporter::new(registry, cli.collector_options());

    if cli.disable_teams {
        info!(collector = "team", "collector disabled");
    } else {
        exporter.register("team", scrape.team, TeamProcessor::new(client.clone()))?;
    }
    exporter.register(
        "user",
        scrape.user,
        UserProcessor::new(client.clone(), team_filter.clone()),
    )?;
    exporter.register(
        "service",
        scrape.service,
        ServiceProcessor::new(client.clone(), team_filter.clone()),
    )?;
    exporter.register(
        "schedule",
        scrape.schedule,
        ScheduleProcessor::new(client.clone(), cli.schedule_settings()),
    )?;
    exporter.register(
        "maintenancewindow",
        scrape.maintenance_window,
        MaintenanceWindowProcessor::new(client.clone(), team_filter),
    )?;
    exporter.register("oncall", scrape.live, OnCallProcessor::new(client.clone()))?;
    exporter.register(
        "incident",
        scrape.live,
        IncidentProcessor::new(client.clone(), cli.incident_settings()),
    )?;
    exporter.register(
        "summary",
        scrape.summary,
        SummaryProcessor::new(client.clone(), cli.summary_settings()),
    )?;
    exporter.register("system", scrape.system, SystemProcessor::new(client))?;
    exporter.enable_self_observability(scrape.general)?;

    Ok(exporter)
}
