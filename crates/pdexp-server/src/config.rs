use std::{path::PathBuf, time::Duration};

use clap::Parser;
use pdexp_collector::CollectorOptions;
use pdexp_common::{
    error::{PdexpError, Result},
    time::{parse_duration, validate_time_format},
};
use pdexp_pagerduty::{
    ClientConfig,
    client::DEFAULT_BASE_URL,
    processors::{IncidentSettings, ScheduleSettings, SummarySettings, expand_statuses},
};

fn duration_arg(value: &str) -> std::result::Result<Duration, String> {
    parse_duration(value).map_err(|err| err.to_string())
}

#[derive(Debug, Parser)]
#[command(name = "pagerduty-exporter", about = "Prometheus exporter for PagerDuty")]
pub struct Cli {
    #[arg(long = "log.debug", env = "LOG_DEBUG")]
    pub log_debug: bool,

    /// Switch log output to JSON.
    #[arg(long = "log.json", env = "LOG_JSON")]
    pub log_json: bool,

    #[arg(
        long = "pagerduty.authtoken",
        env = "PAGERDUTY_AUTH_TOKEN",
        hide_env_values = true,
        conflicts_with = "auth_token_file"
    )]
    pub auth_token: Option<String>,

    #[arg(long = "pagerduty.authtoken-file", env = "PAGERDUTY_AUTH_TOKEN_FILE")]
    pub auth_token_file: Option<PathBuf>,

    #[arg(long = "pagerduty.url", env = "PAGERDUTY_URL", default_value = DEFAULT_BASE_URL)]
    pub pagerduty_url: String,

    /// Maximum number of concurrent requests to the PagerDuty API.
    #[arg(
        long = "pagerduty.max-connections",
        env = "PAGERDUTY_MAX_CONNECTIONS",
        default_value_t = 4
    )]
    pub max_connections: usize,

    #[arg(
        long = "pagerduty.schedule.override-duration",
        env = "PAGERDUTY_SCHEDULE_OVERRIDE_TIMEFRAME",
        default_value = "48h",
        value_parser = duration_arg
    )]
    pub schedule_override_timeframe: Duration,

    #[arg(
        long = "pagerduty.schedule.entry-timeframe",
        env = "PAGERDUTY_SCHEDULE_ENTRY_TIMEFRAME",
        default_value = "72h",
        value_parser = duration_arg
    )]
    pub schedule_entry_timeframe: Duration,

    #[arg(
        long = "pagerduty.schedule.entry-timeformat",
        env = "PAGERDUTY_SCHEDULE_ENTRY_TIMEFORMAT",
        default_value = "%a, %d %b %H:%M %Z"
    )]
    pub schedule_entry_time_format: String,

    #[arg(
        long = "pagerduty.incident.status",
        env = "PAGERDUTY_INCIDENT_STATUS",
        value_delimiter = ';',
        default_values = ["triggered", "acknowledged"],
        value_parser = ["triggered", "acknowledged", "resolved", "all"]
    )]
    pub incident_statuses: Vec<String>,

    #[arg(
        long = "pagerduty.incident.timeformat",
        env = "PAGERDUTY_INCIDENT_TIMEFORMAT",
        default_value = "%a, %d %b %H:%M %Z"
    )]
    pub incident_time_format: String,

    #[arg(
        long = "pagerduty.incident.limit",
        env = "PAGERDUTY_INCIDENT_LIMIT",
        default_value_t = 5000
    )]
    pub incident_limit: u64,

    /// Skip the team collector, for plans without teams.
    #[arg(long = "pagerduty.disable-teams", env = "PAGERDUTY_DISABLE_TEAMS")]
    pub disable_teams: bool,

    #[arg(
        long = "pagerduty.team-filter",
        env = "PAGERDUTY_TEAM_FILTER",
        value_delimiter = ','
    )]
    pub team_filter: Vec<String>,

    #[arg(
        long = "pagerduty.summary.since",
        env = "PAGERDUTY_SUMMARY_SINCE",
        default_value = "730h",
        value_parser = duration_arg
    )]
    pub summary_since: Duration,

    #[arg(long = "bind", env = "SERVER_BIND", default_value = "0.0.0.0:8080")]
    pub bind: String,

    #[arg(
        long = "server.timeout",
        env = "SERVER_TIMEOUT",
        default_value = "10s",
        value_parser = duration_arg
    )]
    pub server_timeout: Duration,

    #[arg(long = "scrape.time", env = "SCRAPE_TIME", default_value = "5m", value_parser = duration_arg)]
    pub scrape_time: Duration,

    #[arg(long = "scrape.time.maintenancewindow", env = "SCRAPE_TIME_MAINTENANCEWINDOW", value_parser = duration_arg)]
    pub scrape_time_maintenance_window: Option<Duration>,

    #[arg(long = "scrape.time.schedule", env = "SCRAPE_TIME_SCHEDULE", value_parser = duration_arg)]
    pub scrape_time_schedule: Option<Duration>,

    #[arg(long = "scrape.time.service", env = "SCRAPE_TIME_SERVICE", value_parser = duration_arg)]
    pub scrape_time_service: Option<Duration>,

    #[arg(long = "scrape.time.team", env = "SCRAPE_TIME_TEAM", value_parser = duration_arg)]
    pub scrape_time_team: Option<Duration>,

    #[arg(long = "scrape.time.user", env = "SCRAPE_TIME_USER", value_parser = duration_arg)]
    pub scrape_time_user: Option<Duration>,

    #[arg(
        long = "scrape.time.summary",
        env = "SCRAPE_TIME_SUMMARY",
        default_value = "15m",
        value_parser = duration_arg
    )]
    pub scrape_time_summary: Duration,

    /// Interval of the on-call and incident collectors.
    #[arg(
        long = "scrape.time.live",
        env = "SCRAPE_TIME_LIVE",
        default_value = "1m",
        value_parser = duration_arg
    )]
    pub scrape_time_live: Duration,

    #[arg(
        long = "scrape.time.system",
        env = "SCRAPE_TIME_SYSTEM",
        default_value = "0",
        value_parser = duration_arg
    )]
    pub scrape_time_system: Duration,

    #[arg(
        long = "collector.error-threshold",
        env = "COLLECTOR_ERROR_THRESHOLD",
        default_value_t = 5
    )]
    pub error_threshold: u32,

    /// Upper bound of a single collection pass; 0 disables it.
    #[arg(
        long = "collector.timeout",
        env = "COLLECTOR_TIMEOUT",
        default_value = "5m",
        value_parser = duration_arg
    )]
    pub collector_timeout: Duration,
}

/// Resolved interval of every collector; zero means disabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScrapeTimes {
    pub general: Duration,
    pub team: Duration,
    pub user: Duration,
    pub service: Duration,
    pub schedule: Duration,
    pub maintenance_window: Duration,
    pub live: Duration,
    pub summary: Duration,
    pub system: Duration,
}

impl Cli {
    /// Checks settings clap cannot validate on its own.
    pub fn validate(&self) -> Result<()> {
        validate_time_format(&self.schedule_entry_time_format)?;
        validate_time_format(&self.incident_time_format)?;
        if self.max_connections == 0 {
            return Err(PdexpError::InvalidArgument(
                "--pagerduty.max-connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Token from the flag or the token file, surrounding whitespace removed.
    pub fn auth_token(&self) -> Result<String> {
        let token = match (&self.auth_token, &self.auth_token_file) {
            (Some(token), _) => token.clone(),
            (None, Some(path)) => std::fs::read_to_string(path)?,
            (None, None) => {
                return Err(PdexpError::InvalidArgument(
                    "one of --pagerduty.authtoken or --pagerduty.authtoken-file is required"
                        .to_string(),
                ));
            }
        };

        let token = token.trim();
        if token.is_empty() {
            return Err(PdexpError::InvalidArgument(
                "PagerDuty auth token is empty".to_string(),
            ));
        }
        Ok(token.to_string())
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            base_url: self.pagerduty_url.clone(),
            max_connections: self.max_connections,
            ..ClientConfig::new(self.auth_token()?)
        })
    }

    pub fn scrape_times(&self) -> ScrapeTimes {
        let general = self.scrape_time;
        ScrapeTimes {
            general,
            team: self.scrape_time_team.unwrap_or(general),
            user: self.scrape_time_user.unwrap_or(general),
            service: self.scrape_time_service.unwrap_or(general),
            schedule: self.scrape_time_schedule.unwrap_or(general),
            maintenance_window: self.scrape_time_maintenance_window.unwrap_or(general),
            live: self.scrape_time_live,
            summary: self.scrape_time_summary,
            system: self.scrape_time_system,
        }
    }

    pub fn collector_options(&self) -> CollectorOptions {
        CollectorOptions {
            error_threshold: self.error_threshold,
            timeout: (!self.collector_timeout.is_zero()).then_some(self.collector_timeout),
        }
    }

    pub fn team_filter(&self) -> Vec<String> {
        self.team_filter
            .iter()
            .map(|team| team.trim())
            .filter(|team| !team.is_empty())
            .map(str::to_string)
            .collect()
    }

    pub fn schedule_settings(&self) -> ScheduleSettings {
        ScheduleSettings {
            lookback: self.scrape_times().schedule,
            entry_timeframe: self.schedule_entry_timeframe,
            override_timeframe: self.schedule_override_timeframe,
            entry_time_format: self.schedule_entry_time_format.clone(),
        }
    }

    pub fn incident_settings(&self) -> IncidentSettings {
        IncidentSettings {
            statuses: expand_statuses(&self.incident_statuses),
            team_filter: self.team_filter(),
            time_format: self.incident_time_format.clone(),
            limit: self.incident_limit,
        }
    }

    pub fn summary_settings(&self) -> SummarySettings {
        SummarySettings {
            since: self.summary_since,
            team_filter: self.team_filter(),
        }
    }
}
