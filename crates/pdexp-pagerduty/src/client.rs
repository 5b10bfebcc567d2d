use std::{sync::Arc, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use pdexp_collector::paging::{Page, PagingGuard, PagingState, fetch_all};
use pdexp_common::error::{PdexpError, Result};
use pdexp_metrics::{CounterMetric, MetricsRegistry, labels};
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::Semaphore;
use tracing::debug;
use url::Url;

use crate::models::{
    Incident, License, LicensesResponse, MaintenanceWindow, OnCall, Override, Schedule,
    ScheduleResponse, Service, Team, User,
};

pub const DEFAULT_BASE_URL: &str = "https://api.pagerduty.com";
pub const API_COUNTER: &str = "pagerduty_api_counter";
pub const PAGE_SIZE: u64 = 100;

const ACCEPT_V2: &str = "application/vnd.pagerduty+json;version=2";

type Query = Vec<(String, String)>;

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub token: String,
    pub max_connections: usize,
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: token.into(),
            max_connections: 4,
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Filters for the incident list endpoint.
#[derive(Debug, Clone, Default)]
pub struct IncidentQuery {
    pub statuses: Vec<String>,
    pub team_ids: Vec<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// PagerDuty REST v2 client.
///
/// Concurrent requests are bounded by a semaphore shared by all clones, and
/// every request is counted in `pagerduty_api_counter{name}`.
#[derive(Clone)]
pub struct PagerDutyClient {
    http: reqwest::Client,
    base_url: Url,
    permits: Arc<Semaphore>,
    api_counter: Arc<CounterMetric>,
}

impl PagerDutyClient {
    pub fn new(config: ClientConfig, registry: &MetricsRegistry) -> Result<Self> {
        if config.token.trim().is_empty() {
            return Err(PdexpError::InvalidArgument(
                "PagerDuty auth token is empty".to_string(),
            ));
        }
        let max_connections = config.max_connections.max(1);

        let mut base = config.base_url.trim_end_matches('/').to_string();
        base.push('/');
        let base_url = Url::parse(&base).map_err(|err| {
            PdexpError::InvalidArgument(format!("invalid PagerDuty url {}: {err}", config.base_url))
        })?;

        let mut authorization =
            HeaderValue::from_str(&format!("Token token={}", config.token.trim())).map_err(
                |_| PdexpError::InvalidArgument("PagerDuty auth token is not a valid header".to_string()),
            )?;
        authorization.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(ACCEPT, HeaderValue::from_static(ACCEPT_V2));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(config.request_timeout)
            .pool_max_idle_per_host(max_connections)
            .build()
            .map_err(|err| {
                PdexpError::InternalError(format!("failed to build PagerDuty http client: {err}"))
            })?;

        let api_counter = registry.register_counter(API_COUNTER, "Pagerduty api counter", &["name"])?;

        Ok(Self {
            http,
            base_url,
            permits: Arc::new(Semaphore::new(max_connections)),
            api_counter,
        })
    }

    pub async fn list_teams(&self) -> Result<Vec<Team>> {
        self.list_all("ListTeams", "teams", "teams", Vec::new(), PagingGuard::new())
            .await
    }

    pub async fn list_users(&self, team_ids: &[String]) -> Result<Vec<User>> {
        self.list_all("ListUsers", "users", "users", team_query(team_ids), PagingGuard::new())
            .await
    }

    pub async fn list_services(&self, team_ids: &[String]) -> Result<Vec<Service>> {
        self.list_all(
            "ListServices",
            "services",
            "services",
            team_query(team_ids),
            PagingGuard::new(),
        )
        .await
    }

    pub async fn list_schedules(&self) -> Result<Vec<Schedule>> {
        self.list_all("ListSchedules", "schedules", "schedules", Vec::new(), PagingGuard::new())
            .await
    }

    /// Schedule detail with rendered layer and final entries for the window.
    pub async fn get_schedule(
        &self,
        schedule_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Schedule> {
        let query = vec![
            ("since".to_string(), format_time(since)),
            ("until".to_string(), format_time(until)),
        ];
        let response: ScheduleResponse = self
            .get("GetSchedule", &format!("schedules/{schedule_id}"), &query)
            .await?;
        Ok(response.schedule)
    }

    pub async fn list_overrides(
        &self,
        schedule_id: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Override>> {
        let query = vec![
            ("since".to_string(), format_time(since)),
            ("until".to_string(), format_time(until)),
        ];
        self.list_all(
            "ListOverrides",
            &format!("schedules/{schedule_id}/overrides"),
            "overrides",
            query,
            PagingGuard::new(),
        )
        .await
    }

    pub async fn list_maintenance_windows(&self, team_ids: &[String]) -> Result<Vec<MaintenanceWindow>> {
        self.list_all(
            "ListMaintenanceWindows",
            "maintenance_windows",
            "maintenance_windows",
            team_query(team_ids),
            PagingGuard::new(),
        )
        .await
    }

    pub async fn list_oncalls(&self) -> Result<Vec<OnCall>> {
        let query = vec![("earliest".to_string(), "true".to_string())];
        self.list_all("ListOnCalls", "oncalls", "oncalls", query, PagingGuard::new())
            .await
    }

    pub async fn list_incidents(&self, filter: &IncidentQuery, guard: PagingGuard) -> Result<Vec<Incident>> {
        let mut query = team_query(&filter.team_ids);
        for status in &filter.statuses {
            query.push(("statuses[]".to_string(), status.clone()));
        }
        if let Some(since) = filter.since {
            query.push(("since".to_string(), format_time(since)));
        }
        if let Some(until) = filter.until {
            query.push(("until".to_string(), format_time(until)));
        }

        self.list_all("ListIncidents", "incidents", "incidents", query, guard)
            .await
    }

    pub async fn list_licenses(&self) -> Result<Vec<License>> {
        let response: LicensesResponse = self.get("ListLicenses", "licenses", &[]).await?;
        Ok(response.licenses)
    }

    async fn list_all<T: DeserializeOwned>(
        &self,
        name: &'static str,
        path: &str,
        items_key: &str,
        query: Query,
        guard: PagingGuard,
    ) -> Result<Vec<T>> {
        fetch_all(guard, PAGE_SIZE, |offset, limit| {
            let mut page_query = query.clone();
            page_query.push(("offset".to_string(), offset.to_string()));
            page_query.push(("limit".to_string(), limit.to_string()));
            async move {
                debug!(request = name, offset, limit, "fetching PagerDuty page");
                self.list_page(name, path, items_key, &page_query).await
            }
        })
        .await
    }

    async fn list_page<T: DeserializeOwned>(
        &self,
        name: &'static str,
        path: &str,
        items_key: &str,
        query: &[(String, String)],
    ) -> Result<Page<T>> {
        let mut body: Map<String, Value> = self.get(name, path, query).await?;

        let items = match body.remove(items_key) {
            Some(Value::Null) | None => Vec::new(),
            Some(value) => serde_json::from_value(value).map_err(|err| PdexpError::decode(name, err))?,
        };
        let state = PagingState {
            offset: body.get("offset").and_then(Value::as_u64).unwrap_or_default(),
            limit: body.get("limit").and_then(Value::as_u64).unwrap_or_default(),
            more: body.get("more").and_then(Value::as_bool).unwrap_or_default(),
        };

        Ok(Page { items, state })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        name: &'static str,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = self
            .base_url
            .join(path)
            .map_err(|err| PdexpError::InvalidArgument(format!("invalid request path {path}: {err}")))?;

        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| PdexpError::InternalError("PagerDuty request limiter closed".to_string()))?;

        self.api_counter.inc(&labels! { "name" => name })?;
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|err| PdexpError::upstream(name, err))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PdexpError::UpstreamStatus {
                endpoint: name.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|err| PdexpError::decode(name, err))
    }
}

fn team_query(team_ids: &[String]) -> Query {
    team_ids
        .iter()
        .map(|team| ("team_ids[]".to_string(), team.clone()))
        .collect()
}

fn format_time(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{header, method, path, query_param},
    };

    use super::*;

    fn client(server: &MockServer, registry: &MetricsRegistry) -> PagerDutyClient {
        let config = ClientConfig {
            base_url: server.uri(),
            ..ClientConfig::new("secret")
        };
        PagerDutyClient::new(config, registry).unwrap()
    }

    #[tokio::test]
    async fn sends_auth_headers_and_walks_pages() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/teams"))
            .and(query_param("offset", "0"))
            .and(header("authorization", "Token token=secret"))
            .and(header("accept", ACCEPT_V2))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": [{ "id": "P1", "name": "Ops", "html_url": "https://x/teams/P1" }],
                "offset": 0, "limit": 100, "more": true
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/teams"))
            .and(query_param("offset", "100"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "teams": [{ "id": "P2", "name": "Dev", "html_url": null }],
                "offset": 100, "limit": 100, "more": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let teams = client(&server, &registry).list_teams().await.unwrap();

        let ids = teams.iter().map(|team| team.id.as_str()).collect::<Vec<_>>();
        assert_eq!(ids, vec!["P1", "P2"]);
        assert!(
            registry
                .render_prometheus()
                .contains("pagerduty_api_counter{name=\"ListTeams\"} 2")
        );
    }

    #[tokio::test]
    async fn error_status_is_reported_per_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/users"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let err = client(&server, &registry).list_users(&[]).await.unwrap_err();
        assert!(matches!(
            err,
            PdexpError::UpstreamStatus { ref endpoint, status: 429 } if endpoint == "ListUsers"
        ));
    }

    #[tokio::test]
    async fn malformed_body_is_a_decode_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/services"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "services": [{ "name": "missing id" }], "more": false
            })))
            .mount(&server)
            .await;

        let registry = MetricsRegistry::new();
        let err = client(&server, &registry)
            .list_services(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, PdexpError::Decode { .. }));
    }

    #[test]
    fn empty_token_is_rejected() {
        let registry = MetricsRegistry::new();
        assert!(PagerDutyClient::new(ClientConfig::new("  "), &registry).is_err());
    }
}
