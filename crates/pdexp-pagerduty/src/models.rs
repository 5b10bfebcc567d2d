//! Subset of the PagerDuty REST v2 resources the exporter reads.
//!
//! PagerDuty sends `null` for many optional strings, so those fields go
//! through [`nullable`] and fall back to their default.

use serde::{Deserialize, Deserializer};

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Reference {
    #[serde(default)]
    pub id: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Team {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub html_url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct User {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub email: String,
    #[serde(default, deserialize_with = "nullable")]
    pub avatar_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub color: String,
    #[serde(default, deserialize_with = "nullable")]
    pub job_title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub role: String,
    #[serde(default, deserialize_with = "nullable")]
    pub time_zone: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Service {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub html_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub teams: Vec<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Schedule {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub time_zone: String,
    #[serde(default, deserialize_with = "nullable")]
    pub schedule_layers: Vec<ScheduleLayer>,
    #[serde(default, deserialize_with = "nullable")]
    pub final_schedule: RenderedSchedule,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleLayer {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub rendered_schedule_entries: Vec<ScheduleEntry>,
    #[serde(default, deserialize_with = "nullable")]
    pub rendered_coverage_percentage: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderedSchedule {
    #[serde(default, deserialize_with = "nullable")]
    pub rendered_schedule_entries: Vec<ScheduleEntry>,
    #[serde(default, deserialize_with = "nullable")]
    pub rendered_coverage_percentage: f64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleEntry {
    #[serde(default, deserialize_with = "nullable")]
    pub start: String,
    #[serde(default, deserialize_with = "nullable")]
    pub end: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user: Reference,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Override {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub start: String,
    #[serde(default, deserialize_with = "nullable")]
    pub end: String,
    #[serde(default, deserialize_with = "nullable")]
    pub user: Reference,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MaintenanceWindow {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub start_time: String,
    #[serde(default, deserialize_with = "nullable")]
    pub end_time: String,
    #[serde(default, deserialize_with = "nullable")]
    pub services: Vec<Reference>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnCall {
    #[serde(default, deserialize_with = "nullable")]
    pub schedule: Reference,
    #[serde(default, deserialize_with = "nullable")]
    pub user: Reference,
    #[serde(default, deserialize_with = "nullable")]
    pub escalation_level: u64,
    /// `null` for permanent on-call assignments.
    #[serde(default, deserialize_with = "nullable")]
    pub start: String,
    #[serde(default, deserialize_with = "nullable")]
    pub end: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Incident {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub incident_number: u64,
    #[serde(default, deserialize_with = "nullable")]
    pub title: String,
    #[serde(default, deserialize_with = "nullable")]
    pub html_url: String,
    #[serde(default, deserialize_with = "nullable")]
    pub status: String,
    #[serde(default, deserialize_with = "nullable")]
    pub urgency: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub created_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub last_status_change_at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub last_status_change_by: Reference,
    #[serde(default, deserialize_with = "nullable")]
    pub service: Reference,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default, deserialize_with = "nullable")]
    pub acknowledgements: Vec<Acknowledgement>,
    #[serde(default, deserialize_with = "nullable")]
    pub assignments: Vec<Assignment>,
}

impl Incident {
    pub fn priority_name(&self) -> &str {
        self.priority
            .as_ref()
            .map(|priority| priority.name.as_str())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Priority {
    #[serde(default)]
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Acknowledgement {
    #[serde(default, deserialize_with = "nullable")]
    pub at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub acknowledger: Reference,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Assignment {
    #[serde(default, deserialize_with = "nullable")]
    pub at: String,
    #[serde(default, deserialize_with = "nullable")]
    pub assignee: Reference,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct License {
    pub id: String,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub kind: String,
    #[serde(default, deserialize_with = "nullable")]
    pub current_value: f64,
    #[serde(default, deserialize_with = "nullable")]
    pub allocations_available: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScheduleResponse {
    pub schedule: Schedule,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct LicensesResponse {
    #[serde(default, deserialize_with = "nullable")]
    pub licenses: Vec<License>,
}
