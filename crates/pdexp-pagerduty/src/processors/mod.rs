//! One processor per PagerDuty resource family.

pub mod incident;
pub mod maintenance_window;
pub mod oncall;
pub mod schedule;
pub mod service;
pub mod summary;
pub mod system;
pub mod team;
pub mod user;

pub use incident::{INCIDENT_INFO, INCIDENT_STATUS, IncidentProcessor, IncidentSettings, expand_statuses};
pub use maintenance_window::{MAINTENANCE_WINDOW_INFO, MAINTENANCE_WINDOW_STATUS, MaintenanceWindowProcessor};
pub use oncall::{OnCallProcessor, SCHEDULE_ONCALL};
pub use schedule::{ScheduleProcessor, ScheduleSettings};
pub use service::{SERVICE_INFO, ServiceProcessor};
pub use summary::{RESOLVE_BUCKETS, SummaryProcessor, SummarySettings};
pub use system::SystemProcessor;
pub use team::{TEAM_INFO, TeamProcessor};
pub use user::{USER_INFO, UserProcessor};
