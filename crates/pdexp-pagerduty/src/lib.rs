//! PagerDuty REST client and the processors that turn its resources into
//! metrics.

pub mod client;
pub mod models;
pub mod processors;

pub use client::{ClientConfig, IncidentQuery, PagerDutyClient};
