use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdexpError {
    #[error("upstream request {endpoint} failed: {message}")]
    Upstream { endpoint: String, message: String },
    #[error("upstream request {endpoint} returned status {status}")]
    UpstreamStatus { endpoint: String, status: u16 },
    #[error("failed to decode {endpoint} response: {message}")]
    Decode { endpoint: String, message: String },
    #[error("collector {collector} timed out after {after:?}")]
    Timeout { collector: String, after: Duration },
    #[error("collector {0} was cancelled")]
    Cancelled(String),
    #[error("collector {collector} panicked: {message}")]
    Panicked { collector: String, message: String },
    #[error("collector {collector} failed {failures} times in a row (threshold {threshold})")]
    ThresholdExceeded {
        collector: String,
        failures: u32,
        threshold: u32,
    },
    #[error("metric {metric} expects labels {expected:?}, got {actual:?}")]
    LabelMismatch {
        metric: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },
    #[error("metric {metric} is a {actual}, cannot apply {requested} observation")]
    KindMismatch {
        metric: String,
        actual: &'static str,
        requested: &'static str,
    },
    #[error("metric not registered: {0}")]
    UnknownMetric(String),
    #[error("metric already registered: {0}")]
    DuplicateMetric(String),
    #[error("collector already registered: {0}")]
    DuplicateCollector(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("internal error: {0}")]
    InternalError(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Failure classes that decide how far an error may travel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Contained at the collector boundary and counted.
    Transient,
    /// A collector ran out of consecutive failures; the process stops.
    Exhausted,
    /// Wiring or schema bug; fatal without retry.
    Programming,
}

impl PdexpError {
    pub fn upstream(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Upstream {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn decode(endpoint: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            message: err.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Upstream { .. }
            | Self::UpstreamStatus { .. }
            | Self::Decode { .. }
            | Self::Timeout { .. }
            | Self::Cancelled(_)
            | Self::Panicked { .. }
            | Self::InternalError(_)
            | Self::Io(_) => ErrorCategory::Transient,
            Self::ThresholdExceeded { .. } => ErrorCategory::Exhausted,
            Self::LabelMismatch { .. }
            | Self::KindMismatch { .. }
            | Self::UnknownMetric(_)
            | Self::DuplicateMetric(_)
            | Self::DuplicateCollector(_)
            | Self::InvalidArgument(_) => ErrorCategory::Programming,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.category() != ErrorCategory::Transient
    }
}

pub type Result<T> = std::result::Result<T, PdexpError>;
