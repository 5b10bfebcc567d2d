use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pdexp_common::error::Result;
use tokio_util::sync::CancellationToken;

use crate::{emitter::Emitter, sinks::SinkRegistrar};

/// Per-cycle information handed to a processor.
#[derive(Debug, Clone)]
pub struct CollectContext {
    pub collector: String,
    pub cancel: CancellationToken,
    /// Start of the previous successful pass, if any.
    pub last_success: Option<DateTime<Utc>>,
}

/// Domain unit driven by a collector.
///
/// `collect` only produces observations; the collector applies them after it
/// returns `Ok`, surrounded by `reset`, while holding the publish lock.
#[async_trait]
pub trait Processor: Send + Sync {
    /// Registers the sinks this processor publishes into.
    fn setup(&mut self, registrar: &mut SinkRegistrar<'_>) -> Result<()>;

    /// Clears sinks that describe currently known entities. Cumulative
    /// counters are left alone.
    fn reset(&self);

    /// Fetches one full pass. Sub-tasks must be joined before returning.
    async fn collect(&self, ctx: &CollectContext, emitter: Emitter) -> Result<()>;
}
