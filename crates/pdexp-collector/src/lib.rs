pub mod collector;
pub mod emitter;
pub mod exporter;
pub mod paging;
pub mod processor;
pub mod sinks;
pub mod stats;

pub use collector::{Collector, CollectorDescriptor, CollectorOptions, CollectorState};
pub use emitter::Emitter;
pub use exporter::{CollectorDirectory, Exporter};
pub use paging::{CEILING, Page, PagingGuard, PagingState, fetch_all, should_stop};
pub use processor::{CollectContext, Processor};
pub use sinks::{ResetGroup, Sink, SinkRegistrar, SinkSet};
pub use stats::StatsProcessor;
