pub mod aggregator;
pub mod builder;
pub mod config;
pub mod delivery;
pub mod error;
pub mod fetcher;
pub mod pipeline;
pub mod traits;
pub mod types;
pub mod webhook;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use aggregator::{aggregate, EngagementAggregator};
pub use builder::{coerce_numeric, EventBuilder, EventName, FieldValue, OutboundEvent};
pub use config::Config;
pub use delivery::{DeliveryOutcome, DeliveryReport, DeliveryWorker, PacingPolicy};
pub use error::SyncError;
pub use fetcher::ReportFetcher;
pub use pipeline::{PipelineSettings, SyncOutcome, SyncPipeline, SyncStatus};
pub use traits::{EventSink, ReportSource};
pub use types::*;
pub use webhook::{WebhookEvent, WebhookKind};
