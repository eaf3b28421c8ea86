pub mod channels;
pub mod global;
pub mod loader;
pub mod pipeline;

pub use channels::{AnalystConfig, ChatConfig, CollectorConfig, MailConfig, PushConfig};
pub use global::{LoggingConfig, SentinelConfig, ServerConfig, StorageConfig};
pub use loader::ConfigLoader;
pub use pipeline::{
    ChangeThreshold, DedupConfig, DeliveryConfig, DetectorConfig, DominanceBounds, FlowThreshold,
    RatioBands, RetryConfig, SchedulerConfig,
};
