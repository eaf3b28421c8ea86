pub mod alert;
pub mod release;
pub mod snapshot;
pub mod subscriber;

pub use alert::{Alert, AlertOrigin, AlertType, DedupKey, Severity};
pub use release::{Impact, ReleaseFlag, ReleaseKind, ReleasePhase, ScheduledRelease};
pub use snapshot::MetricSnapshot;
pub use subscriber::{Channel, NotificationJob, PlanTier, PushEndpoint, Subscriber};
