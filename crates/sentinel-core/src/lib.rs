pub mod error;
pub mod policy;
pub mod retry;
pub mod sink;

pub use error::{Result, SentinelError};
pub use policy::StoreFailPolicy;
pub use retry::RetryPolicy;
pub use sink::AlertSink;
