pub mod dedup;
pub mod jsonl;
pub mod store;

pub use dedup::Deduplicator;
pub use jsonl::JsonlAlertLog;
pub use store::{AlertLog, AlertRecord, MemoryAlertLog};
