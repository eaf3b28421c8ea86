pub mod calendar;
pub mod collaborator;
pub mod scheduler;
pub mod store;
pub mod triggers;

pub use calendar::{eastern_offset, CalendarBuilder, CalendarEntry, CalendarFile};
pub use collaborator::{Opinion, ReleaseAnalyst, SnapshotCollector, Stance};
pub use scheduler::{FiredTrigger, ReleaseScheduler, TickOutcome};
pub use store::{CalendarStore, JsonCalendarStore, MemoryCalendarStore};
pub use triggers::due_flags;
