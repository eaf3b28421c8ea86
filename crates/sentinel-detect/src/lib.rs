pub mod detector;
pub mod rules;

pub use detector::ThresholdDetector;
pub use rules::{ChangeRule, DominanceRule, FlowRule, RatioBandRule, SnapshotRule};
