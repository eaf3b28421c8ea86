use serde::{Deserialize, Serialize};

/// 告警日志不可用时的统一处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreFailPolicy {
    /// 照常发出告警（不落库）
    #[default]
    Emit,
    /// 丢弃告警
    Suppress,
}

impl StoreFailPolicy {
    pub fn emits(&self) -> bool {
        matches!(self, StoreFailPolicy::Emit)
    }
}
