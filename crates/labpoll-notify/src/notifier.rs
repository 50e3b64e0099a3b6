use crate::message::NotifyMessage;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;

/// 单次投递的结果
///
/// 传输层错误走 `Err`，这里只区分对端是否接受
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotifyResult {
    Delivered,
    Rejected { reason: String },
}

impl NotifyResult {
    pub fn success() -> Self {
        NotifyResult::Delivered
    }

    pub fn failure(reason: impl Into<String>) -> Self {
        NotifyResult::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_delivered(&self) -> bool {
        matches!(self, NotifyResult::Delivered)
    }
}

impl fmt::Display for NotifyResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyResult::Delivered => f.write_str("delivered"),
            NotifyResult::Rejected { reason } => write!(f, "rejected: {reason}"),
        }
    }
}

/// 通知渠道的实现
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, message: &NotifyMessage) -> Result<NotifyResult>;

    fn name(&self) -> &str;

    /// 未配置完整的渠道返回 `false`，管理器直接跳过
    fn is_enabled(&self) -> bool {
        true
    }
}
