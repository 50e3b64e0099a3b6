use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// 通知级别，按严重程度排序
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotifyLevel {
    /// 信息
    Info,
    /// 警告
    Warning,
    /// 错误
    Error,
    /// 严重
    Critical,
}

impl NotifyLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotifyLevel::Info => "info",
            NotifyLevel::Warning => "warning",
            NotifyLevel::Error => "error",
            NotifyLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for NotifyLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown notify level: {0}")]
pub struct ParseLevelError(pub String);

impl FromStr for NotifyLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "info" => Ok(NotifyLevel::Info),
            "warning" | "warn" => Ok(NotifyLevel::Warning),
            "error" => Ok(NotifyLevel::Error),
            "critical" => Ok(NotifyLevel::Critical),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// 通知渠道
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotifyChannel {
    /// 日志
    Log,
    /// Webhook
    Webhook,
}

/// 通知消息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifyMessage {
    /// 标题
    pub title: String,

    /// 内容
    pub content: String,

    /// 级别
    pub level: NotifyLevel,

    /// 时间
    pub timestamp: DateTime<Utc>,

    /// 额外数据
    pub metadata: Option<serde_json::Value>,
}

impl NotifyMessage {
    pub fn new(title: impl Into<String>, content: impl Into<String>, level: NotifyLevel) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            level,
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn info(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Info)
    }

    pub fn warning(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Warning)
    }

    pub fn error(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Error)
    }

    pub fn critical(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(title, content, NotifyLevel::Critical)
    }
}
