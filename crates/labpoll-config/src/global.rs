use anyhow::{anyhow, Result};
use labpoll_notify::NotifyLevel;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 全局配置
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct GlobalConfig {
    pub system: SystemConfig,
    pub store: StoreConfig,
    pub polling: PollingConfig,
    pub logging: LoggingConfig,
    pub notify: NotifyConfig,
}

/// 系统配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub name: String,
    pub version: String,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            name: "LabPoll Acquisition".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite://labpoll.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

/// 采集配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    /// 每台设备的缓冲区容量，同时也是落库批量大小
    pub buffer_capacity: usize,
    /// 网络错误后的退避周期（秒）
    pub backoff_interval_secs: u64,
    /// 连续网络错误达到该次数后中止采集
    pub max_retries: u32,
    /// 单次请求超时（秒）
    pub request_timeout_secs: u64,
    /// 落库失败后暂存待重试记录的上限
    pub retry_queue_limit: usize,
    /// 启动后自动开始采集所有设备
    pub autostart: bool,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 60,
            backoff_interval_secs: 5,
            max_retries: 5,
            request_timeout_secs: 3,
            retry_queue_limit: 600,
            autostart: false,
        }
    }
}

impl PollingConfig {
    pub fn backoff_interval(&self) -> Duration {
        Duration::from_secs(self.backoff_interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 过滤指令，例如 `info` 或 `labpoll_device=debug,info`
    pub level: String,
    /// 输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// 通知配置
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NotifyConfig {
    pub min_level: NotifyLevel,
    pub webhook_url: Option<String>,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            min_level: NotifyLevel::Warning,
            webhook_url: None,
        }
    }
}

impl GlobalConfig {
    /// 校验配置取值
    pub fn validate(&self) -> Result<()> {
        if self.store.database_url.trim().is_empty() {
            return Err(anyhow!("store.database_url must not be empty"));
        }

        if self.store.max_connections == 0 {
            return Err(anyhow!("store.max_connections must be greater than 0"));
        }

        if self.polling.buffer_capacity == 0 {
            return Err(anyhow!("polling.buffer_capacity must be greater than 0"));
        }

        if self.polling.max_retries == 0 {
            return Err(anyhow!("polling.max_retries must be greater than 0"));
        }

        if self.polling.backoff_interval_secs == 0 {
            return Err(anyhow!("polling.backoff_interval_secs must be greater than 0"));
        }

        if self.polling.request_timeout_secs == 0 {
            return Err(anyhow!("polling.request_timeout_secs must be greater than 0"));
        }

        if matches!(&self.notify.webhook_url, Some(url) if url.trim().is_empty()) {
            return Err(anyhow!("notify.webhook_url must not be empty when set"));
        }

        Ok(())
    }

    /// 序列化为 TOML，用于生成示例配置
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
