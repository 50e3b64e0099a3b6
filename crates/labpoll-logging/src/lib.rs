//! tracing 订阅器初始化

use labpoll_config::LoggingConfig;
use thiserror::Error;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter {directives:?}: {reason}")]
    InvalidFilter { directives: String, reason: String },

    #[error("Failed to install global subscriber: {0}")]
    AlreadyInitialized(String),
}

/// 解析过滤指令
pub fn parse_filter(directives: &str) -> Result<EnvFilter, LoggingError> {
    EnvFilter::try_new(directives).map_err(|e| LoggingError::InvalidFilter {
        directives: directives.to_string(),
        reason: e.to_string(),
    })
}

/// 过滤器：`RUST_LOG` 优先，否则使用配置中的级别
pub fn build_filter(config: &LoggingConfig) -> Result<EnvFilter, LoggingError> {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => parse_filter(&directives),
        _ => parse_filter(&config.level),
    }
}

/// 安装全局 fmt 订阅器（文本或 JSON）
///
/// 进程内只能成功一次，重复调用返回 `AlreadyInitialized`
pub fn init_logging(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    let installed = if config.json {
        builder.json().flatten_event(true).try_init()
    } else {
        builder.try_init()
    };

    installed.map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(level = %config.level, json = config.json, "Logging initialized");
    Ok(())
}
