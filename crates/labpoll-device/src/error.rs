use labpoll_types::DeviceAddress;
use thiserror::Error;

/// 设备管理错误类型
#[derive(Error, Debug)]
pub enum DeviceError {
    /// 设备未找到
    #[error("Device not found: {0}")]
    NotFound(DeviceAddress),

    /// 设备已存在
    #[error("Device already exists: {0}")]
    AlreadyExists(DeviceAddress),

    /// 持久化的设备记录无效
    #[error("Invalid device record: {0}")]
    InvalidRecord(String),

    /// 数据库错误
    #[error("Database error: {0}")]
    DatabaseError(#[from] sea_orm::DbErr),

    /// 存储错误
    #[error("Store error: {0}")]
    StoreError(#[from] labpoll_store::StoreError),

    /// 缓冲区配置错误
    #[error("Buffer error: {0}")]
    BufferError(#[from] labpoll_core::CoreError),

    /// HTTP 客户端错误
    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// 其他错误
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// 设备管理结果类型
pub type Result<T> = std::result::Result<T, DeviceError>;

impl DeviceError {
    pub fn invalid_record(msg: impl Into<String>) -> Self {
        DeviceError::InvalidRecord(msg.into())
    }
}
