use labpoll_types::FieldError;
use thiserror::Error;

/// 表结构配置错误
///
/// 启动时对单个测量类型致命，不会在运行期出现
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Measurement type {0} declares no fields")]
    NoFields(String),

    #[error("Invalid column name: {0:?}")]
    InvalidName(String),

    #[error("Duplicate column name: {0}")]
    DuplicateName(String),

    #[error("Column name {0} collides with a fixed column")]
    ReservedName(String),
}

/// 存储错误类型
#[derive(Error, Debug)]
pub enum StoreError {
    /// 表结构配置错误
    #[error("Schema configuration error: {0}")]
    Schema(#[from] SchemaError),

    /// 事务开启或提交失败，整批视为未落库
    #[error("Transaction failed: {0}")]
    Transaction(sea_orm::DbErr),

    /// 数据库错误
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// 行解码错误
    #[error("Row decode error: {0}")]
    Decode(#[from] FieldError),

    /// 存储的错误标志位非法
    #[error("Row at {0} has both error flags set")]
    InvalidFlags(String),
}

pub type Result<T> = std::result::Result<T, StoreError>;
