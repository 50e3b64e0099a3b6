use thiserror::Error;

/// 核心库错误类型
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// 缓冲区容量必须大于 0
    #[error("Invalid buffer capacity: {0}")]
    InvalidCapacity(usize),
}

/// Result 类型别名
pub type Result<T> = std::result::Result<T, CoreError>;
