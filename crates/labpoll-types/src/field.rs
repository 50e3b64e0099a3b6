//! 测量类型的字段描述
//!
//! 每种测量类型在编译期给出一份字段描述表（名称、种类、读写函数），
//! 存储层据此推导表结构并绑定参数，不依赖运行时反射。

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use std::fmt;
use thiserror::Error;

/// 时间戳持久化格式（毫秒精度 ISO-8601，UTC）
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3f";

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.format(TIMESTAMP_FORMAT).to_string()
}

pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>, FieldError> {
    NaiveDateTime::parse_from_str(text, TIMESTAMP_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| FieldError::InvalidTimestamp(text.to_string()))
}

/// 字段值转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldError {
    #[error("Expected {expected} value, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("Integer value {0} out of range for field")]
    OutOfRange(i64),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Expected {expected} field values, found {found}")]
    Arity { expected: usize, found: usize },
}

/// 字段的基础种类
///
/// 存储层对该枚举做穷尽匹配，新增种类而未映射存储类型会在编译期报错
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    Text,
    Char,
    Uuid,
    Decimal,
    Date,
    Time,
    DateTime,
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    F32,
    F64,
    Bytes,
}

/// 字段值
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

impl FieldValue {
    pub fn type_name(&self) -> &'static str {
        match self {
            FieldValue::Null => "null",
            FieldValue::Bool(_) => "bool",
            FieldValue::Integer(_) => "integer",
            FieldValue::Real(_) => "real",
            FieldValue::Text(_) => "text",
            FieldValue::Blob(_) => "blob",
            FieldValue::Timestamp(_) => "timestamp",
        }
    }

    fn mismatch(&self, expected: &'static str) -> FieldError {
        FieldError::TypeMismatch {
            expected,
            found: self.type_name(),
        }
    }

    /// 布尔值；存储中的 0/1 整数同样接受
    pub fn as_bool(&self) -> Result<bool, FieldError> {
        match self {
            FieldValue::Bool(b) => Ok(*b),
            FieldValue::Integer(0) => Ok(false),
            FieldValue::Integer(1) => Ok(true),
            FieldValue::Integer(v) => Err(FieldError::OutOfRange(*v)),
            other => Err(other.mismatch("bool")),
        }
    }

    pub fn as_i64(&self) -> Result<i64, FieldError> {
        match self {
            FieldValue::Integer(v) => Ok(*v),
            FieldValue::Bool(b) => Ok(i64::from(*b)),
            other => Err(other.mismatch("integer")),
        }
    }

    /// 整数并收窄到目标宽度
    pub fn as_int<T: TryFrom<i64>>(&self) -> Result<T, FieldError> {
        let value = self.as_i64()?;
        T::try_from(value).map_err(|_| FieldError::OutOfRange(value))
    }

    pub fn as_f64(&self) -> Result<f64, FieldError> {
        match self {
            FieldValue::Real(v) => Ok(*v),
            FieldValue::Integer(v) => Ok(*v as f64),
            other => Err(other.mismatch("real")),
        }
    }

    pub fn as_text(&self) -> Result<&str, FieldError> {
        match self {
            FieldValue::Text(s) => Ok(s),
            other => Err(other.mismatch("text")),
        }
    }

    pub fn as_timestamp(&self) -> Result<DateTime<Utc>, FieldError> {
        match self {
            FieldValue::Timestamp(ts) => Ok(*ts),
            FieldValue::Text(s) => parse_timestamp(s),
            other => Err(other.mismatch("timestamp")),
        }
    }
}

/// 单个字段的描述：名称、种类与读写函数
pub struct FieldDescriptor<R: 'static> {
    /// 列名（snake_case）
    pub name: &'static str,
    pub kind: FieldKind,
    pub get: fn(&R) -> FieldValue,
    pub set: fn(&mut R, FieldValue) -> Result<(), FieldError>,
}

impl<R> fmt::Debug for FieldDescriptor<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .finish()
    }
}

/// 设备特有的测量读数
///
/// 时间戳与错误标志由 [`crate::Measurement`] 统一携带，这里只描述设备字段
pub trait Reading: Clone + Default + PartialEq + fmt::Debug + Send + Sync + 'static {
    /// 测量类型名，表名由它推导
    const TYPE_NAME: &'static str;

    /// 字段描述表
    fn fields() -> &'static [FieldDescriptor<Self>];

    /// 按描述表顺序取出全部字段值
    fn values(&self) -> Vec<FieldValue> {
        Self::fields().iter().map(|field| (field.get)(self)).collect()
    }

    /// 按描述表顺序还原读数
    fn from_values(values: Vec<FieldValue>) -> Result<Self, FieldError> {
        let fields = Self::fields();
        if values.len() != fields.len() {
            return Err(FieldError::Arity {
                expected: fields.len(),
                found: values.len(),
            });
        }

        let mut reading = Self::default();
        for (field, value) in fields.iter().zip(values) {
            (field.set)(&mut reading, value)?;
        }
        Ok(reading)
    }
}
