//! 测量数据持久化
//!
//! - 按字段描述表推导每种测量类型的表结构
//! - 单事务批量写入落库切片
//! - 设备表 DDL

pub mod db;
pub mod error;
pub mod schema;
pub mod writer;

pub use db::{connect, create_devices_table, DEVICES_TABLE};
pub use error::{Result, SchemaError, StoreError};
pub use schema::{table_name_for, ColumnDef, ColumnType, TableSchema, FIXED_COLUMNS};
pub use writer::{BatchReport, MeasurementSink, StoreWriter};
