use crate::error::{Result, StoreError};
use crate::schema::{ColumnType, TableSchema};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use labpoll_types::{format_timestamp, DeviceAddress, FieldValue, Measurement, MeasurementStatus, Reading};
use sea_orm::{ConnectionTrait, DatabaseConnection, QueryResult, Statement, TransactionTrait, Value};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info};

/// 一次批量写入的结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// 成功写入的行数
    pub written: usize,
    /// 写入失败的行数
    pub failed: usize,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.written + self.failed
    }

    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// 测量数据落库接口
#[async_trait]
pub trait MeasurementSink<R: Reading>: Send + Sync {
    /// 在单个事务中写入一个落库切片
    ///
    /// 单行失败只记日志并计数；事务开启或提交失败返回 [`StoreError::Transaction`]
    async fn write_batch(&self, device: &DeviceAddress, batch: &[Measurement<R>]) -> Result<BatchReport>;
}

/// 基于 sea-orm 的测量写入器
///
/// 表结构与 INSERT 语句在构造时推导一次
pub struct StoreWriter<R> {
    db: Arc<DatabaseConnection>,
    schema: TableSchema,
    insert_sql: String,
    _reading: PhantomData<fn() -> R>,
}

impl<R: Reading> StoreWriter<R> {
    /// 创建写入器
    ///
    /// # 错误
    /// * `Schema` - 字段描述表有缺陷，该测量类型不可用
    pub fn new(db: Arc<DatabaseConnection>) -> Result<Self> {
        let schema = TableSchema::derive::<R>()?;
        let insert_sql = schema.insert_sql();

        debug!(
            table = %schema.table,
            columns = schema.columns.len(),
            "Measurement schema derived"
        );

        Ok(Self {
            db,
            schema,
            insert_sql,
            _reading: PhantomData,
        })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// 创建测量表（幂等），设备表需已存在
    pub async fn ensure_table(&self) -> Result<()> {
        self.db
            .execute(Statement::from_string(
                self.db.get_database_backend(),
                self.schema.create_table_sql(),
            ))
            .await?;

        info!(table = %self.schema.table, "Measurement table ready");
        Ok(())
    }

    fn row_values(device: &DeviceAddress, measurement: &Measurement<R>) -> Vec<Value> {
        let mut values: Vec<Value> = measurement
            .reading
            .values()
            .into_iter()
            .map(bind_value)
            .collect();

        values.push(format_timestamp(&measurement.timestamp).into());
        values.push(i64::from(measurement.device_error()).into());
        values.push(i64::from(measurement.network_error()).into());
        values.push(device.ip.to_string().into());
        values.push(i64::from(device.port).into());
        values
    }

    /// 读取设备在 `[from, to]` 区间内的记录，按时间排序
    pub async fn read_range(
        &self,
        device: &DeviceAddress,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Measurement<R>>> {
        let stmt = Statement::from_sql_and_values(
            self.db.get_database_backend(),
            self.schema.select_range_sql().as_str(),
            vec![
                device.ip.to_string().into(),
                i64::from(device.port).into(),
                format_timestamp(&from).into(),
                format_timestamp(&to).into(),
            ],
        );

        let rows = self.db.query_all(stmt).await?;
        let mut measurements = Vec::with_capacity(rows.len());
        for row in rows {
            measurements.push(self.decode_row(&row)?);
        }

        debug!(
            device = %device,
            table = %self.schema.table,
            count = measurements.len(),
            "Measurements read from store"
        );

        Ok(measurements)
    }

    fn decode_row(&self, row: &QueryResult) -> Result<Measurement<R>> {
        let mut values = Vec::with_capacity(self.schema.columns.len());
        for column in &self.schema.columns {
            let name = column.name.as_str();
            let value = match column.column_type {
                ColumnType::Text => row
                    .try_get::<Option<String>>("", name)?
                    .map_or(FieldValue::Null, FieldValue::Text),
                ColumnType::Integer => row
                    .try_get::<Option<i64>>("", name)?
                    .map_or(FieldValue::Null, FieldValue::Integer),
                ColumnType::Real => row
                    .try_get::<Option<f64>>("", name)?
                    .map_or(FieldValue::Null, FieldValue::Real),
                ColumnType::Blob => row
                    .try_get::<Option<Vec<u8>>>("", name)?
                    .map_or(FieldValue::Null, FieldValue::Blob),
            };
            values.push(value);
        }

        let timestamp_text: String = row.try_get("", "timestamp")?;
        let timestamp = FieldValue::Text(timestamp_text.clone()).as_timestamp()?;
        let device_error: i64 = row.try_get("", "error")?;
        let network_error: i64 = row.try_get("", "network_error")?;
        let status = MeasurementStatus::from_flags(device_error != 0, network_error != 0)
            .ok_or(StoreError::InvalidFlags(timestamp_text))?;

        Ok(Measurement::new(timestamp, status, R::from_values(values)?))
    }
}

#[async_trait]
impl<R: Reading> MeasurementSink<R> for StoreWriter<R> {
    async fn write_batch(&self, device: &DeviceAddress, batch: &[Measurement<R>]) -> Result<BatchReport> {
        let mut report = BatchReport::default();
        if batch.is_empty() {
            return Ok(report);
        }

        let txn = self.db.begin().await.map_err(StoreError::Transaction)?;
        let backend = txn.get_database_backend();

        for measurement in batch {
            let stmt = Statement::from_sql_and_values(
                backend,
                self.insert_sql.as_str(),
                Self::row_values(device, measurement),
            );

            match txn.execute(stmt).await {
                Ok(_) => report.written += 1,
                Err(e) => {
                    report.failed += 1;
                    error!(
                        device = %device,
                        table = %self.schema.table,
                        timestamp = %format_timestamp(&measurement.timestamp),
                        error = %e,
                        "Failed to persist measurement row"
                    );
                }
            }
        }

        txn.commit().await.map_err(StoreError::Transaction)?;

        debug!(
            device = %device,
            table = %self.schema.table,
            written = report.written,
            failed = report.failed,
            "Measurement batch committed"
        );

        Ok(report)
    }
}

/// 字段值到 SQL 参数；布尔存 0/1，时间戳存固定格式文本
fn bind_value(value: FieldValue) -> Value {
    match value {
        FieldValue::Null => Value::String(None),
        FieldValue::Bool(b) => i64::from(b).into(),
        FieldValue::Integer(v) => v.into(),
        FieldValue::Real(v) => v.into(),
        FieldValue::Text(s) => s.into(),
        FieldValue::Blob(bytes) => bytes.into(),
        FieldValue::Timestamp(ts) => format_timestamp(&ts).into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_value_mapping() {
        assert_eq!(bind_value(FieldValue::Bool(true)), Value::BigInt(Some(1)));
        assert_eq!(bind_value(FieldValue::Bool(false)), Value::BigInt(Some(0)));
        assert_eq!(bind_value(FieldValue::Integer(-5)), Value::BigInt(Some(-5)));
        assert_eq!(
            bind_value(FieldValue::Text("x".into())),
            Value::String(Some(Box::new("x".into())))
        );
        assert_eq!(bind_value(FieldValue::Null), Value::String(None));
    }

    #[test]
    fn test_report_totals() {
        let report = BatchReport {
            written: 3,
            failed: 1,
        };
        assert_eq!(report.total(), 4);
        assert!(!report.is_complete());
        assert!(BatchReport::default().is_complete());
    }
}
