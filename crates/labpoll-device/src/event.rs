use crate::state::PollerStatus;
use chrono::{DateTime, Utc};
use labpoll_store::BatchReport;
use labpoll_types::{DeviceAddress, FieldValue, Measurement, MeasurementStatus, Reading};

/// 与测量类型无关的记录摘要，供显示层使用
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSummary {
    pub timestamp: DateTime<Utc>,
    pub status: MeasurementStatus,
    /// `(字段名, 值)`，顺序与字段描述表一致
    pub fields: Vec<(&'static str, FieldValue)>,
}

impl RecordSummary {
    pub fn of<R: Reading>(measurement: &Measurement<R>) -> Self {
        Self {
            timestamp: measurement.timestamp,
            status: measurement.status,
            fields: R::fields()
                .iter()
                .map(|field| (field.name, (field.get)(&measurement.reading)))
                .collect(),
        }
    }
}

/// 采集器事件
#[derive(Debug, Clone)]
pub enum PollerEvent {
    /// 状态变化
    StatusChanged {
        device: DeviceAddress,
        from: PollerStatus,
        to: PollerStatus,
        retry_count: u32,
    },
    /// 新记录已写入缓冲区
    MeasurementAdded {
        device: DeviceAddress,
        record: RecordSummary,
        retry_count: u32,
    },
    /// 显示窗口变化
    BufferChanged {
        device: DeviceAddress,
        size: usize,
        evicted: Option<DateTime<Utc>>,
    },
    /// 设备故障周期开始
    DeviceFault {
        device: DeviceAddress,
        timestamp: DateTime<Utc>,
    },
    /// 落库完成（可能含单行失败）
    FlushCompleted {
        device: DeviceAddress,
        report: BatchReport,
    },
    /// 落库事务失败，记录进入重试队列
    FlushFailed {
        device: DeviceAddress,
        pending: usize,
        error: String,
    },
}

impl PollerEvent {
    pub fn device(&self) -> DeviceAddress {
        match self {
            PollerEvent::StatusChanged { device, .. }
            | PollerEvent::MeasurementAdded { device, .. }
            | PollerEvent::BufferChanged { device, .. }
            | PollerEvent::DeviceFault { device, .. }
            | PollerEvent::FlushCompleted { device, .. }
            | PollerEvent::FlushFailed { device, .. } => *device,
        }
    }
}
