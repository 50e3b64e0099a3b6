use crate::field::Reading;
use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

/// 测量结果分类
///
/// 设备错误与网络错误互斥，由枚举本身保证
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementStatus {
    /// 正常
    Success,
    /// 设备在响应中自报故障
    DeviceError,
    /// 传输失败（超时、拒绝连接、响应缺失或格式错误）
    NetworkError,
}

impl MeasurementStatus {
    /// 从持久化的两个标志位还原；两者同时为真视为非法
    pub fn from_flags(device_error: bool, network_error: bool) -> Option<Self> {
        match (device_error, network_error) {
            (false, false) => Some(MeasurementStatus::Success),
            (true, false) => Some(MeasurementStatus::DeviceError),
            (false, true) => Some(MeasurementStatus::NetworkError),
            (true, true) => None,
        }
    }
}

/// 一条不可变的测量记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement<R> {
    pub timestamp: DateTime<Utc>,
    pub status: MeasurementStatus,
    pub reading: R,
}

impl<R: Reading> Measurement<R> {
    pub fn new(timestamp: DateTime<Utc>, status: MeasurementStatus, reading: R) -> Self {
        Self {
            timestamp,
            status,
            reading,
        }
    }

    pub fn success(timestamp: DateTime<Utc>, reading: R) -> Self {
        Self::new(timestamp, MeasurementStatus::Success, reading)
    }

    pub fn device_fault(timestamp: DateTime<Utc>, reading: R) -> Self {
        Self::new(timestamp, MeasurementStatus::DeviceError, reading)
    }

    /// 网络错误记录不带设备数据，读数取默认值
    pub fn network_failure(timestamp: DateTime<Utc>) -> Self {
        Self::new(timestamp, MeasurementStatus::NetworkError, R::default())
    }

    pub fn device_error(&self) -> bool {
        self.status == MeasurementStatus::DeviceError
    }

    pub fn network_error(&self) -> bool {
        self.status == MeasurementStatus::NetworkError
    }

    pub fn is_success(&self) -> bool {
        self.status == MeasurementStatus::Success
    }
}

/// 当前时间，截断到持久化精度（毫秒）
pub fn timestamp_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SmartProReading;
    use chrono::Timelike;

    #[test]
    fn test_flags_are_exclusive() {
        let ts = timestamp_now();
        let ok = Measurement::success(ts, SmartProReading::new(true, 2150));
        assert!(ok.is_success() && !ok.device_error() && !ok.network_error());

        let fault = Measurement::device_fault(ts, SmartProReading::new(true, 0));
        assert!(fault.device_error() && !fault.network_error());

        let lost: Measurement<SmartProReading> = Measurement::network_failure(ts);
        assert!(lost.network_error() && !lost.device_error());
        assert_eq!(lost.reading, SmartProReading::default());
    }

    #[test]
    fn test_from_flags() {
        assert_eq!(MeasurementStatus::from_flags(false, false), Some(MeasurementStatus::Success));
        assert_eq!(MeasurementStatus::from_flags(true, false), Some(MeasurementStatus::DeviceError));
        assert_eq!(MeasurementStatus::from_flags(false, true), Some(MeasurementStatus::NetworkError));
        assert_eq!(MeasurementStatus::from_flags(true, true), None);
    }

    #[test]
    fn test_timestamp_now_truncated() {
        assert_eq!(timestamp_now().nanosecond() % 1_000_000, 0);
    }
}
