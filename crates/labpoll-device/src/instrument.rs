//! 设备种类的接口与报文解码

use labpoll_types::{DeviceKind, ExampleReading, Reading, SmartProReading};
use serde::Deserialize;

/// 解码后的设备响应
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<R> {
    pub reading: R,
    /// 设备在报文中自报的故障标志
    pub device_fault: bool,
}

impl<R> Decoded<R> {
    pub fn ok(reading: R) -> Self {
        Self {
            reading,
            device_fault: false,
        }
    }

    pub fn fault(reading: R) -> Self {
        Self {
            reading,
            device_fault: true,
        }
    }
}

/// 一种设备的静态行为：种类、接口路径、报文解码
pub trait Instrument: Send + Sync + 'static {
    type Reading: Reading;

    const KIND: DeviceKind;

    /// 状态接口路径
    const ENDPOINT: &'static str;

    fn decode(body: &[u8]) -> Result<Decoded<Self::Reading>, serde_json::Error>;
}

/// SmartPro 温控仪
#[derive(Debug, Clone, Copy, Default)]
pub struct SmartPro;

#[derive(Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
struct SmartProStatus {
    is_running: bool,
    temperature_main: SmartProProbe,
}

#[derive(Deserialize)]
struct SmartProProbe {
    value: i32,
    error: bool,
}

impl Instrument for SmartPro {
    type Reading = SmartProReading;

    const KIND: DeviceKind = DeviceKind::SmartPro;
    const ENDPOINT: &'static str = "/api/v1/school/status";

    fn decode(body: &[u8]) -> Result<Decoded<SmartProReading>, serde_json::Error> {
        let status: SmartProStatus = serde_json::from_slice(body)?;
        Ok(Decoded {
            reading: SmartProReading::new(status.is_running, status.temperature_main.value),
            device_fault: status.temperature_main.error,
        })
    }
}

/// 示例设备
#[derive(Debug, Clone, Copy, Default)]
pub struct ExampleInstrument;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExampleStatus {
    altitude: i32,
    speed: i32,
    distance_travelled: i32,
    #[serde(default)]
    error: bool,
}

impl Instrument for ExampleInstrument {
    type Reading = ExampleReading;

    const KIND: DeviceKind = DeviceKind::Example;
    const ENDPOINT: &'static str = "/api/v1/example/status";

    fn decode(body: &[u8]) -> Result<Decoded<ExampleReading>, serde_json::Error> {
        let status: ExampleStatus = serde_json::from_slice(body)?;
        Ok(Decoded {
            reading: ExampleReading {
                altitude: status.altitude,
                speed: status.speed,
                distance_travelled: status.distance_travelled,
            },
            device_fault: status.error,
        })
    }
}
