use crate::field::{FieldDescriptor, FieldKind, FieldValue, Reading};
use serde::{Deserialize, Serialize};

/// SmartPro 温控仪读数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmartProReading {
    /// 设备是否在运行
    pub is_running: bool,

    /// 主探头温度（百分之一摄氏度）
    pub temperature: i32,
}

impl SmartProReading {
    pub fn new(is_running: bool, temperature: i32) -> Self {
        Self {
            is_running,
            temperature,
        }
    }

    pub fn temperature_celsius(&self) -> f64 {
        f64::from(self.temperature) / 100.0
    }
}

static SMART_PRO_FIELDS: [FieldDescriptor<SmartProReading>; 2] = [
    FieldDescriptor {
        name: "is_running",
        kind: FieldKind::Bool,
        get: |r: &SmartProReading| FieldValue::Bool(r.is_running),
        set: |r: &mut SmartProReading, v: FieldValue| {
            r.is_running = v.as_bool()?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: "temperature",
        kind: FieldKind::I32,
        get: |r: &SmartProReading| FieldValue::Integer(i64::from(r.temperature)),
        set: |r: &mut SmartProReading, v: FieldValue| {
            r.temperature = v.as_int()?;
            Ok(())
        },
    },
];

impl Reading for SmartProReading {
    const TYPE_NAME: &'static str = "SmartProMeasurement";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        &SMART_PRO_FIELDS
    }
}

/// 示例设备读数
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExampleReading {
    pub altitude: i32,
    pub speed: i32,
    pub distance_travelled: i32,
}

static EXAMPLE_FIELDS: [FieldDescriptor<ExampleReading>; 3] = [
    FieldDescriptor {
        name: "altitude",
        kind: FieldKind::I32,
        get: |r: &ExampleReading| FieldValue::Integer(i64::from(r.altitude)),
        set: |r: &mut ExampleReading, v: FieldValue| {
            r.altitude = v.as_int()?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: "speed",
        kind: FieldKind::I32,
        get: |r: &ExampleReading| FieldValue::Integer(i64::from(r.speed)),
        set: |r: &mut ExampleReading, v: FieldValue| {
            r.speed = v.as_int()?;
            Ok(())
        },
    },
    FieldDescriptor {
        name: "distance_travelled",
        kind: FieldKind::I32,
        get: |r: &ExampleReading| FieldValue::Integer(i64::from(r.distance_travelled)),
        set: |r: &mut ExampleReading, v: FieldValue| {
            r.distance_travelled = v.as_int()?;
            Ok(())
        },
    },
];

impl Reading for ExampleReading {
    const TYPE_NAME: &'static str = "ExampleMeasurement";

    fn fields() -> &'static [FieldDescriptor<Self>] {
        &EXAMPLE_FIELDS
    }
}
