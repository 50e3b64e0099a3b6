pub mod device;
pub mod field;
pub mod measurement;
pub mod reading;

pub use device::{Device, DeviceAddress, DeviceKind};
pub use field::{
    format_timestamp, parse_timestamp, FieldDescriptor, FieldError, FieldKind, FieldValue, Reading,
    TIMESTAMP_FORMAT,
};
pub use measurement::{timestamp_now, Measurement, MeasurementStatus};
pub use reading::{ExampleReading, SmartProReading};
