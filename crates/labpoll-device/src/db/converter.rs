use crate::db::device;
use crate::error::DeviceError;
use labpoll_types::{Device, DeviceAddress, DeviceKind};
use sea_orm::Set;
use std::net::IpAddr;

impl From<&Device> for device::ActiveModel {
    fn from(d: &Device) -> Self {
        device::ActiveModel {
            ip_address: Set(d.address.ip.to_string()),
            port: Set(i32::from(d.address.port)),
            label: Set(d.label.clone()),
            device_type: Set(d.kind.tag().to_string()),
            refresh_rate: Set(i32::try_from(d.refresh_rate).unwrap_or(i32::MAX)),
        }
    }
}

impl TryFrom<device::Model> for Device {
    type Error = DeviceError;

    fn try_from(m: device::Model) -> Result<Self, Self::Error> {
        let ip: IpAddr = m
            .ip_address
            .parse()
            .map_err(|_| DeviceError::invalid_record(format!("bad ip address {:?}", m.ip_address)))?;
        let port = u16::try_from(m.port)
            .map_err(|_| DeviceError::invalid_record(format!("bad port {}", m.port)))?;
        let kind = DeviceKind::from_tag(&m.device_type).ok_or_else(|| {
            DeviceError::invalid_record(format!("unknown device type {:?}", m.device_type))
        })?;
        let refresh_rate = u32::try_from(m.refresh_rate).unwrap_or(Device::DEFAULT_REFRESH_RATE);

        let mut device = Device::new(DeviceAddress::new(ip, port), kind).with_refresh_rate(refresh_rate);
        device.label = m.label;
        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(ip: &str, port: i32, device_type: &str) -> device::Model {
        device::Model {
            ip_address: ip.to_string(),
            port,
            label: Some("bench".to_string()),
            device_type: device_type.to_string(),
            refresh_rate: 2,
        }
    }

    #[test]
    fn test_model_to_device() {
        let device = Device::try_from(model("10.0.0.5", 56000, "SmartProDevice")).unwrap();
        assert_eq!(device.address.to_string(), "10.0.0.5:56000");
        assert_eq!(device.kind, DeviceKind::SmartPro);
        assert_eq!(device.label.as_deref(), Some("bench"));
        assert_eq!(device.refresh_rate, 2);
    }

    #[test]
    fn test_invalid_models_rejected() {
        assert!(Device::try_from(model("not-an-ip", 1, "SmartProDevice")).is_err());
        assert!(Device::try_from(model("10.0.0.5", 70000, "SmartProDevice")).is_err());
        assert!(Device::try_from(model("10.0.0.5", 1, "WeatherDevice")).is_err());
    }
}
