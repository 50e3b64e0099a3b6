use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

/// 设备网络地址
///
/// 设备的唯一身份，`(ip, port)` 二元组
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceAddress {
    pub ip: IpAddr,
    pub port: u16,
}

impl DeviceAddress {
    pub fn new(ip: IpAddr, port: u16) -> Self {
        Self { ip, port }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }

    /// 拼接设备 HTTP 接口地址（IPv6 自动加方括号）
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.socket_addr(), path)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

impl From<SocketAddr> for DeviceAddress {
    fn from(addr: SocketAddr) -> Self {
        Self::new(addr.ip(), addr.port())
    }
}

/// 设备种类
///
/// 封闭集合，每个种类静态绑定一种测量类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    /// SmartPro 温控仪
    SmartPro,
    /// 示例设备
    Example,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 2] = [DeviceKind::SmartPro, DeviceKind::Example];

    /// 持久化到 `devices.device_type` 的类型标签
    pub fn tag(&self) -> &'static str {
        match self {
            DeviceKind::SmartPro => "SmartProDevice",
            DeviceKind::Example => "ExampleDevice",
        }
    }

    pub fn from_tag(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.tag() == tag)
    }

    pub fn model(&self) -> &'static str {
        match self {
            DeviceKind::SmartPro => "SmartPro",
            DeviceKind::Example => "Example",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            DeviceKind::SmartPro => "Temperature controller reporting a main probe and a running flag",
            DeviceKind::Example => "Demonstration device reporting altitude, speed and distance",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// 设备信息
///
/// 相等性与哈希只取决于 `address`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    /// 网络地址（身份）
    pub address: DeviceAddress,

    /// 显示名称（可选）
    pub label: Option<String>,

    /// 刷新周期（秒）
    pub refresh_rate: u32,

    /// 设备种类
    pub kind: DeviceKind,
}

impl Device {
    pub const DEFAULT_REFRESH_RATE: u32 = 1;

    /// 创建新设备
    pub fn new(address: DeviceAddress, kind: DeviceKind) -> Self {
        Self {
            address,
            label: None,
            refresh_rate: Self::DEFAULT_REFRESH_RATE,
            kind,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_refresh_rate(mut self, seconds: u32) -> Self {
        self.refresh_rate = seconds.max(1);
        self
    }

    /// 正常采集周期
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(u64::from(self.refresh_rate.max(1)))
    }

    pub fn model(&self) -> &'static str {
        self.kind.model()
    }

    pub fn description(&self) -> &'static str {
        self.kind.description()
    }

    /// 界面显示用名称：有标签用标签，否则用地址
    pub fn display_name(&self) -> String {
        match &self.label {
            Some(label) => label.clone(),
            None => self.address.to_string(),
        }
    }
}

impl PartialEq for Device {
    fn eq(&self, other: &Self) -> bool {
        self.address == other.address
    }
}

impl Eq for Device {}

impl Hash for Device {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.address.hash(state);
    }
}
