use clap::{Parser, Subcommand, ValueEnum};
use crate::app::StartTargets;
use labpoll_types::{DeviceAddress, DeviceKind};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Polls networked lab instruments and stores their measurements", long_about = None)]
pub struct Cli {
    /// 配置目录（读取其中的 global.toml）
    #[arg(short, long, default_value = "config")]
    pub config_dir: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// 启动采集，直到收到 Ctrl-C
    Run {
        /// 要启动的设备，可重复
        #[arg(long = "start", value_name = "IP:PORT")]
        start: Vec<SocketAddr>,
        /// 启动全部已注册设备
        #[arg(long, conflicts_with = "start")]
        all: bool,
    },
    /// 注册设备
    AddDevice {
        ip: IpAddr,
        port: u16,
        #[arg(value_enum)]
        kind: KindArg,
        #[arg(long)]
        label: Option<String>,
        /// 刷新周期（秒）
        #[arg(long, default_value_t = 1)]
        refresh_rate: u32,
    },
    /// 删除设备及其测量数据
    RemoveDevice { ip: IpAddr, port: u16 },
    /// 列出已注册设备
    ListDevices,
    /// 输出生效的配置
    PrintConfig,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    SmartPro,
    Example,
}

impl From<KindArg> for DeviceKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::SmartPro => DeviceKind::SmartPro,
            KindArg::Example => DeviceKind::Example,
        }
    }
}

impl Cli {
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Run {
            start: Vec::new(),
            all: false,
        })
    }
}

pub fn address(ip: IpAddr, port: u16) -> DeviceAddress {
    DeviceAddress::new(ip, port)
}

pub fn start_targets(start: &[SocketAddr], all: bool) -> StartTargets {
    StartTargets {
        all,
        devices: start.iter().copied().map(DeviceAddress::from).collect(),
    }
}
