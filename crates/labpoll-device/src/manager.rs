use crate::event::PollerEvent;
use crate::instrument::{ExampleInstrument, SmartPro};
use crate::poller::{Poller, PollerSettings};
use crate::registry::DeviceRegistry;
use crate::source::{build_client, HttpSource};
use crate::state::PollerStatus;
use crate::{DeviceError, Result};
use chrono::{DateTime, Utc};
use labpoll_config::PollingConfig;
use labpoll_core::SharedEventBus;
use labpoll_notify::SharedNotifyManager;
use labpoll_store::{create_devices_table, StoreWriter};
use labpoll_types::{Device, DeviceAddress, DeviceKind, ExampleReading, SmartProReading};
use sea_orm::DatabaseConnection;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// 按设备种类区分的采集器
#[derive(Clone)]
pub enum DevicePoller {
    SmartPro(Poller<SmartProReading>),
    Example(Poller<ExampleReading>),
}

/// 与测量类型无关的采集器概况
#[derive(Debug, Clone)]
pub struct PollerSummary {
    pub device: Device,
    pub status: PollerStatus,
    pub retry_count: u32,
    pub buffer_size: usize,
    pub time_of_last_measurement: Option<DateTime<Utc>>,
    pub pending_retry: usize,
}

macro_rules! each_poller {
    ($self:expr, $poller:ident => $body:expr) => {
        match $self {
            DevicePoller::SmartPro($poller) => $body,
            DevicePoller::Example($poller) => $body,
        }
    };
}

impl DevicePoller {
    pub fn kind(&self) -> DeviceKind {
        match self {
            DevicePoller::SmartPro(_) => DeviceKind::SmartPro,
            DevicePoller::Example(_) => DeviceKind::Example,
        }
    }

    pub fn address(&self) -> DeviceAddress {
        each_poller!(self, p => p.address())
    }

    pub fn status(&self) -> PollerStatus {
        each_poller!(self, p => p.status())
    }

    pub fn start(&self) -> bool {
        each_poller!(self, p => p.start())
    }

    pub async fn stop(&self) -> bool {
        each_poller!(self, p => p.stop().await)
    }

    pub fn update_device(&self, device: Device) -> bool {
        each_poller!(self, p => p.update_device(device))
    }

    pub fn summary(&self) -> PollerSummary {
        each_poller!(self, p => {
            let snapshot = p.snapshot();
            PollerSummary {
                buffer_size: snapshot.buffer_size(),
                device: snapshot.device,
                status: snapshot.status,
                retry_count: snapshot.retry_count,
                time_of_last_measurement: snapshot.time_of_last_measurement,
                pending_retry: snapshot.pending_retry,
            }
        })
    }

    pub fn as_smart_pro(&self) -> Option<&Poller<SmartProReading>> {
        match self {
            DevicePoller::SmartPro(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_example(&self) -> Option<&Poller<ExampleReading>> {
        match self {
            DevicePoller::Example(p) => Some(p),
            _ => None,
        }
    }
}

/// 设备管理器
///
/// 每台已注册设备一个采集器，统一负责增删改、启停与关闭时的落库
pub struct DeviceManager {
    db: Arc<DatabaseConnection>,

    /// 设备注册表
    registry: Arc<DeviceRegistry>,

    /// 采集器（地址 -> 采集器）
    pollers: Arc<RwLock<HashMap<DeviceAddress, DevicePoller>>>,

    smart_pro_store: Arc<StoreWriter<SmartProReading>>,
    example_store: Arc<StoreWriter<ExampleReading>>,

    client: reqwest::Client,
    settings: PollerSettings,
    events: SharedEventBus<PollerEvent>,
    notify: Option<SharedNotifyManager>,
}

impl DeviceManager {
    /// 创建设备管理器
    ///
    /// 测量类型的表结构在此推导，有缺陷时直接失败
    pub fn new(
        db: Arc<DatabaseConnection>,
        polling: &PollingConfig,
        events: SharedEventBus<PollerEvent>,
        notify: Option<SharedNotifyManager>,
    ) -> Result<Self> {
        let registry = Arc::new(DeviceRegistry::new(db.clone()));
        let smart_pro_store = Arc::new(StoreWriter::new(db.clone())?);
        let example_store = Arc::new(StoreWriter::new(db.clone())?);
        let client = build_client(polling.request_timeout())?;

        info!(
            buffer_capacity = polling.buffer_capacity,
            max_retries = polling.max_retries,
            "Device manager created"
        );

        Ok(Self {
            db,
            registry,
            pollers: Arc::new(RwLock::new(HashMap::new())),
            smart_pro_store,
            example_store,
            client,
            settings: PollerSettings::from(polling),
            events,
            notify,
        })
    }

    /// 创建设备表与各测量表
    pub async fn init_schema(&self) -> Result<()> {
        create_devices_table(&self.db).await?;
        self.smart_pro_store.ensure_table().await?;
        self.example_store.ensure_table().await?;
        Ok(())
    }

    pub fn registry(&self) -> Arc<DeviceRegistry> {
        self.registry.clone()
    }

    pub fn events(&self) -> SharedEventBus<PollerEvent> {
        self.events.clone()
    }

    pub fn smart_pro_store(&self) -> Arc<StoreWriter<SmartProReading>> {
        self.smart_pro_store.clone()
    }

    pub fn example_store(&self) -> Arc<StoreWriter<ExampleReading>> {
        self.example_store.clone()
    }

    fn create_poller(&self, device: Device) -> Result<DevicePoller> {
        let poller = match device.kind {
            DeviceKind::SmartPro => {
                let source = Arc::new(HttpSource::<SmartPro>::new(self.client.clone(), &device.address));
                DevicePoller::SmartPro(Poller::new(
                    device,
                    source,
                    self.smart_pro_store.clone(),
                    self.settings,
                    self.events.clone(),
                    self.notify.clone(),
                )?)
            }
            DeviceKind::Example => {
                let source = Arc::new(HttpSource::<ExampleInstrument>::new(
                    self.client.clone(),
                    &device.address,
                ));
                DevicePoller::Example(Poller::new(
                    device,
                    source,
                    self.example_store.clone(),
                    self.settings,
                    self.events.clone(),
                    self.notify.clone(),
                )?)
            }
        };
        Ok(poller)
    }

    /// 从数据库加载设备并创建采集器，返回新增数量
    pub async fn load_devices(&self) -> Result<usize> {
        let devices = self.registry.load_all().await?;
        let mut pollers = self.pollers.write().await;

        let mut loaded = 0;
        for device in devices {
            if pollers.contains_key(&device.address) {
                continue;
            }
            let address = device.address;
            pollers.insert(address, self.create_poller(device)?);
            loaded += 1;
        }

        info!(loaded, total = pollers.len(), "Devices loaded");
        Ok(loaded)
    }

    /// 注册新设备
    pub async fn add_device(&self, device: Device) -> Result<()> {
        let mut pollers = self.pollers.write().await;
        if pollers.contains_key(&device.address) {
            return Err(DeviceError::AlreadyExists(device.address));
        }

        self.registry.upsert(&device).await?;
        let address = device.address;
        pollers.insert(address, self.create_poller(device)?);
        Ok(())
    }

    /// 修改设备标签、刷新周期或种类
    ///
    /// 种类变化时旧采集器停止并落库，新采集器处于 `Ready`；
    /// 落库期间其他设备的操作不受阻塞
    pub async fn update_device(&self, device: Device) -> Result<()> {
        let current = self.poller_for(&device.address).await?;
        self.registry.upsert(&device).await?;

        if current.kind() == device.kind {
            current.update_device(device);
            return Ok(());
        }

        warn!(device = %device.address, from = %current.kind(), to = %device.kind, "Device kind changed");
        let address = device.address;
        let replacement = self.create_poller(device)?;

        // 旧采集器先移出表，停止与落库在锁外进行
        let removed = self.pollers.write().await.remove(&address);
        if let Some(old) = removed {
            old.stop().await;
        }

        match self.pollers.write().await.entry(address) {
            Entry::Vacant(slot) => {
                slot.insert(replacement);
                Ok(())
            }
            Entry::Occupied(_) => Err(DeviceError::AlreadyExists(address)),
        }
    }

    /// 删除设备：停止采集、落库，再从数据库删除（测量数据级联删除）
    pub async fn remove_device(&self, address: &DeviceAddress) -> Result<()> {
        let poller = self
            .pollers
            .write()
            .await
            .remove(address)
            .ok_or(DeviceError::NotFound(*address))?;

        poller.stop().await;
        self.registry.remove(address).await?;
        Ok(())
    }

    async fn poller_for(&self, address: &DeviceAddress) -> Result<DevicePoller> {
        self.pollers
            .read()
            .await
            .get(address)
            .cloned()
            .ok_or(DeviceError::NotFound(*address))
    }

    pub async fn poller(&self, address: &DeviceAddress) -> Option<DevicePoller> {
        self.pollers.read().await.get(address).cloned()
    }

    /// 开始采集
    pub async fn start(&self, address: &DeviceAddress) -> Result<bool> {
        Ok(self.poller_for(address).await?.start())
    }

    /// 停止采集并落库
    pub async fn stop(&self, address: &DeviceAddress) -> Result<bool> {
        Ok(self.poller_for(address).await?.stop().await)
    }

    /// 启动全部未在采集的设备
    pub async fn start_all(&self) -> usize {
        let pollers: Vec<DevicePoller> = self.pollers.read().await.values().cloned().collect();
        pollers.iter().filter(|p| p.start()).count()
    }

    pub async fn summaries(&self) -> Vec<PollerSummary> {
        let pollers = self.pollers.read().await;
        let mut summaries: Vec<PollerSummary> = pollers.values().map(DevicePoller::summary).collect();
        summaries.sort_by_key(|s| s.device.address);
        summaries
    }

    /// 停止全部采集器并尽力落库
    pub async fn shutdown(&self) {
        let pollers: Vec<DevicePoller> = self.pollers.read().await.values().cloned().collect();
        for poller in &pollers {
            poller.stop().await;
        }
        info!(devices = pollers.len(), "Device manager shut down");
    }
}
