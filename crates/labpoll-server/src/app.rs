use anyhow::{Context, Result};
use labpoll_config::{GlobalConfig, NotifyConfig};
use labpoll_core::EventBus;
use labpoll_device::{DeviceManager, PollerEvent, PollerSummary};
use labpoll_notify::{
    LogNotifier, NotifyChannel, NotifyManager, SharedNotifyManager, WebhookConfig, WebhookNotifier,
};
use labpoll_store::connect;
use labpoll_types::{Device, DeviceAddress};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const EVENT_BUS_CAPACITY: usize = 1024;

/// 组装好的采集服务
pub struct App {
    config: GlobalConfig,
    manager: Arc<DeviceManager>,
}

/// 按配置注册日志与 webhook 通知渠道
pub async fn build_notify_manager(config: &NotifyConfig) -> Result<SharedNotifyManager> {
    let manager = Arc::new(NotifyManager::new(config.min_level));
    manager
        .register(NotifyChannel::Log, Box::new(LogNotifier::new()))
        .await;

    if let Some(url) = config.webhook_url.as_deref().filter(|url| !url.is_empty()) {
        let webhook = WebhookNotifier::new(WebhookConfig::new(url))?;
        manager
            .register(NotifyChannel::Webhook, Box::new(webhook))
            .await;
    }

    Ok(manager)
}

impl App {
    /// 连接数据库、建表并加载已注册设备
    pub async fn build(config: GlobalConfig) -> Result<Self> {
        let db = connect(&config.store.database_url, config.store.max_connections)
            .await
            .with_context(|| format!("Failed to open store at {}", config.store.database_url))?;

        let notify = build_notify_manager(&config.notify).await?;
        let events = Arc::new(EventBus::new(EVENT_BUS_CAPACITY));
        let manager = DeviceManager::new(Arc::new(db), &config.polling, events, Some(notify))?;

        manager.init_schema().await.context("Failed to create tables")?;
        manager.load_devices().await.context("Failed to load devices")?;

        Ok(Self {
            config,
            manager: Arc::new(manager),
        })
    }

    pub fn config(&self) -> &GlobalConfig {
        &self.config
    }

    pub fn manager(&self) -> Arc<DeviceManager> {
        self.manager.clone()
    }

    pub async fn add_device(&self, device: Device) -> Result<()> {
        let address = device.address;
        self.manager.add_device(device).await?;
        info!(device = %address, "Device registered");
        Ok(())
    }

    pub async fn remove_device(&self, address: &DeviceAddress) -> Result<()> {
        self.manager.remove_device(address).await?;
        Ok(())
    }

    pub async fn list_devices(&self) -> Vec<PollerSummary> {
        self.manager.summaries().await
    }

    /// 运行采集直到 `shutdown` 完成，随后停止全部设备并落库
    ///
    /// `targets` 决定启动哪些设备；配置了 `autostart` 时总是全部启动
    pub async fn run<F>(&self, targets: &StartTargets, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let logger = spawn_event_logger(self.manager.events().subscribe());

        if let Err(e) = self.start_targets(targets).await {
            self.manager.shutdown().await;
            logger.abort();
            return Err(e);
        }

        info!(name = %self.config.system.name, version = %self.config.system.version, "Acquisition running");
        shutdown.await;

        info!("Shutting down");
        self.manager.shutdown().await;
        logger.abort();
        Ok(())
    }

    async fn start_targets(&self, targets: &StartTargets) -> Result<()> {
        if targets.all || self.config.polling.autostart {
            let started = self.manager.start_all().await;
            info!(started, "Started all devices");
            return Ok(());
        }

        for address in &targets.devices {
            self.manager
                .start(address)
                .await
                .with_context(|| format!("Cannot start {address}"))?;
        }
        if targets.devices.is_empty() {
            warn!("No devices started; pass --start or --all, or enable polling.autostart");
        }
        Ok(())
    }
}

/// `run` 启动时要开始采集的设备
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartTargets {
    pub all: bool,
    pub devices: Vec<DeviceAddress>,
}

/// 订阅采集器事件并写日志
fn spawn_event_logger(mut rx: broadcast::Receiver<PollerEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => log_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event logger lagged behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

fn log_event(event: &PollerEvent) {
    match event {
        PollerEvent::StatusChanged {
            device,
            from,
            to,
            retry_count,
        } => info!(device = %device, %from, %to, retry_count, "Poller status changed"),
        PollerEvent::DeviceFault { device, timestamp } => {
            warn!(device = %device, %timestamp, "Device reported a fault")
        }
        PollerEvent::FlushCompleted { device, report } => {
            debug!(device = %device, written = report.written, failed = report.failed, "Flush completed")
        }
        PollerEvent::FlushFailed {
            device,
            pending,
            error,
        } => error!(device = %device, pending, error = %error, "Flush failed"),
        PollerEvent::MeasurementAdded { .. } | PollerEvent::BufferChanged { .. } => {}
    }
}
