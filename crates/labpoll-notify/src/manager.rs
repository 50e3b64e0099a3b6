use crate::message::{NotifyChannel, NotifyLevel, NotifyMessage};
use crate::notifier::{Notifier, NotifyResult};
use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, error, info};

pub type SharedNotifyManager = Arc<NotifyManager>;

/// 通知管理器
pub struct NotifyManager {
    /// 通知器列表
    notifiers: Arc<RwLock<HashMap<NotifyChannel, Box<dyn Notifier>>>>,

    /// 最小通知级别
    min_level: NotifyLevel,
}

impl NotifyManager {
    pub fn new(min_level: NotifyLevel) -> Self {
        Self {
            notifiers: Arc::new(RwLock::new(HashMap::new())),
            min_level,
        }
    }

    pub fn min_level(&self) -> NotifyLevel {
        self.min_level
    }

    /// 注册通知器，同一渠道重复注册时替换
    pub async fn register(&self, channel: NotifyChannel, notifier: Box<dyn Notifier>) {
        let mut notifiers = self.notifiers.write().await;
        info!(channel = ?channel, notifier = notifier.name(), "Registered notifier");
        notifiers.insert(channel, notifier);
    }

    /// 发送通知到指定渠道
    pub async fn send(&self, channel: NotifyChannel, message: &NotifyMessage) -> Result<()> {
        if !self.should_notify(message.level) {
            return Ok(());
        }

        let notifiers = self.notifiers.read().await;
        if let Some(notifier) = notifiers.get(&channel) {
            deliver(notifier.as_ref(), message).await;
        }

        Ok(())
    }

    /// 发送通知到所有渠道
    pub async fn broadcast(&self, message: &NotifyMessage) -> Result<()> {
        if !self.should_notify(message.level) {
            debug!(title = %message.title, level = %message.level, "Notification below threshold");
            return Ok(());
        }

        let notifiers = self.notifiers.read().await;
        for notifier in notifiers.values() {
            deliver(notifier.as_ref(), message).await;
        }

        Ok(())
    }

    /// 后台广播，调用方不等待送达
    pub fn dispatch(self: &Arc<Self>, message: NotifyMessage) {
        let manager = self.clone();
        tokio::spawn(async move {
            if let Err(e) = manager.broadcast(&message).await {
                error!(title = %message.title, error = %e, "Notification dispatch failed");
            }
        });
    }

    fn should_notify(&self, level: NotifyLevel) -> bool {
        level >= self.min_level
    }
}

async fn deliver(notifier: &dyn Notifier, message: &NotifyMessage) {
    if !notifier.is_enabled() {
        return;
    }

    match notifier.send(message).await {
        Ok(NotifyResult::Delivered) => {
            debug!(notifier = notifier.name(), title = %message.title, "Notification sent");
        }
        Ok(rejected) => {
            error!(notifier = notifier.name(), title = %message.title, result = %rejected, "Notification failed");
        }
        Err(e) => {
            error!(notifier = notifier.name(), error = %e, "Notification error");
        }
    }
}

impl Default for NotifyManager {
    fn default() -> Self {
        Self::new(NotifyLevel::Info)
    }
}
