use std::sync::Arc;
use tokio::sync::broadcast;

/// 进程内事件总线
///
/// 基于 broadcast 通道，慢订阅者会丢失旧事件（收到 `Lagged`），发布方永不阻塞
#[derive(Clone)]
pub struct EventBus<E> {
    sender: broadcast::Sender<E>,
}

impl<E: Clone> EventBus<E> {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }

    /// 发布事件，返回收到事件的订阅者数量；无订阅者时返回 0
    pub fn publish(&self, event: E) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

pub type SharedEventBus<E> = Arc<EventBus<E>>;
