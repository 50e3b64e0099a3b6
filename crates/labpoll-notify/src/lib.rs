pub mod manager;
pub mod message;
pub mod notifier;
pub mod providers;

pub use manager::{NotifyManager, SharedNotifyManager};
pub use message::{NotifyChannel, NotifyLevel, NotifyMessage, ParseLevelError};
pub use notifier::{Notifier, NotifyResult};
pub use providers::{LogNotifier, WebhookConfig, WebhookNotifier};
