//! 采集重试状态机
//!
//! 纯同步值，不持有定时器；异步任务只按返回的 [`Step`] 休眠

use labpoll_config::PollingConfig;
use labpoll_types::MeasurementStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// 采集状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PollerStatus {
    /// 未采集
    Ready,
    /// 正常周期采集
    Fetching,
    /// 网络错误后以退避周期采集
    Backoff,
    /// 重试耗尽，等待手动重启
    Aborted,
}

impl PollerStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, PollerStatus::Fetching | PollerStatus::Backoff)
    }
}

impl fmt::Display for PollerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PollerStatus::Ready => "Ready",
            PollerStatus::Fetching => "Fetching",
            PollerStatus::Backoff => "Backoff",
            PollerStatus::Aborted => "Aborted",
        };
        f.write_str(name)
    }
}

/// 重试策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 退避周期
    pub backoff_interval: Duration,
    /// 连续网络错误达到该次数即中止
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_interval: Duration::from_secs(5),
            max_retries: 5,
        }
    }
}

impl From<&PollingConfig> for RetryPolicy {
    fn from(config: &PollingConfig) -> Self {
        Self {
            backoff_interval: config.backoff_interval(),
            max_retries: config.max_retries.max(1),
        }
    }
}

/// 处理一条记录后的动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Step {
    /// 下次采集前的等待时间；`None` 表示停止采集
    pub next_delay: Option<Duration>,
    /// 状态变化 `(旧, 新)`
    pub transition: Option<(PollerStatus, PollerStatus)>,
    /// 新的设备故障周期开始
    pub fault_started: bool,
}

/// 单台设备的采集状态机
#[derive(Debug, Clone)]
pub struct PollState {
    status: PollerStatus,
    retry_count: u32,
    refresh_interval: Duration,
    policy: RetryPolicy,
    in_fault: bool,
}

impl PollState {
    pub fn new(refresh_interval: Duration, policy: RetryPolicy) -> Self {
        Self {
            status: PollerStatus::Ready,
            retry_count: 0,
            refresh_interval,
            policy,
            in_fault: false,
        }
    }

    pub fn status(&self) -> PollerStatus {
        self.status
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn refresh_interval(&self) -> Duration {
        self.refresh_interval
    }

    /// 修改正常采集周期，下一次等待生效
    pub fn set_refresh_interval(&mut self, interval: Duration) {
        self.refresh_interval = interval;
    }

    /// 当前状态下的采集周期
    pub fn current_interval(&self) -> Duration {
        match self.status {
            PollerStatus::Backoff => self.policy.backoff_interval,
            _ => self.refresh_interval,
        }
    }

    /// 开始采集；从 `Aborted` 重启时清零重试计数
    ///
    /// 已在采集中时返回 `None`
    pub fn start(&mut self) -> Option<(PollerStatus, PollerStatus)> {
        if self.status.is_active() {
            return None;
        }

        let from = self.status;
        self.status = PollerStatus::Fetching;
        self.retry_count = 0;
        self.in_fault = false;
        Some((from, PollerStatus::Fetching))
    }

    /// 停止采集
    pub fn stop(&mut self) -> Option<(PollerStatus, PollerStatus)> {
        if self.status == PollerStatus::Ready {
            return None;
        }

        let from = self.status;
        self.status = PollerStatus::Ready;
        self.in_fault = false;
        Some((from, PollerStatus::Ready))
    }

    /// 根据一条记录的分类推进状态机
    pub fn on_record(&mut self, record: MeasurementStatus) -> Step {
        if !self.status.is_active() {
            return Step {
                next_delay: None,
                transition: None,
                fault_started: false,
            };
        }

        let from = self.status;
        let mut fault_started = false;

        let next_delay = match record {
            MeasurementStatus::Success => {
                self.in_fault = false;
                self.retry_count = 0;
                self.status = PollerStatus::Fetching;
                Some(self.refresh_interval)
            }
            MeasurementStatus::DeviceError => {
                fault_started = !self.in_fault;
                self.in_fault = true;
                Some(self.current_interval())
            }
            MeasurementStatus::NetworkError => {
                self.in_fault = false;
                self.retry_count += 1;
                if self.retry_count >= self.policy.max_retries {
                    self.status = PollerStatus::Aborted;
                    None
                } else {
                    self.status = PollerStatus::Backoff;
                    Some(self.policy.backoff_interval)
                }
            }
        };

        let transition = (from != self.status).then_some((from, self.status));

        Step {
            next_delay,
            transition,
            fault_started,
        }
    }
}
