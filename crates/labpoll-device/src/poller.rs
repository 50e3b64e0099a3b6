//! 单台设备的采集任务
//!
//! 每台已启动的设备一个 tokio 任务：采集、分类、写入缓冲区，缓冲区满时落库。
//! 缓冲区与状态机放在同步锁内，锁内不跨越 await；任务只在 HTTP 请求与落库处挂起。
//! 一次迭代（含落库）完成后才开始下一次等待，因此每台设备最多一个在途请求。

use crate::event::{PollerEvent, RecordSummary};
use crate::instrument::Decoded;
use crate::source::{FetchError, MeasurementSource};
use crate::state::{PollState, PollerStatus, RetryPolicy, Step};
use chrono::{DateTime, Utc};
use labpoll_config::PollingConfig;
use labpoll_core::{CoreError, MeasurementBuffer, SharedEventBus};
use labpoll_notify::{NotifyMessage, SharedNotifyManager};
use labpoll_store::MeasurementSink;
use labpoll_types::{timestamp_now, Device, DeviceAddress, Measurement, Reading};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// 采集器参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerSettings {
    pub buffer_capacity: usize,
    pub policy: RetryPolicy,
    /// 落库失败后暂存记录的上限
    pub retry_queue_limit: usize,
}

impl Default for PollerSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollerSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            buffer_capacity: config.buffer_capacity,
            policy: RetryPolicy::from(config),
            retry_queue_limit: config.retry_queue_limit,
        }
    }
}

/// 采集器对外可见的状态
#[derive(Debug, Clone)]
pub struct PollerSnapshot<R> {
    pub device: Device,
    pub status: PollerStatus,
    pub retry_count: u32,
    pub last_measurement: Option<Measurement<R>>,
    pub last_valid_measurement: Option<Measurement<R>>,
    pub time_of_last_measurement: Option<DateTime<Utc>>,
    /// 滚动显示窗口
    pub buffer: Vec<Measurement<R>>,
    /// 等待重试落库的记录数
    pub pending_retry: usize,
}

impl<R> PollerSnapshot<R> {
    pub fn buffer_size(&self) -> usize {
        self.buffer.len()
    }
}

struct Shared<R> {
    device: Device,
    state: PollState,
    buffer: MeasurementBuffer<Measurement<R>>,
    last_measurement: Option<Measurement<R>>,
    last_valid_measurement: Option<Measurement<R>>,
    time_of_last_measurement: Option<DateTime<Utc>>,
    retry_queue: VecDeque<Measurement<R>>,
    /// 每次启动或停止递增，旧任务据此丢弃迟到的结果
    generation: u64,
}

struct Recorded<R> {
    step: Step,
    summary: RecordSummary,
    retry_count: u32,
    size: usize,
    evicted: Option<DateTime<Utc>>,
    flush: Option<Vec<Measurement<R>>>,
}

struct Inner<R> {
    address: DeviceAddress,
    source: Arc<dyn MeasurementSource<R>>,
    sink: Arc<dyn MeasurementSink<R>>,
    shared: Mutex<Shared<R>>,
    flush_lock: tokio::sync::Mutex<()>,
    stop_tx: Mutex<Option<watch::Sender<bool>>>,
    events: SharedEventBus<PollerEvent>,
    notify: Option<SharedNotifyManager>,
    retry_queue_limit: usize,
}

/// 单台设备的采集器
pub struct Poller<R> {
    inner: Arc<Inner<R>>,
}

impl<R> Clone for Poller<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Reading> Poller<R> {
    pub fn new(
        device: Device,
        source: Arc<dyn MeasurementSource<R>>,
        sink: Arc<dyn MeasurementSink<R>>,
        settings: PollerSettings,
        events: SharedEventBus<PollerEvent>,
        notify: Option<SharedNotifyManager>,
    ) -> Result<Self, CoreError> {
        let buffer = MeasurementBuffer::new(settings.buffer_capacity)?;
        let state = PollState::new(device.refresh_interval(), settings.policy);

        Ok(Self {
            inner: Arc::new(Inner {
                address: device.address,
                source,
                sink,
                shared: Mutex::new(Shared {
                    device,
                    state,
                    buffer,
                    last_measurement: None,
                    last_valid_measurement: None,
                    time_of_last_measurement: None,
                    retry_queue: VecDeque::new(),
                    generation: 0,
                }),
                flush_lock: tokio::sync::Mutex::new(()),
                stop_tx: Mutex::new(None),
                events,
                notify,
                retry_queue_limit: settings.retry_queue_limit,
            }),
        })
    }

    pub fn address(&self) -> DeviceAddress {
        self.inner.address
    }

    pub fn device(&self) -> Device {
        self.inner.lock().device.clone()
    }

    pub fn status(&self) -> PollerStatus {
        self.inner.lock().state.status()
    }

    pub fn retry_count(&self) -> u32 {
        self.inner.lock().state.retry_count()
    }

    /// 修改标签与刷新周期；地址是身份，不可修改
    pub fn update_device(&self, device: Device) -> bool {
        if device.address != self.inner.address {
            return false;
        }

        let mut shared = self.inner.lock();
        shared.state.set_refresh_interval(device.refresh_interval());
        shared.device = device;
        true
    }

    pub fn snapshot(&self) -> PollerSnapshot<R> {
        let shared = self.inner.lock();
        PollerSnapshot {
            device: shared.device.clone(),
            status: shared.state.status(),
            retry_count: shared.state.retry_count(),
            last_measurement: shared.last_measurement.clone(),
            last_valid_measurement: shared.last_valid_measurement.clone(),
            time_of_last_measurement: shared.time_of_last_measurement,
            buffer: shared.buffer.snapshot(),
            pending_retry: shared.retry_queue.len(),
        }
    }

    /// 开始采集，第一次采集立即进行
    ///
    /// 已在采集中返回 `false`。必须在 tokio 运行时内调用。
    pub fn start(&self) -> bool {
        let (generation, transition) = {
            let mut shared = self.inner.lock();
            let Some(transition) = shared.state.start() else {
                debug!(device = %self.inner.address, "Poller already running");
                return false;
            };
            shared.generation += 1;
            (shared.generation, transition)
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let previous = self
            .inner
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(stop_tx);
        if let Some(previous) = previous {
            let _ = previous.send(true);
        }

        self.inner.status_changed(transition);
        info!(device = %self.inner.address, "Polling started");

        let inner = self.inner.clone();
        tokio::spawn(inner.run(generation, stop_rx));
        true
    }

    /// 停止采集并尽力落库未持久化的记录
    ///
    /// 在途请求不会被取消，其结果到达后丢弃
    pub async fn stop(&self) -> bool {
        let transition = {
            let mut shared = self.inner.lock();
            let transition = shared.state.stop();
            if transition.is_some() {
                shared.generation += 1;
            }
            transition
        };

        let stop_tx = self
            .inner
            .stop_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(stop_tx) = stop_tx {
            let _ = stop_tx.send(true);
        }

        let Some(transition) = transition else {
            return false;
        };

        self.inner.status_changed(transition);
        info!(device = %self.inner.address, "Polling stopped");

        self.inner.drain().await;
        true
    }

    /// 尽力落库缓冲区与重试队列中的记录
    pub async fn drain(&self) {
        self.inner.drain().await;
    }

    /// 占住落库锁，模拟一次耗时的落库
    #[cfg(test)]
    pub(crate) async fn hold_flush_lock(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.inner.flush_lock.lock().await
    }
}

impl<R: Reading> Inner<R> {
    fn lock(&self) -> MutexGuard<'_, Shared<R>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run(self: Arc<Self>, generation: u64, mut stop_rx: watch::Receiver<bool>) {
        let mut delay = Duration::ZERO;

        loop {
            if !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = stop_rx.changed() => break,
                }
            }
            if *stop_rx.borrow() {
                break;
            }

            let timestamp = timestamp_now();
            let fetched = self.source.fetch().await;
            let measurement = self.classify(timestamp, fetched);

            let Some(recorded) = self.record(generation, measurement) else {
                debug!(device = %self.address, "Discarding measurement received after stop");
                break;
            };

            let next_delay = recorded.step.next_delay;
            if let Some(batch) = self.publish(recorded) {
                self.flush(batch).await;
            }

            match next_delay {
                Some(next) => delay = next,
                None => break,
            }
        }

        debug!(device = %self.address, generation, "Polling task finished");
    }

    fn classify(&self, timestamp: DateTime<Utc>, fetched: Result<Decoded<R>, FetchError>) -> Measurement<R> {
        match fetched {
            Ok(Decoded {
                reading,
                device_fault: false,
            }) => Measurement::success(timestamp, reading),
            Ok(Decoded {
                reading,
                device_fault: true,
            }) => Measurement::device_fault(timestamp, reading),
            Err(e) => {
                warn!(
                    device = %self.address,
                    transport = e.is_transport(),
                    error = %e,
                    "Fetch failed"
                );
                Measurement::network_failure(timestamp)
            }
        }
    }

    /// 同步写入缓冲区并推进状态机；启动代次不匹配时返回 `None`
    fn record(&self, generation: u64, measurement: Measurement<R>) -> Option<Recorded<R>> {
        let mut shared = self.lock();
        if shared.generation != generation || !shared.state.status().is_active() {
            return None;
        }

        let step = shared.state.on_record(measurement.status);
        shared.time_of_last_measurement = Some(measurement.timestamp);
        if measurement.is_success() {
            shared.last_valid_measurement = Some(measurement.clone());
        }
        shared.last_measurement = Some(measurement.clone());

        let summary = RecordSummary::of(&measurement);
        let added = shared.buffer.add(measurement);
        let evicted = added.evicted().map(|m| m.timestamp);

        let flush = match added.into_flush_slice() {
            Some(slice) => {
                let mut batch: Vec<Measurement<R>> = shared.retry_queue.drain(..).collect();
                batch.extend(slice);
                shared.buffer.mark_flushed();
                Some(batch)
            }
            None => None,
        };

        Some(Recorded {
            step,
            summary,
            retry_count: shared.state.retry_count(),
            size: shared.buffer.size(),
            evicted,
            flush,
        })
    }

    fn publish(&self, recorded: Recorded<R>) -> Option<Vec<Measurement<R>>> {
        let Recorded {
            step,
            summary,
            retry_count,
            size,
            evicted,
            flush,
        } = recorded;

        if let Some(transition) = step.transition {
            self.status_changed(transition);
        }

        if step.fault_started {
            warn!(device = %self.address, "Device reported a fault");
            self.events.publish(PollerEvent::DeviceFault {
                device: self.address,
                timestamp: summary.timestamp,
            });
            self.notify(NotifyMessage::warning(
                "Device fault",
                format!("{} reported an error in its response", self.address),
            ));
        }

        self.events.publish(PollerEvent::MeasurementAdded {
            device: self.address,
            record: summary,
            retry_count,
        });
        self.events.publish(PollerEvent::BufferChanged {
            device: self.address,
            size,
            evicted,
        });

        flush
    }

    fn status_changed(&self, (from, to): (PollerStatus, PollerStatus)) {
        let retry_count = self.lock().state.retry_count();

        self.events.publish(PollerEvent::StatusChanged {
            device: self.address,
            from,
            to,
            retry_count,
        });

        match (from, to) {
            (_, PollerStatus::Backoff) => {
                let backoff = self.lock().state.policy().backoff_interval;
                warn!(device = %self.address, backoff = ?backoff, "Device unreachable, backing off");
                self.notify(NotifyMessage::warning(
                    "Device unreachable",
                    format!("{} did not respond, retrying every {}s", self.address, backoff.as_secs()),
                ));
            }
            (_, PollerStatus::Aborted) => {
                error!(device = %self.address, retry_count, "Polling aborted after repeated failures");
                self.notify(NotifyMessage::error(
                    "Polling aborted",
                    format!("{} failed {} times in a row, polling stopped", self.address, retry_count),
                ));
            }
            (PollerStatus::Backoff, PollerStatus::Fetching) => {
                info!(device = %self.address, "Connection restored");
                self.notify(NotifyMessage::info(
                    "Connection restored",
                    format!("{} is responding again", self.address),
                ));
            }
            _ => {
                debug!(device = %self.address, from = %from, to = %to, "Poller status changed");
            }
        }
    }

    /// 先等在途落库及其重新入队结束，再取出待写记录；写完才释放落库锁
    async fn drain(&self) {
        let guard = self.flush_lock.lock().await;

        let batch = {
            let mut shared = self.lock();
            let mut batch: Vec<Measurement<R>> = shared.retry_queue.drain(..).collect();
            batch.extend(shared.buffer.current_slice());
            shared.buffer.mark_flushed();
            batch
        };

        if batch.is_empty() {
            return;
        }

        info!(device = %self.address, count = batch.len(), "Draining pending measurements");
        self.flush_locked(&guard, batch).await;
    }

    async fn flush(&self, batch: Vec<Measurement<R>>) {
        let guard = self.flush_lock.lock().await;
        self.flush_locked(&guard, batch).await;
    }

    async fn flush_locked(&self, _guard: &tokio::sync::MutexGuard<'_, ()>, batch: Vec<Measurement<R>>) {
        let written = self.sink.write_batch(&self.address, &batch).await;
        match written {
            Ok(report) => {
                if report.is_complete() {
                    debug!(device = %self.address, written = report.written, "Flush completed");
                } else {
                    warn!(
                        device = %self.address,
                        written = report.written,
                        failed = report.failed,
                        "Flush completed with row failures"
                    );
                    self.notify(NotifyMessage::warning(
                        "Measurements not saved",
                        format!("{} of {} rows from {} could not be saved", report.failed, report.total(), self.address),
                    ));
                }
                self.events.publish(PollerEvent::FlushCompleted {
                    device: self.address,
                    report,
                });
            }
            Err(e) => {
                let pending = self.requeue(batch);
                error!(device = %self.address, pending, error = %e, "Flush failed, measurements kept for retry");
                self.events.publish(PollerEvent::FlushFailed {
                    device: self.address,
                    pending,
                    error: e.to_string(),
                });
                self.notify(NotifyMessage::error(
                    "Saving measurements failed",
                    format!("{}: {}", self.address, e),
                ));
            }
        }
    }

    /// 失败批次放回重试队列队首，超过上限时丢弃最旧的记录
    fn requeue(&self, batch: Vec<Measurement<R>>) -> usize {
        let mut shared = self.lock();
        for measurement in batch.into_iter().rev() {
            shared.retry_queue.push_front(measurement);
        }

        let mut dropped = 0usize;
        while shared.retry_queue.len() > self.retry_queue_limit {
            shared.retry_queue.pop_front();
            dropped += 1;
        }
        if dropped > 0 {
            error!(device = %self.address, dropped, "Retry queue full, oldest measurements dropped");
        }

        shared.retry_queue.len()
    }

    fn notify(&self, message: NotifyMessage) {
        if let Some(notify) = &self.notify {
            notify.dispatch(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use labpoll_core::EventBus;
    use labpoll_store::{BatchReport, StoreError};
    use labpoll_types::{DeviceKind, SmartProReading};
    use sea_orm::DbErr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::broadcast;
    use tokio::time::Instant;

    type Fetched = Result<Decoded<SmartProReading>, FetchError>;

    struct ScriptedSource {
        script: Mutex<VecDeque<Fetched>>,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<Fetched>) -> Arc<Self> {
            Arc::new(Self {
                script: Mutex::new(script.into()),
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MeasurementSource<SmartProReading> for ScriptedSource {
        async fn fetch(&self) -> Fetched {
            self.calls.lock().unwrap().push(Instant::now());
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Decoded::ok(SmartProReading::new(true, 2000))))
        }
    }

    /// 第一次请求挂起，直到测试放行
    struct GatedSource {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
    }

    #[async_trait]
    impl MeasurementSource<SmartProReading> for GatedSource {
        async fn fetch(&self) -> Fetched {
            self.entered.notify_one();
            self.release.notified().await;
            Ok(Decoded::ok(SmartProReading::new(true, 1)))
        }
    }

    #[derive(Default)]
    struct RecordingSink {
        batches: Mutex<Vec<Vec<Measurement<SmartProReading>>>>,
        failures: AtomicUsize,
    }

    impl RecordingSink {
        fn failing(times: usize) -> Arc<Self> {
            let sink = Self::default();
            sink.failures.store(times, Ordering::SeqCst);
            Arc::new(sink)
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().iter().map(Vec::len).collect()
        }
    }

    #[async_trait]
    impl MeasurementSink<SmartProReading> for RecordingSink {
        async fn write_batch(
            &self,
            _device: &DeviceAddress,
            batch: &[Measurement<SmartProReading>],
        ) -> labpoll_store::Result<BatchReport> {
            if self.failures.load(Ordering::SeqCst) > 0 {
                self.failures.fetch_sub(1, Ordering::SeqCst);
                return Err(StoreError::Transaction(DbErr::Custom("database is locked".into())));
            }
            self.batches.lock().unwrap().push(batch.to_vec());
            Ok(BatchReport {
                written: batch.len(),
                failed: 0,
            })
        }
    }

    /// 第一次写入挂起直到测试放行，可选择让这次写入失败
    #[derive(Default)]
    struct GatedSink {
        entered: tokio::sync::Notify,
        release: tokio::sync::Notify,
        gated: AtomicUsize,
        fail_gated: bool,
        batches: Mutex<Vec<usize>>,
    }

    impl GatedSink {
        fn new(fail_gated: bool) -> Arc<Self> {
            let sink = Self {
                fail_gated,
                ..Self::default()
            };
            sink.gated.store(1, Ordering::SeqCst);
            Arc::new(sink)
        }

        fn batch_sizes(&self) -> Vec<usize> {
            self.batches.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MeasurementSink<SmartProReading> for GatedSink {
        async fn write_batch(
            &self,
            _device: &DeviceAddress,
            batch: &[Measurement<SmartProReading>],
        ) -> labpoll_store::Result<BatchReport> {
            if self.gated.swap(0, Ordering::SeqCst) > 0 {
                self.entered.notify_one();
                self.release.notified().await;
                if self.fail_gated {
                    return Err(StoreError::Transaction(DbErr::Custom("disk I/O error".into())));
                }
            }
            self.batches.lock().unwrap().push(batch.len());
            Ok(BatchReport {
                written: batch.len(),
                failed: 0,
            })
        }
    }

    fn device(refresh_rate: u32) -> Device {
        Device::new(
            DeviceAddress::new("127.0.0.1".parse().unwrap(), 56000),
            DeviceKind::SmartPro,
        )
        .with_refresh_rate(refresh_rate)
    }

    fn settings(capacity: usize) -> PollerSettings {
        PollerSettings {
            buffer_capacity: capacity,
            ..PollerSettings::default()
        }
    }

    fn create_poller(
        source: Arc<dyn MeasurementSource<SmartProReading>>,
        sink: Arc<dyn MeasurementSink<SmartProReading>>,
        capacity: usize,
    ) -> (Poller<SmartProReading>, broadcast::Receiver<PollerEvent>) {
        let events = Arc::new(EventBus::new(1024));
        let rx = events.subscribe();
        let poller = Poller::new(device(1), source, sink, settings(capacity), events, None).unwrap();
        (poller, rx)
    }

    fn network_error() -> Fetched {
        Err(FetchError::Status(503))
    }

    async fn wait_for(
        rx: &mut broadcast::Receiver<PollerEvent>,
        pred: impl Fn(&PollerEvent) -> bool,
    ) -> PollerEvent {
        loop {
            let event = rx.recv().await.unwrap();
            if pred(&event) {
                return event;
            }
        }
    }

    async fn wait_for_records(rx: &mut broadcast::Receiver<PollerEvent>, n: usize) -> Vec<u32> {
        let mut retries = Vec::new();
        while retries.len() < n {
            if let PollerEvent::MeasurementAdded { retry_count, .. } = rx.recv().await.unwrap() {
                retries.push(retry_count);
            }
        }
        retries
    }

    fn assert_gap(calls: &[Instant], index: usize, expected_secs: u64) {
        let gap = calls[index] - calls[index - 1];
        let expected = Duration::from_secs(expected_secs);
        assert!(
            gap >= expected && gap < expected + Duration::from_millis(50),
            "gap {} was {:?}, expected {:?}",
            index,
            gap,
            expected
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_then_recovery() {
        let source = ScriptedSource::new(vec![network_error(), network_error(), network_error()]);
        let sink = Arc::new(RecordingSink::default());
        let (poller, mut rx) = create_poller(source.clone(), sink, 60);

        assert!(poller.start());
        assert_eq!(poller.retry_count(), 0);

        let retries = wait_for_records(&mut rx, 5).await;
        assert_eq!(retries, vec![1, 2, 3, 0, 0]);

        let calls = source.calls();
        assert_gap(&calls, 1, 5);
        assert_gap(&calls, 2, 5);
        assert_gap(&calls, 3, 5);
        assert_gap(&calls, 4, 1);

        let snapshot = poller.snapshot();
        assert_eq!(snapshot.status, PollerStatus::Fetching);
        assert!(snapshot.last_valid_measurement.is_some());
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_aborts_after_max_retries() {
        let source = ScriptedSource::new((0..20).map(|_| network_error()).collect());
        let sink = Arc::new(RecordingSink::default());
        let (poller, mut rx) = create_poller(source.clone(), sink, 60);

        poller.start();
        wait_for(&mut rx, |e| {
            matches!(e, PollerEvent::StatusChanged { to: PollerStatus::Aborted, .. })
        })
        .await;

        assert_eq!(poller.status(), PollerStatus::Aborted);
        assert_eq!(poller.retry_count(), 5);
        assert_eq!(source.calls().len(), 5);
        // 第 5 条记录的事件在状态变化之后发布
        assert_eq!(wait_for_records(&mut rx, 1).await, vec![5]);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(source.calls().len(), 5);

        // 显式重启
        assert!(poller.start());
        assert_eq!(poller.retry_count(), 0);
        wait_for_records(&mut rx, 1).await;
        assert_eq!(source.calls().len(), 6);
        poller.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_every_capacity_records() {
        let source = ScriptedSource::new(Vec::new());
        let sink = Arc::new(RecordingSink::default());
        let (poller, mut rx) = create_poller(source, sink.clone(), 3);

        poller.start();
        for _ in 0..2 {
            wait_for(&mut rx, |e| matches!(e, PollerEvent::FlushCompleted { .. })).await;
        }
        poller.stop().await;

        let sizes = sink.batch_sizes();
        assert_eq!(&sizes[..2], &[3, 3]);
        assert!(poller.snapshot().buffer_size() <= 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transaction_failure_is_retried_with_next_flush() {
        let source = ScriptedSource::new(Vec::new());
        let sink = RecordingSink::failing(1);
        let (poller, mut rx) = create_poller(source, sink.clone(), 2);

        poller.start();
        let failed = wait_for(&mut rx, |e| matches!(e, PollerEvent::FlushFailed { .. })).await;
        assert!(matches!(failed, PollerEvent::FlushFailed { pending: 2, .. }));

        wait_for(&mut rx, |e| matches!(e, PollerEvent::FlushCompleted { .. })).await;
        poller.stop().await;

        let batches = sink.batches.lock().unwrap().clone();
        assert_eq!(batches[0].len(), 4);
        let timestamps: Vec<_> = batches[0].iter().map(|m| m.timestamp).collect();
        let mut sorted = timestamps.clone();
        sorted.sort();
        assert_eq!(timestamps, sorted);
        assert_eq!(poller.snapshot().pending_retry, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_drains_pending_slice() {
        let source = ScriptedSource::new(Vec::new());
        let sink = Arc::new(RecordingSink::default());
        let (poller, mut rx) = create_poller(source, sink.clone(), 10);

        poller.start();
        wait_for_records(&mut rx, 4).await;
        assert!(poller.stop().await);
        assert!(!poller.stop().await);

        assert_eq!(sink.batch_sizes(), vec![4]);
        assert_eq!(poller.status(), PollerStatus::Ready);

        // 已落库的记录不会再次写入
        poller.drain().await;
        assert_eq!(sink.batch_sizes(), vec![4]);
        assert_eq!(poller.snapshot().buffer_size(), 4);
    }

    #[tokio::test]
    async fn test_late_result_after_stop_is_discarded() {
        let source = Arc::new(GatedSource {
            entered: tokio::sync::Notify::new(),
            release: tokio::sync::Notify::new(),
        });
        let sink = Arc::new(RecordingSink::default());
        let (poller, _rx) = create_poller(source.clone(), sink.clone(), 10);

        poller.start();
        source.entered.notified().await;
        poller.stop().await;
        source.release.notify_one();

        for _ in 0..20 {
            tokio::task::yield_now().await;
        }

        let snapshot = poller.snapshot();
        assert_eq!(snapshot.status, PollerStatus::Ready);
        assert!(snapshot.last_measurement.is_none());
        assert_eq!(snapshot.buffer_size(), 0);
        assert!(sink.batch_sizes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_device_fault_reported_once_per_episode() {
        let fault = || -> Fetched { Ok(Decoded::fault(SmartProReading::new(true, 0))) };
        let source = ScriptedSource::new(vec![
            Ok(Decoded::ok(SmartProReading::new(true, 2100))),
            fault(),
            fault(),
        ]);
        let sink = Arc::new(RecordingSink::default());
        let (poller, mut rx) = create_poller(source, sink, 60);

        poller.start();
        let mut faults = 0;
        let mut records = 0;
        while records < 4 {
            match rx.recv().await.unwrap() {
                PollerEvent::DeviceFault { .. } => faults += 1,
                PollerEvent::MeasurementAdded { .. } => records += 1,
                _ => {}
            }
        }
        assert_eq!(faults, 1);

        let snapshot = poller.snapshot();
        assert_eq!(snapshot.status, PollerStatus::Fetching);
        assert_eq!(snapshot.retry_count, 0);
        assert_eq!(
            snapshot.last_valid_measurement.unwrap().reading,
            SmartProReading::new(true, 2000)
        );
        poller.stop().await;
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let events = Arc::new(EventBus::new(16));
        let result = Poller::<SmartProReading>::new(
            device(1),
            ScriptedSource::new(Vec::new()),
            Arc::new(RecordingSink::default()),
            settings(0),
            events,
            None,
        );
        assert!(matches!(result, Err(CoreError::InvalidCapacity(0))));
    }

    #[tokio::test]
    async fn test_stop_waits_for_in_flight_flush() {
        let sink = GatedSink::new(false);
        let (poller, _rx) = create_poller(ScriptedSource::new(Vec::new()), sink.clone(), 1);

        poller.start();
        sink.entered.notified().await;

        let stopping = tokio::spawn({
            let poller = poller.clone();
            async move { poller.stop().await }
        });
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!stopping.is_finished());

        sink.release.notify_one();
        assert!(stopping.await.unwrap());
        assert_eq!(sink.batch_sizes(), vec![1]);
    }

    #[tokio::test]
    async fn test_stop_drains_batch_requeued_by_in_flight_flush() {
        let sink = GatedSink::new(true);
        let (poller, _rx) = create_poller(ScriptedSource::new(Vec::new()), sink.clone(), 1);

        poller.start();
        sink.entered.notified().await;

        let stopping = tokio::spawn({
            let poller = poller.clone();
            async move { poller.stop().await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        sink.release.notify_one();
        assert!(stopping.await.unwrap());

        // 失败的批次重新入队后由停止时的落库写出
        assert_eq!(sink.batch_sizes(), vec![1]);
        assert_eq!(poller.snapshot().pending_retry, 0);
    }
}
