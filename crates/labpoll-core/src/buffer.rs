//! 测量缓冲区
//!
//! 同一个结构承担两件事：
//! - 最近 N 条记录的滚动显示窗口
//! - 每插入 N 条产生一次落库信号，并给出尚未落库的切片
//!
//! 落库信号通过 [`MeasurementBuffer::add`] 的返回值显式给出，
//! 调用方同步决定何时写库，不存在隐藏的回调重入。

use crate::error::{CoreError, Result};
use std::collections::VecDeque;

/// 默认容量
pub const DEFAULT_CAPACITY: usize = 60;

/// 一次插入的结果
#[derive(Debug, Clone, PartialEq)]
pub enum AddOutcome<T> {
    /// 已插入
    Inserted { evicted: Option<T> },
    /// 已插入，且计数到达容量，`slice` 为需要落库的记录
    InsertedAndFlushDue { evicted: Option<T>, slice: Vec<T> },
}

impl<T> AddOutcome<T> {
    pub fn is_flush_due(&self) -> bool {
        matches!(self, AddOutcome::InsertedAndFlushDue { .. })
    }

    /// 因窗口已满被挤出的最旧记录
    pub fn evicted(&self) -> Option<&T> {
        match self {
            AddOutcome::Inserted { evicted } | AddOutcome::InsertedAndFlushDue { evicted, .. } => {
                evicted.as_ref()
            }
        }
    }

    pub fn into_flush_slice(self) -> Option<Vec<T>> {
        match self {
            AddOutcome::Inserted { .. } => None,
            AddOutcome::InsertedAndFlushDue { slice, .. } => Some(slice),
        }
    }
}

/// 有界 FIFO 测量缓冲区
#[derive(Debug, Clone)]
pub struct MeasurementBuffer<T> {
    items: VecDeque<T>,
    capacity: usize,
    /// 自上次落库信号以来的插入次数，范围 [0, capacity)
    count: usize,
    overflowed_once: bool,
    /// 刚触发过落库信号且尚未确认
    signalled: bool,
}

impl<T: Clone> MeasurementBuffer<T> {
    /// 创建缓冲区，容量必须大于 0
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(CoreError::InvalidCapacity(capacity));
        }

        Ok(Self {
            items: VecDeque::with_capacity(capacity + 1),
            capacity,
            count: 0,
            overflowed_once: false,
            signalled: false,
        })
    }

    /// 插入一条记录
    ///
    /// 首次溢出之后，长度超过容量时淘汰队首，保持长度不超过容量
    pub fn add(&mut self, item: T) -> AddOutcome<T> {
        self.items.push_back(item);
        self.signalled = false;

        let evicted = if self.overflowed_once && self.items.len() > self.capacity {
            self.items.pop_front()
        } else {
            None
        };

        self.count += 1;
        if self.count < self.capacity {
            return AddOutcome::Inserted { evicted };
        }

        let slice = self.tail(self.capacity);
        self.count = 0;
        self.overflowed_once = true;
        self.signalled = true;

        AddOutcome::InsertedAndFlushDue { evicted, slice }
    }

    /// 尚未落库的记录
    ///
    /// 从未溢出时返回整个队列；否则只返回上次落库信号之后插入的记录。
    /// 紧接在落库信号之后（下一次插入之前）返回该信号对应的整窗记录。
    pub fn current_slice(&self) -> Vec<T> {
        if !self.overflowed_once {
            return self.items.iter().cloned().collect();
        }

        if self.signalled {
            self.tail(self.capacity)
        } else {
            self.tail(self.count)
        }
    }

    /// 确认当前待落库切片已持久化
    ///
    /// 之后 `current_slice` 只返回此后插入的记录
    pub fn mark_flushed(&mut self) {
        self.count = 0;
        self.overflowed_once = true;
        self.signalled = false;
    }

    pub fn size(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn overflowed_once(&self) -> bool {
        self.overflowed_once
    }

    pub fn latest(&self) -> Option<&T> {
        self.items.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter()
    }

    /// 滚动显示窗口的拷贝
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }

    fn tail(&self, n: usize) -> Vec<T> {
        let skip = self.items.len().saturating_sub(n);
        self.items.iter().skip(skip).cloned().collect()
    }
}

impl<T: Clone> Default for MeasurementBuffer<T> {
    fn default() -> Self {
        Self {
            items: VecDeque::with_capacity(DEFAULT_CAPACITY + 1),
            capacity: DEFAULT_CAPACITY,
            count: 0,
            overflowed_once: false,
            signalled: false,
        }
    }
}
