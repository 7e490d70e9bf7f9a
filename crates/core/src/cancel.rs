//! 处理中止
//!
//! 扫描和写入逐页检查；标志被置位或超过截止时间后返回 `CoreError::Cancelled`。

use crate::{CoreError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 超过 `timeout` 后视为已中止
    pub fn with_deadline(timeout: Duration) -> Self {
        Self {
            flag: Arc::default(),
            deadline: Instant::now().checked_add(timeout),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed) || self.deadline.is_some_and(|deadline| Instant::now() >= deadline)
    }

    pub fn check(&self) -> Result<()> {
        if self.is_cancelled() {
            return Err(CoreError::Cancelled);
        }
        Ok(())
    }
}
