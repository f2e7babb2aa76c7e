//! 重连策略：为传输类失败生成退避延迟序列。
//!
//! ## 契约说明（What）
//! - [`ReconnectionPolicy::new_schedule`] 每次调用返回一个全新的 [`ReconnectionSchedule`]，
//!   每个连接槽位独占一份，互不影响；
//! - `next_delay` 返回 `None` 表示放弃；认证失败从不进入重连流程，调用方只对
//!   `ErrorCategory::Transport` 的错误消费本序列。

use std::{fmt, time::Duration};

use corvid_core::config::ReconnectionOptions;

/// 重连策略。
pub trait ReconnectionPolicy: Send + Sync + fmt::Debug {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule>;
}

/// 一次重连过程中的延迟序列。
pub trait ReconnectionSchedule: Send {
    fn next_delay(&mut self) -> Option<Duration>;
}

/// 固定间隔重连。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ConstantReconnectionPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl ConstantReconnectionPolicy {
    pub const fn new(delay: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            delay,
            max_attempts,
        }
    }

    pub const fn delay(&self) -> Duration {
        self.delay
    }
}

impl ReconnectionPolicy for ConstantReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ConstantSchedule {
            delay: self.delay,
            remaining: self.max_attempts,
        })
    }
}

struct ConstantSchedule {
    delay: Duration,
    remaining: Option<u32>,
}

impl ReconnectionSchedule for ConstantSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        take_attempt(&mut self.remaining)?;
        Some(self.delay)
    }
}

/// 指数退避重连：延迟从 `base` 起每次翻倍，封顶于 `max`。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 节点短暂不可达时快速重试，持续不可达时逐步拉长间隔，避免连接风暴；
///
/// ## 契约 (What)
/// - 序列单调不减且每一项不超过 `max`；
/// - `max_attempts` 为 `Some(n)` 时序列恰好产生 `n` 项后结束。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExponentialReconnectionPolicy {
    base: Duration,
    max: Duration,
    max_attempts: Option<u32>,
}

impl ExponentialReconnectionPolicy {
    /// `base` 大于 `max` 时以 `max` 为准。
    pub fn new(base: Duration, max: Duration, max_attempts: Option<u32>) -> Self {
        Self {
            base: base.min(max),
            max,
            max_attempts,
        }
    }

    pub const fn base_delay(&self) -> Duration {
        self.base
    }

    pub const fn max_delay(&self) -> Duration {
        self.max
    }
}

impl From<&ReconnectionOptions> for ExponentialReconnectionPolicy {
    fn from(options: &ReconnectionOptions) -> Self {
        Self::new(
            options.base_delay(),
            options.max_delay(),
            options.max_attempts,
        )
    }
}

impl ReconnectionPolicy for ExponentialReconnectionPolicy {
    fn new_schedule(&self) -> Box<dyn ReconnectionSchedule> {
        Box::new(ExponentialSchedule {
            next: self.base,
            max: self.max,
            remaining: self.max_attempts,
        })
    }
}

struct ExponentialSchedule {
    next: Duration,
    max: Duration,
    remaining: Option<u32>,
}

impl ReconnectionSchedule for ExponentialSchedule {
    fn next_delay(&mut self) -> Option<Duration> {
        take_attempt(&mut self.remaining)?;
        let current = self.next;
        self.next = current.saturating_mul(2).min(self.max);
        Some(current)
    }
}

fn take_attempt(remaining: &mut Option<u32>) -> Option<()> {
    match remaining {
        None => Some(()),
        Some(0) => None,
        Some(left) => {
            *left -= 1;
            Some(())
        }
    }
}
