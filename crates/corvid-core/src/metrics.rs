//! 驱动指标：错误计数器与连接规模量表。
//!
//! ## 契约说明（What）
//! - 计数器单调递增，仅提供 `record_*` 写入口，不提供重置；
//! - `authentication_errors`：每条握手以 `FAILED_AUTH` 结束的连接累加一次，
//!   认证失败不重试，因此不存在“按重试次数”重复计数；
//! - 所有方法只做原子操作，可在任意任务中调用。

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// 错误类计数器。
#[derive(Debug, Default)]
pub struct ErrorMetrics {
    authentication_errors: AtomicU64,
    connection_errors: AtomicU64,
    handshake_timeouts: AtomicU64,
    heartbeat_failures: AtomicU64,
}

impl ErrorMetrics {
    pub fn record_authentication_error(&self) {
        self.authentication_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_handshake_timeout(&self) {
        self.handshake_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_heartbeat_failure(&self) {
        self.heartbeat_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn authentication_errors(&self) -> u64 {
        self.authentication_errors.load(Ordering::Relaxed)
    }

    pub fn connection_errors(&self) -> u64 {
        self.connection_errors.load(Ordering::Relaxed)
    }

    pub fn handshake_timeouts(&self) -> u64 {
        self.handshake_timeouts.load(Ordering::Relaxed)
    }

    pub fn heartbeat_failures(&self) -> u64 {
        self.heartbeat_failures.load(Ordering::Relaxed)
    }
}

/// 集群实例级别的指标汇总。
#[derive(Debug, Default)]
pub struct Metrics {
    errors: ErrorMetrics,
    open_connections: AtomicUsize,
    known_hosts: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error_metrics(&self) -> &ErrorMetrics {
        &self.errors
    }

    pub fn connection_opened(&self) {
        self.open_connections.fetch_add(1, Ordering::Relaxed);
    }

    /// 连接关闭；量表在 0 处饱和，不会下溢。
    pub fn connection_closed(&self) {
        let _ = self
            .open_connections
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |current| {
                Some(current.saturating_sub(1))
            });
    }

    pub fn open_connections(&self) -> usize {
        self.open_connections.load(Ordering::Relaxed)
    }

    pub fn set_known_hosts(&self, count: usize) {
        self.known_hosts.store(count, Ordering::Relaxed);
    }

    pub fn known_hosts(&self) -> usize {
        self.known_hosts.load(Ordering::Relaxed)
    }

    /// 导出当前读数。
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            authentication_errors: self.errors.authentication_errors(),
            connection_errors: self.errors.connection_errors(),
            handshake_timeouts: self.errors.handshake_timeouts(),
            heartbeat_failures: self.errors.heartbeat_failures(),
            open_connections: self.open_connections(),
            known_hosts: self.known_hosts(),
        }
    }
}

/// 指标的只读快照。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub authentication_errors: u64,
    pub connection_errors: u64,
    pub handshake_timeouts: u64,
    pub heartbeat_failures: u64,
    pub open_connections: usize,
    pub known_hosts: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_connections_saturates_at_zero() {
        let metrics = Metrics::new();
        metrics.connection_closed();
        assert_eq!(metrics.open_connections(), 0);

        metrics.connection_opened();
        metrics.connection_opened();
        metrics.connection_closed();
        assert_eq!(metrics.open_connections(), 1);
    }

    #[test]
    fn snapshot_reflects_counters() {
        let metrics = Metrics::new();
        metrics.error_metrics().record_authentication_error();
        metrics.error_metrics().record_handshake_timeout();
        metrics.set_known_hosts(3);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.authentication_errors, 1);
        assert_eq!(snapshot.handshake_timeouts, 1);
        assert_eq!(snapshot.connection_errors, 0);
        assert_eq!(snapshot.known_hosts, 3);
    }
}
