//! # pool：单主机连接池的生命周期
//!
//! ## 核心意图（Why）
//! - 为一个主机建立 `core_connections_per_host` 条已认证连接，或者干净地放弃；
//! - 凭证被拒属于主机级条件：同样的凭证重试不会成功，因此首个 `FAILED_AUTH` 立即中止整次填充，
//!   而不是当作单条连接的偶发故障。
//!
//! ## 行为契约（What）
//! - 先建立一条探测连接；探测失败（认证被拒，或传输故障在重连序列耗尽后仍未恢复）时池直接中止，
//!   其余槽位从未启动；
//! - 探测成功后并发填充剩余槽位；任一槽位认证被拒即发出中止信号，仍在连接或退避中的槽位立刻放弃，
//!   已打开的连接在中止清理中一并关闭；
//! - 中止时输出一条 `warn!` 记录，包含主机地址、认证错误文案与错误短名，状态进入 `ABORTED`；
//! - 传输故障按重连策略在槽位内重试，单次发生不会中止整个池。
//!
//! ## 风险提示（Trade-offs）
//! - 探测成功后若剩余槽位全部因传输故障放弃，池仍以较少的连接进入 `READY`；补齐交给后续的重建。

use std::sync::{
    Arc,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use corvid_core::{DriverError, Endpoint, Result, status::PoolState};
use futures::{StreamExt, stream::FuturesUnordered};
use parking_lot::{Mutex, RwLock};
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::{connection::Connection, factory::ConnectionFactory};

/// 单次填充内共享的中止信号：标志位记录状态，`Notify` 唤醒正在等待的槽位。
#[derive(Debug, Default)]
struct AbortSignal {
    raised: AtomicBool,
    notify: Notify,
}

impl AbortSignal {
    fn raise(&self) {
        self.raised.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    /// 信号已发出时立即完成，否则等待 [`AbortSignal::raise`]。
    async fn raised(&self) {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // 先登记等待者再检查标志，避免错过两者之间的 `notify_waiters`。
        notified.as_mut().enable();
        if self.raised.load(Ordering::Acquire) {
            return;
        }
        notified.await;
    }
}

/// 一个主机的连接池。
#[derive(Debug)]
pub struct HostConnectionPool {
    host: Endpoint,
    factory: Arc<ConnectionFactory>,
    connections: RwLock<Vec<Arc<Connection>>>,
    state: Mutex<PoolState>,
    next: AtomicUsize,
}

impl HostConnectionPool {
    pub fn new(host: Endpoint, factory: Arc<ConnectionFactory>) -> Self {
        Self {
            host,
            factory,
            connections: RwLock::new(Vec::new()),
            state: Mutex::new(PoolState::Initializing),
            next: AtomicUsize::new(0),
        }
    }

    pub fn host(&self) -> Endpoint {
        self.host
    }

    pub fn state(&self) -> PoolState {
        *self.state.lock()
    }

    /// 仍处于就绪状态的连接数。
    pub fn open_connections(&self) -> usize {
        self.connections
            .read()
            .iter()
            .filter(|connection| connection.is_ready())
            .count()
    }

    /// 填充连接池。
    ///
    /// # 契约 (What)
    /// - 成功：状态为 `READY`，至少持有一条就绪连接；
    /// - 失败：状态为 `ABORTED`，本次打开的连接全部关闭，返回导致中止的原始错误。
    pub async fn initialize(&self) -> Result<()> {
        let core = self.factory.pooling().core_connections_per_host.max(1);
        let abort = AbortSignal::default();
        let mut opened = Vec::with_capacity(core);

        match self.open_slot(&abort).await {
            Ok(connection) => opened.push(connection),
            Err(err) => return Err(self.abort(opened, err).await),
        }

        let mut in_flight: FuturesUnordered<_> =
            (1..core).map(|_| self.open_slot(&abort)).collect();
        let mut first_failure: Option<DriverError> = None;
        while let Some(outcome) = in_flight.next().await {
            match outcome {
                Ok(connection) => opened.push(connection),
                Err(err) if err.is_authentication_terminal() => {
                    abort.raise();
                    first_failure.get_or_insert(err);
                }
                Err(err) => {
                    debug!(host = %self.host, error.kind = err.short_name(), "pool slot gave up: {err}");
                }
            }
        }
        drop(in_flight);

        if let Some(err) = first_failure {
            return Err(self.abort(opened, err).await);
        }

        let count = opened.len();
        *self.connections.write() = opened;
        {
            let mut state = self.state.lock();
            if *state == PoolState::Initializing {
                *state = PoolState::Ready;
            }
        }
        info!(host = %self.host, connections = count, target = core, "connection pool ready");
        Ok(())
    }

    /// 为一个槽位建立连接；传输故障按重连序列重试，认证失败时立即返回。
    ///
    /// 连接尝试与退避等待都与中止信号竞争，池一旦中止，槽位不再等待。
    async fn open_slot(&self, abort: &AbortSignal) -> Result<Arc<Connection>> {
        let mut schedule = self.factory.reconnection_policy().new_schedule();
        loop {
            let attempt = tokio::select! {
                biased;
                () = abort.raised() => return Err(self.aborted_error()),
                attempt = self.factory.open(self.host) => attempt,
            };
            let err = match attempt {
                Ok(connection) => return Ok(connection),
                Err(err) => err,
            };
            if !err.category().is_reconnectable() {
                return Err(err);
            }
            match schedule.next_delay() {
                Some(delay) => {
                    debug!(
                        host = %self.host,
                        delay_ms = delay.as_millis() as u64,
                        "retrying pool slot after transport failure: {err}"
                    );
                    tokio::select! {
                        biased;
                        () = abort.raised() => return Err(err),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                None => return Err(err),
            }
        }
    }

    fn aborted_error(&self) -> DriverError {
        DriverError::transport(self.host, "pool creation aborted")
    }

    async fn abort(&self, opened: Vec<Arc<Connection>>, err: DriverError) -> DriverError {
        for connection in opened {
            connection.close().await;
        }
        *self.state.lock() = PoolState::Aborted;
        warn!(
            host = %self.host,
            error.kind = err.short_name(),
            "Error creating pool to {} [{}]: {}",
            self.host,
            err.short_name(),
            err
        );
        err
    }

    /// 轮询取出一条就绪连接。
    pub fn borrow_connection(&self) -> Result<Arc<Connection>> {
        if self.state() != PoolState::Ready {
            return Err(DriverError::transport(
                self.host,
                format!("pool is {:?}", self.state()),
            ));
        }
        let connections = self.connections.read();
        let len = connections.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        (0..len)
            .map(|offset| &connections[(start + offset) % len])
            .find(|connection| connection.is_ready())
            .cloned()
            .ok_or_else(|| DriverError::transport(self.host, "no ready connection in pool"))
    }

    /// 关闭池内全部连接。
    pub async fn close(&self) {
        *self.state.lock() = PoolState::Closed;
        let connections = std::mem::take(&mut *self.connections.write());
        for connection in connections {
            connection.close().await;
        }
        debug!(host = %self.host, "connection pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reconnection::ConstantReconnectionPolicy, test_support::ScriptedChannel};
    use async_trait::async_trait;
    use corvid_core::{
        Metrics,
        auth::PlainTextAuthProvider,
        config::{PoolingOptions, SocketOptions},
        protocol::{Response, error_codes, mechanisms::PASSWORD_AUTHENTICATOR},
        transport::{Connector, FrameChannel},
    };
    use std::{
        collections::VecDeque,
        sync::atomic::AtomicUsize,
        time::Duration,
    };

    /// 按顺序发放预置通道；每次连接尝试都会计数。
    #[derive(Debug)]
    struct QueueConnector {
        channels: Mutex<VecDeque<Option<Arc<ScriptedChannel>>>>,
        attempts: AtomicUsize,
    }

    #[async_trait]
    impl Connector for QueueConnector {
        async fn connect(
            &self,
            endpoint: Endpoint,
            _options: &SocketOptions,
        ) -> Result<Arc<dyn FrameChannel>> {
            self.attempts.fetch_add(1, Ordering::Relaxed);
            match self.channels.lock().pop_front().flatten() {
                Some(channel) => Ok(channel),
                None => Err(DriverError::transport(endpoint, "connection refused")),
            }
        }
    }

    fn host() -> Endpoint {
        "127.0.0.1:9042".parse().expect("endpoint")
    }

    fn accepting() -> Arc<ScriptedChannel> {
        ScriptedChannel::new(
            host(),
            vec![
                Response::Authenticate {
                    mechanism: PASSWORD_AUTHENTICATOR.to_owned(),
                },
                Response::AuthSuccess { token: None },
            ],
        )
    }

    fn rejecting() -> Arc<ScriptedChannel> {
        ScriptedChannel::new(
            host(),
            vec![
                Response::Authenticate {
                    mechanism: PASSWORD_AUTHENTICATOR.to_owned(),
                },
                Response::Error {
                    code: error_codes::BAD_CREDENTIALS,
                    message: "bad credentials".into(),
                },
            ],
        )
    }

    fn pool(
        core: usize,
        channels: Vec<Option<Arc<ScriptedChannel>>>,
        retries: u32,
    ) -> (HostConnectionPool, Arc<QueueConnector>, Arc<Metrics>) {
        let connector = Arc::new(QueueConnector {
            channels: Mutex::new(channels.into()),
            attempts: AtomicUsize::new(0),
        });
        let metrics = Arc::new(Metrics::new());
        let factory = ConnectionFactory::new(
            connector.clone(),
            Arc::new(PlainTextAuthProvider::new("cassandra", "cassandra")),
            SocketOptions::default(),
            PoolingOptions::default().with_core_connections_per_host(core),
            Arc::new(ConstantReconnectionPolicy::new(
                Duration::from_millis(1),
                Some(retries),
            )),
            Arc::clone(&metrics),
        );
        (
            HostConnectionPool::new(host(), Arc::new(factory)),
            connector,
            metrics,
        )
    }

    #[tokio::test]
    async fn fills_core_connections() {
        let (pool, _, metrics) = pool(3, vec![Some(accepting()), Some(accepting()), Some(accepting())], 0);
        pool.initialize().await.expect("pool");
        assert_eq!(pool.state(), PoolState::Ready);
        assert_eq!(pool.open_connections(), 3);
        assert_eq!(metrics.open_connections(), 3);

        let first = pool.borrow_connection().expect("borrow");
        let second = pool.borrow_connection().expect("borrow");
        assert_ne!(first.id(), second.id(), "轮询应分散到不同连接");

        pool.close().await;
        assert_eq!(metrics.open_connections(), 0);
        assert!(pool.borrow_connection().is_err());
    }

    #[tokio::test]
    async fn rejected_probe_aborts_without_starting_other_slots() {
        let (pool, connector, metrics) =
            pool(4, vec![Some(rejecting()), Some(accepting()), Some(accepting())], 3);
        let err = pool.initialize().await.expect_err("探测连接被拒必须中止");
        assert!(err.is_authentication_terminal());
        assert_eq!(pool.state(), PoolState::Aborted);
        assert_eq!(connector.attempts.load(Ordering::Relaxed), 1, "认证失败不重试也不派发其他槽位");
        assert_eq!(metrics.error_metrics().authentication_errors(), 1);
        assert_eq!(metrics.open_connections(), 0);
    }

    #[tokio::test]
    async fn rejection_in_later_slot_closes_opened_connections() {
        let first = accepting();
        let (pool, _, metrics) = pool(
            3,
            vec![Some(first.clone()), Some(rejecting()), Some(accepting())],
            0,
        );
        let err = pool.initialize().await.expect_err("后续槽位被拒同样中止");
        assert!(err.is_authentication_terminal());
        assert_eq!(pool.state(), PoolState::Aborted);
        assert!(first.is_closed(), "已打开的连接必须在中止时关闭");
        assert_eq!(metrics.open_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejection_interrupts_sibling_backoff() {
        let first = accepting();
        let connector = Arc::new(QueueConnector {
            channels: Mutex::new(vec![Some(first.clone()), None, Some(rejecting())].into()),
            attempts: AtomicUsize::new(0),
        });
        let metrics = Arc::new(Metrics::new());
        let factory = ConnectionFactory::new(
            connector.clone(),
            Arc::new(PlainTextAuthProvider::new("cassandra", "cassandra")),
            SocketOptions::default(),
            PoolingOptions::default().with_core_connections_per_host(3),
            Arc::new(ConstantReconnectionPolicy::new(
                Duration::from_secs(60),
                Some(5),
            )),
            Arc::clone(&metrics),
        );
        let pool = HostConnectionPool::new(host(), Arc::new(factory));

        let started = tokio::time::Instant::now();
        let err = pool.initialize().await.expect_err("后续槽位被拒必须中止");
        assert!(err.is_authentication_terminal());
        assert!(
            started.elapsed() < Duration::from_secs(1),
            "中止不得等待退避中的槽位，实际耗时 {:?}",
            started.elapsed()
        );
        assert_eq!(pool.state(), PoolState::Aborted);
        assert!(
            connector.attempts.load(Ordering::Relaxed) <= 3,
            "退避中的槽位不得再次连接"
        );
        assert!(first.is_closed());
        assert_eq!(metrics.open_connections(), 0);
    }

    #[tokio::test]
    async fn transport_failures_are_retried() {
        let (pool, connector, metrics) = pool(1, vec![None, None, Some(accepting())], 5);
        pool.initialize().await.expect("重试后应成功");
        assert_eq!(connector.attempts.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.error_metrics().connection_errors(), 2);
        assert_eq!(pool.open_connections(), 1);
    }

    #[tokio::test]
    async fn exhausted_probe_retries_abort_pool() {
        let (pool, connector, _) = pool(2, vec![], 2);
        let err = pool.initialize().await.expect_err("无法连接");
        assert!(err.category().is_reconnectable());
        assert_eq!(pool.state(), PoolState::Aborted);
        assert_eq!(connector.attempts.load(Ordering::Relaxed), 3);
    }
}
