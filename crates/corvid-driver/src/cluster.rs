//! # cluster：集群入口与粘滞初始化
//!
//! ## 核心意图（Why）
//! - 初始化失败必须“记住”：同一实例上的后续调用立即失败，并携带最初的原因，
//!   让调用方区分“新的失败”与“旧失败的重放”，同时杜绝静默的重复握手；
//! - 并发的初始化请求只允许一次真正的握手，其余调用方共享同一结果。
//!
//! ## 行为契约（What）
//! - 结果单元是一次写入的 [`OnceCell`]，配合 [`InitState`] 原子状态：
//!   `NOT_STARTED → INITIALIZING → {READY, FAILED}`；
//! - 触发初始化的调用方（以及初始化期间并发等待的调用方）得到原始错误；
//!   进入 `FAILED` 之后到达的调用方得到 `AlreadyFailed`，其 `source()` 与原始错误是同一实例；
//! - 只有控制连接的结果决定 `READY` 与 `FAILED`；各主机连接池的失败只影响该主机。
//!
//! ## 风险提示（Trade-offs）
//! - `FAILED` 没有重置入口，唯一的恢复方式是重新构建 [`Cluster`]。

use std::sync::{
    Arc, Weak,
    atomic::{AtomicBool, AtomicU8, Ordering},
};

use corvid_core::{
    DriverError, Endpoint, Metrics, MetricsSnapshot, Result,
    auth::{AuthProvider, NoAuthProvider, PlainTextAuthProvider},
    config::{ClusterConfig, PoolingOptions, ReconnectionOptions, SocketOptions},
    status::InitState,
    transport::Connector,
};
use corvid_transport_tcp::TcpConnector;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::{error, info};

use crate::{
    control::ControlConnection,
    factory::ConnectionFactory,
    reconnection::{ExponentialReconnectionPolicy, ReconnectionPolicy},
    session::{Session, SessionInner},
};

/// 集群客户端实例。
#[derive(Clone, Debug)]
pub struct Cluster {
    inner: Arc<ClusterInner>,
}

#[derive(Debug)]
struct ClusterInner {
    contact_points: Vec<Endpoint>,
    factory: Arc<ConnectionFactory>,
    init_state: AtomicU8,
    outcome: OnceCell<Result<Arc<ControlConnection>>>,
    sessions: Mutex<Vec<Weak<SessionInner>>>,
    closed: AtomicBool,
}

impl Cluster {
    pub fn builder() -> ClusterBuilder {
        ClusterBuilder::default()
    }

    /// 按配置文件构建；配置中的凭证映射为 [`PlainTextAuthProvider`]。
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        ClusterBuilder::from_config(config)?.build()
    }

    pub fn contact_points(&self) -> &[Endpoint] {
        &self.inner.contact_points
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.inner.factory.metrics()
    }

    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics().snapshot()
    }

    pub fn init_state(&self) -> InitState {
        InitState::from_u8(self.inner.init_state.load(Ordering::Acquire))
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// 初始化集群：建立并认证控制连接。
    pub async fn init(&self) -> Result<()> {
        self.control().await.map(|_| ())
    }

    /// 初始化集群并为每个已知主机建立连接池。
    pub async fn connect(&self) -> Result<Session> {
        self.control().await?;
        let session = Session::open(
            Arc::clone(&self.inner.factory),
            &self.inner.contact_points,
        )
        .await;
        {
            let mut sessions = self.inner.sessions.lock();
            sessions.retain(|weak| weak.strong_count() > 0);
            sessions.push(session.downgrade());
        }
        if self.is_closed() {
            session.close().await;
            return Err(DriverError::closed());
        }
        Ok(session)
    }

    /// 关闭控制连接与全部会话；之后的调用返回 `Closed`。
    ///
    /// 与进行中的初始化并发时，等待初始化结束并关闭其建立的控制连接，
    /// 该次初始化的调用方得到 `Closed`。
    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let sessions: Vec<_> = std::mem::take(&mut *self.inner.sessions.lock());
        for inner in sessions.into_iter().filter_map(|weak| weak.upgrade()) {
            Session::from_inner(inner).close().await;
        }
        // 初始化进行中时等待其结束；从未初始化则以 `Closed` 封存结果单元。
        let outcome = self
            .inner
            .outcome
            .get_or_init(|| async { Err(DriverError::closed()) })
            .await;
        if let Ok(control) = outcome {
            control.close().await;
        }
        info!("cluster closed");
    }

    /// 读取或建立控制连接。
    ///
    /// # 教案式注释
    ///
    /// ## 逻辑 (How)
    /// 1. 已关闭则返回 `Closed`；
    /// 2. 结果单元已存有失败时不再尝试，直接以存储的原因构造 `AlreadyFailed`；
    /// 3. 否则进入 `OnceCell::get_or_init`：第一个调用方执行初始化，其余调用方等待同一结果。
    ///
    /// ## 契约 (What)
    /// - 结果单元只写一次，失败时保存的是原始错误本身（`Arc` 共享），而非其副本。
    async fn control(&self) -> Result<Arc<ControlConnection>> {
        if self.is_closed() {
            return Err(DriverError::closed());
        }
        let inner = &self.inner;
        if let Some(Err(cause)) = inner.outcome.get() {
            return Err(DriverError::already_failed(cause.clone()));
        }

        let outcome = inner
            .outcome
            .get_or_init(|| async {
                inner
                    .init_state
                    .store(InitState::Initializing.as_u8(), Ordering::Release);
                info!(contact_points = inner.contact_points.len(), "initializing cluster");
                match ControlConnection::connect(&inner.factory, &inner.contact_points).await {
                    Ok(control) if inner.closed.load(Ordering::Acquire) => {
                        control.close().await;
                        inner
                            .init_state
                            .store(InitState::Failed.as_u8(), Ordering::Release);
                        Err(DriverError::closed())
                    }
                    Ok(control) => {
                        inner
                            .factory
                            .metrics()
                            .set_known_hosts(inner.contact_points.len());
                        inner
                            .init_state
                            .store(InitState::Ready.as_u8(), Ordering::Release);
                        Ok(Arc::new(control))
                    }
                    Err(err) => {
                        error!(
                            error.kind = err.short_name(),
                            "cluster initialization failed: {err}"
                        );
                        inner
                            .init_state
                            .store(InitState::Failed.as_u8(), Ordering::Release);
                        Err(err)
                    }
                }
            })
            .await;
        outcome.clone()
    }
}

/// [`Cluster`] 的构建器。
#[derive(Debug)]
pub struct ClusterBuilder {
    contact_points: Vec<Endpoint>,
    pooling: PoolingOptions,
    socket: SocketOptions,
    reconnection: Arc<dyn ReconnectionPolicy>,
    auth_provider: Arc<dyn AuthProvider>,
    connector: Arc<dyn Connector>,
}

impl Default for ClusterBuilder {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            pooling: PoolingOptions::default(),
            socket: SocketOptions::default(),
            reconnection: Arc::new(ExponentialReconnectionPolicy::from(
                &ReconnectionOptions::default(),
            )),
            auth_provider: Arc::new(NoAuthProvider),
            connector: Arc::new(TcpConnector::new()),
        }
    }
}

impl ClusterBuilder {
    pub fn from_config(config: &ClusterConfig) -> Result<Self> {
        config.validate()?;
        let mut builder = Self::default()
            .add_contact_points(config.endpoints()?)
            .with_pooling_options(config.pooling.clone())
            .with_socket_options(config.socket.clone())
            .with_reconnection_policy(Arc::new(ExponentialReconnectionPolicy::from(
                &config.reconnection,
            )));
        if let Some(credentials) = &config.credentials {
            builder = builder.with_credentials(&credentials.username, &credentials.password);
        }
        Ok(builder)
    }

    pub fn add_contact_point(mut self, endpoint: Endpoint) -> Self {
        if !self.contact_points.contains(&endpoint) {
            self.contact_points.push(endpoint);
        }
        self
    }

    pub fn add_contact_points(self, endpoints: impl IntoIterator<Item = Endpoint>) -> Self {
        endpoints
            .into_iter()
            .fold(self, |builder, endpoint| builder.add_contact_point(endpoint))
    }

    /// 以用户名/口令认证；等价于注入一个 [`PlainTextAuthProvider`]。
    pub fn with_credentials(self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.with_auth_provider(Arc::new(PlainTextAuthProvider::new(username, password)))
    }

    pub fn with_auth_provider(mut self, provider: Arc<dyn AuthProvider>) -> Self {
        self.auth_provider = provider;
        self
    }

    pub fn with_pooling_options(mut self, pooling: PoolingOptions) -> Self {
        self.pooling = pooling;
        self
    }

    pub fn with_socket_options(mut self, socket: SocketOptions) -> Self {
        self.socket = socket;
        self
    }

    pub fn with_reconnection_policy(mut self, policy: Arc<dyn ReconnectionPolicy>) -> Self {
        self.reconnection = policy;
        self
    }

    pub fn with_connector(mut self, connector: Arc<dyn Connector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn build(self) -> Result<Cluster> {
        if self.contact_points.is_empty() {
            return Err(DriverError::invalid_configuration(
                "at least one contact point is required",
            ));
        }
        self.pooling.validate()?;
        self.socket.validate()?;

        let factory = ConnectionFactory::new(
            self.connector,
            self.auth_provider,
            self.socket,
            self.pooling,
            self.reconnection,
            Arc::new(Metrics::new()),
        );
        Ok(Cluster {
            inner: Arc::new(ClusterInner {
                contact_points: self.contact_points,
                factory: Arc::new(factory),
                init_state: AtomicU8::new(InitState::NotStarted.as_u8()),
                outcome: OnceCell::new(),
                sessions: Mutex::new(Vec::new()),
                closed: AtomicBool::new(false),
            }),
        })
    }
}
