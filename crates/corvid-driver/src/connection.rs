//! # connection：单条连接的握手驱动
//!
//! ## 核心意图（Why）
//! - 一条连接只有在认证器走到 `SUCCEEDED` 之后才可用；本模块把“STARTUP → 机制协商 →
//!   挑战/应答循环 → 成功回调”串成严格顺序的状态机，并把失败翻译为上层可决策的分类；
//! - 认证失败与传输失败的后果截然不同：前者永不重试，后者交给重连策略。
//!
//! ## 行为契约（What）
//! - 握手整体受 `handshake_timeout` 约束，超时归类为 `FAILED_TRANSPORT`，因为服务端从未给出认证结论；
//! - 认证被拒（或本地不支持服务端机制）时进入 `FAILED_AUTH`，`authentication_errors` 恰好累加一次，
//!   通道随即关闭；
//! - 握手期间不存在保活任务，慢速认证器只受握手超时约束；保活在进入 `READY` 后才启动。
//!
//! ## 风险提示（Trade-offs）
//! - 认证器可能执行任意耗时的工作，握手超时必须大于认证器的最坏耗时，否则慢但正确的节点会被误判。

use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use corvid_core::{
    DriverError, Endpoint, Metrics, Result,
    auth::{AuthProvider, Authenticator},
    protocol::{Request, Response, error_codes},
    status::ConnectionState,
    transport::FrameChannel,
};
use parking_lot::Mutex;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{debug, warn};

/// 一条到单个主机的已握手连接。
pub struct Connection {
    id: u64,
    host: Endpoint,
    channel: Arc<dyn FrameChannel>,
    state: Mutex<ConnectionState>,
    last_activity: Mutex<Instant>,
    metrics: Arc<Metrics>,
    heartbeat: Mutex<Option<JoinHandle<()>>>,
    counted_open: AtomicBool,
}

impl Connection {
    pub(crate) fn new(
        id: u64,
        host: Endpoint,
        channel: Arc<dyn FrameChannel>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            id,
            host,
            channel,
            state: Mutex::new(ConnectionState::New),
            last_activity: Mutex::new(Instant::now()),
            metrics,
            heartbeat: Mutex::new(None),
            counted_open: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn host(&self) -> Endpoint {
        self.host
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.lock()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready && !self.channel.is_closed()
    }

    /// 上一次请求往返结束的时刻。
    pub(crate) fn last_activity(&self) -> Instant {
        *self.last_activity.lock()
    }

    fn touch(&self) {
        *self.last_activity.lock() = Instant::now();
    }

    fn set_state(&self, next: ConnectionState) {
        let mut state = self.state.lock();
        if !state.is_terminal() {
            *state = next;
        }
    }

    /// 在已就绪的连接上发送一次请求。
    pub async fn request(&self, request: Request) -> Result<Response> {
        if !self.is_ready() {
            return Err(DriverError::transport(
                self.host,
                format!("connection #{} is {}", self.id, self.state()),
            ));
        }
        let outcome = self.channel.request(request).await;
        self.touch();
        outcome
    }

    /// 执行握手。
    ///
    /// # 教案式注释
    ///
    /// ## 逻辑 (How)
    /// 1. 发送 STARTUP；`READY` 表示节点无需认证，直接成功；
    /// 2. `AUTHENTICATE { mechanism }` 时向凭证来源索取认证器，发送初始令牌；
    /// 3. 循环处理 `AUTH_CHALLENGE`，直到 `AUTH_SUCCESS`（调用一次 `on_authentication_success`）
    ///    或 `ERROR`（错误码 `0x0100` 为认证被拒，其余为协议违规）。
    ///
    /// ## 契约 (What)
    /// - 每一步严格串行，挑战与应答不会乱序；
    /// - 认证器只为本次尝试创建，成功或失败后随函数返回一起释放。
    pub(crate) async fn handshake(&self, provider: &dyn AuthProvider) -> Result<()> {
        self.set_state(ConnectionState::Authenticating);
        let host = self.host;

        let mechanism = match self.channel.request(Request::startup()).await? {
            Response::Ready => {
                debug!(%host, connection = self.id, "node does not require authentication");
                return Ok(());
            }
            Response::Authenticate { mechanism } => mechanism,
            Response::Error { code, message } => {
                return Err(server_error(host, None, code, message));
            }
            other => return Err(unexpected(host, "STARTUP", &other)),
        };

        debug!(%host, connection = self.id, %mechanism, "node requires authentication");
        let mut authenticator = provider.new_authenticator(&host, &mechanism).await?;
        let outcome = self.exchange(&mechanism, authenticator.as_mut()).await;
        if let Err(err) = &outcome {
            authenticator.on_authentication_failure(err);
        }
        outcome
    }

    /// AUTH_RESPONSE / AUTH_CHALLENGE 循环，直到服务端给出结论。
    async fn exchange(&self, mechanism: &str, authenticator: &mut dyn Authenticator) -> Result<()> {
        let host = self.host;
        let mut token = authenticator.initial_response().await?;
        loop {
            match self
                .channel
                .request(Request::AuthResponse { token })
                .await?
            {
                Response::AuthChallenge { token: challenge } => {
                    debug!(%host, connection = self.id, "received authentication challenge");
                    token = authenticator.evaluate_challenge(challenge).await?;
                }
                Response::AuthSuccess { token: last } => {
                    authenticator.on_authentication_success(last).await?;
                    debug!(%host, connection = self.id, "authentication succeeded");
                    return Ok(());
                }
                Response::Error { code, message } => {
                    return Err(server_error(host, Some(mechanism), code, message));
                }
                other => return Err(unexpected(host, "AUTH_RESPONSE", &other)),
            }
        }
    }

    /// 握手成功：进入 `READY` 并计入打开连接数。
    pub(crate) fn mark_ready(&self) {
        self.set_state(ConnectionState::Ready);
        self.touch();
        if !self.counted_open.swap(true, Ordering::AcqRel) {
            self.metrics.connection_opened();
        }
    }

    /// 握手失败：按错误分类进入终止态并关闭通道。
    pub(crate) async fn mark_failed(&self, error: &DriverError) {
        let state = if error.is_authentication_terminal() {
            ConnectionState::FailedAuth
        } else {
            ConnectionState::FailedTransport
        };
        self.set_state(state);
        self.channel.close().await;
    }

    pub(crate) fn attach_heartbeat(&self, handle: JoinHandle<()>) {
        if let Some(previous) = self.heartbeat.lock().replace(handle) {
            previous.abort();
        }
    }

    /// 保活失败：连接失效并释放。
    ///
    /// 由保活任务自身调用，因此只分离而不中止任务句柄。
    pub(crate) async fn mark_defunct(&self, error: &DriverError) {
        drop(self.heartbeat.lock().take());
        self.set_state(ConnectionState::FailedTransport);
        self.metrics.error_metrics().record_heartbeat_failure();
        warn!(
            host = %self.host,
            connection = self.id,
            error.kind = error.short_name(),
            "heartbeat failed, marking connection defunct: {error}"
        );
        self.release().await;
    }

    /// 关闭连接，重复调用无副作用。
    pub async fn close(&self) {
        if let Some(handle) = self.heartbeat.lock().take() {
            handle.abort();
        }
        self.set_state(ConnectionState::Closed);
        self.release().await;
    }

    async fn release(&self) {
        self.channel.close().await;
        if self.counted_open.swap(false, Ordering::AcqRel) {
            self.metrics.connection_closed();
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        if let Some(handle) = self.heartbeat.get_mut().take() {
            handle.abort();
        }
        if self.counted_open.swap(false, Ordering::AcqRel) {
            self.metrics.connection_closed();
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("host", &self.host)
            .field("state", &self.state())
            .finish()
    }
}

fn server_error(host: Endpoint, mechanism: Option<&str>, code: i32, message: String) -> DriverError {
    match (code, mechanism) {
        (error_codes::BAD_CREDENTIALS, Some(mechanism)) => {
            DriverError::authentication_failed(host, mechanism, message)
        }
        (error_codes::BAD_CREDENTIALS, None) => {
            DriverError::authentication_failed(host, "", message)
        }
        _ => DriverError::protocol_violation(
            host,
            format!("server error {code:#06x} during handshake: {message}"),
        ),
    }
}

fn unexpected(host: Endpoint, step: &str, response: &Response) -> DriverError {
    DriverError::protocol_violation(
        host,
        format!("unexpected {:?} response to {step}", response.opcode()),
    )
}
