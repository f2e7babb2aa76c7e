//! 驱动错误域：认证拒绝、传输故障、配置错误与粘滞初始化失败的统一表达。
//!
//! ## 设计目标（Why）
//! - 同一次初始化失败需要交给多个调用方，且后续调用必须能证明“引用的是同一个原始故障”，
//!   因此公开错误类型 [`DriverError`] 以 `Arc` 共享内部的 [`ErrorKind`]；
//! - 重连决策只看 [`ErrorCategory`]，避免调用方解析错误文案。
//!
//! ## 契约说明（What）
//! - 每个分支提供稳定错误码（[`codes`]）与日志使用的短名称（[`DriverError::short_name`]）；
//! - `AlreadyFailed` 的 `source()` 恒为最初存储的错误，用于区分“新鲜失败”与“重放旧失败”。

use std::{error::Error as StdError, fmt, sync::Arc, time::Duration};

use thiserror::Error;

use crate::endpoint::Endpoint;

/// 稳定错误码，遵循 `corvid.<域>.<语义>` 命名。
pub mod codes {
    pub const AUTH_FAILED: &str = "corvid.auth.failed";
    pub const AUTH_UNSUPPORTED: &str = "corvid.auth.unsupported";
    pub const TRANSPORT_FAILED: &str = "corvid.transport.failed";
    pub const HANDSHAKE_TIMEOUT: &str = "corvid.transport.handshake_timeout";
    pub const PROTOCOL_VIOLATION: &str = "corvid.transport.protocol_violation";
    pub const NO_HOST_AVAILABLE: &str = "corvid.cluster.no_host_available";
    pub const ALREADY_FAILED: &str = "corvid.cluster.already_failed";
    pub const CLOSED: &str = "corvid.cluster.closed";
    pub const INVALID_CONFIGURATION: &str = "corvid.config.invalid";
}

/// `AlreadyFailed` 的固定文案，下游监控按字面匹配。
pub const ALREADY_FAILED_MESSAGE: &str =
    "Can't use this cluster instance because it encountered an error in its initialization";

/// 错误的具体形态。
///
/// # 教案式注释
/// - **意图 (Why)**：把“认证拒绝 / 传输故障 / 配置错误 / 粘滞失败”四类处置策略显式编码为枚举，
///   让连接池与集群初始化在编译期穷举处理路径；
/// - **契约 (What)**：`AuthenticationFailed` 的展示文案以 `Authentication error on host {host}`
///   开头，连接池中止日志直接复用该文案；
/// - **风险 (Trade-offs)**：`detail` 使用 `String` 保存服务端原文，牺牲少量堆分配换取排障可读性。
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ErrorKind {
    /// 服务端拒绝了凭证，或本地没有可用的凭证来源。
    #[error("Authentication error on host {host}: {detail}")]
    AuthenticationFailed {
        host: Endpoint,
        mechanism: String,
        detail: String,
    },

    /// 凭证来源无法为服务端要求的机制生成凭证。
    #[error("Host {host} requires authentication mechanism `{mechanism}`, which the configured auth provider does not support")]
    AuthenticationUnsupported { host: Endpoint, mechanism: String },

    /// 断连、拒绝连接、读写失败等传输层故障。
    #[error("Transport error on host {host}: {detail}")]
    TransportFailed { host: Endpoint, detail: String },

    /// 握手在超时前未完成；服务端并未做出认证裁决。
    #[error("Handshake with host {host} did not complete within {timeout:?}")]
    HandshakeTimeout { host: Endpoint, timeout: Duration },

    /// 畸形帧或握手阶段出现非预期响应。
    #[error("Protocol violation from host {host}: {detail}")]
    ProtocolViolation { host: Endpoint, detail: String },

    /// 所有联系点都因非认证原因不可达。
    #[error("All host(s) tried for initialization failed (tried: {})", describe_attempts(.errors))]
    NoHostAvailable { errors: Vec<(Endpoint, DriverError)> },

    /// 实例此前初始化失败，后续调用直接重放该失败。
    #[error("{}", ALREADY_FAILED_MESSAGE)]
    AlreadyFailed {
        #[source]
        cause: DriverError,
    },

    /// 实例已关闭。
    #[error("cluster instance has been closed")]
    Closed,

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

fn describe_attempts(errors: &[(Endpoint, DriverError)]) -> String {
    errors
        .iter()
        .map(|(host, err)| format!("{host} ({err})"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// 错误分类，驱动重连与中止策略。
///
/// - `Authentication`：终止性，凭证不变时重试必然失败；
/// - `Transport`：瞬时性，允许按外部重连策略重试；
/// - `Configuration`：本地配置错误，对当前连接尝试致命；
/// - `Sticky`：实例级终止状态，直到重新创建实例；
/// - `Unavailable`：所有候选主机均不可用；
/// - `Closed`：实例已关闭。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorCategory {
    Authentication,
    Transport,
    Configuration,
    Sticky,
    Unavailable,
    Closed,
}

impl ErrorCategory {
    /// 只有传输类故障允许进入重连流程。
    pub const fn is_reconnectable(self) -> bool {
        matches!(self, ErrorCategory::Transport)
    }
}

/// 驱动对外暴露的错误类型。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 粘滞失败要求“第二次调用返回的包装错误，其 cause 与第一次抛出的错误是同一实例”，
///   因此错误本体放在 `Arc` 中，克隆只增加引用计数；
///
/// ## 契约 (What)
/// - [`ptr_eq`](Self::ptr_eq)：判断两个错误是否源自同一次失败；
/// - [`category`](Self::category)/[`code`](Self::code)/[`short_name`](Self::short_name)：
///   稳定的机读信息；
/// - `Display`/`source` 完全委托给内部 [`ErrorKind`]。
#[derive(Clone)]
pub struct DriverError {
    inner: Arc<ErrorKind>,
}

/// 驱动统一的返回值别名，默认错误类型为 [`DriverError`]。
pub type Result<T, E = DriverError> = std::result::Result<T, E>;

impl DriverError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            inner: Arc::new(kind),
        }
    }

    pub fn authentication_failed(
        host: Endpoint,
        mechanism: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::AuthenticationFailed {
            host,
            mechanism: mechanism.into(),
            detail: detail.into(),
        })
    }

    pub fn authentication_unsupported(host: Endpoint, mechanism: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthenticationUnsupported {
            host,
            mechanism: mechanism.into(),
        })
    }

    pub fn transport(host: Endpoint, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportFailed {
            host,
            detail: detail.into(),
        })
    }

    pub fn handshake_timeout(host: Endpoint, timeout: Duration) -> Self {
        Self::new(ErrorKind::HandshakeTimeout { host, timeout })
    }

    pub fn protocol_violation(host: Endpoint, detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolViolation {
            host,
            detail: detail.into(),
        })
    }

    pub fn no_host_available(errors: Vec<(Endpoint, DriverError)>) -> Self {
        Self::new(ErrorKind::NoHostAvailable { errors })
    }

    /// 以原始失败为 cause 构造粘滞失败；`cause` 只增加引用计数，不复制内容。
    pub fn already_failed(cause: DriverError) -> Self {
        Self::new(ErrorKind::AlreadyFailed { cause })
    }

    pub fn closed() -> Self {
        Self::new(ErrorKind::Closed)
    }

    pub fn invalid_configuration(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidConfiguration(detail.into()))
    }

    /// 访问错误形态。
    pub fn kind(&self) -> &ErrorKind {
        &self.inner
    }

    /// 两个错误是否共享同一内部实例。
    pub fn ptr_eq(&self, other: &DriverError) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::AuthenticationFailed { .. } => codes::AUTH_FAILED,
            ErrorKind::AuthenticationUnsupported { .. } => codes::AUTH_UNSUPPORTED,
            ErrorKind::TransportFailed { .. } => codes::TRANSPORT_FAILED,
            ErrorKind::HandshakeTimeout { .. } => codes::HANDSHAKE_TIMEOUT,
            ErrorKind::ProtocolViolation { .. } => codes::PROTOCOL_VIOLATION,
            ErrorKind::NoHostAvailable { .. } => codes::NO_HOST_AVAILABLE,
            ErrorKind::AlreadyFailed { .. } => codes::ALREADY_FAILED,
            ErrorKind::Closed => codes::CLOSED,
            ErrorKind::InvalidConfiguration(_) => codes::INVALID_CONFIGURATION,
        }
    }

    /// 日志记录中使用的短名称，日志监控按字面匹配。
    pub fn short_name(&self) -> &'static str {
        match self.kind() {
            ErrorKind::AuthenticationFailed { .. } => "AuthenticationFailed",
            ErrorKind::AuthenticationUnsupported { .. } => "AuthenticationUnsupported",
            ErrorKind::TransportFailed { .. } => "TransportFailed",
            ErrorKind::HandshakeTimeout { .. } => "HandshakeTimeout",
            ErrorKind::ProtocolViolation { .. } => "ProtocolViolation",
            ErrorKind::NoHostAvailable { .. } => "NoHostAvailable",
            ErrorKind::AlreadyFailed { .. } => "AlreadyFailed",
            ErrorKind::Closed => "Closed",
            ErrorKind::InvalidConfiguration(_) => "InvalidConfiguration",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind() {
            ErrorKind::AuthenticationFailed { .. } => ErrorCategory::Authentication,
            ErrorKind::AuthenticationUnsupported { .. } | ErrorKind::InvalidConfiguration(_) => {
                ErrorCategory::Configuration
            }
            ErrorKind::TransportFailed { .. }
            | ErrorKind::HandshakeTimeout { .. }
            | ErrorKind::ProtocolViolation { .. } => ErrorCategory::Transport,
            ErrorKind::NoHostAvailable { .. } => ErrorCategory::Unavailable,
            ErrorKind::AlreadyFailed { .. } => ErrorCategory::Sticky,
            ErrorKind::Closed => ErrorCategory::Closed,
        }
    }

    /// 认证阶段的终止性失败：服务端拒绝，或本地无法生成所需机制的凭证。
    ///
    /// 这类失败使连接进入 `FAILED_AUTH`，不参与重连，并让所属连接池整体中止。
    pub fn is_authentication_terminal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::AuthenticationFailed { .. } | ErrorKind::AuthenticationUnsupported { .. }
        )
    }

    /// 错误关联的主机（若有）。
    pub fn host(&self) -> Option<Endpoint> {
        match self.kind() {
            ErrorKind::AuthenticationFailed { host, .. }
            | ErrorKind::AuthenticationUnsupported { host, .. }
            | ErrorKind::TransportFailed { host, .. }
            | ErrorKind::HandshakeTimeout { host, .. }
            | ErrorKind::ProtocolViolation { host, .. } => Some(*host),
            _ => None,
        }
    }

    /// `AlreadyFailed` 所引用的原始失败。
    pub fn original_cause(&self) -> Option<&DriverError> {
        match self.kind() {
            ErrorKind::AlreadyFailed { cause } => Some(cause),
            _ => None,
        }
    }
}

impl From<ErrorKind> for DriverError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

impl fmt::Debug for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.inner, f)
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&*self.inner, f)
    }
}

impl StdError for DriverError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source()
    }
}
