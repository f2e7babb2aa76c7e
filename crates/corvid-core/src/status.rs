//! 认证器、连接、连接池与集群初始化的生命周期状态。
//!
//! ## 契约说明（What）
//! - 四个状态机都只向前推进，终止状态不会回退；
//! - `ConnectionState::FailedAuth` 为终止态，不触发对同一连接的自动重试；
//!   `FailedTransport` 则允许外部重连策略创建新的连接。

use std::fmt;

/// 单次认证交换的状态：`Initial → Exchanging → {Succeeded, Failed}`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthenticatorState {
    Initial,
    Exchanging,
    Succeeded,
    Failed,
}

impl AuthenticatorState {
    pub const fn is_terminal(self) -> bool {
        matches!(self, AuthenticatorState::Succeeded | AuthenticatorState::Failed)
    }
}

/// 单条连接的状态：`New → Authenticating → {Ready, FailedAuth, FailedTransport}`，
/// `Ready` 之后可进入 `Closed` 或在保活失败时进入 `FailedTransport`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    New,
    Authenticating,
    Ready,
    FailedAuth,
    FailedTransport,
    Closed,
}

impl ConnectionState {
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::FailedAuth | ConnectionState::FailedTransport | ConnectionState::Closed
        )
    }

    /// 是否允许由外部重连策略接管。
    pub const fn is_reconnectable(self) -> bool {
        matches!(self, ConnectionState::FailedTransport)
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::New => "NEW",
            ConnectionState::Authenticating => "AUTHENTICATING",
            ConnectionState::Ready => "READY",
            ConnectionState::FailedAuth => "FAILED_AUTH",
            ConnectionState::FailedTransport => "FAILED_TRANSPORT",
            ConnectionState::Closed => "CLOSED",
        })
    }
}

/// 主机连接池的状态：`Initializing → {Ready, Aborted}`，`Ready` 之后可被关闭。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PoolState {
    Initializing,
    Ready,
    Aborted,
    Closed,
}

/// 集群初始化结果单元的状态：`NotStarted → Initializing → {Ready, Failed}`。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum InitState {
    NotStarted = 0,
    Initializing = 1,
    Ready = 2,
    Failed = 3,
}

impl InitState {
    /// 从原子存储的原始值恢复；未知取值视为 `NotStarted`。
    pub const fn from_u8(raw: u8) -> Self {
        match raw {
            1 => InitState::Initializing,
            2 => InitState::Ready,
            3 => InitState::Failed,
            _ => InitState::NotStarted,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_auth_is_terminal_and_not_reconnectable() {
        assert!(ConnectionState::FailedAuth.is_terminal());
        assert!(!ConnectionState::FailedAuth.is_reconnectable());
        assert!(ConnectionState::FailedTransport.is_reconnectable());
        assert_eq!(ConnectionState::FailedAuth.to_string(), "FAILED_AUTH");
    }

    #[test]
    fn init_state_round_trips_through_u8() {
        for state in [
            InitState::NotStarted,
            InitState::Initializing,
            InitState::Ready,
            InitState::Failed,
        ] {
            assert_eq!(InitState::from_u8(state.as_u8()), state);
        }
    }
}
