//! # auth：凭证来源与认证器能力接口
//!
//! ## 核心意图（Why）
//! - 服务端在 STARTUP 之后通告所需的认证机制（如
//!   `org.apache.cassandra.auth.PasswordAuthenticator`），客户端需要为每条连接生成一个全新的
//!   挑战/应答状态机；
//! - 机制选择通过配置注入的 [`AuthProvider`] 变体完成，而非继承覆盖。
//!
//! ## 行为契约（What）
//! - [`AuthProvider::new_authenticator`]：按 `(host, mechanism)` 生产认证器；无法支持该机制时返回
//!   `AuthenticationUnsupported`，没有任何凭证时返回 `AuthenticationFailed`；
//! - [`Authenticator`]：`initial_response` → 反复 `evaluate_challenge` → 成功时恰好一次
//!   `on_authentication_success`，交换失败时恰好一次 `on_authentication_failure`；
//!   实例只服务一次连接尝试，绝不复用；
//! - 认证器捕获创建时的凭证快照，之后对凭证来源的修改只影响新创建的认证器。
//!
//! ## 风险提示（Trade-offs）
//! - 所有方法均为 `async`，实现方可以执行任意耗时的工作；驱动侧以握手超时兜底，
//!   并保证握手期间不会有保活请求与之竞争。

mod none;
mod plain_text;

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;

use crate::{
    endpoint::Endpoint,
    error::{DriverError, Result},
};

pub use none::NoAuthProvider;
pub use plain_text::{Credentials, PlainTextAuthProvider, PlainTextAuthenticator};

/// 单条连接上的挑战/应答状态机。
#[async_trait]
pub trait Authenticator: Send {
    /// 首个发往服务端的令牌，可以为空。
    async fn initial_response(&mut self) -> Result<Option<Bytes>>;

    /// 处理服务端挑战并给出应答；返回错误即终止交换。
    async fn evaluate_challenge(&mut self, challenge: Option<Bytes>) -> Result<Option<Bytes>>;

    /// 服务端确认认证成功，`token` 为其最终附带的数据。
    async fn on_authentication_success(&mut self, token: Option<Bytes>) -> Result<()> {
        let _ = token;
        Ok(())
    }

    /// 交换以失败告终（服务端拒绝、协议异常或传输中断）；之后不会再有任何回调。
    fn on_authentication_failure(&mut self, error: &DriverError) {
        let _ = error;
    }
}

/// 凭证来源。
#[async_trait]
pub trait AuthProvider: Send + Sync + fmt::Debug {
    async fn new_authenticator(
        &self,
        host: &Endpoint,
        mechanism: &str,
    ) -> Result<Box<dyn Authenticator>>;
}
