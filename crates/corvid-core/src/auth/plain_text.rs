use std::{fmt, sync::Arc};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use tracing::debug;

use super::{AuthProvider, Authenticator};
use crate::{
    endpoint::Endpoint,
    error::{DriverError, Result},
    protocol::mechanisms,
    status::AuthenticatorState,
};

/// DSE 风格服务端在 PLAIN 交换中发出的起始挑战。
const PLAIN_START_CHALLENGE: &[u8] = b"PLAIN-START";

/// 一份不可变的用户名/口令快照。
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    username: String,
    password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// SASL PLAIN 令牌：`\0username\0password`。
    fn plain_token(&self) -> Bytes {
        let mut token = BytesMut::with_capacity(self.username.len() + self.password.len() + 2);
        token.put_u8(0);
        token.put_slice(self.username.as_bytes());
        token.put_u8(0);
        token.put_slice(self.password.as_bytes());
        token.freeze()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// 用户名/口令凭证来源。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 应用可在客户端生命周期内随时替换口令（例如轮换后重新下发），而正在进行的握手不应被
///   “半新半旧”的凭证打断；
///
/// ## 逻辑 (How)
/// - 当前快照存放在 [`ArcSwap`] 中：读路径无锁地 `load_full` 一份 `Arc<Credentials>`，
///   写路径通过 `rcu` 原子替换；
/// - 每个认证器在创建时捕获快照，此后与来源解耦。
///
/// ## 契约 (What)
/// - 支持的机制默认包括 `PasswordAuthenticator`、`DseAuthenticator` 与
///   `TransitionalAuthenticator`，可通过 [`with_mechanism`](Self::with_mechanism) 追加；
/// - 对其他机制返回 `AuthenticationUnsupported`；
/// - 修改凭证不与进行中的握手同步，只影响之后创建的认证器。
pub struct PlainTextAuthProvider {
    credentials: ArcSwap<Credentials>,
    mechanisms: Vec<String>,
}

impl PlainTextAuthProvider {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            credentials: ArcSwap::from_pointee(Credentials::new(username, password)),
            mechanisms: vec![
                mechanisms::PASSWORD_AUTHENTICATOR.to_owned(),
                mechanisms::DSE_AUTHENTICATOR.to_owned(),
                mechanisms::TRANSITIONAL_AUTHENTICATOR.to_owned(),
            ],
        }
    }

    /// 追加一个可识别的服务端机制名。
    pub fn with_mechanism(mut self, mechanism: impl Into<String>) -> Self {
        let mechanism = mechanism.into();
        if !self.mechanisms.contains(&mechanism) {
            self.mechanisms.push(mechanism);
        }
        self
    }

    pub fn supports(&self, mechanism: &str) -> bool {
        self.mechanisms.iter().any(|known| known == mechanism)
    }

    /// 当前凭证快照。
    pub fn credentials(&self) -> Arc<Credentials> {
        self.credentials.load_full()
    }

    pub fn set_credentials(&self, credentials: Credentials) {
        self.credentials.store(Arc::new(credentials));
    }

    pub fn set_username(&self, username: impl Into<String>) {
        let username = username.into();
        self.credentials.rcu(|current| {
            let mut next = Credentials::clone(current);
            next.username = username.clone();
            next
        });
    }

    pub fn set_password(&self, password: impl Into<String>) {
        let password = password.into();
        self.credentials.rcu(|current| {
            let mut next = Credentials::clone(current);
            next.password = password.clone();
            next
        });
    }
}

impl fmt::Debug for PlainTextAuthProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlainTextAuthProvider")
            .field("credentials", &*self.credentials.load())
            .field("mechanisms", &self.mechanisms)
            .finish()
    }
}

#[async_trait]
impl AuthProvider for PlainTextAuthProvider {
    async fn new_authenticator(
        &self,
        host: &Endpoint,
        mechanism: &str,
    ) -> Result<Box<dyn Authenticator>> {
        if !self.supports(mechanism) {
            return Err(DriverError::authentication_unsupported(*host, mechanism));
        }
        debug!(%host, mechanism, "creating plain text authenticator");
        Ok(Box::new(PlainTextAuthenticator::new(self.credentials())))
    }
}

/// SASL PLAIN 认证器，绑定创建时的凭证快照。
#[derive(Debug)]
pub struct PlainTextAuthenticator {
    credentials: Arc<Credentials>,
    state: AuthenticatorState,
}

impl PlainTextAuthenticator {
    pub fn new(credentials: Arc<Credentials>) -> Self {
        Self {
            credentials,
            state: AuthenticatorState::Initial,
        }
    }

    pub fn state(&self) -> AuthenticatorState {
        self.state
    }

    pub fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

#[async_trait]
impl Authenticator for PlainTextAuthenticator {
    async fn initial_response(&mut self) -> Result<Option<Bytes>> {
        self.state = AuthenticatorState::Exchanging;
        Ok(Some(self.credentials.plain_token()))
    }

    async fn evaluate_challenge(&mut self, challenge: Option<Bytes>) -> Result<Option<Bytes>> {
        self.state = AuthenticatorState::Exchanging;
        match challenge.as_deref() {
            Some(PLAIN_START_CHALLENGE) => Ok(Some(self.credentials.plain_token())),
            _ => Ok(None),
        }
    }

    async fn on_authentication_success(&mut self, _token: Option<Bytes>) -> Result<()> {
        self.state = AuthenticatorState::Succeeded;
        Ok(())
    }

    fn on_authentication_failure(&mut self, _error: &DriverError) {
        self.state = AuthenticatorState::Failed;
    }
}
