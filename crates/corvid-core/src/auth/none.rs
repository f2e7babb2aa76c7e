use async_trait::async_trait;

use super::{AuthProvider, Authenticator};
use crate::{
    endpoint::Endpoint,
    error::{DriverError, Result},
};

/// 未配置任何凭证时使用的来源：对所有机制都以认证失败作答。
///
/// 节点无需认证时握手直接收到 READY，根本不会调用到这里。
#[derive(Clone, Copy, Debug, Default)]
pub struct NoAuthProvider;

#[async_trait]
impl AuthProvider for NoAuthProvider {
    async fn new_authenticator(
        &self,
        host: &Endpoint,
        mechanism: &str,
    ) -> Result<Box<dyn Authenticator>> {
        Err(DriverError::authentication_failed(
            *host,
            mechanism,
            format!(
                "Host {host} requires authentication ({mechanism}), but no authenticator found in cluster configuration"
            ),
        ))
    }
}
