use std::sync::Arc;

use async_trait::async_trait;
use corvid_core::{
    Endpoint, Result,
    config::SocketOptions,
    transport::{Connector, FrameChannel},
};

use crate::channel::{TcpChannel, into_shared};

/// 基于 Tokio TCP 的通道工厂。
///
/// 连接超时、`TCP_NODELAY` 与 `SO_KEEPALIVE` 均取自调用方传入的 [`SocketOptions`]。
#[derive(Clone, Copy, Debug, Default)]
pub struct TcpConnector;

impl TcpConnector {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for TcpConnector {
    async fn connect(
        &self,
        endpoint: Endpoint,
        options: &SocketOptions,
    ) -> Result<Arc<dyn FrameChannel>> {
        TcpChannel::connect(endpoint, options).await.map(into_shared)
    }
}
