//! 传输接缝：驱动与线级实现之间的最小契约。
//!
//! # 教案式注释
//!
//! ## 意图 (Why)
//! - 握手驱动只需要“发出请求、拿到响应、关闭通道”三个动作，线级编码、套接字选项与
//!   帧格式都留在实现 crate（如 `corvid-transport-tcp`）；
//! - 测试与替代传输（TLS、内存管道）只需实现这两个 trait 即可接入驱动。
//!
//! ## 契约 (What)
//! - [`Connector::connect`]：建立到端点的通道；失败时返回传输类错误（`ErrorCategory::Transport`）；
//! - [`FrameChannel::request`]：一次请求对应一次响应，同一通道上的请求严格串行；
//! - [`FrameChannel::close`]：幂等，关闭后 `request` 返回传输错误。
//!
//! ## 注意事项 (Trade-offs)
//! - 通道不做流复用：握手阶段本就严格串行，保活请求与业务请求共享同一把锁即可。

use std::{fmt, sync::Arc};

use async_trait::async_trait;

use crate::{
    config::SocketOptions,
    endpoint::Endpoint,
    error::Result,
    protocol::{Request, Response},
};

/// 一条已建立的帧通道。
#[async_trait]
pub trait FrameChannel: Send + Sync + fmt::Debug {
    /// 对端端点。
    fn endpoint(&self) -> Endpoint;

    /// 发送请求并等待对应响应。
    async fn request(&self, request: Request) -> Result<Response>;

    /// 关闭通道，重复调用无副作用。
    async fn close(&self);

    fn is_closed(&self) -> bool;
}

/// 通道工厂。
#[async_trait]
pub trait Connector: Send + Sync + fmt::Debug {
    async fn connect(
        &self,
        endpoint: Endpoint,
        options: &SocketOptions,
    ) -> Result<Arc<dyn FrameChannel>>;
}
