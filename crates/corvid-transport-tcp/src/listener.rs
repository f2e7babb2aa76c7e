use std::net::SocketAddr;

use corvid_core::{
    Endpoint, Result,
    protocol::{Request, Response},
};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener as TokioTcpListener, TcpStream},
};

use crate::{
    codec::{self, FrameError},
    error::{self, map_io_error},
};

/// 服务端视角的帧监听器。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 驱动的握手、连接池与集群初始化都需要一个可编程的“节点”来验证；复用同一份编解码
///   可以保证测试中的节点与真实客户端字节级一致。
///
/// ## 契约 (What)
/// - `bind`：端口为 0 时由内核分配，实际地址通过 [`local_endpoint`](Self::local_endpoint) 读取；
/// - `accept`：返回 [`ServerFrameStream`]，后者只负责“读请求 / 写响应”，应答策略由调用方决定。
#[derive(Debug)]
pub struct FrameListener {
    inner: TokioTcpListener,
    local: Endpoint,
}

impl FrameListener {
    pub async fn bind(endpoint: Endpoint) -> Result<Self> {
        let inner = TokioTcpListener::bind(endpoint.socket_addr())
            .await
            .map_err(|err| map_io_error(error::BIND, endpoint, err))?;
        let local = inner
            .local_addr()
            .map_err(|err| map_io_error(error::BIND, endpoint, err))?;
        Ok(Self {
            inner,
            local: Endpoint::from(local),
        })
    }

    pub fn local_endpoint(&self) -> Endpoint {
        self.local
    }

    pub async fn accept(&self) -> Result<ServerFrameStream> {
        let (stream, peer) = self
            .inner
            .accept()
            .await
            .map_err(|err| map_io_error(error::ACCEPT, self.local, err))?;
        let _ = stream.set_nodelay(true);
        Ok(ServerFrameStream { stream, peer })
    }
}

/// 已接受的一条客户端连接。
#[derive(Debug)]
pub struct ServerFrameStream {
    stream: TcpStream,
    peer: SocketAddr,
}

impl ServerFrameStream {
    pub fn peer_addr(&self) -> SocketAddr {
        self.peer
    }

    /// 读取下一条请求；客户端正常关闭时返回 [`FrameError::ConnectionClosed`]。
    pub async fn read_request(&mut self) -> Result<(i16, Request), FrameError> {
        let (header, body) = codec::read_frame(&mut self.stream).await?;
        let request = codec::decode_request(&header, body)?;
        Ok((header.stream, request))
    }

    pub async fn write_response(
        &mut self,
        stream_id: i16,
        response: &Response,
    ) -> Result<(), FrameError> {
        let frame = codec::encode_response(stream_id, response)?;
        self.stream.write_all(&frame).await?;
        Ok(())
    }

    pub async fn shutdown(&mut self) {
        let _ = self.stream.shutdown().await;
    }
}
