use std::{
    fmt,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicI16, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use corvid_core::{
    DriverError, Endpoint, Result,
    config::SocketOptions,
    protocol::{Request, Response},
    transport::FrameChannel,
};
use socket2::SockRef;
use tokio::{
    io::AsyncWriteExt,
    net::TcpStream,
    sync::{Mutex as AsyncMutex, Notify},
};
use tracing::{debug, trace};

use crate::{
    codec::{self, FrameError},
    error::{self, CONFIGURE, READ, WRITE, is_peer_gone, map_frame_error, map_io_error},
    util::run_with_timeout,
};

/// 客户端单条 TCP 帧通道。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 握手与保活都是“一问一答”，因此以 `tokio::sync::Mutex` 包裹 `TcpStream`，
///   让 `&self` 上的并发调用天然串行；
/// - 关闭需要打断正在等待响应的请求，否则保活请求可能把关闭拖到读超时之后。
///
/// ## 逻辑 (How)
/// - 每次请求分配递增的流 ID，写出请求帧后读取一帧响应并校验流 ID 一致；
/// - 请求在 IO 与关闭信号（[`Notify`]）之间 `select!`，关闭一旦触发立即返回传输错误；
/// - 任何请求失败都会把通道标记为关闭：串行通道在超时或半帧之后无法再对齐请求与响应。
///
/// ## 契约 (What)
/// - `request`：成功返回对应响应；失败返回传输类或协议违规错误，且通道随即关闭；
/// - `close`：幂等；调用后 `is_closed()` 为 `true`，后续 `request` 立即失败。
///
/// ## 注意事项 (Trade-offs)
/// - 不做流复用，单通道吞吐受限于往返时延；本通道只服务握手与保活，足够使用。
pub struct TcpChannel {
    endpoint: Endpoint,
    stream: AsyncMutex<TcpStream>,
    closed: AtomicBool,
    shutdown: Notify,
    next_stream: AtomicI16,
    read_timeout: Option<Duration>,
}

impl TcpChannel {
    /// 建立到 `endpoint` 的连接并应用套接字选项。
    pub async fn connect(endpoint: Endpoint, options: &SocketOptions) -> Result<Self> {
        let stream = run_with_timeout(
            endpoint,
            error::CONNECT,
            Some(options.connect_timeout()),
            TcpStream::connect(endpoint.socket_addr()),
        )
        .await?;
        apply_socket_options(&stream, options)
            .map_err(|err| map_io_error(CONFIGURE, endpoint, err))?;
        debug!(host = %endpoint, "tcp channel established");
        Ok(Self::from_stream(
            endpoint,
            stream,
            Some(options.read_timeout()),
        ))
    }

    /// 包装一条已建立的流。
    pub fn from_stream(endpoint: Endpoint, stream: TcpStream, read_timeout: Option<Duration>) -> Self {
        Self {
            endpoint,
            stream: AsyncMutex::new(stream),
            closed: AtomicBool::new(false),
            shutdown: Notify::new(),
            next_stream: AtomicI16::new(0),
            read_timeout,
        }
    }

    fn allocate_stream_id(&self) -> i16 {
        // 流 ID 仅用于校验应答对齐，负值保留给服务端推送事件。
        let id = self.next_stream.fetch_add(1, Ordering::Relaxed);
        if id < 0 {
            self.next_stream.store(1, Ordering::Relaxed);
            0
        } else {
            id
        }
    }

    fn closed_error(&self) -> DriverError {
        DriverError::transport(self.endpoint, "channel is closed")
    }

    async fn exchange(&self, stream: &mut TcpStream, request: &Request) -> Result<Response> {
        let stream_id = self.allocate_stream_id();
        let frame =
            codec::encode_request(stream_id, request).map_err(|err| self.frame_failure(err))?;
        trace!(host = %self.endpoint, opcode = ?request.opcode(), stream_id, "sending request");
        run_with_timeout(self.endpoint, WRITE, None, stream.write_all(&frame)).await?;

        let read = codec::read_frame(stream);
        let (header, body) = match self.read_timeout {
            Some(limit) => tokio::time::timeout(limit, read)
                .await
                .map_err(|_| error::timeout_error(READ, self.endpoint, limit))?,
            None => read.await,
        }
        .map_err(|err| self.frame_failure(err))?;

        if header.stream != stream_id {
            return Err(DriverError::protocol_violation(
                self.endpoint,
                format!(
                    "response stream id {} does not match request stream id {stream_id}",
                    header.stream
                ),
            ));
        }
        codec::decode_response(&header, body).map_err(|err| map_frame_error(self.endpoint, err))
    }

    fn frame_failure(&self, err: FrameError) -> DriverError {
        if is_peer_gone(&err) {
            debug!(host = %self.endpoint, error = %err, "peer went away");
        }
        map_frame_error(self.endpoint, err)
    }
}

fn apply_socket_options(stream: &TcpStream, options: &SocketOptions) -> std::io::Result<()> {
    stream.set_nodelay(options.tcp_nodelay)?;
    SockRef::from(stream).set_keepalive(options.keepalive)
}

impl fmt::Debug for TcpChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TcpChannel")
            .field("endpoint", &self.endpoint)
            .field("closed", &self.is_closed())
            .finish()
    }
}

#[async_trait]
impl FrameChannel for TcpChannel {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    async fn request(&self, request: Request) -> Result<Response> {
        let notified = self.shutdown.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_closed() {
            return Err(self.closed_error());
        }

        let outcome = tokio::select! {
            biased;
            _ = &mut notified => Err(self.closed_error()),
            outcome = async {
                let mut stream = self.stream.lock().await;
                if self.is_closed() {
                    return Err(self.closed_error());
                }
                self.exchange(&mut stream, &request).await
            } => outcome,
        };

        if outcome.is_err() {
            self.closed.store(true, Ordering::Release);
        }
        outcome
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.shutdown.notify_waiters();
        let mut stream = self.stream.lock().await;
        if let Err(err) = stream.shutdown().await {
            trace!(host = %self.endpoint, error = %err, "tcp shutdown failed");
        }
        debug!(host = %self.endpoint, "tcp channel closed");
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// 为 [`FrameChannel`] 提供 `Arc` 形式的构造捷径。
pub(crate) fn into_shared(channel: TcpChannel) -> Arc<dyn FrameChannel> {
    Arc::new(channel)
}
