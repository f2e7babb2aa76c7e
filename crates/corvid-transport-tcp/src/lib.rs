#![doc = r#"
# corvid-transport-tcp

## 模块使命（Why）
- **落地传输接缝**：为 `corvid-core` 的 `Connector`/`FrameChannel` 提供基于 Tokio TCP 的实现，
  让握手驱动只面对语义消息，而不关心字节布局。
- **测试对端**：提供服务端视角的 `FrameListener`，集成测试以它搭建可编程的假节点。

## 核心契约（What）
- `TcpConnector::connect` 受连接超时约束，并按配置设置 `TCP_NODELAY` 与 `SO_KEEPALIVE`；
- `TcpChannel` 上的请求严格串行，任何失败都会使通道关闭；
- 帧格式沿用原生协议 v4：9 字节帧头加消息体，详见 [`codec`]。

## 实现策略（How）
- 读写通过 `tokio::sync::Mutex<TcpStream>` 串行化，超时由内部工具函数以 `tokio::select!` 注入；
- IO 错误统一映射为传输类 `DriverError`，帧格式错误映射为协议违规。
"#]

pub mod codec;

mod channel;
mod connector;
mod error;
mod listener;
mod util;

pub use channel::TcpChannel;
pub use codec::FrameError;
pub use connector::TcpConnector;
pub use listener::{FrameListener, ServerFrameStream};
