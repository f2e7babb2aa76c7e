#![doc = r#"
# corvid-core

## 设计动机（Why）
- **定位**：为集群感知的数据库客户端提供“连接能否变得可用”这一关口的共享契约：
  凭证来源、认证器状态机、错误分类、传输接缝、指标与配置。
- **架构角色**：位于依赖图最底层，`corvid-transport-tcp` 实现其中的传输接缝，
  `corvid-driver` 基于这些契约编排连接握手、连接池与集群初始化。

## 核心契约（What）
- [`auth`]：`AuthProvider`（凭证来源）按 `(host, mechanism)` 生产一次性的
  [`Authenticator`](auth::Authenticator)；
- [`error`]：`DriverError` 以 `Arc` 共享同一故障实例，`ErrorCategory` 决定是否允许重连；
- [`transport`]：`Connector`/`FrameChannel` 两个 trait 把线级编码隔离在下层；
- [`metrics`]：单调计数器，`authentication_errors` 每条认证失败的连接只累加一次；
- [`config`]：TOML 可加载的集群、连接池、套接字与重连配置。

## 风险与考量（Trade-offs）
- 认证器接口全部为 `async`，允许实现方执行任意耗时的工作；驱动侧因此不能假设握手延迟有界，
  必须由显式的握手超时兜底。
"#]

pub mod auth;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod status;
pub mod transport;

pub use endpoint::Endpoint;
pub use error::{DriverError, ErrorCategory, ErrorKind, Result};
pub use metrics::{Metrics, MetricsSnapshot};
