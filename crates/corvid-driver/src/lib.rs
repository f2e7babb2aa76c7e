#![doc = r#"
# corvid-driver

## 模块使命（Why）
- **连接可用性关口**：决定一个集群客户端能否开始工作：逐连接完成挑战/应答认证，
  按主机建立连接池，并把集群初始化的成败记为粘滞结果。
- **失败可追溯**：认证被拒立即中止对应主机的连接池并输出可被日志监控匹配的记录；
  控制连接认证失败使整个实例进入不可恢复的失败态，之后的每次调用都携带最初的原因。

## 核心契约（What）
- [`Cluster`]：`init` / `connect` / `close`，初始化在并发调用下只执行一次握手；
- [`HostConnectionPool`]：探测连接先行，首个认证失败中止整次填充，传输故障按 [`ReconnectionPolicy`] 重试；
- [`Connection`]：严格串行的握手状态机，超时归类为传输失败；就绪后由保活任务定期探活；
- [`Session`]：持有已就绪的连接池，`state().connected_hosts()` 只包含成功建池的主机。

## 实现策略（How）
- 结果单元使用 `tokio::sync::OnceCell`，失败以 `Arc` 共享的 `DriverError` 存储，保证原因的同一性；
- 连接池在调用方任务内以 `FuturesUnordered` / `buffer_unordered` 并发推进，日志与调用方处于同一上下文；
- 连接池仓储基于 `DashMap`，连接与池的状态使用 `parking_lot` 锁保护。
"#]

mod cluster;
mod connection;
mod control;
mod factory;
mod heartbeat;
mod pool;
mod reconnection;
mod registry;
mod session;

#[cfg(test)]
mod test_support;

pub use cluster::{Cluster, ClusterBuilder};
pub use connection::Connection;
pub use control::ControlConnection;
pub use factory::ConnectionFactory;
pub use pool::HostConnectionPool;
pub use reconnection::{
    ConstantReconnectionPolicy, ExponentialReconnectionPolicy, ReconnectionPolicy,
    ReconnectionSchedule,
};
pub use registry::PoolRegistry;
pub use session::{Session, SessionState};

pub use corvid_core::{
    DriverError, Endpoint, ErrorCategory, ErrorKind, Metrics, MetricsSnapshot, Result, auth,
    config, status,
};
