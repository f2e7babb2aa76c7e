use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use corvid_core::{DriverError, Endpoint, Result};
use futures::{StreamExt, stream};
use tracing::{debug, info};

use crate::{
    connection::Connection, factory::ConnectionFactory, pool::HostConnectionPool,
    registry::PoolRegistry,
};

/// 客户端会话：持有每个可用主机的连接池。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 集群初始化只由控制连接决定成败；各主机连接池的失败只影响该主机的可用性，
///   因此会话总能返回，失败的主机只是不出现在 [`SessionState::connected_hosts`] 中；
///
/// ## 逻辑 (How)
/// - 以 `buffer_unordered(max_concurrent_pool_creations)` 在调用方任务内并发建立连接池，
///   中止的连接池自行记录日志并被丢弃，只有 `READY` 的连接池进入 [`PoolRegistry`]；
///
/// ## 契约 (What)
/// - `close` 幂等，关闭全部连接池；关闭后 `borrow_connection` 返回 `Closed`。
#[derive(Clone, Debug)]
pub struct Session {
    inner: Arc<SessionInner>,
}

#[derive(Debug)]
pub(crate) struct SessionInner {
    pools: PoolRegistry,
    closed: AtomicBool,
}

impl Session {
    pub(crate) async fn open(factory: Arc<ConnectionFactory>, hosts: &[Endpoint]) -> Self {
        let limit = factory.pooling().max_concurrent_pool_creations.max(1);
        let pools = PoolRegistry::new();

        let mut creations = stream::iter(hosts.iter().copied())
            .map(|host| {
                let factory = Arc::clone(&factory);
                async move {
                    let pool = Arc::new(HostConnectionPool::new(host, factory));
                    let outcome = pool.initialize().await;
                    (pool, outcome)
                }
            })
            .buffer_unordered(limit);

        while let Some((pool, outcome)) = creations.next().await {
            match outcome {
                Ok(()) => {
                    pools.register(pool);
                }
                Err(err) => {
                    debug!(host = %pool.host(), error.kind = err.short_name(), "host left out of session");
                }
            }
        }

        info!(
            connected = pools.len(),
            known = hosts.len(),
            "session opened"
        );
        Self {
            inner: Arc::new(SessionInner {
                pools,
                closed: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn downgrade(&self) -> std::sync::Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    /// 会话当前状态的快照。
    pub fn state(&self) -> SessionState {
        let hosts = self.inner.pools.hosts();
        let open_connections = hosts
            .iter()
            .filter_map(|host| self.inner.pools.get(host))
            .map(|pool| (pool.host(), pool.open_connections()))
            .collect();
        SessionState {
            connected_hosts: hosts,
            open_connections,
        }
    }

    pub fn pool(&self, host: &Endpoint) -> Option<Arc<HostConnectionPool>> {
        self.inner.pools.get(host)
    }

    /// 从指定主机的连接池取出一条就绪连接。
    pub fn borrow_connection(&self, host: &Endpoint) -> Result<Arc<Connection>> {
        if self.is_closed() {
            return Err(DriverError::closed());
        }
        self.inner
            .pools
            .get(host)
            .ok_or_else(|| DriverError::transport(*host, "no connection pool for host"))?
            .borrow_connection()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub async fn close(&self) {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for pool in self.inner.pools.drain() {
            pool.close().await;
        }
        info!("session closed");
    }
}

/// [`Session::state`] 返回的只读快照。
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionState {
    connected_hosts: Vec<Endpoint>,
    open_connections: Vec<(Endpoint, usize)>,
}

impl SessionState {
    /// 拥有就绪连接池的主机，按地址排序。
    pub fn connected_hosts(&self) -> &[Endpoint] {
        &self.connected_hosts
    }

    pub fn open_connections(&self, host: &Endpoint) -> usize {
        self.open_connections
            .iter()
            .find(|(candidate, _)| candidate == host)
            .map_or(0, |(_, count)| *count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{reconnection::ConstantReconnectionPolicy, test_support::ScriptedChannel};
    use async_trait::async_trait;
    use corvid_core::{
        Metrics,
        auth::PlainTextAuthProvider,
        config::{PoolingOptions, SocketOptions},
        protocol::{Response, error_codes, mechanisms::PASSWORD_AUTHENTICATOR},
        transport::{Connector, FrameChannel},
    };
    use std::time::Duration;

    /// 端口 9042 的主机接受认证，其余主机拒绝。
    #[derive(Debug)]
    struct SplitConnector;

    #[async_trait]
    impl Connector for SplitConnector {
        async fn connect(
            &self,
            endpoint: Endpoint,
            _options: &SocketOptions,
        ) -> Result<Arc<dyn FrameChannel>> {
            let verdict = if endpoint.port() == 9042 {
                Response::AuthSuccess { token: None }
            } else {
                Response::Error {
                    code: error_codes::BAD_CREDENTIALS,
                    message: "bad credentials".into(),
                }
            };
            Ok(ScriptedChannel::new(
                endpoint,
                vec![
                    Response::Authenticate {
                        mechanism: PASSWORD_AUTHENTICATOR.to_owned(),
                    },
                    verdict,
                ],
            ))
        }
    }

    fn factory() -> Arc<ConnectionFactory> {
        Arc::new(ConnectionFactory::new(
            Arc::new(SplitConnector),
            Arc::new(PlainTextAuthProvider::new("cassandra", "cassandra")),
            SocketOptions::default(),
            PoolingOptions::default().with_core_connections_per_host(2),
            Arc::new(ConstantReconnectionPolicy::new(Duration::ZERO, Some(0))),
            Arc::new(Metrics::new()),
        ))
    }

    #[tokio::test]
    async fn rejected_hosts_are_left_out() {
        let good: Endpoint = "127.0.0.1:9042".parse().expect("endpoint");
        let bad: Endpoint = "127.0.0.2:9043".parse().expect("endpoint");
        let session = Session::open(factory(), &[good, bad]).await;

        let state = session.state();
        assert_eq!(state.connected_hosts(), &[good]);
        assert_eq!(state.open_connections(&good), 2);
        assert_eq!(state.open_connections(&bad), 0);
        assert!(session.borrow_connection(&good).is_ok());
        assert!(session.borrow_connection(&bad).is_err());

        session.close().await;
        assert!(session.state().connected_hosts().is_empty());
        assert_eq!(
            session
                .borrow_connection(&good)
                .expect_err("关闭后不可借用")
                .short_name(),
            "Closed"
        );
    }
}
