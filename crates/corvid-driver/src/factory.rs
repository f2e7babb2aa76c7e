use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use corvid_core::{
    DriverError, Endpoint, Metrics, Result,
    auth::AuthProvider,
    config::{PoolingOptions, SocketOptions},
    transport::Connector,
};
use tracing::debug;

use crate::{connection::Connection, heartbeat, reconnection::ReconnectionPolicy};

/// 连接工厂：建立通道、执行握手、挂接保活，并维护相关指标。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 控制连接与各主机连接池使用同一套握手规则，集中在此避免两处实现出现分歧；
///
/// ## 逻辑 (How)
/// 1. 通过 [`Connector`] 建立通道，失败计入 `connection_errors`；
/// 2. 在 `handshake_timeout` 内执行握手；
/// 3. 成功则进入 `READY` 并启动保活；失败按分类记账：认证终止计入 `authentication_errors`，
///    超时计入 `handshake_timeouts` 与 `connection_errors`，其余传输故障计入 `connection_errors`。
///
/// ## 契约 (What)
/// - 每次 [`open`](Self::open) 最多创建一个认证器，且每条失败连接最多记一次账；
/// - 返回错误时通道已经关闭，不遗留打开的连接。
#[derive(Debug)]
pub struct ConnectionFactory {
    connector: Arc<dyn Connector>,
    auth_provider: Arc<dyn AuthProvider>,
    socket: SocketOptions,
    pooling: PoolingOptions,
    reconnection: Arc<dyn ReconnectionPolicy>,
    metrics: Arc<Metrics>,
    next_id: AtomicU64,
}

impl ConnectionFactory {
    pub(crate) fn new(
        connector: Arc<dyn Connector>,
        auth_provider: Arc<dyn AuthProvider>,
        socket: SocketOptions,
        pooling: PoolingOptions,
        reconnection: Arc<dyn ReconnectionPolicy>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            connector,
            auth_provider,
            socket,
            pooling,
            reconnection,
            metrics,
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pooling(&self) -> &PoolingOptions {
        &self.pooling
    }

    pub fn socket(&self) -> &SocketOptions {
        &self.socket
    }

    pub fn reconnection_policy(&self) -> &dyn ReconnectionPolicy {
        self.reconnection.as_ref()
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// 建立一条已认证的连接。
    pub async fn open(&self, host: Endpoint) -> Result<Arc<Connection>> {
        let errors = self.metrics.error_metrics();
        let channel = match self.connector.connect(host, &self.socket).await {
            Ok(channel) => channel,
            Err(err) => {
                errors.record_connection_error();
                return Err(err);
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let connection = Arc::new(Connection::new(
            id,
            host,
            channel,
            Arc::clone(&self.metrics),
        ));
        let limit = self.socket.handshake_timeout();
        let outcome = match tokio::time::timeout(
            limit,
            connection.handshake(self.auth_provider.as_ref()),
        )
        .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                errors.record_handshake_timeout();
                Err(DriverError::handshake_timeout(host, limit))
            }
        };

        match outcome {
            Ok(()) => {
                connection.mark_ready();
                connection.attach_heartbeat(heartbeat::spawn(
                    Arc::downgrade(&connection),
                    self.pooling.heartbeat_interval(),
                ));
                debug!(%host, connection = id, "connection ready");
                Ok(connection)
            }
            Err(err) => {
                if err.is_authentication_terminal() {
                    errors.record_authentication_error();
                } else {
                    errors.record_connection_error();
                }
                debug!(
                    %host,
                    connection = id,
                    error.kind = err.short_name(),
                    "connection handshake failed: {err}"
                );
                connection.mark_failed(&err).await;
                Err(err)
            }
        }
    }
}
