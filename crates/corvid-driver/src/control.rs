use std::sync::Arc;

use corvid_core::{DriverError, Endpoint, Result};
use tracing::{debug, info};

use crate::{connection::Connection, factory::ConnectionFactory};

/// 控制连接：集群初始化时建立的第一条连接，用于验证可达性与认证。
///
/// # 教案式注释
///
/// ## 逻辑 (How)
/// - 按声明顺序尝试联系点；传输类失败换下一个主机，认证终止类失败立即返回，
///   因为换主机无法修复被拒的凭证；
///
/// ## 契约 (What)
/// - 成功时返回的连接已处于 `READY`，其认证器已到达 `SUCCEEDED`；
/// - 所有联系点均因传输故障失败时返回 `NoHostAvailable`，逐一列出各主机的原因。
#[derive(Debug)]
pub struct ControlConnection {
    connection: Arc<Connection>,
}

impl ControlConnection {
    pub async fn connect(factory: &ConnectionFactory, contact_points: &[Endpoint]) -> Result<Self> {
        let mut errors = Vec::new();
        for &host in contact_points {
            match factory.open(host).await {
                Ok(connection) => {
                    info!(%host, "control connection established");
                    return Ok(Self { connection });
                }
                Err(err) if err.is_authentication_terminal() => return Err(err),
                Err(err) => {
                    debug!(%host, error.kind = err.short_name(), "control connection attempt failed: {err}");
                    errors.push((host, err));
                }
            }
        }
        Err(DriverError::no_host_available(errors))
    }

    pub fn host(&self) -> Endpoint {
        self.connection.host()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.connection
    }

    pub async fn close(&self) {
        self.connection.close().await;
    }
}
