//! 集群配置：联系点、连接池、套接字、重连与凭证。
//!
//! # 教案式注释
//!
//! ## 意图 (Why)
//! - 将握手超时、保活间隔、核心连接数等阈值集中管理，避免在连接、连接池、集群三层各自散落默认值；
//! - 支持从 TOML 文件加载，便于运维以声明式方式调整。
//!
//! ## 契约 (What)
//! - 所有时长字段以毫秒记录（`*_ms`），通过访问器转换为 [`Duration`]；
//! - 缺省字段取 `Default` 值，未知字段直接拒绝，防止拼写错误被静默忽略；
//! - [`ClusterConfig::validate`] 在构造集群前执行，违反约束时返回 `InvalidConfiguration`。
//!
//! ## 注意事项 (Trade-offs)
//! - 凭证以明文出现在配置中仅适用于开发环境；凭证存储与轮换策略不在本 crate 职责范围内。

use std::{fmt, path::Path, time::Duration};

use serde::Deserialize;

use crate::{
    endpoint::{DEFAULT_PORT, Endpoint},
    error::{DriverError, Result},
};

/// 连接池相关选项。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct PoolingOptions {
    /// 每个主机维持的核心连接数。
    pub core_connections_per_host: usize,
    /// 空闲连接发送保活请求的间隔。
    pub heartbeat_interval_ms: u64,
    /// 同时建立的主机连接池数量上限。
    pub max_concurrent_pool_creations: usize,
}

impl PoolingOptions {
    pub fn with_core_connections_per_host(mut self, count: usize) -> Self {
        self.core_connections_per_host = count;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = duration_to_ms(interval);
        self
    }

    pub fn with_max_concurrent_pool_creations(mut self, limit: usize) -> Self {
        self.max_concurrent_pool_creations = limit;
        self
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            (
                "pooling.core_connections_per_host",
                self.core_connections_per_host as u64,
            ),
            ("pooling.heartbeat_interval_ms", self.heartbeat_interval_ms),
            (
                "pooling.max_concurrent_pool_creations",
                self.max_concurrent_pool_creations as u64,
            ),
        ] {
            ensure_positive(field, value)?;
        }
        Ok(())
    }
}

impl Default for PoolingOptions {
    fn default() -> Self {
        Self {
            core_connections_per_host: 1,
            heartbeat_interval_ms: 30_000,
            max_concurrent_pool_creations: 8,
        }
    }
}

/// 套接字与握手超时选项。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SocketOptions {
    /// 建立 TCP 连接的超时。
    pub connect_timeout_ms: u64,
    /// 从发送 STARTUP 到握手结束（含认证器内部耗时）的超时。
    pub handshake_timeout_ms: u64,
    /// 握手之后单次请求（含保活）的超时。
    pub read_timeout_ms: u64,
    pub tcp_nodelay: bool,
    pub keepalive: bool,
}

impl SocketOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_to_ms(timeout);
        self
    }

    pub fn with_handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout_ms = duration_to_ms(timeout);
        self
    }

    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout_ms = duration_to_ms(timeout);
        self
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_positive("socket.connect_timeout_ms", self.connect_timeout_ms)?;
        ensure_positive("socket.handshake_timeout_ms", self.handshake_timeout_ms)?;
        ensure_positive("socket.read_timeout_ms", self.read_timeout_ms)
    }
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 5_000,
            handshake_timeout_ms: 12_000,
            read_timeout_ms: 12_000,
            tcp_nodelay: true,
            keepalive: true,
        }
    }
}

/// 连接池填充阶段的重连选项（指数退避）。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ReconnectionOptions {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// 单个连接槽位允许的重试次数；`None` 表示不设上限。
    pub max_attempts: Option<u32>,
}

impl ReconnectionOptions {
    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }
}

impl Default for ReconnectionOptions {
    fn default() -> Self {
        Self {
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
            max_attempts: Some(2),
        }
    }
}

/// 用户名与口令。
#[derive(Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// 集群配置根节点。
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ClusterConfig {
    pub contact_points: Vec<String>,
    /// 联系点未写端口时使用的端口。
    pub port: u16,
    pub pooling: PoolingOptions,
    pub socket: SocketOptions,
    pub reconnection: ReconnectionOptions,
    pub credentials: Option<CredentialsConfig>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            contact_points: Vec::new(),
            port: DEFAULT_PORT,
            pooling: PoolingOptions::default(),
            socket: SocketOptions::default(),
            reconnection: ReconnectionOptions::default(),
            credentials: None,
        }
    }
}

impl ClusterConfig {
    /// 解析 TOML 文本并校验。
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: ClusterConfig = toml::from_str(raw)
            .map_err(|err| DriverError::invalid_configuration(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 读取并解析 TOML 文件。
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| {
            DriverError::invalid_configuration(format!("cannot read {}: {err}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// 将联系点解析为端点列表，保持声明顺序并去重。
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        let mut endpoints = Vec::with_capacity(self.contact_points.len());
        for raw in &self.contact_points {
            let endpoint = Endpoint::parse_with_default_port(raw, self.port)?;
            if !endpoints.contains(&endpoint) {
                endpoints.push(endpoint);
            }
        }
        Ok(endpoints)
    }

    pub fn validate(&self) -> Result<()> {
        if self.contact_points.is_empty() {
            return Err(DriverError::invalid_configuration(
                "at least one contact point is required",
            ));
        }
        self.endpoints()?;
        self.pooling.validate()?;
        self.socket.validate()?;
        if self.reconnection.base_delay_ms > self.reconnection.max_delay_ms {
            return Err(DriverError::invalid_configuration(
                "reconnection.base_delay_ms must not exceed reconnection.max_delay_ms",
            ));
        }
        Ok(())
    }
}

fn ensure_positive(field: &str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(DriverError::invalid_configuration(format!(
            "{field} must be positive"
        )));
    }
    Ok(())
}

fn duration_to_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
