//! 主机端点：集群中一个节点的可连接地址。

use std::{
    fmt,
    net::{IpAddr, SocketAddr},
    str::FromStr,
};

use crate::error::DriverError;

/// 节点未显式给出端口时使用的默认原生协议端口。
pub const DEFAULT_PORT: u16 = 9042;

/// 集群节点的标识与地址。
///
/// - **契约 (What)**：`Display` 输出 `ip:port`，日志与错误文案按该格式携带主机地址；
/// - **风险 (Trade-offs)**：仅接受字面 IP，不做 DNS 解析，拓扑发现不在本层职责之内。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub const fn new(addr: SocketAddr) -> Self {
        Self(addr)
    }

    pub const fn socket_addr(&self) -> SocketAddr {
        self.0
    }

    pub fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }

    /// 解析 `ip:port` 或裸 IP；裸 IP 使用 `default_port`。
    pub fn parse_with_default_port(raw: &str, default_port: u16) -> Result<Self, DriverError> {
        let trimmed = raw.trim();
        if let Ok(addr) = trimmed.parse::<SocketAddr>() {
            return Ok(Self(addr));
        }
        trimmed
            .parse::<IpAddr>()
            .map(|ip| Self(SocketAddr::new(ip, default_port)))
            .map_err(|_| DriverError::invalid_configuration(format!("invalid contact point `{raw}`")))
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl FromStr for Endpoint {
    type Err = DriverError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_with_default_port(s, DEFAULT_PORT)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}
