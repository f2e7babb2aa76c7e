//! 握手与保活使用的协议消息。
//!
//! ## 角色定位（Why）
//! - 驱动只关心消息的语义形态，线级编码交给实现 [`crate::transport::FrameChannel`] 的传输层；
//! - 操作码沿用原生协议 v4 的取值，便于与真实节点及抓包工具对照。

use std::collections::BTreeMap;

use bytes::Bytes;

/// 常见的服务端认证器名称。
pub mod mechanisms {
    pub const PASSWORD_AUTHENTICATOR: &str = "org.apache.cassandra.auth.PasswordAuthenticator";
    pub const DSE_AUTHENTICATOR: &str = "com.datastax.bdp.cassandra.auth.DseAuthenticator";
    pub const TRANSITIONAL_AUTHENTICATOR: &str = "com.scylladb.auth.TransitionalAuthenticator";
}

/// STARTUP 选项键。
pub mod startup {
    pub const CQL_VERSION: &str = "CQL_VERSION";
    pub const DRIVER_NAME: &str = "DRIVER_NAME";
    pub const DRIVER_VERSION: &str = "DRIVER_VERSION";

    pub const DEFAULT_CQL_VERSION: &str = "3.0.0";
}

/// ERROR 响应中的错误码。
pub mod error_codes {
    pub const SERVER_ERROR: i32 = 0x0000;
    pub const PROTOCOL_ERROR: i32 = 0x000A;
    pub const BAD_CREDENTIALS: i32 = 0x0100;
    pub const OVERLOADED: i32 = 0x1001;
}

/// 帧操作码。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    Error = 0x00,
    Startup = 0x01,
    Ready = 0x02,
    Authenticate = 0x03,
    Options = 0x05,
    Supported = 0x06,
    AuthChallenge = 0x0E,
    AuthResponse = 0x0F,
    AuthSuccess = 0x10,
}

impl Opcode {
    pub fn from_u8(raw: u8) -> Option<Self> {
        Some(match raw {
            0x00 => Opcode::Error,
            0x01 => Opcode::Startup,
            0x02 => Opcode::Ready,
            0x03 => Opcode::Authenticate,
            0x05 => Opcode::Options,
            0x06 => Opcode::Supported,
            0x0E => Opcode::AuthChallenge,
            0x0F => Opcode::AuthResponse,
            0x10 => Opcode::AuthSuccess,
            _ => return None,
        })
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 客户端发出的请求。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Request {
    Startup { options: BTreeMap<String, String> },
    AuthResponse { token: Option<Bytes> },
    Options,
}

impl Request {
    /// 驱动默认的 STARTUP 请求。
    pub fn startup() -> Self {
        let mut options = BTreeMap::new();
        options.insert(
            startup::CQL_VERSION.to_owned(),
            startup::DEFAULT_CQL_VERSION.to_owned(),
        );
        options.insert(startup::DRIVER_NAME.to_owned(), "corvid".to_owned());
        options.insert(
            startup::DRIVER_VERSION.to_owned(),
            env!("CARGO_PKG_VERSION").to_owned(),
        );
        Request::Startup { options }
    }

    pub fn opcode(&self) -> Opcode {
        match self {
            Request::Startup { .. } => Opcode::Startup,
            Request::AuthResponse { .. } => Opcode::AuthResponse,
            Request::Options => Opcode::Options,
        }
    }
}

/// 服务端返回的响应。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Response {
    Ready,
    Authenticate { mechanism: String },
    AuthChallenge { token: Option<Bytes> },
    AuthSuccess { token: Option<Bytes> },
    Supported { options: BTreeMap<String, Vec<String>> },
    Error { code: i32, message: String },
}

impl Response {
    pub fn opcode(&self) -> Opcode {
        match self {
            Response::Ready => Opcode::Ready,
            Response::Authenticate { .. } => Opcode::Authenticate,
            Response::AuthChallenge { .. } => Opcode::AuthChallenge,
            Response::AuthSuccess { .. } => Opcode::AuthSuccess,
            Response::Supported { .. } => Opcode::Supported,
            Response::Error { .. } => Opcode::Error,
        }
    }
}
