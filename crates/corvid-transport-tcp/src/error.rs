use std::{io, time::Duration};

use corvid_core::{DriverError, Endpoint};

use crate::codec::FrameError;

/// 描述一次底层操作对应的默认文案。
#[derive(Clone, Copy, Debug)]
pub(crate) struct OperationKind {
    pub message: &'static str,
}

pub(crate) const BIND: OperationKind = OperationKind {
    message: "tcp bind",
};
pub(crate) const ACCEPT: OperationKind = OperationKind {
    message: "tcp accept",
};
pub(crate) const CONNECT: OperationKind = OperationKind {
    message: "tcp connect",
};
pub(crate) const READ: OperationKind = OperationKind {
    message: "tcp read",
};
pub(crate) const WRITE: OperationKind = OperationKind {
    message: "tcp write",
};
pub(crate) const CONFIGURE: OperationKind = OperationKind {
    message: "tcp configure",
};

/// 将 IO 错误映射为驱动级传输错误。
pub(crate) fn map_io_error(kind: OperationKind, host: Endpoint, error: io::Error) -> DriverError {
    DriverError::transport(
        host,
        format!("{}: {} ({})", kind.message, error, describe_io_error(&error)),
    )
}

/// 构造超时错误；仍归入传输类，调用方据此决定是否重连。
pub(crate) fn timeout_error(kind: OperationKind, host: Endpoint, timeout: Duration) -> DriverError {
    DriverError::transport(
        host,
        format!("{} timed out after {} ms", kind.message, timeout.as_millis()),
    )
}

/// 读路径错误：帧格式问题属于协议违规，其余是传输故障。
pub(crate) fn map_frame_error(host: Endpoint, error: FrameError) -> DriverError {
    match error {
        FrameError::Io(err) => map_io_error(READ, host, err),
        FrameError::ConnectionClosed => {
            DriverError::transport(host, "connection closed by peer")
        }
        FrameError::Truncated => {
            DriverError::transport(host, "connection closed in the middle of a frame")
        }
        other => DriverError::protocol_violation(host, other.to_string()),
    }
}

/// 对端已不可达的错误，通道据此立即标记为关闭。
pub(crate) fn is_peer_gone(error: &FrameError) -> bool {
    match error {
        FrameError::ConnectionClosed | FrameError::Truncated => true,
        FrameError::Io(err) => matches!(
            err.kind(),
            io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::NotConnected
                | io::ErrorKind::UnexpectedEof
        ),
        _ => false,
    }
}

fn describe_io_error(error: &io::Error) -> &'static str {
    use io::ErrorKind;
    match error.kind() {
        ErrorKind::TimedOut => "timed out",
        ErrorKind::ConnectionRefused => "refused",
        ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
            "reset"
        }
        ErrorKind::NotConnected | ErrorKind::AddrNotAvailable | ErrorKind::AddrInUse => {
            "unreachable"
        }
        ErrorKind::PermissionDenied => "denied",
        _ => "io",
    }
}
