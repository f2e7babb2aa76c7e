use std::{sync::Weak, time::Duration};

use corvid_core::{
    DriverError,
    protocol::{Request, Response},
};
use tokio::task::JoinHandle;
use tracing::trace;

use crate::connection::Connection;

/// 为已就绪的连接启动保活任务。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 空闲连接可能被中间设备静默丢弃，定期发送 `OPTIONS` 能尽早发现失效连接；
///
/// ## 逻辑 (How)
/// - 任务只持有 [`Weak`] 引用，连接被释放后自然退出；
/// - 每轮睡到“上次活动 + 间隔”，若期间有其他请求完成则顺延，只有真正空闲满一个间隔才发送；
/// - 失败时调用 [`Connection::mark_defunct`]：连接进入 `FAILED_TRANSPORT` 并关闭。
///
/// ## 契约 (What)
/// - 仅在连接进入 `READY` 之后由连接工厂调用，握手期间不存在保活任务；
/// - 连接离开 `READY` 后任务在下一轮退出。
pub(crate) fn spawn(connection: Weak<Connection>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let wake_at = match connection.upgrade() {
                Some(conn) if conn.is_ready() => conn.last_activity() + interval,
                _ => return,
            };
            tokio::time::sleep_until(wake_at).await;

            let Some(conn) = connection.upgrade() else {
                return;
            };
            if !conn.is_ready() {
                return;
            }
            if conn.last_activity() + interval > tokio::time::Instant::now() {
                continue;
            }

            trace!(host = %conn.host(), connection = conn.id(), "sending heartbeat");
            match conn.request(Request::Options).await {
                Ok(Response::Supported { .. }) | Ok(Response::Ready) => {}
                Ok(other) => {
                    let error = DriverError::protocol_violation(
                        conn.host(),
                        format!("unexpected {:?} response to heartbeat", other.opcode()),
                    );
                    conn.mark_defunct(&error).await;
                    return;
                }
                Err(error) => {
                    conn.mark_defunct(&error).await;
                    return;
                }
            }
        }
    })
}
