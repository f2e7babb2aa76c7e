use std::{future::Future, io, time::Duration};

use corvid_core::{DriverError, Endpoint};

use crate::error::{OperationKind, map_io_error, timeout_error};

/// 在给定超时内执行 IO Future，并把结果映射为驱动错误。
///
/// # 教案式注释
///
/// ## 意图 (Why)
/// - 连接建立与单次请求都需要“超时即失败”的语义，集中在此处理可保证错误文案一致。
///
/// ## 逻辑 (How)
/// - `tokio::select!` 以 `biased` 顺序先检查 IO 结果，再检查计时器，避免在两者同时就绪时
///   丢弃一个已经完成的结果；
///
/// ## 契约 (What)
/// - `timeout` 为 `None` 时不设上限；超时返回传输类错误，文案包含操作名与毫秒数。
pub(crate) async fn run_with_timeout<F, T>(
    host: Endpoint,
    kind: OperationKind,
    timeout: Option<Duration>,
    future: F,
) -> Result<T, DriverError>
where
    F: Future<Output = io::Result<T>>,
{
    tokio::pin!(future);
    match timeout {
        Some(limit) => {
            let sleep = tokio::time::sleep(limit);
            tokio::pin!(sleep);
            tokio::select! {
                biased;
                result = &mut future => result.map_err(|err| map_io_error(kind, host, err)),
                _ = &mut sleep => Err(timeout_error(kind, host, limit)),
            }
        }
        None => future.await.map_err(|err| map_io_error(kind, host, err)),
    }
}
