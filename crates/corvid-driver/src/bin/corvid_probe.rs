//! 连通性探测工具：按配置文件初始化集群，打印已连接主机与指标后退出。
//!
//! # 使用方法
//! ```bash
//! RUST_LOG=corvid_driver=debug cargo run --bin corvid_probe -- cluster.toml
//! ```
//! - `cluster.toml`：`ClusterConfig` 格式的配置文件，至少包含 `contact_points`。
//!
//! # 设计要点（Why）
//! - 运维排查认证问题时，只需要知道“控制连接能否认证”以及“哪些主机的连接池建成了”；
//!   日志中的 `Error creating pool to` 记录与退出码足以定位问题主机。

use std::{env, path::PathBuf, process::ExitCode};

use corvid_driver::{Cluster, config::ClusterConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("探测失败: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), String> {
    let path = env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| "用法: corvid_probe <cluster.toml>".to_owned())?;
    let config = ClusterConfig::from_path(&path).map_err(|err| err.to_string())?;
    let cluster = Cluster::from_config(&config).map_err(|err| err.to_string())?;

    let outcome = cluster.connect().await;
    let result = match &outcome {
        Ok(session) => {
            let state = session.state();
            for host in state.connected_hosts() {
                println!("{host}\t{} connection(s)", state.open_connections(host));
            }
            Ok(())
        }
        Err(err) => Err(format!("[{}] {err}", err.short_name())),
    };
    println!("{:?}", cluster.metrics_snapshot());
    cluster.close().await;
    result
}
