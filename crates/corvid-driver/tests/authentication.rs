//! 认证握手、连接池中止与粘滞初始化的端到端验证。
//!
//! 所有用例都通过真实的 TCP 传输与假节点交互，假节点实现见 `support` 模块。

mod support;

use std::{sync::Arc, time::Duration};

use corvid_core::{
    ErrorKind,
    auth::PlainTextAuthProvider,
    config::{PoolingOptions, SocketOptions},
    error::ALREADY_FAILED_MESSAGE,
    protocol::mechanisms::PASSWORD_AUTHENTICATOR,
    status::InitState,
};
use corvid_driver::{Cluster, ClusterBuilder, ConstantReconnectionPolicy};
use support::{FakeNode, NodeBehavior, RecordingAuthProvider, SlowAuthProvider};
use tracing_test::traced_test;

fn builder(node: &FakeNode) -> ClusterBuilder {
    Cluster::builder()
        .add_contact_point(node.endpoint())
        .with_reconnection_policy(Arc::new(ConstantReconnectionPolicy::new(
            Duration::from_millis(10),
            Some(0),
        )))
}

#[tokio::test(flavor = "multi_thread")]
async fn connects_with_valid_credentials() {
    let node = FakeNode::start(NodeBehavior::default()).await;
    let provider = Arc::new(RecordingAuthProvider::new("cassandra", "cassandra"));
    let cluster = builder(&node)
        .with_auth_provider(provider.clone())
        .build()
        .expect("build");

    let session = cluster.connect().await.expect("合法凭证必须连接成功");
    assert_eq!(session.state().connected_hosts(), &[node.endpoint()]);
    assert_eq!(cluster.init_state(), InitState::Ready);
    assert_eq!(cluster.metrics_snapshot().authentication_errors, 0);
    assert!(
        provider
            .calls()
            .iter()
            .all(|(host, mechanism)| *host == node.endpoint() && mechanism == PASSWORD_AUTHENTICATOR),
        "认证器必须按节点地址与服务端机制创建"
    );
    assert!(!provider.calls().is_empty());

    cluster.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn wrong_credentials_fail_and_stick() {
    let node = FakeNode::start(NodeBehavior::default()).await;
    let cluster = builder(&node)
        .with_credentials("bogus", "bogus")
        .build()
        .expect("build");

    let first = cluster.connect().await.expect_err("错误凭证必须失败");
    assert!(matches!(first.kind(), ErrorKind::AuthenticationFailed { .. }));
    assert!(
        first
            .to_string()
            .contains(&format!("Authentication error on host {}", node.endpoint()))
    );

    let second = cluster.connect().await.expect_err("粘滞失败不得重试");
    assert!(matches!(second.kind(), ErrorKind::AlreadyFailed { .. }));
    assert_eq!(second.to_string(), ALREADY_FAILED_MESSAGE);
    let cause = std::error::Error::source(&second).expect("必须携带原始原因");
    assert_eq!(cause.to_string(), first.to_string());
    assert!(
        second.original_cause().expect("cause").ptr_eq(&first),
        "cause 必须与第一次抛出的错误是同一实例"
    );
    assert_eq!(node.stats().startups(), 1, "粘滞失败后不得再握手");
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_credentials_fail_authentication() {
    let node = FakeNode::start(NodeBehavior::default()).await;
    let cluster = builder(&node).build().expect("build");

    let err = cluster.init().await.expect_err("无凭证必须失败");
    assert!(matches!(err.kind(), ErrorKind::AuthenticationFailed { .. }));
    assert_eq!(cluster.metrics_snapshot().authentication_errors, 1);
    assert_eq!(node.stats().auth_failures(), 0, "未发送任何令牌");
}

#[tokio::test(flavor = "multi_thread")]
async fn slow_authenticator_outlasting_heartbeat_succeeds() {
    let node = FakeNode::start(NodeBehavior {
        challenge_first: true,
        ..NodeBehavior::default()
    })
    .await;
    let cluster = builder(&node)
        .with_auth_provider(Arc::new(SlowAuthProvider::new(
            "cassandra",
            "cassandra",
            Duration::from_secs(2),
        )))
        .with_pooling_options(
            PoolingOptions::default().with_heartbeat_interval(Duration::from_secs(1)),
        )
        .build()
        .expect("build");

    let session = cluster
        .connect()
        .await
        .expect("慢速认证器最终必须成功");
    assert_eq!(session.state().connected_hosts(), &[node.endpoint()]);

    tokio::time::sleep(Duration::from_millis(1_500)).await;
    let snapshot = cluster.metrics_snapshot();
    assert_eq!(snapshot.handshake_timeouts, 0);
    assert_eq!(snapshot.heartbeat_failures, 0);
    assert_eq!(snapshot.connection_errors, 0);
    assert_eq!(session.state().open_connections(&node.endpoint()), 1);
    assert!(node.stats().heartbeats() >= 1, "空闲连接应已开始保活");

    cluster.close().await;
}

#[tokio::test(flavor = "multi_thread")]
#[traced_test]
async fn pool_with_wrong_credentials_is_left_out() {
    let node = FakeNode::start(NodeBehavior::default()).await;
    let provider = Arc::new(PlainTextAuthProvider::new("cassandra", "cassandra"));
    let cluster = builder(&node)
        .with_auth_provider(provider.clone())
        .build()
        .expect("build");
    cluster.init().await.expect("控制连接使用正确凭证");

    provider.set_password("wrong");
    let session = cluster.connect().await.expect("连接池失败不影响整体就绪");
    assert!(session.state().connected_hosts().is_empty());
    assert_eq!(cluster.metrics_snapshot().authentication_errors, 1);

    let host = node.endpoint().to_string();
    assert!(logs_contain(&format!("Error creating pool to {host}")));
    assert!(logs_contain(&format!("Authentication error on host {host}")));
    assert!(logs_contain("AuthenticationFailed"));
    logs_assert(|lines: &[&str]| {
        match lines
            .iter()
            .filter(|line| line.contains("Error creating pool to"))
            .count()
        {
            1 => Ok(()),
            n => Err(format!("中止记录应恰好输出一次，实际 {n} 次")),
        }
    });

    cluster.close().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_init_after_failure_never_counts_again() {
    let node = FakeNode::start(NodeBehavior::default()).await;
    let cluster = builder(&node)
        .with_credentials("cassandra", "wrong")
        .build()
        .expect("build");

    assert!(cluster.init().await.is_err());
    for _ in 0..5 {
        let err = cluster.init().await.expect_err("粘滞失败");
        assert!(matches!(err.kind(), ErrorKind::AlreadyFailed { .. }));
    }
    assert_eq!(cluster.metrics_snapshot().authentication_errors, 1);
    assert_eq!(node.stats().startups(), 1);
    assert_eq!(node.stats().auth_failures(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_handshake() {
    for valid in [true, false] {
        let node = FakeNode::start(NodeBehavior {
            startup_delay: Some(Duration::from_millis(100)),
            ..NodeBehavior::default()
        })
        .await;
        let password = if valid { "cassandra" } else { "wrong" };
        let cluster = builder(&node)
            .with_credentials("cassandra", password)
            .build()
            .expect("build");

        let callers: Vec<_> = (0..16)
            .map(|_| {
                let cluster = cluster.clone();
                tokio::spawn(async move { cluster.init().await })
            })
            .collect();
        let mut outcomes = Vec::new();
        for caller in callers {
            outcomes.push(caller.await.expect("join"));
        }

        assert_eq!(node.stats().startups(), 1, "并发初始化只允许一次握手");
        if valid {
            assert!(outcomes.iter().all(Result::is_ok));
        } else {
            let errors: Vec<_> = outcomes
                .into_iter()
                .map(|outcome| outcome.expect_err("所有调用方都应失败"))
                .collect();
            let root = errors[0].original_cause().unwrap_or(&errors[0]).clone();
            for err in &errors {
                assert!(err.original_cause().unwrap_or(err).ptr_eq(&root));
            }
        }
        cluster.close().await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn handshake_timeout_is_a_transport_failure() {
    let node = FakeNode::start(NodeBehavior {
        startup_delay: Some(Duration::from_millis(500)),
        ..NodeBehavior::default()
    })
    .await;
    let cluster = builder(&node)
        .with_credentials("cassandra", "cassandra")
        .with_socket_options(
            SocketOptions::default().with_handshake_timeout(Duration::from_millis(100)),
        )
        .build()
        .expect("build");

    let err = cluster.init().await.expect_err("握手超时");
    let ErrorKind::NoHostAvailable { errors } = err.kind() else {
        panic!("控制连接耗尽联系点后应报告 NoHostAvailable，实际 {err}");
    };
    assert_eq!(errors.len(), 1);
    assert_eq!(errors[0].0, node.endpoint());
    assert!(matches!(errors[0].1.kind(), ErrorKind::HandshakeTimeout { .. }));
    assert!(errors[0].1.category().is_reconnectable());

    let snapshot = cluster.metrics_snapshot();
    assert_eq!(snapshot.handshake_timeouts, 1);
    assert_eq!(snapshot.authentication_errors, 0);
    assert_eq!(snapshot.open_connections, 0);
}
