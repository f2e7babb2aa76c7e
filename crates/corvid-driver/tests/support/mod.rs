//! 集成测试用的假节点：基于真实 TCP 与帧编解码，按可编程策略应答握手。
#![allow(dead_code)]

use std::{
    collections::{BTreeMap, HashMap},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bytes::Bytes;
use corvid_core::{
    Endpoint, Result,
    auth::{AuthProvider, Authenticator, PlainTextAuthProvider},
    protocol::{Request, Response, error_codes, mechanisms},
};
use corvid_transport_tcp::{FrameListener, ServerFrameStream};
use parking_lot::Mutex;
use tokio::task::JoinHandle;

/// 假节点的应答策略。
#[derive(Clone, Debug)]
pub struct NodeBehavior {
    pub require_auth: bool,
    pub mechanism: String,
    pub users: HashMap<String, String>,
    /// 首个 AUTH_RESPONSE 之后先下发 `PLAIN-START` 挑战，再校验令牌。
    pub challenge_first: bool,
    /// STARTUP 应答前的延迟，用于模拟繁忙节点。
    pub startup_delay: Option<Duration>,
}

impl Default for NodeBehavior {
    fn default() -> Self {
        Self {
            require_auth: true,
            mechanism: mechanisms::PASSWORD_AUTHENTICATOR.to_owned(),
            users: HashMap::from([("cassandra".to_owned(), "cassandra".to_owned())]),
            challenge_first: false,
            startup_delay: None,
        }
    }
}

/// 节点侧计数器。
#[derive(Debug, Default)]
pub struct NodeStats {
    pub connections: AtomicUsize,
    pub startups: AtomicUsize,
    pub auth_successes: AtomicUsize,
    pub auth_failures: AtomicUsize,
    pub heartbeats: AtomicUsize,
}

impl NodeStats {
    pub fn startups(&self) -> usize {
        self.startups.load(Ordering::SeqCst)
    }

    pub fn auth_failures(&self) -> usize {
        self.auth_failures.load(Ordering::SeqCst)
    }

    pub fn auth_successes(&self) -> usize {
        self.auth_successes.load(Ordering::SeqCst)
    }

    pub fn heartbeats(&self) -> usize {
        self.heartbeats.load(Ordering::SeqCst)
    }
}

pub struct FakeNode {
    endpoint: Endpoint,
    stats: Arc<NodeStats>,
    task: JoinHandle<()>,
}

impl FakeNode {
    pub async fn start(behavior: NodeBehavior) -> Self {
        let listener = FrameListener::bind("127.0.0.1:0".parse().expect("endpoint"))
            .await
            .expect("假节点绑定失败");
        let endpoint = listener.local_endpoint();
        let stats = Arc::new(NodeStats::default());
        let behavior = Arc::new(behavior);

        let task = {
            let stats = Arc::clone(&stats);
            tokio::spawn(async move {
                while let Ok(stream) = listener.accept().await {
                    stats.connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        stream,
                        Arc::clone(&behavior),
                        Arc::clone(&stats),
                    ));
                }
            })
        };

        Self {
            endpoint,
            stats,
            task,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    pub fn stats(&self) -> &NodeStats {
        &self.stats
    }
}

impl Drop for FakeNode {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: ServerFrameStream, behavior: Arc<NodeBehavior>, stats: Arc<NodeStats>) {
    let mut challenged = false;
    while let Ok((stream_id, request)) = stream.read_request().await {
        let response = match request {
            Request::Startup { .. } => {
                stats.startups.fetch_add(1, Ordering::SeqCst);
                if let Some(delay) = behavior.startup_delay {
                    tokio::time::sleep(delay).await;
                }
                if behavior.require_auth {
                    Response::Authenticate {
                        mechanism: behavior.mechanism.clone(),
                    }
                } else {
                    Response::Ready
                }
            }
            Request::AuthResponse { token } => {
                if behavior.challenge_first && !challenged {
                    challenged = true;
                    Response::AuthChallenge {
                        token: Some(Bytes::from_static(b"PLAIN-START")),
                    }
                } else {
                    verify(&behavior, token.as_deref(), &stats)
                }
            }
            Request::Options => {
                stats.heartbeats.fetch_add(1, Ordering::SeqCst);
                Response::Supported {
                    options: BTreeMap::from([(
                        "CQL_VERSION".to_owned(),
                        vec!["3.0.0".to_owned()],
                    )]),
                }
            }
        };
        if stream.write_response(stream_id, &response).await.is_err() {
            break;
        }
    }
}

fn verify(behavior: &NodeBehavior, token: Option<&[u8]>, stats: &NodeStats) -> Response {
    let (user, password) = token
        .and_then(parse_plain)
        .unwrap_or_else(|| (String::new(), String::new()));
    if behavior.users.get(&user) == Some(&password) {
        stats.auth_successes.fetch_add(1, Ordering::SeqCst);
        Response::AuthSuccess { token: None }
    } else {
        stats.auth_failures.fetch_add(1, Ordering::SeqCst);
        Response::Error {
            code: error_codes::BAD_CREDENTIALS,
            message: format!("Provided username {user} and/or password are incorrect"),
        }
    }
}

fn parse_plain(token: &[u8]) -> Option<(String, String)> {
    let mut parts = token.split(|byte| *byte == 0);
    let _authzid = parts.next()?;
    let user = String::from_utf8(parts.next()?.to_vec()).ok()?;
    let password = String::from_utf8(parts.next()?.to_vec()).ok()?;
    Some((user, password))
}

/// 记录每次 `new_authenticator` 调用的凭证来源。
#[derive(Debug)]
pub struct RecordingAuthProvider {
    inner: PlainTextAuthProvider,
    calls: Mutex<Vec<(Endpoint, String)>>,
}

impl RecordingAuthProvider {
    pub fn new(username: &str, password: &str) -> Self {
        Self {
            inner: PlainTextAuthProvider::new(username, password),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<(Endpoint, String)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AuthProvider for RecordingAuthProvider {
    async fn new_authenticator(
        &self,
        host: &Endpoint,
        mechanism: &str,
    ) -> Result<Box<dyn Authenticator>> {
        self.calls.lock().push((*host, mechanism.to_owned()));
        self.inner.new_authenticator(host, mechanism).await
    }
}

/// 在应答挑战前故意停顿的凭证来源，模拟缓慢但最终正确的认证器。
#[derive(Debug)]
pub struct SlowAuthProvider {
    inner: PlainTextAuthProvider,
    pause: Duration,
}

impl SlowAuthProvider {
    pub fn new(username: &str, password: &str, pause: Duration) -> Self {
        Self {
            inner: PlainTextAuthProvider::new(username, password),
            pause,
        }
    }
}

#[async_trait]
impl AuthProvider for SlowAuthProvider {
    async fn new_authenticator(
        &self,
        host: &Endpoint,
        mechanism: &str,
    ) -> Result<Box<dyn Authenticator>> {
        let inner = self.inner.new_authenticator(host, mechanism).await?;
        Ok(Box::new(SlowAuthenticator {
            inner,
            pause: self.pause,
        }))
    }
}

struct SlowAuthenticator {
    inner: Box<dyn Authenticator>,
    pause: Duration,
}

#[async_trait]
impl Authenticator for SlowAuthenticator {
    async fn initial_response(&mut self) -> Result<Option<Bytes>> {
        self.inner.initial_response().await
    }

    async fn evaluate_challenge(&mut self, challenge: Option<Bytes>) -> Result<Option<Bytes>> {
        tokio::time::sleep(self.pause).await;
        self.inner.evaluate_challenge(challenge).await
    }

    async fn on_authentication_success(&mut self, token: Option<Bytes>) -> Result<()> {
        self.inner.on_authentication_success(token).await
    }
}
