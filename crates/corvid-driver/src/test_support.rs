//! 单元测试用的脚本化通道：按顺序吐出预置响应，并记录收到的请求。

use std::{
    collections::VecDeque,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use corvid_core::{
    DriverError, Endpoint, Result,
    protocol::{Request, Response},
    transport::FrameChannel,
};
use parking_lot::Mutex;

#[derive(Debug)]
pub(crate) struct ScriptedChannel {
    endpoint: Endpoint,
    script: Mutex<VecDeque<Response>>,
    requests: Mutex<Vec<Request>>,
    closed: AtomicBool,
}

impl ScriptedChannel {
    pub(crate) fn new(endpoint: Endpoint, script: Vec<Response>) -> Arc<Self> {
        Arc::new(Self {
            endpoint,
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn requests(&self) -> Vec<Request> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl FrameChannel for ScriptedChannel {
    fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    async fn request(&self, request: Request) -> Result<Response> {
        if self.is_closed() {
            return Err(DriverError::transport(self.endpoint, "channel is closed"));
        }
        self.requests.lock().push(request);
        let next = self.script.lock().pop_front();
        next.ok_or_else(|| {
            self.closed.store(true, Ordering::Release);
            DriverError::transport(self.endpoint, "connection closed by peer")
        })
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
