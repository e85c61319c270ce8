//! Test doubles for channels and engines.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use parking_lot::Mutex;
use serde_json::{json, Value};
use switchyard_core::jsonrpc::{ErrorObject, JsonRpcRequest};
use switchyard_core::{session_factory, Engine, Peer, SessionFactory, SessionId};

use crate::channel::{Channel, ChannelFactory, ChannelRequest, SESSION_HEADER};
use crate::error::ChannelError;
use crate::hooks::{ClosedSignal, EstablishedSignal, SessionHooks};

/// Minimal channel: a POST whose body has `"method":"initialize"` establishes
/// a fresh session; every other exchange is echoed back.
pub(crate) struct StubChannel {
    established: Mutex<Option<EstablishedSignal>>,
    closed_signal: Mutex<Option<ClosedSignal>>,
    session_id: Mutex<Option<SessionId>>,
    closed: AtomicBool,
    pub(crate) close_calls: AtomicUsize,
    pub(crate) bodies: Mutex<Vec<Option<Value>>>,
    pub(crate) engine: Mutex<Option<Arc<dyn Engine>>>,
}

impl StubChannel {
    pub(crate) fn new(hooks: SessionHooks) -> Arc<Self> {
        Arc::new(Self {
            established: Mutex::new(Some(hooks.established)),
            closed_signal: Mutex::new(Some(hooks.closed)),
            session_id: Mutex::new(None),
            closed: AtomicBool::new(false),
            close_calls: AtomicUsize::new(0),
            bodies: Mutex::new(Vec::new()),
            engine: Mutex::new(None),
        })
    }

    pub(crate) fn detached() -> Arc<dyn Channel> {
        Self::new(SessionHooks::detached())
    }

    fn with_header(&self, mut response: Response) -> Response {
        if let Some(id) = self.session_id.lock().as_ref() {
            if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                response.headers_mut().insert(SESSION_HEADER, value);
            }
        }
        response
    }
}

#[async_trait]
impl Channel for StubChannel {
    async fn bind(&self, engine: Arc<dyn Engine>) -> Result<(), ChannelError> {
        {
            let mut slot = self.engine.lock();
            if slot.is_some() {
                return Err(ChannelError::AlreadyBound);
            }
            *slot = Some(Arc::clone(&engine));
        }
        let (peer, _link) = Peer::pair(8);
        engine.on_bind(peer).await;
        Ok(())
    }

    async fn handle(&self, request: ChannelRequest, body: Option<Value>) -> Response {
        self.bodies.lock().push(body.clone());

        if request.method == Method::DELETE {
            self.close().await;
            return StatusCode::OK.into_response();
        }

        let wants_init = body
            .as_ref()
            .and_then(|b| b.get("method"))
            .and_then(Value::as_str)
            == Some("initialize");
        if wants_init {
            let id = SessionId::new();
            *self.session_id.lock() = Some(id.clone());
            if let Some(signal) = self.established.lock().take() {
                signal.fire(id);
            }
        }

        let reply = json!({ "method": request.method.as_str(), "echo": body });
        self.with_header((StatusCode::OK, Json(reply)).into_response())
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        let signal = self.closed_signal.lock().take();
        if let Some(signal) = signal {
            signal.fire();
        }
        let engine = self.engine.lock().clone();
        if let Some(engine) = engine {
            engine.on_close().await;
        }
    }

    fn session_id(&self) -> Option<SessionId> {
        self.session_id.lock().clone()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Channel factory that keeps every channel it builds.
pub(crate) fn recording_factory() -> (ChannelFactory, Arc<Mutex<Vec<Arc<StubChannel>>>>) {
    let built: Arc<Mutex<Vec<Arc<StubChannel>>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&built);
    let factory: ChannelFactory = Arc::new(move |hooks| {
        let channel = StubChannel::new(hooks);
        sink.lock().push(Arc::clone(&channel));
        channel as Arc<dyn Channel>
    });
    (factory, built)
}

/// Engine that answers every request with its method name.
pub(crate) struct NullEngine;

#[async_trait]
impl Engine for NullEngine {
    async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, ErrorObject> {
        Ok(json!({ "method": request.method }))
    }
}

/// Session factory that counts how many engines it has produced.
pub(crate) fn counting_engines() -> (SessionFactory, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let factory = session_factory(move || {
        counter.fetch_add(1, Ordering::SeqCst);
        NullEngine
    });
    (factory, count)
}

/// How many engines were made, bound and closed.
#[derive(Debug, Default)]
pub(crate) struct Lifecycle {
    pub(crate) made: AtomicUsize,
    pub(crate) bound: AtomicUsize,
    pub(crate) closed: AtomicUsize,
}

pub(crate) struct LifecycleEngine(Arc<Lifecycle>);

#[async_trait]
impl Engine for LifecycleEngine {
    async fn on_bind(&self, _peer: Peer) {
        self.0.bound.fetch_add(1, Ordering::SeqCst);
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> Result<Value, ErrorObject> {
        Ok(json!({ "method": request.method }))
    }

    async fn on_close(&self) {
        self.0.closed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Session factory whose engines record their lifecycle.
pub(crate) fn lifecycle_engines() -> (SessionFactory, Arc<Lifecycle>) {
    let lifecycle = Arc::new(Lifecycle::default());
    let shared = Arc::clone(&lifecycle);
    let factory = session_factory(move || {
        shared.made.fetch_add(1, Ordering::SeqCst);
        LifecycleEngine(Arc::clone(&shared))
    });
    (factory, lifecycle)
}
