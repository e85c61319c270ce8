//! `Gateway`: owns the listener, the registry and the shutdown sequence.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use switchyard_core::SessionFactory;
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::channel::ChannelFactory;
use crate::config::{ConfigError, ServerConfig};
use crate::dispatcher::Dispatcher;
use crate::registry::SessionRegistry;
use crate::router::build_router;
use crate::shutdown::ShutdownCoordinator;
use crate::streamable;

enum ListenerSlot {
    Idle,
    Running {
        addr: SocketAddr,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// A session-multiplexing gateway bound to one endpoint path.
pub struct Gateway {
    config: ServerConfig,
    registry: Arc<SessionRegistry>,
    session_factory: SessionFactory,
    channel_factory: ChannelFactory,
    shutdown: ShutdownCoordinator,
    listener: Mutex<ListenerSlot>,
}

impl Gateway {
    pub fn new(config: ServerConfig, session_factory: SessionFactory) -> Result<Self, ConfigError> {
        config.validate()?;
        let shutdown = ShutdownCoordinator::new(config.shutdown_timeout());
        Ok(Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            session_factory,
            channel_factory: streamable::factory(),
            shutdown,
            listener: Mutex::new(ListenerSlot::Idle),
        })
    }

    /// Replace the per-session channel implementation.
    pub fn with_channel_factory(mut self, channel_factory: ChannelFactory) -> Self {
        self.channel_factory = channel_factory;
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Router over this gateway's registry, for embedding or in-process tests.
    pub fn router(&self) -> Router {
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.session_factory),
            Arc::clone(&self.channel_factory),
            self.config.max_body_bytes,
        );
        build_router(&self.config.path, Arc::new(dispatcher))
    }

    /// Address the listener is bound to while running.
    pub async fn local_addr(&self) -> Option<SocketAddr> {
        match &*self.listener.lock().await {
            ListenerSlot::Running { addr, .. } => Some(*addr),
            _ => None,
        }
    }

    /// Bind the configured address and start accepting. Resolves once the
    /// socket is listening.
    pub async fn start(&self) -> io::Result<SocketAddr> {
        let mut slot = self.listener.lock().await;
        match &*slot {
            ListenerSlot::Idle => {}
            ListenerSlot::Running { .. } => {
                return Err(io::Error::new(io::ErrorKind::AlreadyExists, "gateway already started"));
            }
            ListenerSlot::Stopped => {
                return Err(io::Error::other("gateway was stopped"));
            }
        }

        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await })
                .await;
            if let Err(e) = served {
                error!(error = %e, "listener failed");
            }
        });

        info!(%addr, path = %self.config.path, "gateway listening");
        *slot = ListenerSlot::Running { addr, task };
        Ok(addr)
    }

    /// Close every session, then stop the listener. Safe to call repeatedly
    /// and before `start`.
    pub async fn stop(&self) {
        let mut slot = self.listener.lock().await;
        let previous = std::mem::replace(&mut *slot, ListenerSlot::Stopped);
        if matches!(previous, ListenerSlot::Stopped) {
            return;
        }

        let report = self.shutdown.drain_sessions(&self.registry).await;
        if let ListenerSlot::Running { addr, task } = previous {
            self.shutdown.stop_listener(task).await;
            info!(%addr, sessions_closed = report.closed, "gateway stopped");
        }
    }
}
