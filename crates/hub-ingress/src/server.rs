//! The host-wide Ingress Server (§4.1).

use std::sync::Arc;

use hub_core::registry::FlowHandler;
use hub_core::{Mode, Router};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};
use tokio::task::JoinHandle;

use crate::config::IngressConfig;
use crate::stats::{IngressStats, IngressStatsSnapshot};
use crate::wire::{encode_modified_response, parse_line, Request};

/// Error returned by [`IngressServer::start`] (§4.1 "BindFailed").
#[derive(Debug, thiserror::Error)]
pub enum StartError {
    /// The configured port could not be bound.
    #[error("failed to bind ingress listener on port {port}: {source}")]
    BindFailed {
        /// The port that could not be bound.
        port: u16,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },
}

enum ServerState {
    Stopped,
    Running(RunningState),
}

struct RunningState {
    shutdown: Arc<Notify>,
    sender: mpsc::Sender<TcpStream>,
    listener_task: JoinHandle<()>,
    worker_tasks: Vec<JoinHandle<()>>,
}

/// Accepts agent connections on a fixed port, bounds concurrency
/// through a bounded channel and a fixed worker pool, and speaks the
/// line-delimited JSON wire protocol (§4.1, §6).
pub struct IngressServer {
    config: IngressConfig,
    router: Arc<Router>,
    state: AsyncMutex<ServerState>,
    stats: Arc<IngressStats>,
}

impl IngressServer {
    /// Construct a stopped server bound to the given router. Call
    /// [`Self::start`] or [`Self::register`] to begin accepting.
    pub fn new(config: IngressConfig, router: Arc<Router>) -> Self {
        Self {
            config,
            router,
            state: AsyncMutex::new(ServerState::Stopped),
            stats: Arc::new(IngressStats::default()),
        }
    }

    /// The router this server dispatches flows through.
    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Ingress-wide counters.
    pub fn stats(&self) -> IngressStatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether the server currently holds a bound listening socket.
    pub async fn is_running(&self) -> bool {
        matches!(&*self.state.lock().await, ServerState::Running(_))
    }

    /// Bind the listening socket and start the worker pool. Idempotent
    /// on an already-running server.
    pub async fn start(&self) -> Result<(), StartError> {
        let mut state = self.state.lock().await;
        if matches!(&*state, ServerState::Running(_)) {
            return Ok(());
        }

        let addr = format!("0.0.0.0:{}", self.config.port);
        let listener =
            TcpListener::bind(&addr)
                .await
                .map_err(|source| StartError::BindFailed { port: self.config.port, source })?;
        tracing::info!(%addr, workers = self.config.worker_count, "ingress server listening");

        let (tx, rx) = mpsc::channel::<TcpStream>(self.config.channel_capacity);
        let rx = Arc::new(AsyncMutex::new(rx));
        let shutdown = Arc::new(Notify::new());

        let mut worker_tasks = Vec::with_capacity(self.config.worker_count);
        for worker_id in 0..self.config.worker_count {
            let rx = Arc::clone(&rx);
            let router = Arc::clone(&self.router);
            let stats = Arc::clone(&self.stats);
            let read_timeout = self.config.read_timeout;
            worker_tasks.push(tokio::spawn(async move {
                loop {
                    let stream = {
                        let mut guard = rx.lock().await;
                        guard.recv().await
                    };
                    let Some(stream) = stream else {
                        break;
                    };
                    tracing::debug!(worker_id, "handling connection");
                    handle_connection(stream, &router, &stats, read_timeout).await;
                }
            }));
        }

        let accept_shutdown = Arc::clone(&shutdown);
        let accept_tx = tx.clone();
        let accept_stats = Arc::clone(&self.stats);
        let listener_task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    () = accept_shutdown.notified() => {
                        tracing::info!("ingress acceptor shutting down");
                        break;
                    }
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _peer)) => {
                                accept_stats.record_accepted();
                                // Backpressure (§5): suspend here, never drop,
                                // when the channel is saturated.
                                if accept_tx.send(stream).await.is_err() {
                                    break;
                                }
                            }
                            Err(e) => tracing::warn!(error = %e, "accept failed"),
                        }
                    }
                }
            }
        });

        *state = ServerState::Running(RunningState {
            shutdown,
            sender: tx,
            listener_task,
            worker_tasks,
        });
        Ok(())
    }

    /// Stop the server: cancel the acceptor, close the channel so
    /// workers drain their current item and exit, cancel every
    /// registered project's outstanding Debug Requests with the
    /// original-sentinel so no worker is left blocked on one, then
    /// join everything within the configured grace period (§5).
    /// Idempotent.
    pub async fn stop(&self) {
        let mut state = self.state.lock().await;
        let running = match std::mem::replace(&mut *state, ServerState::Stopped) {
            ServerState::Running(running) => running,
            ServerState::Stopped => return,
        };
        drop(state);

        running.shutdown.notify_waiters();
        drop(running.sender);

        for registration in self.router.all() {
            registration.handler.cancel_pending();
        }

        let grace = self.config.shutdown_grace;
        if tokio::time::timeout(grace, running.listener_task).await.is_err() {
            tracing::warn!("ingress listener task did not exit within the grace period");
        }
        for task in running.worker_tasks {
            if tokio::time::timeout(grace, task).await.is_err() {
                tracing::warn!("ingress worker task did not exit within the grace period");
            }
        }
    }

    /// Add or replace a Project Registration; implicitly starts the
    /// server if it is not already running (§4.1 `register`).
    pub async fn register(
        &self,
        project_id: impl Into<String>,
        name: impl Into<String>,
        mode: Mode,
        handler: Arc<dyn FlowHandler>,
        package_filter: Option<String>,
    ) -> Result<(), StartError> {
        self.router.register(project_id, name, mode, handler, package_filter);
        self.start().await
    }

    /// Remove a Project Registration, cancelling its outstanding Debug
    /// Requests, and stop the server if this was the last registration
    /// (§4.1 `unregister`).
    pub async fn unregister(&self, project_id: &str) {
        if let Some(registration) = self.router.unregister(project_id) {
            registration.handler.cancel_pending();
        }
        if self.router.is_empty() {
            self.stop().await;
        }
    }

    /// Atomically change a project's mode.
    pub fn set_mode(&self, project_id: &str, mode: Mode) -> bool {
        self.router.set_mode(project_id, mode)
    }

    /// Atomically change a project's package filter.
    pub fn set_filter(&self, project_id: &str, filter: Option<String>) -> bool {
        self.router.set_filter(project_id, filter)
    }
}

async fn handle_connection(
    stream: TcpStream,
    router: &Router,
    stats: &IngressStats,
    read_timeout: std::time::Duration,
) {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    let read = tokio::time::timeout(read_timeout, reader.read_line(&mut line)).await;
    let n = match read {
        Ok(Ok(n)) => n,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "transport error reading connection");
            return;
        }
        Err(_elapsed) => {
            tracing::debug!("connection read timed out");
            return;
        }
    };
    if n == 0 {
        return;
    }

    match parse_line(&line) {
        Ok(Request::Ping) => {
            stats.record_ping();
            if let Err(e) = write_half.write_all(b"PONG\n").await {
                tracing::debug!(error = %e, "transport error replying to PING");
            }
        }
        Ok(Request::Flow(envelope)) => {
            let project_id = envelope.project_id.clone();
            let package_name = envelope.package_name.clone();
            let flow = envelope.into_flow();
            let response = router
                .route_and_handle(flow, project_id.as_deref(), package_name.as_deref())
                .await;
            stats.record_flow_routed();
            let line = encode_modified_response(&response);
            if let Err(e) = write_half.write_all(line.as_bytes()).await {
                tracing::debug!(error = %e, "transport error replying with modified response");
            }
        }
        Err(e) => {
            stats.record_parse_error();
            tracing::debug!(error = %e, "protocol error: replying with original-sentinel");
            let line = encode_modified_response(&hub_core::ModifiedResponse::original());
            let _ = write_half.write_all(line.as_bytes()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hub_core::{Flow, ModifiedResponse};
    use tokio::io::AsyncReadExt;

    struct Echo;

    #[async_trait::async_trait]
    impl FlowHandler for Echo {
        async fn handle(&self, flow: Flow, _mode: Mode) -> ModifiedResponse {
            ModifiedResponse::full(200, Default::default(), flow.flow_id)
        }
    }

    async fn spawn_server() -> (Arc<IngressServer>, u16) {
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = probe.local_addr().unwrap().port();
        drop(probe);

        let router = Arc::new(Router::new());
        router.register("a", "A", Mode::Record, Arc::new(Echo), None);
        let config = IngressConfig {
            port,
            ..IngressConfig::default()
        };
        let server = Arc::new(IngressServer::new(config, router));
        server.start().await.unwrap();
        (server, port)
    }

    #[tokio::test]
    async fn ping_replies_pong_and_closes() {
        let (server, port) = spawn_server().await;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"PING\n").await.unwrap();
        let mut buf = [0u8; 5];
        stream.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"PONG\n");
        server.stop().await;
    }

    #[tokio::test]
    async fn registered_project_flow_is_routed_to_handler() {
        let (server, port) = spawn_server().await;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let line = r#"{"flow_id":"f1","request":{"method":"GET","url":"https://x/y","headers":{},"body":""},"response":null,"timestamp":0,"duration":0,"project_id":"a","package_name":null}"#;
        stream.write_all(line.as_bytes()).await.unwrap();
        stream.write_all(b"\n").await.unwrap();

        let mut response = Vec::new();
        let mut reader = BufReader::new(stream);
        reader.read_until(b'\n', &mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        let parsed: ModifiedResponse = serde_json::from_str(text.trim_end()).unwrap();
        assert_eq!(parsed.body.as_deref(), Some("f1"));
        server.stop().await;
    }

    #[tokio::test]
    async fn malformed_line_replies_original_sentinel() {
        let (server, port) = spawn_server().await;
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(b"not json\n").await.unwrap();

        let mut response = Vec::new();
        let mut reader = BufReader::new(stream);
        reader.read_until(b'\n', &mut response).await.unwrap();
        let text = String::from_utf8(response).unwrap();
        let parsed: ModifiedResponse = serde_json::from_str(text.trim_end()).unwrap();
        assert!(parsed.is_original());
        server.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (server, _port) = spawn_server().await;
        server.stop().await;
        server.stop().await;
        assert!(!server.is_running().await);
    }
}
