//! HTTP server exposing the dataset in every format.
//!
//! Lifecycle: the dataset is generated before the listener binds, then the
//! protobuf schema loads on a background task. While it loads the server is
//! `Initializing` and `/protobuf` answers 503; JSON, MessagePack and PSON are
//! served straight away. A schema that fails to load stops the server with
//! [`BenchError::Startup`].

use crate::codec::{Codec, CodecRegistry, ProtobufCodec};
use crate::dataset::{generate_dataset, Dataset, GenerateConfig};
use crate::{BenchError, Format, Result};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    Initializing,
    Ready,
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Health {
    pub phase: Lifecycle,
    pub records: u64,
}

/// Shared, read-only state behind every handler.
#[derive(Debug)]
pub struct ServerState {
    dataset: Arc<Dataset>,
    initial: CodecRegistry,
    ready: OnceLock<CodecRegistry>,
    startup_error: OnceLock<String>,
    failed: Notify,
}

impl ServerState {
    pub fn new(dataset: Dataset) -> Self {
        Self {
            dataset: Arc::new(dataset),
            initial: CodecRegistry::new(),
            ready: OnceLock::new(),
            startup_error: OnceLock::new(),
            failed: Notify::new(),
        }
    }

    pub fn dataset(&self) -> &Arc<Dataset> {
        &self.dataset
    }

    pub fn phase(&self) -> Lifecycle {
        if self.ready.get().is_some() {
            Lifecycle::Ready
        } else {
            Lifecycle::Initializing
        }
    }

    /// Attach the protobuf codec and move to `Ready`. Later calls are ignored.
    pub fn mark_ready(&self, protobuf: ProtobufCodec) {
        let _ = self.ready.set(self.initial.clone().with_protobuf(protobuf));
    }

    pub fn codec(&self, format: Format) -> Result<Arc<dyn Codec>> {
        self.ready.get().unwrap_or(&self.initial).get(format)
    }

    fn fail(&self, message: String) {
        let _ = self.startup_error.set(message);
        self.failed.notify_one();
    }

    pub fn startup_error(&self) -> Option<&str> {
        self.startup_error.get().map(String::as_str)
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub addr: SocketAddr,
    pub dataset: GenerateConfig,
    /// Path of `item.proto`.
    pub schema: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 3000)),
            dataset: GenerateConfig::default(),
            schema: PathBuf::from("proto/item.proto"),
        }
    }
}

/// Router with one GET route per format plus `/health`.
pub fn router(state: Arc<ServerState>) -> Router {
    let mut router = Router::new().route("/health", get(health));
    for format in Format::ALL {
        router = router.route(
            format.path(),
            get(move |State(state): State<Arc<ServerState>>| encoded_response(state, format)),
        );
    }
    router.with_state(state)
}

async fn health(State(state): State<Arc<ServerState>>) -> Json<Health> {
    Json(Health {
        phase: state.phase(),
        records: state.dataset().len() as u64,
    })
}

/// Encode the full dataset for `format`. Nothing is cached between requests.
async fn encoded_response(state: Arc<ServerState>, format: Format) -> Response {
    let codec = match state.codec(format) {
        Ok(codec) => codec,
        Err(e) => {
            warn!(%format, "request while initializing");
            return (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response();
        }
    };

    let content_type = codec.content_type();
    let dataset = Arc::clone(state.dataset());
    let started = Instant::now();
    let encoded = tokio::task::spawn_blocking(move || codec.encode(&dataset)).await;

    match encoded {
        Ok(Ok(bytes)) => {
            debug!(
                %format,
                bytes = bytes.len(),
                encode_ms = started.elapsed().as_secs_f64() * 1000.0,
                "encoded dataset"
            );
            ([(header::CONTENT_TYPE, content_type)], bytes).into_response()
        }
        Ok(Err(e)) => {
            error!(%format, error = %e, "encode failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
        Err(e) => {
            error!(%format, error = %e, "encode task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, format!("encode task failed: {e}")).into_response()
        }
    }
}

async fn load_schema(state: Arc<ServerState>, schema: PathBuf) {
    let loaded = tokio::task::spawn_blocking(move || ProtobufCodec::load(schema)).await;
    match loaded {
        Ok(Ok(codec)) => {
            state.mark_ready(codec);
            info!("protobuf schema loaded, server ready");
        }
        Ok(Err(e)) => {
            error!(error = %e, "failed to load protobuf schema");
            state.fail(e.to_string());
        }
        Err(e) => {
            error!(error = %e, "schema loader panicked");
            state.fail(format!("schema loader panicked: {e}"));
        }
    }
}

#[derive(Debug, Clone)]
pub struct BenchServer {
    config: ServerConfig,
}

impl BenchServer {
    pub fn new(config: ServerConfig) -> Self {
        Self { config }
    }

    /// Generate the dataset, bind, and start serving. The protobuf schema
    /// keeps loading in the background after this returns.
    pub async fn start(self) -> Result<RunningServer> {
        let gen_config = self.config.dataset.clone();
        let started = Instant::now();
        let dataset = tokio::task::spawn_blocking(move || generate_dataset(&gen_config))
            .await
            .map_err(|e| BenchError::Startup(format!("dataset generation failed: {e}")))?;
        info!(
            records = dataset.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generated dataset"
        );

        let state = Arc::new(ServerState::new(dataset));
        let listener = tokio::net::TcpListener::bind(self.config.addr)
            .await
            .map_err(|e| BenchError::Startup(format!("cannot bind {}: {e}", self.config.addr)))?;
        let addr = listener.local_addr()?;
        info!("server running on http://{addr}");

        tokio::spawn(load_schema(Arc::clone(&state), self.config.schema.clone()));

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let app = router(Arc::clone(&state));
        let task_state = Arc::clone(&state);
        let handle = tokio::spawn(async move {
            let signal_state = Arc::clone(&task_state);
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    tokio::select! {
                        _ = shutdown_rx => {}
                        _ = signal_state.failed.notified() => {}
                    }
                })
                .await?;
            if let Some(msg) = task_state.startup_error() {
                return Err(BenchError::Startup(msg.to_string()));
            }
            Ok::<(), BenchError>(())
        });

        Ok(RunningServer {
            addr,
            state,
            shutdown_tx,
            handle,
        })
    }
}

/// Handle to a server started with [`BenchServer::start`]. Dropping it stops the server.
#[derive(Debug)]
pub struct RunningServer {
    addr: SocketAddr,
    state: Arc<ServerState>,
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<Result<()>>,
}

fn joined(result: std::result::Result<Result<()>, tokio::task::JoinError>) -> Result<()> {
    result.map_err(|e| BenchError::Io(std::io::Error::other(e)))?
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn state(&self) -> &Arc<ServerState> {
        &self.state
    }

    /// Stop accepting connections and wait for in-flight requests.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown_tx.send(());
        joined(self.handle.await)
    }

    /// Shut down after a client run against this server. The run's own
    /// error wins over a shutdown failure, which is only logged.
    pub async fn finish<T>(self, outcome: Result<T>) -> Result<T> {
        if let Err(e) = self.shutdown().await {
            match &outcome {
                Ok(_) => return Err(e),
                Err(_) => warn!(error = %e, "server shutdown failed"),
            }
        }
        outcome
    }

    /// Serve until `signal` resolves or the server stops on its own.
    pub async fn run_until<F: Future<Output = ()>>(mut self, signal: F) -> Result<()> {
        tokio::select! {
            _ = signal => {}
            result = &mut self.handle => return joined(result),
        }
        info!("shutting down");
        self.shutdown().await
    }
}
