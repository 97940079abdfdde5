//! Process bootstrap and a minimal websocket listener demonstrating the
//! delivery engine end-to-end. The listener itself carries no delivery-engine
//! logic — it only adapts an axum websocket into the `Connection` trait the
//! core already defines, per spec's transport-framing boundary.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::extract::State;
use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex as AsyncMutex;

use topicbus::bus::dispatcher::Dispatcher;
use topicbus::bus::schema::{ClientMessage, ServerMessage};
use topicbus::bus::topic_manager::TopicManager;
use topicbus::bus::transport::{Connection, ConnectionReader, ConnectionWriter, TransportError};
use topicbus::core::cli::Cli;
use topicbus::core::config::BusConfig;
use topicbus::core::shutdown::ShutdownService;

struct WsReader {
    stream: futures::stream::SplitStream<WebSocket>,
}

#[async_trait]
impl ConnectionReader for WsReader {
    async fn recv(&mut self) -> Result<ClientMessage, TransportError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    return serde_json::from_str(&text)
                        .map_err(|e| TransportError::Decode(e.to_string()));
                }
                Some(Ok(WsMessage::Close(_))) | None => return Err(TransportError::Closed),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(TransportError::Other(e.to_string())),
            }
        }
    }
}

struct WsWriter {
    sink: AsyncMutex<futures::stream::SplitSink<WebSocket, WsMessage>>,
}

#[async_trait]
impl ConnectionWriter for WsWriter {
    async fn send(&self, msg: ServerMessage) -> Result<(), TransportError> {
        let text = serde_json::to_string(&msg).map_err(|e| TransportError::Other(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|e| TransportError::Other(e.to_string()))
    }
}

struct WsConnection(WebSocket);

impl Connection for WsConnection {
    fn split(self: Box<Self>) -> (Box<dyn ConnectionReader>, Arc<dyn ConnectionWriter>) {
        let (sink, stream) = self.0.split();
        (
            Box::new(WsReader { stream }),
            Arc::new(WsWriter {
                sink: AsyncMutex::new(sink),
            }),
        )
    }
}

#[derive(Clone)]
struct AppState {
    dispatcher: Arc<Dispatcher>,
    shutdown: ShutdownService,
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| async move {
        let client_id = cuid2::create_id();
        let conn: Box<dyn Connection> = Box::new(WsConnection(socket));
        let shutdown_rx = state.shutdown.subscribe();
        state.dispatcher.run(conn, client_id, shutdown_rx).await;
    })
}

fn init_logging(filter: Option<&str>) {
    let filter = filter
        .map(String::from)
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| "info".to_string());
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .with_ansi(true)
        .compact()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(cli.log.as_deref());

    let config = match BusConfig::load(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    let shutdown_deadline = config.shutdown_deadline;

    let manager = Arc::new(TopicManager::new(config));
    let shutdown = ShutdownService::new(manager.clone(), shutdown_deadline);
    shutdown.install_signal_handlers();

    let dispatcher = Arc::new(Dispatcher::new(manager));
    let state = AppState {
        dispatcher,
        shutdown: shutdown.clone(),
    };

    let app = Router::new()
        .route("/ws", get(ws_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state);

    let listener = match tokio::net::TcpListener::bind("0.0.0.0:8080").await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind listener: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(addr = ?listener.local_addr(), "listening");

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.wait())
        .await
    {
        eprintln!("server error: {e}");
        std::process::exit(1);
    }
}
