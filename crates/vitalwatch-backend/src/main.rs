//! vitalwatch server.
//!
//! Connects to PostgreSQL, restores the persisted detector selection,
//! listens for telemetry datagrams on UDP, and serves the control-plane
//! API with a live WebSocket stream.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, mpsc};
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use vitalwatch_backend::{
    create_router, AppState, IngestPipeline, PgStore, PgStoreConfig, TransportEvent,
};
use vitalwatch_core::DetectionEngine;

#[derive(Parser, Debug)]
#[command(name = "vitalwatch", about = "Vital sign anomaly detection service")]
struct Args {
    /// HTTP port for the control-plane API
    #[arg(long, default_value = "8080")]
    http_port: u16,

    /// UDP port for telemetry sample datagrams
    #[arg(long, default_value = "5005")]
    udp_port: u16,

    /// PostgreSQL connection string
    #[arg(long, env = "DATABASE_URL", default_value = "postgresql://localhost/vitalwatch")]
    database_url: String,

    /// Maximum pooled database connections
    #[arg(long, default_value = "5")]
    max_connections: u32,

    /// Capacity of the sample/alert broadcast channel
    #[arg(long, default_value = "1024")]
    stream_capacity: usize,

    /// Capacity of the transport event queue
    #[arg(long, default_value = "256")]
    event_queue: usize,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let args = Args::parse();

    info!(url = %args.database_url, "connecting to database");
    let store = Arc::new(
        PgStore::connect(PgStoreConfig {
            url: args.database_url.clone(),
            max_connections: args.max_connections,
            ..Default::default()
        })
        .await?,
    );
    store.migrate().await?;
    info!("database ready");

    let engine = Arc::new(DetectionEngine::new(Arc::clone(&store)));
    match store.load_selection().await {
        Ok(Some(selection)) => {
            info!(kind = %selection.kind, subject = %selection.subject_id, "restored detector selection");
            engine.select_detector(selection.kind, selection.subject_id);
        }
        Ok(None) => {
            let selection = engine.current_selection();
            info!(kind = %selection.kind, subject = %selection.subject_id, "using default detector selection");
        }
        Err(err) => warn!(error = %err, "could not restore detector selection"),
    }

    let (stream_tx, _) = broadcast::channel(args.stream_capacity);
    let (event_tx, event_rx) = mpsc::channel(args.event_queue);

    let pipeline = IngestPipeline::new(Arc::clone(&store), Arc::clone(&engine), stream_tx.clone());
    tokio::spawn(pipeline.run(event_rx));

    let udp_port = args.udp_port;
    tokio::spawn(async move {
        if let Err(err) = run_udp_ingest(udp_port, event_tx).await {
            error!(error = %err, "UDP ingest terminated");
        }
    });

    let state = AppState::new(store, engine, stream_tx);
    let app = create_router(state).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], args.http_port));
    info!(%addr, "serving control-plane API");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("server stopped");
    Ok(())
}

/// Receive raw JSON sample payloads as UDP datagrams and feed them to
/// the pipeline as transport events.
async fn run_udp_ingest(
    port: u16,
    events: mpsc::Sender<TransportEvent>,
) -> anyhow::Result<()> {
    let socket = UdpSocket::bind(("0.0.0.0", port)).await?;
    info!(port, "listening for telemetry datagrams");
    let _ = events.send(TransportEvent::Connected).await;

    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let (len, peer) = socket.recv_from(&mut buf).await?;
        match std::str::from_utf8(&buf[..len]) {
            Ok(payload) => {
                if events
                    .send(TransportEvent::SampleReceived {
                        payload: payload.to_string(),
                    })
                    .await
                    .is_err()
                {
                    // Pipeline gone; nothing left to feed.
                    return Ok(());
                }
            }
            Err(err) => warn!(%peer, %err, "dropping non-UTF-8 datagram"),
        }
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!(error = %err, "failed to listen for shutdown signal");
        return;
    }
    info!("shutdown signal received");
}
