//! OCR API server lifecycle: bind, spawn the axum server in a background
//! task, hand back a handle with a shutdown channel.

use std::net::SocketAddr;

use axum::Router;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

// ═══════════════════════════════════════════════════════════
// Public types
// ═══════════════════════════════════════════════════════════

/// Handle to a running OCR API server.
pub struct OcrServer {
    /// Bound address; the port is resolved when binding to port 0.
    pub addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl OcrServer {
    /// Ask the server to stop accepting connections. In-flight requests finish.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
            tracing::info!("OCR API server shutdown signal sent");
        }
    }

    /// Wait until the server task has exited.
    pub async fn wait(self) {
        if let Err(e) = self.handle.await {
            tracing::error!("OCR API server task failed: {e}");
        }
    }
}

// ═══════════════════════════════════════════════════════════
// Server lifecycle
// ═══════════════════════════════════════════════════════════

/// Bind `addr` and serve `app` until `OcrServer::shutdown` is called.
pub async fn start_server(addr: SocketAddr, app: Router) -> Result<OcrServer, String> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("Failed to bind OCR API server on {addr}: {e}"))?;

    let addr = listener
        .local_addr()
        .map_err(|e| format!("Failed to get server address: {e}"))?;

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

    let handle = tokio::spawn(async move {
        let shutdown_signal = async move {
            let _ = shutdown_rx.await;
            tracing::info!("OCR API server received shutdown signal");
        };

        tracing::info!(%addr, "OCR API server started");

        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal)
            .await
        {
            tracing::error!("OCR API server error: {e}");
        }

        tracing::info!("OCR API server stopped");
    });

    Ok(OcrServer {
        addr,
        shutdown_tx: Some(shutdown_tx),
        handle,
    })
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
