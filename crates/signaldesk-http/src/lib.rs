//! HTTP server for the browser agent console.
//!
//! Exposes the agent console via REST and the event bus via WebSocket.
//! Everything except `POST /api/auth/mpin` needs a bearer token.

mod auth;
mod routes;
mod state;
mod websocket;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::oneshot;
use tower_http::cors::{Any, CorsLayer};

pub use routes::InvokeResponse;
pub use state::HttpSharedState;

/// Handle to a running HTTP server.
#[derive(Default)]
pub struct HttpServerHandle {
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<std::thread::JoinHandle<()>>,
}

impl HttpServerHandle {
    pub fn is_running(&self) -> bool {
        self.shutdown_tx.is_some()
    }

    /// Stop the server gracefully and wait for its thread.
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.join();
        }
    }
}

/// Build the application router.
pub fn router(state: Arc<HttpSharedState>) -> Router {
    let protected = Router::new()
        .route("/api/auth/logout", post(routes::logout))
        .route("/api/conversations", get(routes::list_conversations))
        .route("/api/conversations/{id}", get(routes::get_conversation))
        .route("/api/conversations/{id}/messages", post(routes::post_message))
        .route("/api/conversations/{id}/status", post(routes::set_status))
        .route("/api/conversations/{id}/priority", post(routes::set_priority))
        .route("/ws/events", get(websocket::ws_handler))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::auth_middleware,
        ));

    Router::new()
        .route("/api/auth/mpin", post(routes::auth_mpin))
        .merge(protected)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the HTTP server on the given host and port.
///
/// The server runs in a separate thread with its own tokio runtime.
pub fn start(
    state: Arc<HttpSharedState>,
    host: String,
    port: u16,
) -> Result<HttpServerHandle, String> {
    let (shutdown_tx, shutdown_rx) = oneshot::channel();

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("Invalid address: {}", e))?;

    let task = std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Failed to create tokio runtime: {}", e);
                return;
            }
        };

        rt.block_on(async move {
            let app = router(state);

            let listener = match tokio::net::TcpListener::bind(addr).await {
                Ok(l) => l,
                Err(e) => {
                    log::error!("Failed to bind HTTP server to {}: {}", addr, e);
                    return;
                }
            };

            log::info!("HTTP server listening on http://{}", addr);

            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                    log::info!("HTTP server shutting down");
                })
                .await
                .ok();
        });
    });

    Ok(HttpServerHandle {
        shutdown_tx: Some(shutdown_tx),
        task: Some(task),
    })
}

// ============================================================================
// TESTS
// ============================================================================
