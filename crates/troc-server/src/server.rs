//! HTTP listener
//!
//! There is a single fallback route: the gateway classifies paths itself.

use std::future::Future;
use std::sync::Arc;

use axum::body::to_bytes;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use troc_config::GatewayConfig;
use troc_core::error::TrocError;

use crate::context::AppContext;
use crate::dispatch::Gateway;
use crate::request::{GatewayRequest, GatewayResponse};
use crate::ServerResult;

/// Largest request body accepted, publish payloads included
pub const MAX_BODY_BYTES: usize = 256 * 1024 * 1024;

/// Build the router for a gateway
pub fn router(gateway: Arc<Gateway>) -> Router {
    Router::new().fallback(handle).with_state(gateway)
}

async fn handle(State(gateway): State<Arc<Gateway>>, request: Request) -> Response {
    let (parts, body) = request.into_parts();
    let body = match to_bytes(body, MAX_BODY_BYTES).await {
        Ok(body) => body,
        Err(e) => {
            return GatewayResponse::status(StatusCode::BAD_REQUEST, &format!("unreadable body: {}", e))
                .into_response()
        }
    };

    let path = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| "/".to_string());

    gateway
        .handle(GatewayRequest {
            method: parts.method,
            path,
            headers: parts.headers,
            body,
        })
        .await
        .into_response()
}

/// Serve `config` until Ctrl-C or SIGTERM. Registry caches load in the
/// background; a registry answers 503 until its own cache is ready.
pub async fn run(config: GatewayConfig) -> ServerResult<()> {
    let listen = config.server.listen;
    let app = AppContext::new(config)?;

    let listener = TcpListener::bind(listen)
        .await
        .map_err(|e| TrocError::io(format!("Failed to bind {}", listen), e))?;
    info!(%listen, registries = app.registries.len(), "troc listening");

    tokio::spawn({
        let app = Arc::clone(&app);
        async move {
            if let Err(e) = app.load_caches().await {
                error!(error = %e, "some registries failed to load and will answer 503");
            }
        }
    });

    serve(app, listener, shutdown_signal()).await
}

/// Serve an already bound listener until `shutdown` resolves
pub async fn serve(
    app: Arc<AppContext>,
    listener: TcpListener,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> ServerResult<()> {
    let gateway = Arc::new(Gateway::new(app));
    axum::serve(listener, router(gateway))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| TrocError::io("HTTP server error".to_string(), e))?;

    info!("troc stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}
