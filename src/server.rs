use crate::stream::{mjpeg_response, SharedFrame};
use crate::Result;
use axum::extract::State;
use axum::http::{header, HeaderMap};
use axum::response::{Html, Response};
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;

const FALLBACK_HOST: &str = "127.0.0.1:5000";

pub fn router(shared: SharedFrame) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/video_feed", get(video_feed))
        .with_state(shared)
}

/// Serves until Ctrl-C.
pub async fn serve(addr: SocketAddr, shared: SharedFrame) -> Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Processed stream available at http://<host>:{}/", addr.port());
    serve_until(listener, shared, shutdown_signal()).await
}

/// Serves on `listener` until `signal` resolves, then ends open MJPEG streams
/// so graceful shutdown does not wait on them.
pub async fn serve_until<F>(listener: TcpListener, shared: SharedFrame, signal: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let closing = shared.clone();
    axum::serve(listener, router(shared))
        .with_graceful_shutdown(async move {
            signal.await;
            closing.close();
        })
        .await?;
    tracing::info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Server shutting down");
}

async fn video_feed(State(shared): State<SharedFrame>) -> Response {
    mjpeg_response(shared)
}

async fn index(headers: HeaderMap) -> Html<String> {
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .unwrap_or(FALLBACK_HOST);
    Html(index_page(host))
}

pub fn index_page(host: &str) -> String {
    format!(
        r#"<html>
    <head>
        <title>Face Recognition Stream</title>
        <style>
            body {{
                background: #f0f0f0;
                color: #333;
                font-family: sans-serif;
                text-align: center;
            }}
            h1 {{ color: #007bff; }}
            img {{
                border: 3px solid #555;
                box-shadow: 0 4px 8px rgba(0, 0, 0, 0.1);
            }}
        </style>
    </head>
    <body>
        <h1>Processed Video Stream (Face Recognition)</h1>
        <img src='http://{host}/video_feed' width='640'>
        <p>Stream served from {host}</p>
    </body>
</html>
"#
    )
}
