use crate::errors::{AdmissionError, Result as AdmitResult};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{error, info};

/// Start HTTP server for Prometheus metrics endpoint
pub async fn start_metrics_server(port: u16) -> AdmitResult<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await.map_err(|e| {
        AdmissionError::InternalError(format!("Failed to bind metrics server: {}", e))
    })?;

    info!("Metrics server listening on http://0.0.0.0:{}/metrics", port);
    serve(listener).await
}

/// Accept loop, split out so tests can bind an ephemeral port
async fn serve(listener: TcpListener) -> AdmitResult<()> {
    loop {
        match listener.accept().await {
            Ok((socket, _)) => {
                tokio::spawn(handle_connection(socket));
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}

async fn handle_connection(mut socket: TcpStream) {
    let mut buffer = [0; 1024];

    let read = match socket.read(&mut buffer).await {
        Ok(n) => n,
        Err(e) => {
            error!("Failed to read from socket: {}", e);
            return;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..read]);
    let response = if request.starts_with("GET /metrics") || request.starts_with("GET / ") {
        match gather_metrics() {
            Ok(metrics) => format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\n\r\n{}",
                metrics.len(),
                metrics
            ),
            Err(e) => {
                error!("Failed to gather metrics: {}", e);
                "HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\n\r\n".to_string()
            }
        }
    } else {
        "HTTP/1.1 404 Not Found\r\nContent-Length: 17\r\n\r\nTry GET /metrics\n".to_string()
    };

    if let Err(e) = socket.write_all(response.as_bytes()).await {
        error!("Failed to write metrics response: {}", e);
    }
}

/// Gather metrics with Send-safe error type
fn gather_metrics() -> Result<String, String> {
    use prometheus::{Encoder, TextEncoder};

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| format!("Failed to encode metrics: {}", e))?;

    String::from_utf8(buffer).map_err(|e| format!("Failed to convert metrics to UTF-8: {}", e))
}
