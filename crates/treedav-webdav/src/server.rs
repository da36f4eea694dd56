//! HTTP server lifecycle management for WebDAV.
//!
//! This module provides the HTTP server that routes requests to mounts
//! and handles the server lifecycle (start, stop).

use crate::body::DavBody;
use crate::handler::status_response;
use crate::mount::MountTable;
use hyper::Request;
use hyper::StatusCode;
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Configuration for the WebDAV server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 = auto-assign).
    pub port: u16,
    /// Bind address.
    pub bind_address: IpAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 0, // Auto-assign
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        }
    }
}

/// A running WebDAV server instance.
pub struct WebDavServer {
    /// The actual bound address.
    pub addr: SocketAddr,
    /// Mounted prefixes, for display.
    prefixes: Vec<String>,
    /// Shutdown signal sender.
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Server task handle.
    server_handle: Option<tokio::task::JoinHandle<()>>,
}

impl WebDavServer {
    /// Bind and start serving `mounts`.
    pub async fn start(mounts: MountTable, config: ServerConfig) -> Result<Self, std::io::Error> {
        let addr = SocketAddr::new(config.bind_address, config.port);
        let listener = TcpListener::bind(addr).await?;
        let actual_addr = listener.local_addr()?;
        let prefixes: Vec<String> = mounts.prefixes().map(str::to_string).collect();

        info!(addr = %actual_addr, mounts = ?prefixes, "Starting WebDAV server");

        let mounts = Arc::new(mounts);

        // Create shutdown channel
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        // Spawn the server task
        let server_handle = tokio::spawn(async move {
            tokio::select! {
                () = run_server(listener, mounts) => {
                    debug!("Server loop ended");
                }
                _ = shutdown_rx => {
                    info!("Received shutdown signal");
                }
            }
        });

        Ok(Self {
            addr: actual_addr,
            prefixes,
            shutdown_tx: Some(shutdown_tx),
            server_handle: Some(server_handle),
        })
    }

    /// Get the URL for this server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// URL of one mount.
    pub fn mount_url(&self, prefix: &str) -> String {
        format!("{}/{prefix}/", self.url())
    }

    /// Prefixes served by this instance.
    pub fn prefixes(&self) -> &[String] {
        &self.prefixes
    }

    /// Stop the server.
    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            let _ = handle.await;
        }
        info!("WebDAV server stopped");
    }

    /// Stop the server synchronously (for use in Drop).
    fn stop_sync(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.server_handle.take() {
            handle.abort();
        }
    }
}

impl Drop for WebDavServer {
    fn drop(&mut self) {
        self.stop_sync();
    }
}

/// Route one request to its mount, or 404 when no mount matches.
async fn route(mounts: &MountTable, req: Request<Incoming>) -> hyper::Response<DavBody> {
    match mounts.route(req.uri().path()) {
        Some(handler) => {
            if let Some(other) = mounts.foreign_destination(handler, req.method(), req.headers()) {
                debug!(mount = %handler.prefix(), destination = %other, "destination is in another mount");
                return status_response(StatusCode::BAD_GATEWAY);
            }
            handler.handle(req).await
        }
        None => {
            debug!(method = %req.method(), path = %req.uri().path(), "no mount for path");
            status_response(StatusCode::NOT_FOUND)
        }
    }
}

/// Run the server accept loop.
async fn run_server(listener: TcpListener, mounts: Arc<MountTable>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                let mounts = mounts.clone();
                tokio::spawn(async move {
                    let io = TokioIo::new(stream);
                    let service = service_fn(move |req: Request<Incoming>| {
                        let mounts = mounts.clone();
                        async move { Ok::<_, Infallible>(route(&mounts, req).await) }
                    });

                    if let Err(e) = auto::Builder::new(TokioExecutor::new())
                        .serve_connection(io, service)
                        .await
                    {
                        // Note: With auto protocol negotiation, we can't easily detect
                        // incomplete messages. Log all connection errors at warn level.
                        warn!(peer = %peer_addr, error = %e, "HTTP connection error");
                    }
                });
            }
            Err(e) => {
                error!(error = %e, "Failed to accept connection");
            }
        }
    }
}
