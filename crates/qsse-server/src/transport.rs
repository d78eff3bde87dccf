//! Listener setup, TLS and the serve loop.

use std::future::Future;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use qsse_proto::connector_server::ConnectorServer;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tonic::transport::server::TcpIncoming;
use tonic::transport::{Certificate, Identity, Server, ServerTlsConfig};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::service::SseService;

pub const SERVER_KEY_FILE: &str = "sse_server_key.pem";
pub const SERVER_CERT_FILE: &str = "sse_server_cert.pem";
pub const ROOT_CERT_FILE: &str = "root_cert.pem";

/// Mutual-TLS settings from the three PEM files in `dir`.
///
/// Clients must present a certificate issued by `root_cert.pem`.
pub fn load_tls(dir: &Path) -> Result<ServerTlsConfig> {
    let read = |name: &str| {
        let path = dir.join(name);
        std::fs::read(&path).with_context(|| format!("Failed to read {}", path.display()))
    };
    let key = read(SERVER_KEY_FILE)?;
    let cert = read(SERVER_CERT_FILE)?;
    let root = read(ROOT_CERT_FILE)?;

    Ok(ServerTlsConfig::new()
        .identity(Identity::from_pem(cert, key))
        .client_ca_root(Certificate::from_pem(root)))
}

/// A bound, not yet serving, plugin server.
pub struct SseServer {
    listener: TcpListener,
    tls: Option<ServerTlsConfig>,
    service: SseService,
    grace: Duration,
}

impl SseServer {
    /// Load TLS material if configured and bind the listener.
    pub async fn bind(config: &ServerConfig, service: SseService) -> Result<Self> {
        let tls = match &config.pem_dir {
            Some(dir) => Some(load_tls(dir)?),
            None => None,
        };
        let listener = TcpListener::bind(config.bind_addr)
            .await
            .with_context(|| format!("Failed to bind {}", config.bind_addr))?;

        Ok(Self {
            listener,
            tls,
            service,
            grace: config.shutdown_grace,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn is_secure(&self) -> bool {
        self.tls.is_some()
    }

    /// Serve until SIGINT or SIGTERM.
    pub async fn serve(self) -> Result<()> {
        self.serve_with_shutdown(shutdown_signal()).await
    }

    /// Serve until `signal` resolves, then let in-flight calls finish for at
    /// most the grace period. Calls still running after it are answered with
    /// UNAVAILABLE.
    pub async fn serve_with_shutdown<F>(self, signal: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.local_addr()?;
        if self.is_secure() {
            info!("Serving securely on {}", addr);
        } else {
            info!("Serving insecurely on {}", addr);
        }

        let mut builder = Server::builder();
        if let Some(tls) = self.tls {
            builder = builder.tls_config(tls).context("Invalid TLS configuration")?;
        }

        let abandon = self.service.abandon_handle();
        let incoming = TcpIncoming::from_listener(self.listener, true, None)
            .map_err(|e| anyhow::anyhow!(e))?;
        let (stopping_tx, stopping_rx) = oneshot::channel::<()>();
        let server = builder
            .add_service(ConnectorServer::new(self.service))
            .serve_with_incoming_shutdown(incoming, async move {
                signal.await;
                info!("Shutting down; no longer accepting calls");
                let _ = stopping_tx.send(());
            });
        tokio::pin!(server);

        let grace = self.grace;
        tokio::select! {
            biased;
            result = &mut server => result.context("gRPC server error")?,
            _ = async move {
                if stopping_rx.await.is_ok() {
                    tokio::time::sleep(grace).await;
                } else {
                    std::future::pending::<()>().await;
                }
            } => {
                warn!("Grace period of {:?} elapsed; abandoning in-flight calls", grace);
                abandon.abandon();
            }
        }

        info!("Server stopped");
        Ok(())
    }
}

pub async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (signal(SignalKind::interrupt()), signal(SignalKind::terminate())) {
            (Ok(mut sigint), Ok(mut sigterm)) => {
                tokio::select! {
                    _ = sigint.recv() => info!(signal = "SIGINT", "shutdown signal"),
                    _ = sigterm.recv() => info!(signal = "SIGTERM", "shutdown signal"),
                }
            }
            _ => {
                warn!("Failed to install signal handlers; falling back to Ctrl-C");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_tls_requires_all_three_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(SERVER_KEY_FILE), "key").unwrap();
        std::fs::write(dir.path().join(SERVER_CERT_FILE), "cert").unwrap();

        let err = load_tls(dir.path()).unwrap_err();
        assert!(err.to_string().contains(ROOT_CERT_FILE));
    }

    #[test]
    fn load_tls_reads_pem_files() {
        let dir = tempfile::tempdir().unwrap();
        for name in [SERVER_KEY_FILE, SERVER_CERT_FILE, ROOT_CERT_FILE] {
            std::fs::write(dir.path().join(name), "pem").unwrap();
        }
        assert!(load_tls(dir.path()).is_ok());
    }
}
