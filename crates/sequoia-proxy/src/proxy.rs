//! MITM proxy server.
//!
//! Decrypts traffic to the provider hosts so the interceptor can see request
//! bodies. Other hosts are tunnelled.

use std::net::SocketAddr;
use std::path::PathBuf;

use hudsucker::rustls::crypto::aws_lc_rs::default_provider;
use hudsucker::Proxy;
use tokio::sync::broadcast;

use crate::ca::CaManager;
use crate::error::{ProxyError, Result};
use crate::handler::{ProxyHandler, DEFAULT_MAX_BODY_BYTES};
use crate::interceptor::Interceptor;
use crate::DEFAULT_PROXY_PORT;

/// Proxy server configuration.
#[derive(Clone, Debug)]
pub struct ProxyConfig {
    /// Address to bind the proxy to.
    pub addr: SocketAddr,
    /// The CA manager for certificate generation.
    pub ca_manager: CaManager,
    /// Pipeline run on every provider request.
    pub interceptor: Interceptor,
    /// Largest request body that is inspected.
    pub max_body_bytes: usize,
}

impl ProxyConfig {
    /// Localhost on the default port, CA under the data directory.
    pub fn new(interceptor: Interceptor) -> Result<Self> {
        let ca_manager = CaManager::with_default_dir()?;

        Ok(Self {
            addr: SocketAddr::from(([127, 0, 0, 1], DEFAULT_PROXY_PORT)),
            ca_manager,
            interceptor,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        })
    }

    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// Sets the port (uses 127.0.0.1 as host).
    pub fn with_port(mut self, port: u16) -> Self {
        self.addr = SocketAddr::from(([127, 0, 0, 1], port));
        self
    }

    pub fn with_ca_manager(mut self, ca_manager: CaManager) -> Self {
        self.ca_manager = ca_manager;
        self
    }

    pub fn with_max_body_bytes(mut self, max_body_bytes: usize) -> Self {
        self.max_body_bytes = max_body_bytes;
        self
    }

    fn handler(&self) -> ProxyHandler {
        ProxyHandler::new(self.interceptor.clone()).with_max_body_bytes(self.max_body_bytes)
    }
}

/// MITM proxy server for provider traffic.
pub struct ProxyServer {
    config: ProxyConfig,
}

impl ProxyServer {
    /// Creates the server, generating the CA if it does not exist yet.
    pub fn new(config: ProxyConfig) -> Result<Self> {
        config.ca_manager.ensure_ca()?;
        Ok(Self { config })
    }

    pub fn addr(&self) -> SocketAddr {
        self.config.addr
    }

    /// Where users find the certificate to trust.
    pub fn ca_cert_path(&self) -> PathBuf {
        self.config.ca_manager.cert_path()
    }

    pub fn ca_cert_der(&self) -> Result<Vec<u8>> {
        Ok(self.config.ca_manager.read_cert_der()?)
    }

    /// Runs until the proxy fails.
    pub async fn run(self) -> Result<()> {
        let authority = self.config.ca_manager.ensure_ca()?;

        tracing::info!("Starting MITM proxy on {}", self.config.addr);
        tracing::info!("CA certificate: {:?}", self.ca_cert_path());

        let proxy = Proxy::builder()
            .with_addr(self.config.addr)
            .with_ca(authority)
            .with_rustls_connector(default_provider())
            .with_http_handler(self.config.handler())
            .build()
            .map_err(|e| ProxyError::Build(e.to_string()))?;

        proxy
            .start()
            .await
            .map_err(|e| ProxyError::Serve(e.to_string()))?;

        tracing::info!("Proxy server stopped");
        Ok(())
    }

    /// Runs in the background; the handle stops it.
    pub fn start(self) -> Result<ProxyHandle> {
        let (shutdown_tx, _) = broadcast::channel::<()>(1);
        let mut shutdown_rx = shutdown_tx.subscribe();
        let addr = self.config.addr;

        let authority = self.config.ca_manager.ensure_ca()?;
        let handler = self.config.handler();

        tracing::info!("Starting MITM proxy on {}", addr);

        let handle = tokio::spawn(async move {
            let proxy = match Proxy::builder()
                .with_addr(addr)
                .with_ca(authority)
                .with_rustls_connector(default_provider())
                .with_http_handler(handler)
                .build()
            {
                Ok(p) => p,
                Err(e) => {
                    tracing::error!("Failed to build proxy: {}", e);
                    return;
                }
            };

            tokio::select! {
                result = proxy.start() => {
                    if let Err(e) = result {
                        tracing::error!("Proxy error: {}", e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    tracing::info!("Proxy shutdown signal received");
                }
            };
        });

        Ok(ProxyHandle {
            shutdown_tx,
            addr,
            handle,
        })
    }
}

/// Handle for controlling a running proxy server.
pub struct ProxyHandle {
    shutdown_tx: broadcast::Sender<()>,
    addr: SocketAddr,
    handle: tokio::task::JoinHandle<()>,
}

impl ProxyHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    pub async fn wait(self) {
        let _ = self.handle.await;
    }

    /// Shuts down the proxy and waits for it to finish.
    pub async fn stop(self) {
        self.shutdown();
        self.wait().await;
    }
}
