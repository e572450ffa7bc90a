//! HTTPS termination
//!
//! `TlsListener` wraps a TCP listener and completes the TLS handshake before
//! handing the stream to axum. Each handshake runs in its own task, so a peer
//! that connects and never finishes the handshake only holds its own
//! connection. Connections whose handshake fails or stalls are dropped with a
//! warning.

use axum::serve::Listener;
use rustls::ServerConfig;
use rustls::pki_types::pem::PemObject;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_rustls::TlsAcceptor;
use tokio_rustls::server::TlsStream;

const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Completed handshakes waiting for axum to pick them up
const READY_BACKLOG: usize = 64;

type Accepted = (TlsStream<TcpStream>, SocketAddr);

#[derive(Error, Debug)]
pub enum TlsSetupError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse certificates in {}: {message}", path.display())]
    Certificate { path: PathBuf, message: String },

    #[error("no certificates found in {}", .0.display())]
    NoCertificates(PathBuf),

    #[error("failed to parse private key in {}: {message}", path.display())]
    PrivateKey { path: PathBuf, message: String },

    #[error("invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

fn read_pem(path: &Path) -> Result<Vec<u8>, TlsSetupError> {
    std::fs::read(path).map_err(|source| TlsSetupError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a server config from a PEM certificate chain and private key
pub fn load_server_config(cert_path: &Path, key_path: &Path) -> Result<ServerConfig, TlsSetupError> {
    let cert_pem = read_pem(cert_path)?;
    let certs = CertificateDer::pem_slice_iter(&cert_pem)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| TlsSetupError::Certificate {
            path: cert_path.to_path_buf(),
            message: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(TlsSetupError::NoCertificates(cert_path.to_path_buf()));
    }

    let key_pem = read_pem(key_path)?;
    let key = PrivateKeyDer::from_pem_slice(&key_pem).map_err(|e| TlsSetupError::PrivateKey {
        path: key_path.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut config =
        ServerConfig::builder_with_provider(Arc::new(rustls::crypto::ring::default_provider()))
            .with_safe_default_protocol_versions()?
            .with_no_client_auth()
            .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(config)
}

pub struct TlsListener {
    local_addr: SocketAddr,
    ready: mpsc::Receiver<Accepted>,
    accept_task: JoinHandle<()>,
}

impl TlsListener {
    /// Start accepting on `inner`; must be called inside a tokio runtime
    pub fn new(inner: TcpListener, config: ServerConfig) -> io::Result<Self> {
        let local_addr = inner.local_addr()?;
        let acceptor = TlsAcceptor::from(Arc::new(config));
        let (tx, ready) = mpsc::channel(READY_BACKLOG);
        let accept_task = tokio::spawn(accept_loop(inner, acceptor, tx));

        Ok(Self {
            local_addr,
            ready,
            accept_task,
        })
    }
}

impl Drop for TlsListener {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}

async fn accept_loop(mut listener: TcpListener, acceptor: TlsAcceptor, ready: mpsc::Sender<Accepted>) {
    loop {
        let (stream, addr) = Listener::accept(&mut listener).await;
        tokio::spawn(handshake(acceptor.clone(), stream, addr, ready.clone()));
    }
}

async fn handshake(
    acceptor: TlsAcceptor,
    stream: TcpStream,
    addr: SocketAddr,
    ready: mpsc::Sender<Accepted>,
) {
    match tokio::time::timeout(HANDSHAKE_TIMEOUT, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => {
            if ready.send((tls, addr)).await.is_err() {
                tracing::debug!("Listener closed, dropping connection from {}", addr);
            }
        }
        Ok(Err(e)) => tracing::warn!("TLS handshake with {} failed: {}", addr, e),
        Err(_) => tracing::warn!("TLS handshake with {} timed out", addr),
    }
}

impl Listener for TlsListener {
    type Io = TlsStream<TcpStream>;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        match self.ready.recv().await {
            Some(accepted) => accepted,
            // accept_task owns a sender until it is aborted in Drop
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        Ok(self.local_addr)
    }
}
