//! DNS-over-TLS transport (RFC 7858)
//!
//! - One `ClientConfig` per pool, built from the `tls` options and shared by
//!   every TLS upstream (session resumption comes from its session cache)
//! - Idle TLS connections are cached per upstream and reused, amortizing the
//!   handshake cost

use super::conn_cache::{peek_idle, ConnCache, IdleCheck};
use super::tcp::{connect, exchange_framed};
use super::{DnsTransport, TransportResponse};
use async_trait::async_trait;
use bytes::Bytes;
use dns_forward_domain::{DomainError, Protocol, TlsOptions};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, ServerName};
use std::fs::File;
use std::io::{self, BufReader};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::{timeout_at, Instant};
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;
use tracing::debug;

impl IdleCheck for TlsStream<TcpStream> {
    fn is_stale(&self) -> bool {
        // Pending bytes may be a session ticket; only EOF or an error rules
        // the stream out here. A close_notify shows up on the next exchange.
        match peek_idle(self.get_ref().0) {
            Ok(0) => true,
            Ok(_) => false,
            Err(e) => e.kind() != io::ErrorKind::WouldBlock,
        }
    }
}

/// Builds the client configuration shared by the TLS upstreams of one pool.
///
/// Without a CA file the bundled web PKI roots are trusted. A certificate and
/// key pair enables client authentication.
pub fn build_client_config(options: &TlsOptions) -> Result<Arc<rustls::ClientConfig>, DomainError> {
    let mut root_store = rustls::RootCertStore::empty();
    match &options.ca_file {
        Some(ca_file) => {
            for cert in load_certs(ca_file)? {
                root_store.add(cert).map_err(|e| {
                    DomainError::TlsConfig(format!("{}: {}", ca_file.display(), e))
                })?;
            }
        }
        None => root_store.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned()),
    }

    let builder = rustls::ClientConfig::builder().with_root_certificates(root_store);

    let config = match (&options.cert_file, &options.key_file) {
        (Some(cert_file), Some(key_file)) => {
            let chain = load_certs(cert_file)?;
            let key = load_private_key(key_file)?;
            builder
                .with_client_auth_cert(chain, key)
                .map_err(|e| DomainError::TlsConfig(format!("client certificate: {}", e)))?
        }
        _ => builder.with_no_client_auth(),
    };

    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, DomainError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| DomainError::TlsConfig(format!("{}: {}", path.display(), e)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, DomainError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| DomainError::TlsConfig(format!("{}: {}", path.display(), e)))?;
    if certs.is_empty() {
        return Err(DomainError::TlsConfig(format!(
            "{}: no certificates found",
            path.display()
        )));
    }
    Ok(certs)
}

fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, DomainError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| DomainError::TlsConfig(format!("{}: {}", path.display(), e)))?
        .ok_or_else(|| DomainError::TlsConfig(format!("{}: no private key found", path.display())))
}

/// Server name checked against the upstream certificate: the configured
/// `tls_servername`, or the upstream IP address itself.
pub fn server_name_for(
    server_addr: SocketAddr,
    configured: Option<&str>,
) -> Result<ServerName<'static>, DomainError> {
    match configured {
        Some(name) => ServerName::try_from(name.to_string())
            .map_err(|e| DomainError::TlsConfig(format!("invalid TLS server name '{}': {}", name, e))),
        None => Ok(ServerName::from(server_addr.ip())),
    }
}

/// DNS-over-TLS transport (RFC 7858)
pub struct TlsTransport {
    server_addr: SocketAddr,
    server_name: ServerName<'static>,
    connector: TlsConnector,
    cache: ConnCache<TlsStream<TcpStream>>,
}

impl TlsTransport {
    pub fn new(
        server_addr: SocketAddr,
        server_name: ServerName<'static>,
        client_config: Arc<rustls::ClientConfig>,
        expire: Duration,
    ) -> Self {
        Self {
            server_addr,
            server_name,
            connector: TlsConnector::from(client_config),
            cache: ConnCache::new(expire),
        }
    }

    pub fn server_name(&self) -> &ServerName<'static> {
        &self.server_name
    }

    /// Establish a new TLS connection (TCP connect + TLS handshake).
    async fn connect_new(&self, deadline: Instant) -> Result<TlsStream<TcpStream>, DomainError> {
        let tcp_stream = connect(self.server_addr, deadline).await?;
        let server = self.server_addr.to_string();

        let tls_stream = timeout_at(
            deadline,
            self.connector.connect(self.server_name.clone(), tcp_stream),
        )
        .await
        .map_err(|_| DomainError::TransportTimeout {
            server: server.clone(),
        })?
        .map_err(|e| DomainError::from_io(server, &e))?;

        debug!(server = %self.server_addr, server_name = ?self.server_name, "TLS connection established");
        Ok(tls_stream)
    }
}

#[async_trait]
impl DnsTransport for TlsTransport {
    async fn send(
        &self,
        message_bytes: &[u8],
        timeout: Duration,
    ) -> Result<TransportResponse, DomainError> {
        let deadline = Instant::now() + timeout;
        if let Some(mut stream) = self.cache.take() {
            match exchange_framed(&mut stream, message_bytes, deadline, self.server_addr).await {
                Ok(response_bytes) => {
                    debug!(server = %self.server_addr, "TLS query via cached connection");
                    self.cache.put(stream);
                    return Ok(TransportResponse {
                        bytes: Bytes::from(response_bytes),
                        protocol_used: Protocol::Tls,
                        reused: true,
                    });
                }
                Err(e) if Instant::now() >= deadline => return Err(e),
                Err(e) => {
                    debug!(server = %self.server_addr, error = %e, "Cached TLS connection failed, reconnecting");
                }
            }
        }

        let mut stream = self.connect_new(deadline).await?;
        let response_bytes =
            exchange_framed(&mut stream, message_bytes, deadline, self.server_addr).await?;

        debug!(
            server = %self.server_addr,
            response_len = response_bytes.len(),
            "TLS response received"
        );

        self.cache.put(stream);

        Ok(TransportResponse {
            bytes: Bytes::from(response_bytes),
            protocol_used: Protocol::Tls,
            reused: false,
        })
    }

    fn protocol(&self) -> Protocol {
        Protocol::Tls
    }

    fn close_idle(&self) {
        self.cache.clear();
    }
}
