use std::{pin::Pin, time::Duration};

use chrono::{DateTime, Utc};
use openssl::ssl::{Ssl, SslConnector, SslMethod};
use serde::Serialize;
use tokio::{net::TcpStream, time::timeout};
use tokio_openssl::SslStream;
use tracing::{debug, warn};
use x509_parser::prelude::*;

use crate::{error::Error, Result};

/// Outcome of a single certificate probe. Only `Valid` is trusted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificateStatus {
    PlainTransport,
    Unreachable,
    TimedOut,
    HandshakeFailed,
    NoCertificate,
    Expired,
    Valid,
}

impl CertificateStatus {
    pub fn is_trusted(self) -> bool {
        matches!(self, CertificateStatus::Valid)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CertificateOptions {
    pub connect_timeout: Duration,
    pub handshake_timeout: Duration,
    /// 443 everywhere except loopback tests.
    pub port: u16,
}

impl Default for CertificateOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            handshake_timeout: Duration::from_secs(5),
            port: 443,
        }
    }
}

/// Single attempt, no retries. Every failure is folded into a non-trusted status.
pub async fn validate_certificate(url: &str, opts: &CertificateOptions) -> CertificateStatus {
    if url.starts_with("http://") {
        debug!(url, "plain transport, skipping handshake");
        return CertificateStatus::PlainTransport;
    }
    let Some(host) = host_of(url) else {
        warn!(url, "no host component found");
        return CertificateStatus::Unreachable;
    };
    probe(host, opts.port, opts).await
}

/// Text between the first `//` and the next `/`. Ports and userinfo are not stripped.
pub fn host_of(url: &str) -> Option<&str> {
    let start = url.find("//")? + 2;
    let rest = &url[start..];
    let host = rest.split('/').next().unwrap_or(rest);
    (!host.is_empty()).then_some(host)
}

async fn probe(host: &str, port: u16, opts: &CertificateOptions) -> CertificateStatus {
    debug!(host, port, "connecting");
    let tcp_stream = match timeout(opts.connect_timeout, TcpStream::connect((host, port))).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(e)) => {
            warn!(host, error = %e, "TCP connect error");
            return CertificateStatus::Unreachable;
        }
        Err(_) => {
            warn!(host, "TCP connect timed out");
            return CertificateStatus::TimedOut;
        }
    };

    let mut ssl_stream = match tls_session(host).and_then(|ssl| SslStream::new(ssl, tcp_stream)) {
        Ok(stream) => stream,
        Err(e) => {
            warn!(host, error = %e, "SSL init error");
            return CertificateStatus::HandshakeFailed;
        }
    };

    match timeout(opts.handshake_timeout, Pin::new(&mut ssl_stream).connect()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            warn!(host, error = %e, "TLS handshake failed");
            return CertificateStatus::HandshakeFailed;
        }
        Err(_) => {
            warn!(host, "TLS handshake timed out");
            return CertificateStatus::TimedOut;
        }
    }

    let Some(cert) = ssl_stream.ssl().peer_certificate() else {
        debug!(host, "handshake done but no peer certificate");
        return CertificateStatus::NoCertificate;
    };

    match cert.to_der().map_err(|e| Error::ParseError(e.to_string())).and_then(|der| not_after(&der)) {
        Ok(expiry) => {
            debug!(host, %expiry, "peer certificate expiry");
            expiry_status(expiry, Utc::now())
        }
        Err(e) => {
            warn!(host, error = %e, "unreadable peer certificate");
            CertificateStatus::NoCertificate
        }
    }
}

// Default verify paths, peer verification, SNI and hostname checking.
fn tls_session(host: &str) -> std::result::Result<Ssl, openssl::error::ErrorStack> {
    let connector = SslConnector::builder(SslMethod::tls())?.build();
    connector.configure()?.into_ssl(host)
}

fn not_after(der: &[u8]) -> Result<DateTime<Utc>> {
    let (_, x509) = parse_x509_certificate(der)
        .map_err(|e| Error::ParseError(format!("X.509 parse error: {e}")))?;
    DateTime::from_timestamp(x509.validity().not_after.timestamp(), 0)
        .ok_or_else(|| Error::ParseError("Invalid certificate expiry date".to_owned()))
}

fn expiry_status(not_after: DateTime<Utc>, now: DateTime<Utc>) -> CertificateStatus {
    if not_after > now {
        CertificateStatus::Valid
    } else {
        CertificateStatus::Expired
    }
}
