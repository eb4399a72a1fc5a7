//! The single blocking, TLS-wrapped WebSocket connection.
//!
//! Runs on a dedicated OS thread — no async reactor. `send`/`receive` share
//! one mutex-guarded socket; `close` is idempotent and unblocks any
//! in-progress `receive` by shutting down the underlying TCP stream.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tungstenite::stream::MaybeTlsStream;
use tungstenite::{Connector, Message, WebSocket};
use url::Url;

use crate::config::{ConnectionTimeouts, TlsConfig};
use crate::error::{Error, ErrorKind, Result};

type Socket = WebSocket<MaybeTlsStream<TcpStream>>;

pub struct Transport {
    socket: Mutex<Socket>,
    closed: AtomicBool,
}

fn set_timeouts(socket: &Socket, timeouts: &ConnectionTimeouts) -> Result<()> {
    let set = |stream: &TcpStream| -> std::io::Result<()> {
        stream.set_read_timeout(Some(timeouts.read))?;
        stream.set_write_timeout(Some(timeouts.write))?;
        Ok(())
    };

    let result = match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => set(stream),
        MaybeTlsStream::NativeTls(stream) => set(stream.get_ref()),
        _ => Ok(()),
    };

    result.map_err(|e| Error::Kind {
        kind: ErrorKind::ConnectionFailed,
        message: format!("failed to set socket timeouts: {e}"),
    })
}

fn shutdown(socket: &Socket) {
    match socket.get_ref() {
        MaybeTlsStream::Plain(stream) => {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
        MaybeTlsStream::NativeTls(stream) => {
            let _ = stream.get_ref().shutdown(std::net::Shutdown::Both);
        }
        _ => {}
    }
}

fn build_connector(tls: &TlsConfig) -> Result<native_tls::TlsConnector> {
    let mut builder = native_tls::TlsConnector::builder();
    builder.danger_accept_invalid_certs(tls.allow_insecure || !tls.verify_peer);

    if let Some(ca_path) = &tls.ca_path {
        let pem = std::fs::read(ca_path).map_err(|e| Error::Kind {
            kind: ErrorKind::ConnectionFailed,
            message: format!("failed to read ca_path {ca_path}: {e}"),
        })?;
        let cert = native_tls::Certificate::from_pem(&pem).map_err(|e| Error::Kind {
            kind: ErrorKind::ConnectionFailed,
            message: format!("invalid CA certificate at {ca_path}: {e}"),
        })?;
        builder.add_root_certificate(cert);
    }

    if let (Some(cert_path), Some(key_path)) = (&tls.client_cert_path, &tls.client_key_path) {
        let cert_pem = std::fs::read(cert_path).map_err(|e| Error::Kind {
            kind: ErrorKind::ConnectionFailed,
            message: format!("failed to read client_cert_path {cert_path}: {e}"),
        })?;
        let key_pem = std::fs::read(key_path).map_err(|e| Error::Kind {
            kind: ErrorKind::ConnectionFailed,
            message: format!("failed to read client_key_path {key_path}: {e}"),
        })?;
        let identity = native_tls::Identity::from_pkcs8(&cert_pem, &key_pem).map_err(|e| Error::Kind {
            kind: ErrorKind::ConnectionFailed,
            message: format!("invalid client identity: {e}"),
        })?;
        builder.identity(identity);
    }

    // native-tls has no cross-platform cipher suite selection API; cipher_suites
    // is accepted for config-surface parity but isn't applied here.

    builder.build().map_err(|e| Error::Kind {
        kind: ErrorKind::ConnectionFailed,
        message: format!("failed to build tls connector: {e}"),
    })
}

fn is_timeout(err: &tungstenite::Error) -> bool {
    matches!(
        err,
        tungstenite::Error::Io(e)
            if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
    )
}

impl Transport {
    /// Resolves, TCP-connects, TLS-handshakes (SNI set to the host), and
    /// performs the WebSocket upgrade, all within `timeouts.connect`: the
    /// deadline is tracked across DNS resolution, the TCP connect, and the
    /// TLS/WebSocket handshake, not just the initial `TcpStream::connect`.
    pub fn connect(url: &str, timeouts: &ConnectionTimeouts, tls: &TlsConfig) -> Result<Self> {
        let deadline = Instant::now() + timeouts.connect;
        let parsed = Url::parse(url)?;
        let host = parsed.host_str().ok_or_else(|| Error::Kind {
            kind: ErrorKind::ConnectionFailed,
            message: "url has no host".to_string(),
        })?;
        let port = parsed
            .port_or_known_default()
            .unwrap_or(if parsed.scheme() == "ws" { 80 } else { 443 });

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(|e| Error::Kind {
                kind: ErrorKind::ConnectionFailed,
                message: format!("dns resolution for {host}:{port} failed: {e}"),
            })?
            .next()
            .ok_or_else(|| Error::Kind {
                kind: ErrorKind::ConnectionFailed,
                message: format!("dns resolution for {host}:{port} returned no addresses"),
            })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout(timeouts.connect));
        }
        let tcp = TcpStream::connect_timeout(&addr, remaining).map_err(|e| {
            if matches!(e.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock) {
                Error::Timeout(timeouts.connect)
            } else {
                Error::Kind {
                    kind: ErrorKind::ConnectionFailed,
                    message: format!("tcp connect to {addr} failed: {e}"),
                }
            }
        })?;

        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return Err(Error::Timeout(timeouts.connect));
        }
        tcp.set_read_timeout(Some(remaining))
            .and_then(|_| tcp.set_write_timeout(Some(remaining)))
            .map_err(|e| Error::Kind {
                kind: ErrorKind::ConnectionFailed,
                message: format!("failed to set handshake deadline: {e}"),
            })?;

        let connector = build_connector(tls)?;
        let (socket, _response) =
            tungstenite::client_tls_with_config(parsed.as_str(), tcp, None, Some(Connector::NativeTls(connector)))?;
        set_timeouts(&socket, timeouts)?;

        Ok(Self {
            socket: Mutex::new(socket),
            closed: AtomicBool::new(false),
        })
    }

    /// Serialized by the internal mutex; never interleaves partial frames
    /// from concurrent callers.
    pub fn send(&self, text: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::ConnectionClosed {
                reason: "transport already closed".to_string(),
            });
        }
        let mut socket = self.socket.lock();
        socket.send(Message::Text(text.to_string()))?;
        Ok(())
    }

    /// Blocks for one complete text frame. Control frames are absorbed
    /// transparently; a server-initiated close is surfaced as
    /// `ConnectionClosed`. Read timeouts loop back to re-check the closed
    /// flag rather than propagating as an error, so `close()` can interrupt
    /// a blocked reader promptly.
    pub fn receive(&self) -> Result<String> {
        loop {
            if self.is_closed() {
                return Err(Error::ConnectionClosed {
                    reason: "transport closed".to_string(),
                });
            }

            let mut socket = self.socket.lock();
            match socket.read() {
                Ok(Message::Text(text)) => return Ok(text),
                Ok(Message::Binary(_)) | Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {
                    continue;
                }
                Ok(Message::Close(frame)) => {
                    self.closed.store(true, Ordering::Release);
                    let reason = frame
                        .map(|f| f.reason.to_string())
                        .unwrap_or_else(|| "server closed connection".to_string());
                    return Err(Error::ConnectionClosed { reason });
                }
                Err(ref e) if is_timeout(e) => {
                    drop(socket);
                    continue;
                }
                Err(e) => return Err(Error::from(e)),
            }
        }
    }

    /// Idempotent: only the first call does anything.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let mut socket = self.socket.lock();
        let _ = socket.close(None);
        shutdown(&socket);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}
