//! Shared utilities for integration testing.
//!
//! Backends here are raw TCP servers so the tests see exactly what the proxy
//! put on the wire.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, Response};
use futures_util::{SinkExt, StreamExt};
use hyper_util::rt::TokioIo;
use rustls::pki_types::{CertificateDer, ServerName};
use rustls::{ClientConfig, RootCertStore, SupportedCipherSuite, SupportedProtocolVersion};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use frontdoor::config::ProxyConfig;
use frontdoor::lifecycle::{Proxy, Shutdown, StartupError};
use frontdoor::net::{Listener, SessionCache};

/// What a mock backend saw.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub request_line: String,
    pub headers: Vec<(String, String)>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// How a mock backend answers.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// `200 OK` with this body.
    Respond(&'static str),
    /// Close the socket without reading or answering.
    CloseImmediately,
    /// Read the request and never answer.
    Hang,
    /// Send a head promising 100 bytes, then five bytes, then nothing.
    StallBody,
    /// Answer `101` and echo raw bytes afterwards.
    Upgrade,
    /// Answer an upgrade attempt with `403`.
    RefuseUpgrade,
}

#[derive(Clone)]
pub struct MockBackend {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    accepts: Arc<AtomicUsize>,
}

impl MockBackend {
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn accepts(&self) -> usize {
        self.accepts.load(Ordering::SeqCst)
    }
}

/// Start a mock backend on an ephemeral port.
pub async fn start_backend(behavior: Behavior) -> MockBackend {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        requests: Arc::new(Mutex::new(Vec::new())),
        accepts: Arc::new(AtomicUsize::new(0)),
    };

    let state = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            state.accepts.fetch_add(1, Ordering::SeqCst);
            let requests = Arc::clone(&state.requests);
            tokio::spawn(handle_backend_connection(socket, behavior, requests));
        }
    });

    backend
}

async fn handle_backend_connection(
    mut socket: TcpStream,
    behavior: Behavior,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    if let Behavior::CloseImmediately = behavior {
        return;
    }

    let Some((recorded, leftover)) = read_head(&mut socket).await else {
        return;
    };
    requests.lock().unwrap().push(recorded);

    match behavior {
        Behavior::Respond(body) => {
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
        Behavior::Hang => {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Behavior::StallBody => {
            let _ = socket
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nhello")
                .await;
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Behavior::Upgrade => {
            let _ = socket
                .write_all(
                    b"HTTP/1.1 101 Switching Protocols\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nX-Backend: raw\r\n\r\n",
                )
                .await;
            if !leftover.is_empty() {
                let _ = socket.write_all(&leftover).await;
            }
            let (mut rd, mut wr) = socket.split();
            let _ = tokio::io::copy(&mut rd, &mut wr).await;
        }
        Behavior::RefuseUpgrade => {
            let _ = socket
                .write_all(b"HTTP/1.1 403 Forbidden\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                .await;
            let _ = socket.shutdown().await;
        }
        Behavior::CloseImmediately => {}
    }
}

/// Read one request head; returns it plus any bytes read past it.
async fn read_head(socket: &mut TcpStream) -> Option<(RecordedRequest, Vec<u8>)> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let mut lines = head.split("\r\n");
            let request_line = lines.next().unwrap_or_default().to_string();
            let headers = lines
                .filter_map(|line| line.split_once(':'))
                .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
                .collect();
            let leftover = buf[end + 4..].to_vec();
            return Some((RecordedRequest { request_line, headers }, leftover));
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
}

/// A real WebSocket echo server. Records each handshake request.
pub async fn start_ws_echo_backend() -> MockBackend {
    use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request as WsRequest, Response as WsResponse};

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let backend = MockBackend {
        addr: listener.local_addr().unwrap(),
        requests: Arc::new(Mutex::new(Vec::new())),
        accepts: Arc::new(AtomicUsize::new(0)),
    };

    let state = backend.clone();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            state.accepts.fetch_add(1, Ordering::SeqCst);
            let requests = Arc::clone(&state.requests);
            tokio::spawn(async move {
                let record = |req: &WsRequest, resp: WsResponse| -> Result<WsResponse, ErrorResponse> {
                    let headers = req
                        .headers()
                        .iter()
                        .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or_default().to_string()))
                        .collect();
                    requests.lock().unwrap().push(RecordedRequest {
                        request_line: format!("{} {} HTTP/1.1", req.method(), req.uri()),
                        headers,
                    });
                    Ok(resp)
                };
                let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(socket, record).await else {
                    return;
                };
                while let Some(Ok(msg)) = ws.next().await {
                    if msg.is_text() || msg.is_binary() {
                        if ws.send(msg).await.is_err() {
                            break;
                        }
                    } else if msg.is_close() {
                        break;
                    }
                }
            });
        }
    });

    backend
}

/// A self-signed certificate for `localhost` written to a temp dir.
pub struct TestCert {
    _dir: tempfile::TempDir,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    pub der: CertificateDer<'static>,
}

pub fn self_signed() -> TestCert {
    let rcgen::CertifiedKey { cert, key_pair } =
        rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("fullchain.pem");
    let key_path = dir.path().join("privkey.pem");
    std::fs::write(&cert_path, cert.pem()).unwrap();
    std::fs::write(&key_path, key_pair.serialize_pem()).unwrap();
    TestCert {
        _dir: dir,
        cert_path,
        key_path,
        der: cert.der().clone(),
    }
}

/// Defaults pointed at the given backends, with short drain timers.
pub fn test_config(websocket: SocketAddr, spa: SocketAddr) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.backends.websocket = websocket.to_string();
    config.backends.spa = spa.to_string();
    config.timeouts.bridge_grace_secs = 1;
    config.timeouts.shutdown_grace_secs = 2;
    config
}

/// A running proxy on ephemeral ports.
pub struct TestProxy {
    pub https_addr: SocketAddr,
    pub http_addr: SocketAddr,
    pub shutdown: Shutdown,
    pub session_cache: Arc<SessionCache>,
    pub cert: TestCert,
    task: JoinHandle<Result<(), StartupError>>,
}

pub async fn start_proxy(mut config: ProxyConfig) -> TestProxy {
    let cert = self_signed();
    config.tls.cert_path = cert.cert_path.to_string_lossy().into_owned();
    config.tls.key_path = cert.key_path.to_string_lossy().into_owned();

    let proxy = Proxy::build(&config).expect("proxy builds");
    let secure = Listener::bind("127.0.0.1:0", 1024).await.unwrap();
    let redirect = Listener::bind("127.0.0.1:0", 1024).await.unwrap();

    let https_addr = secure.local_addr().unwrap();
    let http_addr = redirect.local_addr().unwrap();
    let shutdown = proxy.shutdown_handle();
    let session_cache = Arc::clone(proxy.session_cache());
    let task = tokio::spawn(proxy.serve(secure, redirect));

    TestProxy {
        https_addr,
        http_addr,
        shutdown,
        session_cache,
        cert,
        task,
    }
}

impl TestProxy {
    /// Trigger shutdown and wait for the drain to finish.
    pub async fn stop(self) -> Result<(), StartupError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.task)
            .await
            .expect("proxy did not stop")
            .expect("proxy task panicked")
    }

    pub fn client_config(&self) -> Arc<ClientConfig> {
        client_config(&self.cert.der, rustls::ALL_VERSIONS, None)
    }

    pub async fn connect(&self) -> TlsStream<TcpStream> {
        tls_connect(self.https_addr, self.client_config())
            .await
            .expect("TLS handshake")
    }

    /// Send one request over a fresh TLS connection and collect the response.
    pub async fn send(&self, request: Request<Body>) -> (Response<()>, Bytes) {
        let tls = self.connect().await;
        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(tls))
            .await
            .unwrap();
        tokio::spawn(conn);

        let response = sender.send_request(request).await.unwrap();
        let (parts, body) = response.into_parts();
        let bytes = axum::body::to_bytes(Body::new(body), usize::MAX).await.unwrap();
        (Response::from_parts(parts, ()), bytes)
    }

    pub async fn get(&self, target: &str) -> (Response<()>, Bytes) {
        let request = Request::builder()
            .uri(target)
            .header("host", "app.example.com")
            .body(Body::empty())
            .unwrap();
        self.send(request).await
    }
}

/// Client config trusting `root`, restricted to `versions` and optionally `suites`.
pub fn client_config(
    root: &CertificateDer<'static>,
    versions: &[&'static SupportedProtocolVersion],
    suites: Option<Vec<SupportedCipherSuite>>,
) -> Arc<ClientConfig> {
    let mut provider = rustls::crypto::ring::default_provider();
    if let Some(suites) = suites {
        provider.cipher_suites = suites;
    }
    let mut roots = RootCertStore::empty();
    roots.add(root.clone()).unwrap();

    let mut config = ClientConfig::builder_with_provider(Arc::new(provider))
        .with_protocol_versions(versions)
        .unwrap()
        .with_root_certificates(roots)
        .with_no_client_auth();
    config.alpn_protocols = vec![b"http/1.1".to_vec()];
    Arc::new(config)
}

pub async fn tls_connect(
    addr: SocketAddr,
    config: Arc<ClientConfig>,
) -> std::io::Result<TlsStream<TcpStream>> {
    let tcp = TcpStream::connect(addr).await?;
    let name = ServerName::try_from("localhost").unwrap();
    TlsConnector::from(config).connect(name, tcp).await
}

/// Read until the end of a response head; returns the head text and any extra bytes.
pub async fn read_response_head<S>(stream: &mut S) -> (String, Vec<u8>)
where
    S: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            return (head, buf[end + 4..].to_vec());
        }
        let n = stream.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before response head");
        buf.extend_from_slice(&chunk[..n]);
    }
}
