use sni_proxy::metrics::Metrics;
use sni_proxy::proxy::RouterOptions;
use sni_proxy::resolve::{BackendAddr, BackendTarget, ResolverType, from_fn};
use sni_proxy::{ProxyServer, RunningProxy, create_proxy};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const HTTP_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\nConnection: close\r\n\r\nHTTP-Server";

/// Test backend: reads exactly `expect` bytes, reports them, replies and closes
struct Backend {
    addr: SocketAddr,
    accepted: Arc<AtomicUsize>,
    received: mpsc::UnboundedReceiver<Vec<u8>>,
}

impl Backend {
    async fn start(expect: usize, response: &'static [u8]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accepted = Arc::new(AtomicUsize::new(0));
        let (tx, received) = mpsc::unbounded_channel();

        let counter = Arc::clone(&accepted);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                counter.fetch_add(1, Ordering::SeqCst);
                let tx = tx.clone();
                tokio::spawn(async move {
                    let mut buffer = vec![0u8; expect];
                    if stream.read_exact(&mut buffer).await.is_ok() {
                        let _ = tx.send(buffer);
                        let _ = stream.write_all(response).await;
                    }
                    let _ = stream.shutdown().await;
                });
            }
        });

        Self {
            addr,
            accepted,
            received,
        }
    }

    async fn next_received(&mut self) -> Vec<u8> {
        timeout(Duration::from_secs(5), self.received.recv())
            .await
            .expect("backend never received data")
            .expect("backend channel closed")
    }

    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }
}

/// Echo backend: sends back everything it receives until the peer closes
async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(async move {
                let (mut reader, mut writer) = stream.into_split();
                let _ = tokio::io::copy(&mut reader, &mut writer).await;
            });
        }
    });
    addr
}

/// An address with nothing listening on it
async fn unused_addr() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

fn http_request(host: &str) -> Vec<u8> {
    format!(
        "GET / HTTP/1.1\r\nHost: {}\r\nUser-Agent: sni-proxy-test\r\n\r\n",
        host
    )
    .into_bytes()
}

fn localhost_resolver(backend: SocketAddr) -> ResolverType {
    from_fn(move |hostname, _is_secure| {
        (hostname == Some("localhost")).then(|| BackendTarget::from(backend))
    })
}

async fn start_proxy(resolver: ResolverType, metrics: Arc<Metrics>) -> RunningProxy {
    ProxyServer::new(resolver, RouterOptions::default(), metrics)
        .unwrap()
        .listen("127.0.0.1:0")
        .await
        .unwrap()
}

/// Send `request` and collect everything until the proxy closes the connection
async fn exchange(proxy: SocketAddr, request: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut client = TcpStream::connect(proxy).await?;
    client.write_all(request).await?;
    let mut response = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .expect("proxy did not close the connection")?;
    Ok(response)
}

/// A refused connection shows up either as a clean close or as a reset
fn assert_closed_without_data(result: std::io::Result<Vec<u8>>) {
    match result {
        Ok(data) => assert!(data.is_empty(), "unexpected bytes: {:?}", data),
        Err(e) => assert_eq!(e.kind(), std::io::ErrorKind::ConnectionReset),
    }
}

#[tokio::test]
async fn test_proxy_http_by_host_header() {
    let request = http_request("localhost");
    let mut backend = Backend::start(request.len(), HTTP_RESPONSE).await;
    let proxy = create_proxy(localhost_resolver(backend.addr))
        .listen("127.0.0.1:0")
        .await
        .unwrap();

    let response = exchange(proxy.local_addr(), &request).await.unwrap();

    assert_eq!(response, HTTP_RESPONSE);
    assert_eq!(backend.next_received().await, request);
    assert_eq!(backend.accepted(), 1);
    proxy.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_proxy_tls_by_sni() {
    let config = rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_root_certificates(rustls::RootCertStore::empty())
        .with_no_client_auth();
    let name = rustls::ServerName::try_from("localhost").unwrap();
    let mut conn = rustls::ClientConnection::new(Arc::new(config), name).unwrap();
    let mut hello = Vec::new();
    conn.write_tls(&mut hello).unwrap();

    let mut backend = Backend::start(hello.len(), b"tls-backend").await;
    let backend_addr = backend.addr;
    let resolver = from_fn(move |hostname, is_secure| {
        (hostname == Some("localhost") && is_secure).then(|| BackendTarget::from(backend_addr))
    });
    let proxy = create_proxy(resolver).listen("127.0.0.1:0").await.unwrap();

    let response = exchange(proxy.local_addr(), &hello).await.unwrap();

    assert_eq!(response, b"tls-backend");
    // the ClientHello consumed for routing reaches the backend unchanged
    assert_eq!(backend.next_received().await, hello);
}

#[tokio::test]
async fn test_proxy_url_target() {
    let request = http_request("localhost");
    let mut backend = Backend::start(request.len(), HTTP_RESPONSE).await;
    let url = format!("http://www.localhost:{}/", backend.addr.port());
    let resolver = from_fn(move |_hostname, _is_secure| Some(BackendTarget::from(url.as_str())));
    let proxy = create_proxy(resolver).listen("127.0.0.1:0").await.unwrap();

    let response = exchange(proxy.local_addr(), &request).await.unwrap();

    assert_eq!(response, HTTP_RESPONSE);
    assert_eq!(backend.next_received().await, request);
}

#[tokio::test]
async fn test_unknown_host_is_closed_without_backend() {
    let request = http_request("127.0.0.1");
    let backend = Backend::start(request.len(), HTTP_RESPONSE).await;
    let metrics = Arc::new(Metrics::new());
    let proxy = start_proxy(localhost_resolver(backend.addr), Arc::clone(&metrics)).await;

    assert_closed_without_data(exchange(proxy.local_addr(), &request).await);

    assert_eq!(backend.accepted(), 0);
    assert_eq!(metrics.snapshot().unrouted, 1);
    assert_eq!(metrics.snapshot().routed, 0);
}

#[tokio::test]
async fn test_resolver_sees_missing_hostname() {
    let calls = Arc::new(Mutex::new(Vec::new()));
    let seen = Arc::clone(&calls);
    let resolver = from_fn(move |hostname, is_secure| {
        seen.lock()
            .unwrap()
            .push((hostname.map(str::to_owned), is_secure));
        None
    });
    let proxy = create_proxy(resolver).listen("127.0.0.1:0").await.unwrap();

    assert_closed_without_data(
        exchange(proxy.local_addr(), b"\x00\x01no host header here\r\n\r\n").await,
    );

    assert_eq!(*calls.lock().unwrap(), vec![(None, false)]);
}

#[tokio::test]
async fn test_silent_client_never_reaches_resolver() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let resolver = from_fn(move |_hostname, _is_secure| {
        counter.fetch_add(1, Ordering::SeqCst);
        None
    });
    let proxy = create_proxy(resolver).listen("127.0.0.1:0").await.unwrap();

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    client.shutdown().await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .unwrap()
        .unwrap();

    assert!(response.is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_first_packet_timeout_closes_idle_client() {
    let options = RouterOptions {
        first_packet_timeout: Some(Duration::from_millis(100)),
        ..RouterOptions::default()
    };
    let metrics = Arc::new(Metrics::new());
    let resolver = from_fn(|_hostname, _is_secure| None);
    let proxy = ProxyServer::new(resolver, options, Arc::clone(&metrics))
        .unwrap()
        .listen("127.0.0.1:0")
        .await
        .unwrap();

    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    let mut response = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut response))
        .await
        .expect("idle client was never closed")
        .unwrap();

    assert!(response.is_empty());
    assert_eq!(metrics.snapshot().unrouted, 1);
}

#[tokio::test]
async fn test_unreachable_backend_keeps_server_running() {
    let dead = unused_addr().await;
    let request = http_request("localhost");
    let mut backend = Backend::start(request.len(), HTTP_RESPONSE).await;
    let live = backend.addr;
    let resolver = from_fn(move |hostname, _is_secure| match hostname {
        Some("dead.example") => Some(BackendTarget::from(dead)),
        Some("localhost") => Some(BackendTarget::from(live)),
        _ => None,
    });
    let metrics = Arc::new(Metrics::new());
    let proxy = start_proxy(resolver, Arc::clone(&metrics)).await;

    assert_closed_without_data(exchange(proxy.local_addr(), &http_request("dead.example")).await);
    assert_eq!(metrics.snapshot().backend_errors_ignored, 1);
    assert_eq!(metrics.snapshot().backend_errors, 0);

    // the listener is still accepting and routing
    let response = exchange(proxy.local_addr(), &request).await.unwrap();
    assert_eq!(response, HTTP_RESPONSE);
    assert_eq!(backend.next_received().await, request);
}

#[tokio::test]
async fn test_bad_resolver_result_is_isolated() {
    let request = http_request("localhost");
    let mut backend = Backend::start(request.len(), HTTP_RESPONSE).await;
    let live = backend.addr;
    let resolver = from_fn(move |hostname, _is_secure| match hostname {
        Some("broken.example") => Some(BackendTarget::from("/no/host/here")),
        Some("localhost") => Some(BackendTarget::from(live)),
        _ => None,
    });
    let proxy = create_proxy(resolver).listen("127.0.0.1:0").await.unwrap();

    assert_closed_without_data(exchange(proxy.local_addr(), &http_request("broken.example")).await);

    let response = exchange(proxy.local_addr(), &request).await.unwrap();
    assert_eq!(response, HTTP_RESPONSE);
    assert_eq!(backend.next_received().await, request);
}

#[tokio::test]
async fn test_splice_is_bidirectional_until_client_closes() {
    let echo = start_echo_backend().await;
    let metrics = Arc::new(Metrics::new());
    let proxy = start_proxy(localhost_resolver(echo), Arc::clone(&metrics)).await;

    let request = http_request("localhost");
    let mut client = TcpStream::connect(proxy.local_addr()).await.unwrap();
    client.write_all(&request).await.unwrap();

    let mut echoed = vec![0u8; request.len()];
    timeout(Duration::from_secs(5), client.read_exact(&mut echoed))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed, request);

    // traffic after the first packet flows both ways unchanged
    for round in 0..3 {
        let message = format!("ping {}", round);
        client.write_all(message.as_bytes()).await.unwrap();
        let mut reply = vec![0u8; message.len()];
        timeout(Duration::from_secs(5), client.read_exact(&mut reply))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(reply, message.as_bytes());
    }
    assert_eq!(metrics.snapshot().active_sessions, 1);

    client.shutdown().await.unwrap();
    let mut rest = Vec::new();
    timeout(Duration::from_secs(5), client.read_to_end(&mut rest))
        .await
        .expect("backend side was not closed")
        .unwrap();
    assert!(rest.is_empty());

    // the session gauge drops once the router task finishes
    timeout(Duration::from_secs(5), async {
        while metrics.snapshot().active_sessions != 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.routed, 1);
    assert_eq!(snapshot.bytes_client_to_backend, snapshot.bytes_backend_to_client);
}

#[tokio::test]
async fn test_structured_address_target() {
    let request = http_request("localhost");
    let mut backend = Backend::start(request.len(), HTTP_RESPONSE).await;
    let port = backend.addr.port();
    let resolver = from_fn(move |_hostname, _is_secure| {
        Some(BackendAddr::new("127.0.0.1", port).into())
    });
    let proxy = create_proxy(resolver).listen("127.0.0.1:0").await.unwrap();

    let response = exchange(proxy.local_addr(), &request).await.unwrap();
    assert_eq!(response, HTTP_RESPONSE);
    assert_eq!(backend.next_received().await, request);
}
