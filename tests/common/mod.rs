//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

use powerups_proxy::{HttpServer, ProxyConfig, Shutdown};

/// Set-Cookie lines every recording backend answers with.
pub const BACKEND_COOKIES: [&str; 2] = [
    "_ga=GA1.1.123; Expires=Wed, 21 Oct 2026 07:28:00 GMT; Path=/",
    "FPID=abc; Max-Age=60; HttpOnly",
];

/// Request heads received by a mock backend, one entry per request.
#[derive(Clone, Default)]
pub struct Recorded(Arc<Mutex<Vec<String>>>);

impl Recorded {
    pub fn count(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    /// Value of `name` in the most recent request, matched case-insensitively.
    pub fn last_header(&self, name: &str) -> Option<String> {
        let heads = self.0.lock().unwrap();
        let head = heads.last()?;
        head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim().to_string())
        })
    }

    /// Request line of the most recent request.
    pub fn last_request_line(&self) -> Option<String> {
        let heads = self.0.lock().unwrap();
        heads.last()?.lines().next().map(str::to_string)
    }
}

/// Start a mock backend that records each request head and answers 200 "ok"
/// with [`BACKEND_COOKIES`].
pub async fn start_recording_backend() -> (SocketAddr, Recorded) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let recorded = Recorded::default();
    let sink = recorded.clone();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    let sink = sink.clone();
                    tokio::spawn(async move {
                        let mut buf = Vec::new();
                        let mut chunk = [0u8; 1024];
                        while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => return,
                                Ok(n) => buf.extend_from_slice(&chunk[..n]),
                            }
                        }
                        let head_len = buf.windows(4).position(|w| w == b"\r\n\r\n").unwrap() + 4;
                        let head = String::from_utf8_lossy(&buf[..head_len]).into_owned();

                        // Drain the body so closing the socket does not reset it.
                        let body_len = head
                            .lines()
                            .filter_map(|line| line.split_once(':'))
                            .find(|(key, _)| key.trim().eq_ignore_ascii_case("content-length"))
                            .and_then(|(_, value)| value.trim().parse::<usize>().ok())
                            .unwrap_or(0);
                        let mut remaining = (head_len + body_len).saturating_sub(buf.len());
                        while remaining > 0 {
                            match socket.read(&mut chunk).await {
                                Ok(0) | Err(_) => break,
                                Ok(n) => remaining = remaining.saturating_sub(n),
                            }
                        }

                        sink.0.lock().unwrap().push(head);

                        let cookies: String = BACKEND_COOKIES
                            .iter()
                            .map(|c| format!("Set-Cookie: {}\r\n", c))
                            .collect();
                        let response = format!(
                            "HTTP/1.1 200 OK\r\n{}Content-Length: 2\r\nConnection: close\r\n\r\nok",
                            cookies
                        );
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                    });
                }
                Err(_) => break,
            }
        }
    });

    (addr, recorded)
}

/// Run the proxy on an ephemeral port. The listener is bound before this
/// returns, so requests may be sent immediately.
pub async fn start_proxy(config: ProxyConfig) -> (SocketAddr, Shutdown) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let server = HttpServer::new(config).unwrap();
    let receiver = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, receiver).await;
    });

    (addr, shutdown)
}

/// Client that never pools or follows proxies, so each test sees a fresh connection.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
