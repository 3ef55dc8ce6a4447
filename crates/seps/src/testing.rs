//! A throwaway HTTP server for exercising test bodies in unit tests.

use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::http::Fetcher;

/// A canned response.
pub(crate) struct Reply {
    status: u16,
    content_type: &'static str,
    headers: Vec<(String, String)>,
    body: String,
}

impl Reply {
    pub(crate) fn text(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "text/plain",
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    pub(crate) fn json(status: u16, body: &str) -> Self {
        Self {
            content_type: "application/json",
            ..Self::text(status, body)
        }
    }

    pub(crate) fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

/// A request as seen by the server.
pub(crate) struct Request {
    pub method: String,
    /// Path including any query string
    pub path: String,
    pub body: String,
}

/// Serve `handler` on an ephemeral local port, returning the base URL.
///
/// The handler receives the request path including any query string.
pub(crate) async fn serve<F>(handler: F) -> Url
where
    F: Fn(&str) -> Reply + Send + Sync + 'static,
{
    serve_requests(move |request| handler(&request.path)).await
}

/// Like [`serve`], with the method and body available to the handler.
pub(crate) async fn serve_requests<F>(handler: F) -> Url
where
    F: Fn(&Request) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let handler = handler.clone();
            tokio::spawn(async move {
                let request = read_request(&mut socket).await;
                let reply = handler(&request);

                let mut response = format!(
                    "HTTP/1.1 {} OK\r\nContent-Type: {}\r\nContent-Length: {}\r\n\
                     Connection: close\r\n",
                    reply.status,
                    reply.content_type,
                    reply.body.len()
                );
                for (name, value) in &reply.headers {
                    response.push_str(&format!("{}: {}\r\n", name, value));
                }
                response.push_str("\r\n");
                response.push_str(&reply.body);

                let _ = socket.write_all(response.as_bytes()).await;
                let _ = socket.shutdown().await;
            });
        }
    });

    Url::parse(&format!("http://{}", addr)).unwrap()
}

async fn read_request(socket: &mut TcpStream) -> Request {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(end) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
            break end + 4;
        }
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break buffer.len();
        }
        buffer.extend_from_slice(&chunk[..read]);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < head_end + content_length {
        let read = socket.read(&mut chunk).await.unwrap_or(0);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let mut words = head.split_whitespace();
    let method = words.next().unwrap_or("GET").to_string();
    let path = words.next().unwrap_or("/").to_string();
    let body = String::from_utf8_lossy(&buffer[head_end.min(buffer.len())..]).to_string();
    Request { method, path, body }
}

/// A fetcher that ignores proxy settings from the environment.
pub(crate) fn test_fetcher() -> Fetcher {
    Fetcher::with_client(reqwest::Client::builder().no_proxy().build().unwrap())
}
