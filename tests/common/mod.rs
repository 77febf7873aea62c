//! Loopback fake backend: accepts one connection, captures the request and
//! writes a scripted response in separate writes.

#![allow(dead_code)]

use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

impl CapturedRequest {
    pub fn json(&self) -> serde_json::Value {
        serde_json::from_str(&self.body).expect("request body is JSON")
    }
}

/// Serve one request with `status` (e.g. `"200 OK"`) and a close-delimited
/// body written as `parts`, pausing between writes so the client sees
/// separate reads.
pub async fn spawn_backend(
    status: &'static str,
    parts: Vec<Vec<u8>>,
) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let captured = read_request(&mut socket).await;
        let head = format!(
            "HTTP/1.1 {status}\r\ncontent-type: text/event-stream\r\nconnection: close\r\n\r\n"
        );
        // The client may hang up early (error statuses, health checks).
        if socket.write_all(head.as_bytes()).await.is_ok() {
            for part in parts {
                tokio::time::sleep(Duration::from_millis(10)).await;
                if socket.write_all(&part).await.is_err() || socket.flush().await.is_err() {
                    break;
                }
            }
        }
        let _ = socket.shutdown().await;
        captured
    });
    (format!("http://{addr}"), handle)
}

pub fn parts(chunks: &[&str]) -> Vec<Vec<u8>> {
    chunks.iter().map(|c| c.as_bytes().to_vec()).collect()
}

async fn read_request(socket: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];
    loop {
        let n = socket.read(&mut tmp).await.expect("read request");
        assert!(n > 0, "client closed before sending a full request");
        buf.extend_from_slice(&tmp[..n]);

        let mut headers = [httparse::EMPTY_HEADER; 32];
        let mut req = httparse::Request::new(&mut headers);
        if let httparse::Status::Complete(head_len) = req.parse(&buf).expect("parse request") {
            let content_length = req
                .headers
                .iter()
                .find(|h| h.name.eq_ignore_ascii_case("content-length"))
                .and_then(|h| std::str::from_utf8(h.value).ok())
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= head_len + content_length {
                return CapturedRequest {
                    method: req.method.unwrap_or_default().to_string(),
                    path: req.path.unwrap_or_default().to_string(),
                    body: String::from_utf8_lossy(&buf[head_len..head_len + content_length])
                        .into_owned(),
                };
            }
        }
    }
}
