// SPDX-License-Identifier: MIT

//! A minimal GET-only HTTP/1.1 parser and response writer, used only by
//! the server-family resources. No general-purpose HTTP server crate is
//! pulled in here: the listener lifecycle belongs to the resource, not
//! to an app framework, and the wire surface is deliberately tiny.

use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;

#[derive(Debug, Error)]
pub enum HttpProtoError {
    #[error("connection closed before a complete request line was read")]
    ConnectionClosed,
    #[error("malformed request line: {0}")]
    MalformedRequestLine(String),
    #[error("malformed header line: {0}")]
    MalformedHeader(String),
    #[error("request line too long")]
    RequestLineTooLong,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
}

const MAX_LINE_LEN: usize = 8 * 1024;

/// Reads a request line plus headers, up to the blank line. Any body is
/// ignored: every resource this parser serves is a GET.
pub async fn read_request(reader: &mut BufReader<OwnedReadHalf>) -> Result<HttpRequest, HttpProtoError> {
    let mut line = String::new();
    let n = reader.read_line(&mut line).await?;
    if n == 0 {
        return Err(HttpProtoError::ConnectionClosed);
    }
    if line.len() > MAX_LINE_LEN {
        return Err(HttpProtoError::RequestLineTooLong);
    }
    let line = line.trim_end_matches(['\r', '\n']);
    let mut parts = line.split_whitespace();
    let method = parts.next().ok_or_else(|| HttpProtoError::MalformedRequestLine(line.to_string()))?;
    let path = parts.next().ok_or_else(|| HttpProtoError::MalformedRequestLine(line.to_string()))?;
    // HTTP-version token, if present, is accepted but not otherwise checked.

    let mut headers = HashMap::new();
    loop {
        let mut header_line = String::new();
        let n = reader.read_line(&mut header_line).await?;
        if n == 0 {
            return Err(HttpProtoError::ConnectionClosed);
        }
        let header_line = header_line.trim_end_matches(['\r', '\n']);
        if header_line.is_empty() {
            break;
        }
        let (name, value) = header_line
            .split_once(':')
            .ok_or_else(|| HttpProtoError::MalformedHeader(header_line.to_string()))?;
        headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
    }

    Ok(HttpRequest { method: method.to_string(), path: path.to_string(), headers })
}

pub struct HttpResponse {
    pub status: u16,
    pub reason: &'static str,
    pub content_type: &'static str,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn ok(content_type: &'static str, body: Vec<u8>) -> Self {
        Self { status: 200, reason: "OK", content_type, body }
    }

    pub fn not_found() -> Self {
        Self { status: 404, reason: "Not Found", content_type: "text/plain", body: b"not found".to_vec() }
    }

    pub fn forbidden() -> Self {
        Self { status: 403, reason: "Forbidden", content_type: "text/plain", body: b"forbidden".to_vec() }
    }

    pub fn method_not_allowed() -> Self {
        Self {
            status: 405,
            reason: "Method Not Allowed",
            content_type: "text/plain",
            body: b"only GET is supported".to_vec(),
        }
    }
}

pub async fn write_response<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    resp: &HttpResponse,
) -> Result<(), HttpProtoError> {
    let header = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        resp.status,
        resp.reason,
        resp.content_type,
        resp.body.len()
    );
    writer.write_all(header.as_bytes()).await?;
    writer.write_all(&resp.body).await?;
    writer.flush().await?;
    Ok(())
}

/// Guess a `Content-Type` from a path's extension. Falls back to a
/// generic binary type for anything unrecognized, never the original
/// I/O error — `serve` callers must not leak filesystem detail.
pub fn content_type_for(path: &std::path::Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt as _;
    use tokio::net::{TcpListener, TcpStream};

    async fn roundtrip(raw: &str) -> Result<HttpRequest, HttpProtoError> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(raw.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();
        });
        let (stream, _) = listener.accept().await.unwrap();
        let (read_half, _write_half) = stream.into_split();
        let mut reader = BufReader::new(read_half);
        let result = read_request(&mut reader).await;
        client.await.unwrap();
        result
    }

    #[tokio::test]
    async fn parses_a_simple_get() {
        let req = roundtrip("GET /hello HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
        assert_eq!(req.method, "GET");
        assert_eq!(req.path, "/hello");
        assert_eq!(req.headers.get("host").map(String::as_str), Some("x"));
    }

    #[tokio::test]
    async fn rejects_a_malformed_request_line() {
        let err = roundtrip("garbage\r\n\r\n").await.unwrap_err();
        assert!(matches!(err, HttpProtoError::MalformedRequestLine(_)));
    }

    #[test]
    fn content_type_guesses_by_extension() {
        assert_eq!(content_type_for(std::path::Path::new("a/b.html")), "text/html");
        assert_eq!(content_type_for(std::path::Path::new("a/b.bin")), "application/octet-stream");
    }
}
