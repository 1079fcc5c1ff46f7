//! HTTP/1.1 Codec
//!
//! Just enough HTTP to serve a small JSON API: parse a request head and its
//! query string, skip any body, write a response, close the connection.

use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Maximum size of request line plus headers.
pub const MAX_HEAD_BYTES: usize = 8 * 1024;

/// Maximum number of header lines.
pub const MAX_HEADERS: usize = 64;

/// Maximum request body size. Bodies are read and discarded.
pub const MAX_BODY_BYTES: usize = 64 * 1024;

/// HTTP parsing errors.
#[derive(Debug, Error)]
pub enum HttpError {
    /// Socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Request line or header is malformed.
    #[error("malformed request: {0}")]
    Malformed(&'static str),

    /// Request head exceeds [`MAX_HEAD_BYTES`] or [`MAX_HEADERS`].
    #[error("request head too large")]
    HeadTooLarge,

    /// Body exceeds [`MAX_BODY_BYTES`].
    #[error("request body too large")]
    BodyTooLarge,
}

impl HttpError {
    /// Response to send back, if the connection is still usable.
    pub fn to_response(&self) -> Option<Response> {
        match self {
            HttpError::Io(_) => None,
            HttpError::Malformed(_) => Some(Response::error(400, "Bad Request")),
            HttpError::HeadTooLarge => Some(Response::error(431, "Request Header Fields Too Large")),
            HttpError::BodyTooLarge => Some(Response::error(413, "Payload Too Large")),
        }
    }
}

/// A parsed HTTP request.
#[derive(Debug, Clone, Default)]
pub struct Request {
    method: String,
    path: String,
    query: Vec<(String, String)>,
    /// Names are lowercased.
    headers: Vec<(String, String)>,
}

impl Request {
    /// Build a request directly, mainly for tests and in-process callers.
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.to_ascii_uppercase(),
            path,
            query,
            headers: Vec::new(),
        }
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_ascii_lowercase(), value.to_string()));
        self
    }

    /// Read one request from `reader`.
    ///
    /// Returns `Ok(None)` if the peer closed the connection before sending
    /// anything.
    pub async fn read<R>(reader: &mut R) -> Result<Option<Self>, HttpError>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut head = (&mut *reader).take(MAX_HEAD_BYTES as u64);
        let mut line = String::new();

        if read_head_line(&mut head, &mut line).await? == 0 {
            return Ok(None);
        }
        if !line.ends_with('\n') {
            return Err(HttpError::HeadTooLarge);
        }

        let mut parts = line.split_whitespace();
        let method = parts.next().ok_or(HttpError::Malformed("missing method"))?;
        let target = parts.next().ok_or(HttpError::Malformed("missing target"))?;
        let version = parts.next().ok_or(HttpError::Malformed("missing version"))?;
        if !version.starts_with("HTTP/1.") || parts.next().is_some() {
            return Err(HttpError::Malformed("bad request line"));
        }

        let mut request = Self::new(method, target);

        loop {
            line.clear();
            if read_head_line(&mut head, &mut line).await? == 0 && head.limit() > 0 {
                return Err(HttpError::Malformed("unexpected end of request head"));
            }
            if !line.ends_with('\n') {
                return Err(HttpError::HeadTooLarge);
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            if trimmed.is_empty() {
                break;
            }
            if request.headers.len() >= MAX_HEADERS {
                return Err(HttpError::HeadTooLarge);
            }
            let (name, value) = trimmed
                .split_once(':')
                .ok_or(HttpError::Malformed("header without colon"))?;
            request = request.with_header(name.trim(), value.trim());
        }

        #[cfg(feature = "debug-tracing")]
        tracing::trace!(?request, "parsed request head");

        let body_len = match request.header("content-length") {
            Some(value) => value
                .parse::<usize>()
                .map_err(|_| HttpError::Malformed("bad content-length"))?,
            None => 0,
        };
        if body_len > MAX_BODY_BYTES {
            return Err(HttpError::BodyTooLarge);
        }
        if body_len > 0 {
            let mut body = vec![0u8; body_len];
            reader.read_exact(&mut body).await?;
        }

        Ok(Some(request))
    }

    /// Upper-case method.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Decoded path without query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First value of a query parameter.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether this is a WebSocket upgrade request.
    pub fn is_websocket_upgrade(&self) -> bool {
        let upgrade = self
            .header("upgrade")
            .map(|v| v.eq_ignore_ascii_case("websocket"))
            .unwrap_or(false);
        let connection = self
            .header("connection")
            .map(|v| v.split(',').any(|t| t.trim().eq_ignore_ascii_case("upgrade")))
            .unwrap_or(false);
        upgrade && connection
    }
}

/// Read one line of the request head. Non-UTF-8 input is a malformed request.
async fn read_head_line<R>(reader: &mut R, line: &mut String) -> Result<usize, HttpError>
where
    R: AsyncBufRead + Unpin,
{
    reader.read_line(line).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::InvalidData => HttpError::Malformed("request head is not valid UTF-8"),
        _ => HttpError::Io(e),
    })
}

/// An HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Status code.
    pub status: u16,
    /// Header name/value pairs.
    pub headers: Vec<(String, String)>,
    /// Body bytes.
    pub body: Vec<u8>,
}

impl Response {
    /// Empty response with the given status.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    /// JSON response.
    pub fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self::new(status)
                .with_header("Content-Type", "application/json")
                .with_body(body),
            Err(e) => {
                tracing::error!("Failed to serialize response: {}", e);
                Self::new(500).with_body(b"Internal Server Error".to_vec())
            }
        }
    }

    /// JSON `{"error": message}` response.
    pub fn error(status: u16, message: &str) -> Self {
        Self::json(status, &serde_json::json!({ "error": message }))
    }

    /// Plain text response.
    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status)
            .with_header("Content-Type", "text/plain; charset=utf-8")
            .with_body(body.as_bytes().to_vec())
    }

    /// Add a header.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Replace the body.
    pub fn with_body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// First value of a header (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Body parsed as JSON.
    pub fn json_body(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.body)
    }

    /// Serialize status line, headers and body.
    ///
    /// Final (non-1xx) responses get `Content-Length` and `Connection: close`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = format!("HTTP/1.1 {} {}\r\n", self.status, reason_phrase(self.status));
        for (name, value) in &self.headers {
            out.push_str(&format!("{}: {}\r\n", name, value));
        }
        if self.status >= 200 {
            out.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
            if self.header("connection").is_none() {
                out.push_str("Connection: close\r\n");
            }
        }
        out.push_str("\r\n");

        let mut bytes = out.into_bytes();
        bytes.extend_from_slice(&self.body);
        bytes
    }

    /// Write the response and flush.
    pub async fn write_to<W>(&self, writer: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        writer.write_all(&self.to_bytes()).await?;
        writer.flush().await
    }
}

fn reason_phrase(status: u16) -> &'static str {
    match status {
        101 => "Switching Protocols",
        200 => "OK",
        204 => "No Content",
        400 => "Bad Request",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        431 => "Request Header Fields Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Split a request target into decoded path and query pairs.
fn split_target(target: &str) -> (String, Vec<(String, String)>) {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, query),
        None => (target, ""),
    };
    (percent_decode(path, false), parse_query(query))
}

/// Parse an `application/x-www-form-urlencoded` query string.
pub fn parse_query(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            (percent_decode(name, true), percent_decode(value, true))
        })
        .collect()
}

/// Decode `%XX` escapes, and `+` as space when `plus_as_space` is set.
///
/// Invalid escapes are kept literally; invalid UTF-8 is replaced.
pub fn percent_decode(input: &str, plus_as_space: bool) -> String {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' if i + 2 < bytes.len() => {
                match (hex_value(bytes[i + 1]), hex_value(bytes[i + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i += 3;
                        continue;
                    }
                    _ => out.push(b'%'),
                }
            }
            b'+' if plus_as_space => out.push(b' '),
            b => out.push(b),
        }
        i += 1;
    }

    String::from_utf8_lossy(&out).into_owned()
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
