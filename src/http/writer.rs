//! Message serialization and the outbound write path.
//!
//! - [`serialize_response`] / [`serialize_request`] turn messages into wire
//!   bytes. Framing headers (`Content-Length`, `Connection`) are always
//!   written by the serializer; copies set by callers are dropped.
//! - [`WriteQueue`] buffers serialized output for one connection and
//!   enforces a ceiling on how much may pile up for a slow peer.
//! - [`ResponseWriter`] is what a request handler receives to answer one
//!   request, now or later.

use bytes::BytesMut;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::oneshot;

use crate::http::headers::Headers;
use crate::http::request::Request;
use crate::http::response::{Response, ResponseBuilder, StatusCode};

const HTTP_VERSION: &str = "HTTP/1.1";

/// Headers owned by the serializer.
const FRAMING_HEADERS: [&str; 3] = ["Content-Length", "Connection", "Transfer-Encoding"];

fn is_framing(field: &str) -> bool {
    FRAMING_HEADERS.iter().any(|f| f.eq_ignore_ascii_case(field))
}

pub(crate) fn write_header(buf: &mut Vec<u8>, field: &str, value: &str) {
    buf.extend_from_slice(field.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

/// Serializes a response.
///
/// `head` omits the body (the reply to a HEAD request) while still
/// advertising its length. `keep_alive` selects the `Connection` header.
pub fn serialize_response(resp: &Response, head: bool, keep_alive: bool) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.reason()
    );
    buf.extend_from_slice(status_line.as_bytes());

    for h in resp.headers.iter().filter(|h| !is_framing(&h.field)) {
        write_header(&mut buf, &h.field, &h.value);
    }

    let bodyless = resp.status.is_bodyless();

    if !bodyless {
        write_header(&mut buf, "Content-Length", &resp.body.len().to_string());
    }

    write_header(
        &mut buf,
        "Connection",
        if keep_alive { "keep-alive" } else { "close" },
    );

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    if !head && !bodyless {
        buf.extend_from_slice(&resp.body);
    }

    buf
}

/// Serializes a request exactly as given, adding `Content-Length` when the
/// request has a body and no framing header of its own.
pub fn serialize_request(req: &Request) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + req.body.len());

    let path = if req.path.is_empty() { "/" } else { &req.path };
    buf.extend_from_slice(format!("{} {} {}\r\n", req.method, path, req.version).as_bytes());

    for h in &req.headers {
        write_header(&mut buf, &h.field, &h.value);
    }

    let framed = req.headers.contains("Content-Length") || req.headers.contains("Transfer-Encoding");
    if !req.body.is_empty() && !framed {
        write_header(&mut buf, "Content-Length", &req.body.len().to_string());
    }

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(&req.body);
    buf
}

/// Raised when a peer lets more output pile up than the ceiling allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("unsent output reached {limit} bytes")]
pub struct WriteOverflow {
    pub limit: usize,
}

/// Outbound bytes for one connection, bounded by a ceiling.
///
/// The ceiling applies to the backlog, not to any single message: a reply of
/// any size is admitted while the bytes still unsent stay below the limit.
#[derive(Debug)]
pub struct WriteQueue {
    buffer: BytesMut,
    limit: usize,
}

impl WriteQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            limit,
        }
    }

    /// Queues `bytes`, refusing once the unsent backlog has reached the
    /// ceiling.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), WriteOverflow> {
        if self.buffer.len() >= self.limit {
            return Err(WriteOverflow { limit: self.limit });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Performs one write, dropping whatever the stream accepted.
    pub async fn write_to<W>(&mut self, stream: &mut W) -> std::io::Result<usize>
    where
        W: AsyncWrite + Unpin,
    {
        let n = stream.write_buf(&mut self.buffer).await?;

        if n == 0 && !self.buffer.is_empty() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::WriteZero,
                "connection closed while writing",
            ));
        }

        Ok(n)
    }

    /// Writes everything queued and flushes the stream.
    pub async fn flush_to<W>(&mut self, stream: &mut W) -> std::io::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while !self.buffer.is_empty() {
            self.write_to(stream).await?;
        }
        stream.flush().await
    }
}

/// Answers one request.
///
/// Every send method consumes the writer, so a request is answered at most
/// once. A writer dropped without sending makes the connection answer
/// `500 Internal Server Error` and close. The writer may be moved into a
/// task and used after the handler returned; replies still go out in the
/// order the requests arrived.
#[derive(Debug)]
pub struct ResponseWriter {
    headers: Headers,
    reply: oneshot::Sender<Response>,
}

impl ResponseWriter {
    /// Creates a writer and the receiving end its reply is delivered to.
    pub fn channel() -> (Self, oneshot::Receiver<Response>) {
        let (reply, rx) = oneshot::channel();
        let writer = Self {
            headers: Headers::new(),
            reply,
        };
        (writer, rx)
    }

    /// Adds a header to the eventual response.
    pub fn set_header(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.headers.set(field, value);
    }

    /// Headers set so far.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Sends `body` with the given status. An empty `content_type` omits the
    /// `Content-Type` header.
    pub fn send(mut self, status: StatusCode, content_type: &str, body: impl Into<Vec<u8>>) {
        if !content_type.is_empty() {
            self.headers.set("Content-Type", content_type);
        }
        let headers = std::mem::take(&mut self.headers);
        let response = ResponseBuilder::new(status)
            .headers(headers)
            .body(body)
            .build();
        self.send_response(response);
    }

    /// Sends a plain-text body naming the status, e.g. `404 Not Found`.
    pub fn send_error(self, status: StatusCode) {
        self.send(status, "text/plain", format!("{}\n", status));
    }

    /// Sends `401 Unauthorized` with a Basic challenge for `realm`.
    pub fn unauthorized(mut self, realm: &str) {
        self.set_header("WWW-Authenticate", format!("Basic realm=\"{}\"", realm));
        self.send_error(StatusCode::UNAUTHORIZED);
    }

    /// Sends a fully built response. Headers set on the writer come first.
    pub fn send_response(self, mut response: Response) {
        if !self.headers.is_empty() {
            let mut headers = self.headers;
            for h in &response.headers {
                headers.set(h.field.clone(), h.value.clone());
            }
            response.headers = headers;
        }

        if self.reply.send(response).is_err() {
            tracing::trace!("connection closed before the reply was sent");
        }
    }
}
