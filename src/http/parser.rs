//! Incremental HTTP/1.x message parser.
//!
//! A [`Parser`] is fed socket reads of any size and boundary. It keeps its
//! position between calls, so a chunk may end mid-method, mid-header or
//! mid-body, and the next call picks up exactly there. Each completed
//! message is handed back together with the number of bytes it consumed, so
//! pipelined messages in a single read are returned one after another.
//!
//! ```text
//!   StartLine ──▶ HeaderLine ──┬──────────────────────────────▶ Complete
//!                   ▲   │      ├─▶ Length ─────────────────────▶ Complete
//!                   └───┘      ├─▶ ChunkSize ─▶ ChunkData ─▶ ChunkDataEnd
//!                              │      ▲                            │
//!                              │      └────────────────────────────┘
//!                              │   (size 0) ─▶ Trailer ────────▶ Complete
//!                              └─▶ UntilClose ──(finish)───────▶ Complete
//!
//!   any state ──(malformed input)──▶ Error (terminal)
//! ```
//!
//! On completion the parser resets itself for the next message on the same
//! connection, reusing its line buffer.
//!
//! Header values must be UTF-8. Anything else (e.g. Latin-1 obs-text) is
//! rejected as [`ParseError::InvalidHeader`] rather than rewritten.

use serde::{Deserialize, Serialize};

use crate::http::buffer::{Buffer, BufferError};
use crate::http::headers::Headers;
use crate::http::request::{Method, Request, Version, wants_keep_alive};
use crate::http::response::{Response, StatusCode};

/// Reasons a message was rejected. Every variant is terminal for the parser.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("malformed request line")]
    InvalidRequestLine,
    #[error("malformed status line")]
    InvalidStatusLine,
    #[error("unrecognized method")]
    InvalidMethod,
    #[error("invalid status code")]
    InvalidStatus,
    #[error("unsupported protocol version")]
    InvalidVersion,
    #[error("malformed header line")]
    InvalidHeader,
    #[error("folded header lines are not supported")]
    FoldedHeader,
    #[error("line longer than {limit} bytes")]
    LineTooLong { limit: usize },
    #[error("more than {limit} headers")]
    TooManyHeaders { limit: usize },
    #[error("invalid content-length")]
    InvalidContentLength,
    #[error("unsupported transfer-encoding")]
    UnsupportedTransferEncoding,
    #[error("invalid chunk size")]
    InvalidChunkSize,
    #[error("chunk data not followed by CRLF")]
    InvalidChunkTerminator,
    #[error("body larger than {limit} bytes")]
    BodyTooLarge { limit: usize },
    #[error("connection closed mid-message")]
    Truncated,
    #[error("out of memory")]
    OutOfMemory,
}

/// Size ceilings applied while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Limits {
    /// Longest start line, header line or chunk-size line, without CRLF.
    pub max_line: usize,
    /// Most header (and trailer) fields per message.
    pub max_headers: usize,
    /// Largest decoded body.
    pub max_body: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line: 8 * 1024,
            max_headers: 100,
            max_body: 16 * 1024 * 1024,
        }
    }
}

/// Which kind of message the parser expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Parse requests (server side).
    Request,
    /// Parse responses (client side).
    Response,
}

/// A complete message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Request(Request),
    Response(Response),
}

impl Message {
    pub fn into_request(self) -> Option<Request> {
        match self {
            Message::Request(req) => Some(req),
            Message::Response(_) => None,
        }
    }

    pub fn into_response(self) -> Option<Response> {
        match self {
            Message::Response(res) => Some(res),
            Message::Request(_) => None,
        }
    }
}

/// A complete message plus whether its connection may be reused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parsed {
    pub message: Message,
    pub keep_alive: bool,
}

/// Outcome of one [`Parser::advance`] call.
#[derive(Debug)]
pub enum Status {
    /// A message finished after `consumed` bytes of the input.
    Complete { parsed: Parsed, consumed: usize },
    /// All input was consumed and the message is still in progress.
    Partial,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    StartLine,
    HeaderLine,
    Length { remaining: usize },
    ChunkSize,
    ChunkData { remaining: usize },
    ChunkDataEnd,
    Trailer,
    UntilClose,
    Error(ParseError),
}

#[derive(Debug)]
enum Start {
    Request { method: Method, path: String },
    Response { status: StatusCode, reason: String },
}

#[derive(Debug, Default)]
struct Head {
    start: Option<Start>,
    version: Version,
    headers: Headers,
}

/// Incremental parser for one connection.
#[derive(Debug)]
pub struct Parser {
    role: Role,
    limits: Limits,
    state: State,
    line: Buffer,
    body: Buffer,
    head: Head,
    head_response: bool,
}

impl Parser {
    pub fn new(role: Role, limits: Limits) -> Self {
        Self {
            role,
            limits,
            state: State::StartLine,
            // One extra byte for the CR of a maximal line.
            line: Buffer::with_limit(limits.max_line.saturating_add(1)),
            body: Buffer::with_limit(limits.max_body),
            head: Head::default(),
            head_response: false,
        }
    }

    /// Tells a response parser that the next response answers a HEAD
    /// request and therefore carries no body whatever its headers say.
    pub fn expect_head_response(&mut self) {
        self.head_response = true;
    }

    /// True between messages, before any byte of the next one arrived.
    pub fn is_idle(&self) -> bool {
        self.state == State::StartLine && self.line.is_empty() && self.head.start.is_none()
    }

    /// The error the parser stopped on, if any.
    pub fn error(&self) -> Option<&ParseError> {
        match &self.state {
            State::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Consumes input until one message completes or the input runs out.
    ///
    /// After `Complete { consumed, .. }` the caller should call `advance`
    /// again with `&data[consumed..]` if anything is left.
    pub fn advance(&mut self, data: &[u8]) -> Result<Status, ParseError> {
        if let State::Error(e) = &self.state {
            return Err(e.clone());
        }

        let mut pos = 0;

        loop {
            match self.step(data, &mut pos) {
                Ok(Some(parsed)) => {
                    return Ok(Status::Complete {
                        parsed,
                        consumed: pos,
                    });
                }
                Ok(None) if pos >= data.len() => return Ok(Status::Partial),
                Ok(None) => {}
                Err(e) => {
                    self.state = State::Error(e.clone());
                    return Err(e);
                }
            }
        }
    }

    /// Feeds a whole chunk and returns every message it completed, in order.
    pub fn feed(&mut self, mut data: &[u8]) -> Result<Vec<Parsed>, ParseError> {
        let mut done = Vec::new();

        loop {
            match self.advance(data)? {
                Status::Complete { parsed, consumed } => {
                    done.push(parsed);
                    data = &data[consumed..];
                    if data.is_empty() {
                        return Ok(done);
                    }
                }
                Status::Partial => return Ok(done),
            }
        }
    }

    /// Signals end of input.
    ///
    /// Completes a response delimited by connection close. Returns `None`
    /// when no message was in progress, and `Truncated` when one was cut off.
    pub fn finish(&mut self) -> Result<Option<Parsed>, ParseError> {
        if let State::Error(e) = &self.state {
            return Err(e.clone());
        }
        if self.state == State::UntilClose {
            return self.complete(false).map(Some);
        }
        if self.is_idle() {
            return Ok(None);
        }

        self.state = State::Error(ParseError::Truncated);
        Err(ParseError::Truncated)
    }

    fn step(&mut self, data: &[u8], pos: &mut usize) -> Result<Option<Parsed>, ParseError> {
        match self.state {
            State::StartLine => {
                if !self.read_line(data, pos)? {
                    return Ok(None);
                }
                // Stray CRLFs between messages are allowed.
                if self.line.is_empty() {
                    return Ok(None);
                }
                self.parse_start_line()?;
                self.line.reset();
                self.state = State::HeaderLine;
                Ok(None)
            }
            State::HeaderLine => {
                if !self.read_line(data, pos)? {
                    return Ok(None);
                }
                if self.line.is_empty() {
                    return self.headers_done();
                }
                self.parse_header_line()?;
                self.line.reset();
                Ok(None)
            }
            State::Length { remaining } => {
                let left = self.read_body(data, pos, remaining)?;
                if left == 0 {
                    return self.complete(true).map(Some);
                }
                self.state = State::Length { remaining: left };
                Ok(None)
            }
            State::ChunkSize => {
                if !self.read_line(data, pos)? {
                    return Ok(None);
                }
                let size = self.parse_chunk_size()?;
                self.line.reset();
                self.state = if size == 0 {
                    State::Trailer
                } else {
                    State::ChunkData { remaining: size }
                };
                Ok(None)
            }
            State::ChunkData { remaining } => {
                let left = self.read_body(data, pos, remaining)?;
                self.state = if left == 0 {
                    State::ChunkDataEnd
                } else {
                    State::ChunkData { remaining: left }
                };
                Ok(None)
            }
            State::ChunkDataEnd => {
                if !self.read_line(data, pos)? {
                    return Ok(None);
                }
                if !self.line.is_empty() {
                    return Err(ParseError::InvalidChunkTerminator);
                }
                self.state = State::ChunkSize;
                Ok(None)
            }
            State::Trailer => {
                if !self.read_line(data, pos)? {
                    return Ok(None);
                }
                if self.line.is_empty() {
                    return self.complete(true).map(Some);
                }
                self.parse_header_line()?;
                self.line.reset();
                Ok(None)
            }
            State::UntilClose => {
                let rest = &data[*pos..];
                self.body.append(rest).map_err(body_error)?;
                *pos = data.len();
                Ok(None)
            }
            State::Error(ref e) => Err(e.clone()),
        }
    }

    /// Accumulates bytes up to and including the next LF.
    ///
    /// Returns true once a full line sits in `self.line`, with the line
    /// terminator (CRLF or bare LF) stripped.
    fn read_line(&mut self, data: &[u8], pos: &mut usize) -> Result<bool, ParseError> {
        let rest = &data[*pos..];

        match rest.iter().position(|&b| b == b'\n') {
            Some(nl) => {
                self.append_line(&rest[..nl])?;
                *pos += nl + 1;

                if self.line.as_slice().last() == Some(&b'\r') {
                    self.line.pop();
                }
                if self.line.len() > self.limits.max_line {
                    return Err(ParseError::LineTooLong {
                        limit: self.limits.max_line,
                    });
                }
                Ok(true)
            }
            None => {
                self.append_line(rest)?;
                *pos = data.len();
                Ok(false)
            }
        }
    }

    fn append_line(&mut self, bytes: &[u8]) -> Result<(), ParseError> {
        let max_line = self.limits.max_line;
        self.line.append(bytes).map_err(|e| match e {
            BufferError::LimitExceeded { .. } => ParseError::LineTooLong { limit: max_line },
            BufferError::OutOfMemory => ParseError::OutOfMemory,
        })
    }

    /// Moves up to `remaining` body bytes into the body buffer.
    fn read_body(&mut self, data: &[u8], pos: &mut usize, remaining: usize) -> Result<usize, ParseError> {
        let take = remaining.min(data.len() - *pos);
        self.body
            .append(&data[*pos..*pos + take])
            .map_err(body_error)?;
        *pos += take;
        Ok(remaining - take)
    }

    fn parse_start_line(&mut self) -> Result<(), ParseError> {
        match self.role {
            Role::Request => self.parse_request_line(),
            Role::Response => self.parse_status_line(),
        }
    }

    fn parse_request_line(&mut self) -> Result<(), ParseError> {
        let line = self.line.as_str().ok_or(ParseError::InvalidRequestLine)?;
        let mut parts = line.split(' ');

        let method = parts.next().unwrap_or_default();
        let path = parts.next().unwrap_or_default();
        let version = parts.next().ok_or(ParseError::InvalidRequestLine)?;

        if method.is_empty() || parts.next().is_some() {
            return Err(ParseError::InvalidRequestLine);
        }

        let method = Method::from_str(method).ok_or(ParseError::InvalidMethod)?;

        if path.is_empty() {
            return Err(ParseError::InvalidRequestLine);
        }

        let version = Version::from_str(version).ok_or(ParseError::InvalidVersion)?;

        self.head.version = version;
        self.head.start = Some(Start::Request {
            method,
            path: path.to_string(),
        });
        Ok(())
    }

    fn parse_status_line(&mut self) -> Result<(), ParseError> {
        let line = self.line.as_str().ok_or(ParseError::InvalidStatusLine)?;
        let (version, rest) = line.split_once(' ').ok_or(ParseError::InvalidStatusLine)?;
        let version = Version::from_str(version).ok_or(ParseError::InvalidVersion)?;

        let (code, reason) = match rest.split_once(' ') {
            Some((code, reason)) => (code, reason),
            None => (rest, ""),
        };

        if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::InvalidStatus);
        }

        let status = code
            .parse::<u16>()
            .ok()
            .and_then(StatusCode::from_u16)
            .ok_or(ParseError::InvalidStatus)?;

        self.head.version = version;
        self.head.start = Some(Start::Response {
            status,
            reason: reason.trim().to_string(),
        });
        Ok(())
    }

    fn parse_header_line(&mut self) -> Result<(), ParseError> {
        let line = self.line.as_slice();

        if matches!(line.first(), Some(b' ' | b'\t')) {
            return Err(ParseError::FoldedHeader);
        }

        let colon = line
            .iter()
            .position(|&b| b == b':')
            .ok_or(ParseError::InvalidHeader)?;
        let (field, value) = (&line[..colon], &line[colon + 1..]);

        if field.is_empty() || !field.iter().all(|&b| is_token(b)) {
            return Err(ParseError::InvalidHeader);
        }

        if self.head.headers.len() >= self.limits.max_headers {
            return Err(ParseError::TooManyHeaders {
                limit: self.limits.max_headers,
            });
        }

        // Field bytes are all token characters, hence ASCII.
        let field = String::from_utf8_lossy(field).into_owned();
        let value = std::str::from_utf8(trim_ows(value)).map_err(|_| ParseError::InvalidHeader)?;

        self.head.headers.set(field, value);
        Ok(())
    }

    fn parse_chunk_size(&self) -> Result<usize, ParseError> {
        let line = self.line.as_slice();
        let size = match line.iter().position(|&b| b == b';') {
            Some(ext) => &line[..ext],
            None => line,
        };
        let size = trim_ows(size);

        if size.is_empty() || size.len() > 16 || !size.iter().all(|b| b.is_ascii_hexdigit()) {
            return Err(ParseError::InvalidChunkSize);
        }

        let size = std::str::from_utf8(size).map_err(|_| ParseError::InvalidChunkSize)?;
        let size = usize::from_str_radix(size, 16).map_err(|_| ParseError::InvalidChunkSize)?;

        if self.body.len().saturating_add(size) > self.limits.max_body {
            return Err(ParseError::BodyTooLarge {
                limit: self.limits.max_body,
            });
        }

        Ok(size)
    }

    /// Picks the body framing once the blank line after the headers is seen.
    fn headers_done(&mut self) -> Result<Option<Parsed>, ParseError> {
        self.line.reset();

        if let Some(Start::Response { status, .. }) = &self.head.start {
            if status.is_bodyless() || self.head_response {
                return self.complete(true).map(Some);
            }
        }

        if self.head.headers.contains("Transfer-Encoding") {
            let last = self
                .head
                .headers
                .get_all("Transfer-Encoding")
                .flat_map(|v| v.split(','))
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .last()
                .unwrap_or_default();

            if last.eq_ignore_ascii_case("chunked") {
                self.state = State::ChunkSize;
                return Ok(None);
            }

            return match self.role {
                Role::Request => Err(ParseError::UnsupportedTransferEncoding),
                Role::Response => {
                    self.state = State::UntilClose;
                    Ok(None)
                }
            };
        }

        if let Some(length) = self.content_length()? {
            if length > self.limits.max_body {
                return Err(ParseError::BodyTooLarge {
                    limit: self.limits.max_body,
                });
            }
            if length == 0 {
                return self.complete(true).map(Some);
            }
            self.state = State::Length { remaining: length };
            return Ok(None);
        }

        match self.role {
            Role::Request => self.complete(true).map(Some),
            Role::Response => {
                self.state = State::UntilClose;
                Ok(None)
            }
        }
    }

    /// The declared Content-Length. Repeated identical values are accepted,
    /// differing ones are not.
    fn content_length(&self) -> Result<Option<usize>, ParseError> {
        let mut length = None;

        for value in self.head.headers.get_all("Content-Length") {
            for item in value.split(',').map(str::trim) {
                if item.is_empty() || !item.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(ParseError::InvalidContentLength);
                }
                let n: usize = item.parse().map_err(|_| ParseError::InvalidContentLength)?;
                match length {
                    Some(prev) if prev != n => return Err(ParseError::InvalidContentLength),
                    _ => length = Some(n),
                }
            }
        }

        Ok(length)
    }

    /// Builds the finished message and rewinds for the next one.
    fn complete(&mut self, framed: bool) -> Result<Parsed, ParseError> {
        let head = std::mem::take(&mut self.head);
        let body = self.body.take();

        self.state = State::StartLine;
        self.line.reset();
        self.head_response = false;

        let keep_alive = framed && wants_keep_alive(head.version, &head.headers);

        let message = match head.start {
            Some(Start::Request { method, path }) => Message::Request(Request {
                method,
                path,
                version: head.version,
                headers: head.headers,
                body,
            }),
            Some(Start::Response { status, reason }) => Message::Response(Response {
                status,
                reason,
                version: head.version,
                headers: head.headers,
                body,
            }),
            None => return Err(ParseError::Truncated),
        };

        Ok(Parsed {
            message,
            keep_alive,
        })
    }
}

fn body_error(e: BufferError) -> ParseError {
    match e {
        BufferError::LimitExceeded { limit } => ParseError::BodyTooLarge { limit },
        BufferError::OutOfMemory => ParseError::OutOfMemory,
    }
}

/// RFC 7230 `tchar`.
fn is_token(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b"!#$%&'*+-.^_`|~".contains(&b)
}

fn trim_ows(mut bytes: &[u8]) -> &[u8] {
    while let [b' ' | b'\t', rest @ ..] = bytes {
        bytes = rest;
    }
    while let [rest @ .., b' ' | b'\t'] = bytes {
        bytes = rest;
    }
    bytes
}
