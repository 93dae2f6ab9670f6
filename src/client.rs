//! Outbound HTTP requests.
//!
//! Every call opens its own connection, writes one request, parses one
//! response and closes the connection again. There is no pooling, so a
//! response always belongs to the request written on the same socket.

use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::config::ClientConfig;
use crate::http::headers::Headers;
use crate::http::parser::{Limits, ParseError, Parser, Role, Status};
use crate::http::request::Method;
use crate::http::response::Response;
use crate::http::writer::write_header;

/// Default buffer size for reading responses
const BUFFER_SIZE: usize = 8192;

pub const DEFAULT_USER_AGENT: &str = concat!("peerhttp/", env!("CARGO_PKG_VERSION"));

/// Why a request produced no response.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("malformed response: {0}")]
    Parse(#[from] ParseError),
    #[error("connection closed before a response arrived")]
    ConnectionClosed,
    #[error("request cancelled")]
    Cancelled,
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// What to send and where.
#[derive(Debug, Clone)]
pub struct RequestOptions {
    pub method: Method,
    pub host: String,
    pub port: u16,
    pub path: String,
    /// Extra headers, written after the generated ones.
    pub headers: Headers,
    pub agent: Option<String>,
    pub accept: Option<String>,
    pub content_type: Option<String>,
    pub body: Option<Vec<u8>>,
    /// Deadline for connect, send and receive together.
    pub timeout: Option<Duration>,
    pub limits: Limits,
}

impl Default for RequestOptions {
    fn default() -> Self {
        let cfg = ClientConfig::default();

        Self {
            method: Method::GET,
            host: "localhost".to_string(),
            port: 80,
            path: "/".to_string(),
            headers: Headers::new(),
            agent: Some(cfg.user_agent.clone()),
            accept: None,
            content_type: None,
            body: None,
            timeout: cfg.timeout(),
            limits: cfg.limits,
        }
    }
}

impl RequestOptions {
    /// Options for a GET of an `http://` URL.
    pub fn from_url(input: &str) -> Result<Self, ClientError> {
        let url = url::Url::parse(input).map_err(|e| ClientError::InvalidUrl(e.to_string()))?;

        if url.scheme() != "http" {
            return Err(ClientError::InvalidUrl(format!(
                "unsupported scheme {}",
                url.scheme()
            )));
        }

        let host = url
            .host_str()
            .ok_or_else(|| ClientError::InvalidUrl("missing host".to_string()))?
            .trim_start_matches('[')
            .trim_end_matches(']')
            .to_string();

        let mut path = url.path().to_string();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        Ok(Self {
            host,
            port: url.port_or_known_default().unwrap_or(80),
            path,
            ..Self::default()
        })
    }

    /// Applies user agent, timeout and limits from `cfg`.
    pub fn with_config(mut self, cfg: &ClientConfig) -> Self {
        self.agent = Some(cfg.user_agent.clone());
        self.timeout = cfg.timeout();
        self.limits = cfg.limits;
        self
    }

    fn authority(&self) -> String {
        let host = if self.host.contains(':') {
            format!("[{}]", self.host)
        } else {
            self.host.clone()
        };

        if self.port == 80 {
            host
        } else {
            format!("{}:{}", host, self.port)
        }
    }
}

/// Serializes the request described by `options`.
///
/// Generated headers come first (`Host`, `User-Agent`, `Accept`,
/// `Content-Type`, `Content-Length`, `Connection: close`), then the extra
/// headers, minus any that would conflict with the framing.
pub fn build_request(options: &RequestOptions) -> Vec<u8> {
    let body = options.body.as_deref().unwrap_or_default();
    let mut buf = Vec::with_capacity(256 + body.len());

    let path = if options.path.is_empty() {
        "/"
    } else {
        &options.path
    };
    buf.extend_from_slice(format!("{} {} HTTP/1.1\r\n", options.method, path).as_bytes());

    write_header(&mut buf, "Host", &options.authority());

    if let Some(agent) = &options.agent {
        write_header(&mut buf, "User-Agent", agent);
    }
    if let Some(accept) = &options.accept {
        write_header(&mut buf, "Accept", accept);
    }
    if let Some(content_type) = &options.content_type {
        write_header(&mut buf, "Content-Type", content_type);
    }

    let sends_length =
        options.body.is_some() || matches!(options.method, Method::POST | Method::PUT | Method::PATCH);
    if sends_length {
        write_header(&mut buf, "Content-Length", &body.len().to_string());
    }

    write_header(&mut buf, "Connection", "close");

    for h in &options.headers {
        let owned = ["Host", "Content-Length", "Connection", "Transfer-Encoding"]
            .iter()
            .any(|f| h.is(f));
        if !owned {
            write_header(&mut buf, &h.field, &h.value);
        }
    }

    buf.extend_from_slice(b"\r\n");
    buf.extend_from_slice(body);
    buf
}

/// Sends one request and returns its response.
pub async fn fetch(options: RequestOptions) -> Result<Response, ClientError> {
    match options.timeout {
        Some(limit) => timeout(limit, exchange(&options))
            .await
            .map_err(|_| ClientError::Timeout)?,
        None => exchange(&options).await,
    }
}

async fn exchange(options: &RequestOptions) -> Result<Response, ClientError> {
    let mut stream = TcpStream::connect((options.host.as_str(), options.port))
        .await
        .map_err(|source| ClientError::Connect {
            addr: options.authority(),
            source,
        })?;
    stream.set_nodelay(true)?;

    tracing::trace!(host = %options.host, port = options.port, "Connected");

    let response = send_request(&mut stream, options).await;

    // One request per connection, whatever the server offered.
    stream.shutdown().await.ok();
    response
}

/// Writes the request to an open stream and reads the response.
pub async fn send_request<S>(stream: &mut S, options: &RequestOptions) -> Result<Response, ClientError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let request_bytes = build_request(options);
    stream.write_all(&request_bytes).await?;
    stream.flush().await?;

    tracing::debug!(
        method = %options.method,
        host = %options.host,
        path = %options.path,
        "Request sent"
    );

    let response = read_response(stream, options).await?;

    tracing::debug!(
        status = response.status.as_u16(),
        bytes = response.body.len(),
        "Response received"
    );

    Ok(response)
}

async fn read_response<S>(stream: &mut S, options: &RequestOptions) -> Result<Response, ClientError>
where
    S: AsyncRead + Unpin,
{
    let head = options.method == Method::HEAD;
    let mut parser = Parser::new(Role::Response, options.limits);
    if head {
        parser.expect_head_response();
    }

    let mut buffer = BytesMut::with_capacity(BUFFER_SIZE);

    loop {
        let n = stream.read_buf(&mut buffer).await?;

        if n == 0 {
            return match parser.finish()? {
                Some(parsed) => parsed.message.into_response().ok_or(ClientError::ConnectionClosed),
                None => Err(ClientError::ConnectionClosed),
            };
        }

        let mut data = &buffer[..];

        while !data.is_empty() {
            match parser.advance(data)? {
                Status::Complete { parsed, consumed } => {
                    data = &data[consumed..];

                    let Some(response) = parsed.message.into_response() else {
                        continue;
                    };

                    let code = response.status.as_u16();
                    if (100..200).contains(&code) && code != 101 {
                        tracing::trace!(status = code, "Skipping interim response");
                        if head {
                            parser.expect_head_response();
                        }
                        continue;
                    }

                    return Ok(response);
                }
                Status::Partial => break,
            }
        }

        buffer.clear();
    }
}

/// Runs the completion callback exactly once: with the result, or with
/// `Cancelled` if the request task is dropped first.
struct Completion<F>
where
    F: FnOnce(Result<Response, ClientError>),
{
    callback: Option<F>,
}

impl<F> Completion<F>
where
    F: FnOnce(Result<Response, ClientError>),
{
    fn fire(&mut self, result: Result<Response, ClientError>) {
        if let Some(callback) = self.callback.take() {
            callback(result);
        }
    }
}

impl<F> Drop for Completion<F>
where
    F: FnOnce(Result<Response, ClientError>),
{
    fn drop(&mut self) {
        self.fire(Err(ClientError::Cancelled));
    }
}

/// Handle to a request started with [`request`].
#[derive(Debug)]
pub struct RequestHandle {
    task: JoinHandle<()>,
}

impl RequestHandle {
    /// Closes the request's connection. The callback fires with
    /// `Cancelled` unless it already fired.
    pub fn cancel(&self) {
        self.task.abort();
    }

    /// Whether the callback has run.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Starts a request on the current `LocalSet`.
///
/// `callback` fires exactly once with the response or the error, after which
/// the connection is closed.
pub fn request<F>(options: RequestOptions, callback: F) -> RequestHandle
where
    F: FnOnce(Result<Response, ClientError>) + 'static,
{
    let mut completion = Completion {
        callback: Some(callback),
    };

    let task = tokio::task::spawn_local(async move {
        let result = fetch(options).await;

        if let Err(e) = &result {
            tracing::warn!(error = %e, "Request failed");
        }

        completion.fire(result);
    });

    RequestHandle { task }
}
