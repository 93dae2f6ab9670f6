use std::collections::VecDeque;
use std::rc::Rc;

use anyhow::Context;
use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{oneshot, watch};
use tracing::{debug, trace, warn};

use crate::config::ServerConfig;
use crate::http::parser::{ParseError, Parsed, Parser, Role, Status};
use crate::http::request::Method;
use crate::http::response::{Response, StatusCode};
use crate::http::writer::{ResponseWriter, WriteQueue, serialize_response};
use crate::server::{Handler, Outcome};

const READ_BUFFER_SIZE: usize = 4096;

/// Read side of the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    /// Parsing requests and dispatching them.
    Reading,
    /// No further requests are read; queued replies are still written.
    Draining,
}

/// A dispatched request waiting for its reply.
struct Pending {
    reply: oneshot::Receiver<Response>,
    head: bool,
    keep_alive: bool,
    /// The handler asked to close; a missing reply is not an error.
    closing: bool,
}

/// Server side of one accepted socket.
///
/// Requests are parsed as bytes arrive and handed to the handler in receipt
/// order. Replies are queued per request and written in that same order,
/// whenever each handler gets around to answering.
pub struct Connection<S> {
    reader: ReadHalf<S>,
    writer: WriteHalf<S>,
    peer: String,
    parser: Parser,
    handler: Rc<dyn Handler>,
    max_pipeline: usize,
    shutdown: watch::Receiver<bool>,
    read_buf: BytesMut,
    out: WriteQueue,
    pending: VecDeque<Pending>,
    state: ConnectionState,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(
        stream: S,
        peer: impl Into<String>,
        handler: Rc<dyn Handler>,
        config: &ServerConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        Self {
            reader,
            writer,
            peer: peer.into(),
            parser: Parser::new(Role::Request, config.limits),
            handler,
            max_pipeline: config.max_pipeline.max(1),
            shutdown,
            read_buf: BytesMut::with_capacity(READ_BUFFER_SIZE),
            out: WriteQueue::new(config.max_write_buffer),
            pending: VecDeque::new(),
            state: ConnectionState::Reading,
        }
    }

    /// Serves requests until the peer leaves, a protocol error occurs, a
    /// handler asks to close, or the server shuts down.
    pub async fn run(mut self) -> anyhow::Result<()> {
        if *self.shutdown.borrow() {
            self.state = ConnectionState::Draining;
        }

        loop {
            if self.state == ConnectionState::Draining && self.pending.is_empty() && self.out.is_empty() {
                break;
            }

            // Bytes held back while the pipeline was full.
            if self.state == ConnectionState::Reading
                && !self.read_buf.is_empty()
                && self.pending.len() < self.max_pipeline
            {
                self.process_input();
                continue;
            }

            let can_read = self.state == ConnectionState::Reading && self.pending.len() < self.max_pipeline;
            let draining = self.state == ConnectionState::Draining;

            tokio::select! {
                reply = next_reply(&mut self.pending), if !self.pending.is_empty() => {
                    self.queue_reply(reply)?;
                }
                res = self.out.write_to(&mut self.writer), if !self.out.is_empty() => {
                    let n = res.context("writing response")?;
                    trace!(peer = %self.peer, bytes = n, "wrote");
                }
                res = self.reader.read_buf(&mut self.read_buf), if can_read => {
                    let n = res.context("reading request")?;
                    if n == 0 {
                        self.on_eof();
                    } else {
                        trace!(peer = %self.peer, bytes = n, "read");
                    }
                }
                _ = self.shutdown.changed(), if !draining => {
                    debug!(peer = %self.peer, "server closing, draining connection");
                    self.state = ConnectionState::Draining;
                }
                else => break,
            }
        }

        self.out.flush_to(&mut self.writer).await?;
        self.writer.shutdown().await.ok();
        debug!(peer = %self.peer, "connection closed");

        Ok(())
    }

    /// Parses buffered input, dispatching each complete request.
    fn process_input(&mut self) {
        let mut consumed = 0;

        while consumed < self.read_buf.len()
            && self.state == ConnectionState::Reading
            && self.pending.len() < self.max_pipeline
        {
            match self.parser.advance(&self.read_buf[consumed..]) {
                Ok(Status::Complete { parsed, consumed: n }) => {
                    consumed += n;
                    self.dispatch(parsed);
                }
                Ok(Status::Partial) => consumed = self.read_buf.len(),
                Err(e) => {
                    self.reject(&e);
                    consumed = self.read_buf.len();
                }
            }
        }

        self.read_buf.advance(consumed);

        if self.state != ConnectionState::Reading {
            self.read_buf.clear();
        }
    }

    fn dispatch(&mut self, parsed: Parsed) {
        let Some(request) = parsed.message.into_request() else {
            return;
        };

        debug!(
            peer = %self.peer,
            method = %request.method,
            path = %request.path,
            "dispatching request"
        );

        let head = request.method == Method::HEAD;
        let (writer, reply) = ResponseWriter::channel();
        let outcome = self.handler.on_request(request, writer);
        let closing = outcome == Outcome::Close;
        let keep_alive = parsed.keep_alive && !closing;

        self.pending.push_back(Pending {
            reply,
            head,
            keep_alive,
            closing,
        });

        if !keep_alive {
            self.state = ConnectionState::Draining;
        }
    }

    /// Queues a best-effort error reply and stops reading.
    fn reject(&mut self, err: &ParseError) {
        warn!(peer = %self.peer, error = %err, "malformed request");

        let status = match err {
            ParseError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ParseError::LineTooLong { .. } | ParseError::TooManyHeaders { .. } => {
                StatusCode::HEADER_FIELDS_TOO_LARGE
            }
            ParseError::UnsupportedTransferEncoding => StatusCode::NOT_IMPLEMENTED,
            ParseError::OutOfMemory => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };

        let (writer, reply) = ResponseWriter::channel();
        writer.send_error(status);

        self.pending.push_back(Pending {
            reply,
            head: false,
            keep_alive: false,
            closing: false,
        });
        self.state = ConnectionState::Draining;
    }

    fn on_eof(&mut self) {
        if let Err(e) = self.parser.finish() {
            debug!(peer = %self.peer, error = %e, "peer closed mid-request");
        }
        self.state = ConnectionState::Draining;
    }

    /// Serializes the reply at the front of the queue.
    fn queue_reply(&mut self, reply: Option<Response>) -> anyhow::Result<()> {
        let Some(entry) = self.pending.pop_front() else {
            return Ok(());
        };

        let (response, keep_alive) = match reply {
            Some(response) => (response, entry.keep_alive),
            None if entry.closing => {
                self.pending.clear();
                self.state = ConnectionState::Draining;
                return Ok(());
            }
            None => {
                warn!(peer = %self.peer, "handler dropped the response writer without replying");
                (Response::error(StatusCode::INTERNAL_SERVER_ERROR), false)
            }
        };

        debug!(
            peer = %self.peer,
            status = response.status.as_u16(),
            keep_alive,
            "queueing response"
        );

        let bytes = serialize_response(&response, entry.head, keep_alive);
        if let Err(e) = self.out.push(&bytes) {
            warn!(peer = %self.peer, error = %e, "peer is not reading, aborting connection");
            return Err(e.into());
        }

        if !keep_alive {
            self.pending.clear();
            self.state = ConnectionState::Draining;
        }

        Ok(())
    }
}

/// Waits for the reply at the front of the queue; `None` if its writer was
/// dropped unsent.
async fn next_reply(pending: &mut VecDeque<Pending>) -> Option<Response> {
    match pending.front_mut() {
        Some(entry) => (&mut entry.reply).await.ok(),
        None => std::future::pending().await,
    }
}
