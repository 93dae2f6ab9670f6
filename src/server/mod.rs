//! HTTP server: listening sockets, accept loops and the handler contract.
//!
//! A [`Server`] runs on the current thread's [`tokio::task::LocalSet`]. Every
//! listening socket gets its own accept loop task, and every accepted socket
//! its own [`Connection`](crate::http::connection::Connection) task. Handlers
//! therefore need not be `Send`, and shared handler state can live in `Rc`.

pub mod listener;

use std::net::{Ipv4Addr, SocketAddr};
use std::rc::Rc;

use tokio::net::{TcpListener, ToSocketAddrs};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::ServerConfig;
use crate::http::request::Request;
use crate::http::writer::ResponseWriter;

/// What the connection should do after a request was handed off.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep serving the connection.
    Continue,
    /// Write the replies queued so far, then close the connection.
    Close,
}

/// Embedder logic invoked once per complete request.
///
/// The handler may answer through `response` before returning, or move it
/// elsewhere and answer later.
pub trait Handler {
    fn on_request(&self, request: Request, response: ResponseWriter) -> Outcome;
}

impl<F> Handler for F
where
    F: Fn(Request, ResponseWriter) -> Outcome,
{
    fn on_request(&self, request: Request, response: ResponseWriter) -> Outcome {
        self(request, response)
    }
}

/// An HTTP server bound to the current event loop.
pub struct Server {
    handler: Rc<dyn Handler>,
    config: ServerConfig,
    shutdown: watch::Sender<bool>,
    listeners: Vec<(SocketAddr, JoinHandle<()>)>,
}

impl Server {
    /// Creates a server with default settings. Nothing listens yet.
    pub fn new(handler: impl Handler + 'static) -> Self {
        Self::with_config(handler, ServerConfig::default())
    }

    pub fn with_config(handler: impl Handler + 'static, config: ServerConfig) -> Self {
        let (shutdown, _) = watch::channel(false);

        Self {
            handler: Rc::new(handler),
            config,
            shutdown,
            listeners: Vec::new(),
        }
    }

    /// Binds `addr` and starts accepting connections on it.
    ///
    /// Must run inside a `LocalSet`. May be called again to listen on more
    /// addresses. Returns the bound address.
    pub async fn open(&mut self, addr: impl ToSocketAddrs) -> std::io::Result<SocketAddr> {
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;

        info!(addr = %local, "Listening");

        let task = tokio::task::spawn_local(listener::run(
            listener,
            self.handler.clone(),
            self.config.clone(),
            self.shutdown.subscribe(),
        ));
        self.listeners.push((local, task));

        Ok(local)
    }

    /// Listens on the IPv4 loopback address.
    pub async fn open_local(&mut self, port: u16) -> std::io::Result<SocketAddr> {
        self.open((Ipv4Addr::LOCALHOST, port)).await
    }

    /// Addresses currently listened on.
    pub fn local_addrs(&self) -> Vec<SocketAddr> {
        self.listeners.iter().map(|(addr, _)| *addr).collect()
    }

    pub fn is_listening(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Stops accepting, lets in-flight connections finish their queued
    /// replies, then releases the listening sockets.
    pub async fn close(&mut self) {
        self.shutdown.send_replace(true);

        for (addr, task) in self.listeners.drain(..) {
            if let Err(e) = task.await {
                tracing::error!(addr = %addr, error = %e, "accept loop failed");
            }
            info!(addr = %addr, "Stopped listening");
        }
    }
}
