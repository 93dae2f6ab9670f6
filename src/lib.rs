//! peerhttp - HTTP/1.x transport for a node's control interface.
//!
//! An asynchronous server and client built on a hand-written incremental
//! parser, running on a single-threaded event loop (a tokio current-thread
//! runtime driving a `LocalSet`).

pub mod client;
pub mod config;
pub mod http;
pub mod server;

pub use client::{ClientError, RequestHandle, RequestOptions, fetch, request};
pub use http::headers::Headers;
pub use http::request::{Method, Request};
pub use http::response::{Response, StatusCode};
pub use http::writer::ResponseWriter;
pub use server::{Handler, Outcome, Server};
