//! HTTP/1.x protocol implementation.
//!
//! # Architecture
//!
//! - **`buffer`**: growable byte storage for lines and bodies
//! - **`headers`**: insertion-ordered, case-insensitive header collection
//! - **`request`** / **`response`**: message types, methods and status codes
//! - **`parser`**: incremental parser for requests and responses
//! - **`writer`**: serialization, the bounded write queue and the
//!   handler-facing `ResponseWriter`
//! - **`connection`**: the server-side per-socket state machine
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌─────────────┐
//!        │   Reading   │ ← Parse incoming bytes
//!        └──────┬──────┘
//!               │ Request complete
//!               ▼
//!        ┌──────────────────┐
//!        │   Dispatched     │ ← Handler answers now or later
//!        └──────┬───────────┘
//!               │ Reply ready (in receipt order)
//!               ▼
//!        ┌──────────────────┐
//!        │    Writing       │ ← Queue and send the response
//!        └──────┬───────────┘
//!               │
//!               ├─ Keep-Alive → Reading (same connection, same parser)
//!               └─ Close / error → Draining → Closed
//! ```
//!
//! Pipelined requests are dispatched as soon as they are parsed; their
//! replies are still written strictly in the order the requests arrived.
//!
//! # Example
//!
//! ```ignore
//! use peerhttp::{Outcome, Request, ResponseWriter, Server, StatusCode};
//!
//! let local = tokio::task::LocalSet::new();
//! local.run_until(async {
//!     let mut server = Server::new(|req: Request, res: ResponseWriter| {
//!         res.send(StatusCode::OK, "text/plain", format!("you asked for {}\n", req.path));
//!         Outcome::Continue
//!     });
//!     server.open("127.0.0.1:8080").await?;
//!     tokio::signal::ctrl_c().await?;
//!     server.close().await;
//!     Ok::<_, std::io::Error>(())
//! }).await?;
//! ```

pub mod buffer;
pub mod connection;
pub mod headers;
pub mod parser;
pub mod request;
pub mod response;
pub mod writer;
