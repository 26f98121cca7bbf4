//! A transport-agnostic request/response protocol engine with HTTP-like messages.
//!
//! quasi-http exchanges look like HTTP (method, target, headers, status, body) but run
//! over any connection the host provides: byte streams such as pipes and TCP streams, or
//! transports exchanging discrete messages of bounded size, including in-process ones.
//! The engine never opens sockets itself; hosts plug their connections in through the
//! [`transport`] contracts.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use quasi_http::handler::make_application;
//! use quasi_http::protocol::body::BytesBody;
//! use quasi_http::protocol::{QuasiHttpError, QuasiRequest, QuasiResponse};
//! use quasi_http::transport::memory::{MemoryNetwork, MemoryStreamTransport};
//! use quasi_http::{StandardQuasiHttpClient, StandardQuasiHttpServer};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), QuasiHttpError> {
//! let network = MemoryNetwork::new();
//! let transport = Arc::new(MemoryStreamTransport::new(network.clone()));
//! let mut listener = network.bind_stream("greeter")?;
//!
//! let server = StandardQuasiHttpServer::new(make_application(|request: QuasiRequest| async move {
//!     let greeting = format!("hello {}", request.target());
//!     Ok::<_, QuasiHttpError>(Some(QuasiResponse::with_status_code(200).with_body(Arc::new(BytesBody::from(greeting)))))
//! }));
//! let server_transport = transport.clone();
//! tokio::spawn(async move {
//!     while let Some(connection) = listener.accept().await {
//!         let _ = server.accept_stream_connection(server_transport.clone(), connection).await;
//!     }
//! });
//!
//! let client = StandardQuasiHttpClient::new(transport);
//! let response = client.send("greeter", QuasiRequest::new("GET", "/world"), None).await?;
//! assert!(response.is_success());
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! - [`protocol`]: requests, responses, lead chunks, bodies, options and errors
//! - [`codec`]: the lead chunk, subsequent chunk and transfer PDU wire formats
//! - [`cancellation`]: timeout and cancellation coordination of every exchange step
//! - [`transport`]: the byte-stream and message transport contracts, with in-memory
//!   implementations
//! - [`handler`]: the application contract
//! - [`StandardQuasiHttpClient`], [`MessageQuasiHttpClient`] and [`StandardQuasiHttpServer`]:
//!   the drivers running the transfer protocols
//!
//! # Bodies and connections
//!
//! Bodies are pulled lazily through [`QuasiBody`](protocol::body::QuasiBody). By default
//! the client reads a response body into memory and releases the connection before
//! returning. With response buffering disabled the body streams from the connection,
//! and the connection is released when the consumer calls `end_read` on the body.
//!
//! # Logging
//!
//! The engine emits `tracing` events: exchange lifecycle at `debug`, state transitions
//! and chunk sizes at `trace`, swallowed release failures at `warn` and aborted
//! exchanges at `error`. Installing a subscriber is up to the host.

pub mod cancellation;
pub mod codec;
pub mod handler;
pub mod protocol;
pub mod transport;

mod client;
mod connection;
mod server;

pub use client::{MessageQuasiHttpClient, StandardQuasiHttpClient};
pub use server::StandardQuasiHttpServer;

mod utils;
pub(crate) use utils::ensure;
