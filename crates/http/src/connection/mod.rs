//! The transfer protocols driving one exchange over a connection.
//!
//! Each protocol is an `async fn` run by the client or the server under the
//! exchange's timeout and cancellation:
//!
//! - byte-stream transports: [`stream_send::send_request`] and [`stream_receive::receive_request`],
//!   lead chunks followed by subsequent chunks
//! - message transports: [`message_send::send_request`] and [`message_receive::receive_request`],
//!   transfer PDUs with inline bodies or chunk-get / chunk-ret round trips
//!
//! The connection itself is held by a [`ConnectionLease`], which releases it once
//! together with every body attached to the exchange.

mod context;
mod lease;
pub(crate) mod message_exchange;
pub(crate) mod message_receive;
pub(crate) mod message_send;
pub(crate) mod stream_io;
pub(crate) mod stream_receive;
pub(crate) mod stream_send;

pub(crate) use context::{ExchangeContext, ExchangeState};
pub(crate) use lease::{AbortSignal, ConnectionLease};
pub(crate) use message_exchange::MessageExchange;
