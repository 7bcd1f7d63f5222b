//! Point-to-point delivery of encrypted envelopes over TCP.
//!
//! One envelope per connection: the client opens a connection, writes the
//! envelope as a single newline-terminated line, reads a single `true` or
//! `false` ack line, and closes. The server accepts sequentially and
//! handles exactly one exchange per connection.
//!
//! Client-side exchange, terminal states in brackets:
//!
//! ```text
//! Idle -> Connecting -> Sending -> AwaitingAck -> [Acked]
//!                \---------\----------\--------> [Failed]
//! ```
//!
//! Every failure on the client path collapses to a boolean `false`; retry
//! policy belongs to the caller.

mod client;
mod server;

pub use client::DeliveryClient;
pub use server::{MessageSink, Server, ServerHandle};
