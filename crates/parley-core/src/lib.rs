//! # Parley Core Library
//!
//! A peer-to-peer encrypted chat core. Every peer runs a small server that
//! accepts single messages from other peers and a client that pushes
//! messages out. There are no accounts and no central broker: a contact is
//! a UUID, a public key and a network address.
//!
//! ## Message flow
//!
//! ```text
//! PlainMessage -> codec encode -> hybrid encrypt (per recipient)
//!              -> one TCP exchange per envelope -> boolean ack
//! ```
//!
//! Receiving reverses the first two steps after the server reads a line.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │            parley-cli / UI              │
//! ├─────────────────────────────────────────┤
//! │  fanout  │  conversation  │   storage   │
//! ├─────────────────────────────────────────┤
//! │       transport (client + server)       │
//! ├─────────────────────────────────────────┤
//! │   protocol (wire)   │      crypto       │
//! └─────────────────────────────────────────┘
//! ```
//!
//! ## Failure policy
//!
//! Transport and crypto failures become boolean outcomes at the delivery
//! boundary; only wire-grammar violations surface as typed errors. Nothing
//! in this crate terminates the server loop or the calling application.

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod config;
pub mod conversation;
pub mod crypto;
pub mod error;
pub mod fanout;
pub mod identity;
pub mod logging;
pub mod peer;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use error::{Error, Result};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
