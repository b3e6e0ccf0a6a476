//! A client-side implementation of Open Protocol, the ASCII-framed
//! request/response protocol spoken by industrial tightening controllers
//! (torque wrenches, nutrunners, and similar fieldbus-adjacent tools).
//!
//! The crate is split into a sans-IO core — pure, testable, no sockets —
//! and a thin [`transport`] driver that runs it over a real
//! [`tokio::net::TcpStream`]:
//!
//! - [`header`] parses and serializes the fixed-width 20-byte ASCII
//!   header that frames every message on the wire.
//! - [`reassembly`] reassembles a message split across up to 9 frames.
//! - [`link`] is the reliability and sequencing state machine: ack
//!   dispatch, retransmission, duplicate suppression.
//! - [`registry`] and [`codecs`] decode and encode each MID's payload
//!   into a structured [`message::DecodedPayload`].
//! - [`fields`] provides the Data Field / Resolution Field / Trace Sample
//!   readers the leaf codecs build on.
//! - [`seq`] is the small wraparound sequence-number type the Link Layer
//!   and its tests share.
//! - [`transport`] drives a [`link::LinkLayer`] over a live TCP
//!   connection with `tokio`, exposing an async `write`/`recv` API.
#![deny(rustdoc::broken_intra_doc_links, rust_2018_idioms)]
#![warn(
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro,
    clippy::explicit_iter_loop,
    clippy::future_not_send,
    clippy::todo,
    clippy::unimplemented,
    clippy::use_self,
    clippy::doc_markdown,
    clippy::print_stdout,
    missing_debug_implementations,
    unused_crate_dependencies,
    unreachable_pub,
    missing_docs
)]

pub mod message;
pub use message::{Message, Payload};

pub mod codes;

pub mod seq;
pub use seq::Seq;

pub mod fields;

pub mod header;

pub mod reassembly;
pub use reassembly::Reassembler;

pub mod registry;
pub use registry::{CodecOptions, Registry};

mod codecs;

pub mod link;
pub use link::{LinkError, LinkLayer, LinkLayerConfig};

pub mod transport;
pub use transport::{Connection, Inbound, TransportError};

// Unused-crate-dependency lint workaround: `criterion` is only exercised by
// `benches/bench.rs`, which is a separate compilation target from the lib's
// own unit tests. `hex_literal` and `assert_matches` are used directly by
// `src/fields.rs`'s test module and `tests/scenarios.rs` respectively, so
// they need no such workaround.
#[cfg(test)]
use criterion as _;
