//! Mutual-TLS connection manager (§4.E): persistent signed streams between
//! every pair of servers, metadata framing, and latency-ordered send
//! scheduling.

mod connection;
mod error;
mod framing;
mod latency;
mod tls;

pub use connection::*;
pub use error::*;
pub use framing::*;
pub use latency::*;
pub use tls::*;
