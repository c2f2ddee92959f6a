//! Duskmesh core data model.
//!
//! Defines the fixed-size wire types shared across the mix network: server
//! and anytrust-group identity, the bootstrap-key record installed during
//! path establishment, the fixed-offset envelope codecs, the metadata
//! header that frames every inter-server chunk, and the crate-spanning
//! error taxonomy.

mod envelope;
mod error;
mod identity;
mod message;

pub use envelope::*;
pub use error::{DuskmeshError, Result};
pub use identity::*;
pub use message::*;

/// Size in bytes of a curve point serialized on the wire (an Ed25519
/// verifying/lookup key, doubling as an Edwards DH public point).
pub const POINT_SIZE: usize = 32;

/// Size in bytes of an Ed25519 signature.
pub const SIGNATURE_SIZE: usize = 64;

/// Size in bytes of a packed blind-signature token (a compressed G1 point).
pub const TOKEN_SIZE: usize = 48;

/// Size in bytes of a domain-separated nonce reconstructed by the receiver.
pub const NONCE_SIZE: usize = 24;
