//! Pairing-based blind-signature tokens (§4.J): anytrust groups issue a
//! token over a client-chosen message while learning nothing about it, and
//! any holder of the group's public key can verify the result.

mod error;
mod keys;
mod token;

pub use error::*;
pub use keys::*;
pub use token::*;
