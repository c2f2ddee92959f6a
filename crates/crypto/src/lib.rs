//! Duskmesh cryptographic primitives: long-lived and ephemeral keypairs,
//! and the authenticated sealed-box (§4.B).

mod curve;
mod keys;
mod sealed_box;
mod sign;

pub use curve::*;
pub use keys::*;
pub use sealed_box::*;
pub use sign::*;
