//! Per-layer key lookup table (§4.C): maps a lookup key — which doubles as
//! the client's Ed25519 verification key for that hop — to the bootstrap
//! key material installed for it during path establishment.

mod error;
mod table;

pub use error::*;
pub use table::*;
