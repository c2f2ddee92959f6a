//! Persistence for a server's long-lived identity keys (§4.L): the Ed25519
//! signing keypair used for link/onion signatures and the Edwards-curve
//! Diffie-Hellman keypair used to open bootstrap-key ciphertexts.

mod keypair;
mod paths;

pub use keypair::{
    default_key_path, load_or_generate_dh_keypair, load_or_generate_signing_keypair,
    save_keypair_bytes, KeystoreError,
};
pub use paths::{default_config_dir, default_keystore_dir, expand_path};
