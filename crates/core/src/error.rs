//! Crate-spanning error taxonomy.
//!
//! Every variant here is, per the protocol's error handling design, a fatal
//! round-aborting condition unless its doc comment says otherwise. Lower
//! level crates (codec parsing, crypto, token) define their own focused
//! error enums; code that threads errors up to the orchestrator converts
//! into this taxonomy at the boundary.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DuskmeshError {
    /// Envelope or header length mismatch, bad point encoding, non-canonical scalar.
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Ed25519 or blind-signature verification failed.
    #[error("signature verification failed: {0}")]
    SignatureError(String),

    /// Blind-signature token does not verify, or its hash routes to a different server.
    #[error("token invalid: {0}")]
    TokenInvalid(String),

    /// Incoming lookup key has no bootstrap record.
    #[error("key not found: {0}")]
    KeyNotFound(String),

    /// A bootstrap key was used twice in one layer, a sender delivered twice in
    /// one (round, layer), or a checkpoint path was decrypted twice.
    #[error("duplicate: {0}")]
    DuplicateError(String),

    /// A destination's shuffle buffer received more than `bin_size` messages.
    #[error("link overflow: {0}")]
    LinkOverflow(String),

    /// At layer-complete, used-count != table-size or a sender never arrived.
    #[error("missing messages: {0}")]
    MissingMessages(String),

    /// A message arrived for a (round, layer) not matching current state.
    #[error("synchronization error: {0}")]
    SynchronizationError(String),

    /// Underlying TLS / I/O error.
    #[error("network error: {0}")]
    NetworkError(String),
}

pub type Result<T> = std::result::Result<T, DuskmeshError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_error_message() {
        let e = DuskmeshError::DecodeError("short buffer".into());
        assert_eq!(e.to_string(), "decode error: short buffer");
    }

    #[test]
    fn signature_error_message() {
        let e = DuskmeshError::SignatureError("bad sig".into());
        assert_eq!(e.to_string(), "signature verification failed: bad sig");
    }

    #[test]
    fn token_invalid_message() {
        let e = DuskmeshError::TokenInvalid("wrong server".into());
        assert_eq!(e.to_string(), "token invalid: wrong server");
    }

    #[test]
    fn key_not_found_message() {
        let e = DuskmeshError::KeyNotFound("lookup key abcd".into());
        assert_eq!(e.to_string(), "key not found: lookup key abcd");
    }

    #[test]
    fn duplicate_error_message() {
        let e = DuskmeshError::DuplicateError("bootstrap key reused".into());
        assert_eq!(e.to_string(), "duplicate: bootstrap key reused");
    }

    #[test]
    fn link_overflow_message() {
        let e = DuskmeshError::LinkOverflow("dest 3".into());
        assert_eq!(e.to_string(), "link overflow: dest 3");
    }

    #[test]
    fn missing_messages_message() {
        let e = DuskmeshError::MissingMessages("sender 2 never arrived".into());
        assert_eq!(e.to_string(), "missing messages: sender 2 never arrived");
    }

    #[test]
    fn synchronization_error_message() {
        let e = DuskmeshError::SynchronizationError("layer mismatch".into());
        assert_eq!(e.to_string(), "synchronization error: layer mismatch");
    }

    #[test]
    fn network_error_message() {
        let e = DuskmeshError::NetworkError("connection reset".into());
        assert_eq!(e.to_string(), "network error: connection reset");
    }

    #[test]
    fn result_alias_ok() {
        let r: Result<u32> = Ok(42);
        assert_eq!(r.unwrap(), 42);
    }

    #[test]
    fn result_alias_err() {
        let r: Result<u32> = Err(DuskmeshError::KeyNotFound("x".into()));
        assert!(r.is_err());
    }
}
