use thiserror::Error;

use duskmesh_core::DuskmeshError;
use duskmesh_crypto::{KeyError, SealedBoxError};
use duskmesh_keytable::KeyTableError;
use duskmesh_network::NetworkError;
use duskmesh_shuffle::ShuffleError;
use duskmesh_sync::SyncError;
use duskmesh_token::TokenError;

/// Crate-spanning error type for the per-message handlers and the round
/// orchestrator. Every variant here is a round-aborting condition (§7):
/// callers propagate rather than retry.
#[derive(Error, Debug)]
pub enum ServerError {
    #[error(transparent)]
    Codec(#[from] DuskmeshError),
    #[error(transparent)]
    SealedBox(#[from] SealedBoxError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    KeyTable(#[from] KeyTableError),
    #[error(transparent)]
    Shuffle(#[from] ShuffleError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Network(#[from] NetworkError),
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("no outgoing buffer registered for destination {0}")]
    UnknownDestination(u32),
    #[error("token routes to server {expected}, but arrived at server {actual}")]
    WrongServer { expected: u32, actual: u32 },
    #[error("layer {layer} complete but only {used}/{expected} installed keys were used")]
    MissingMessages {
        layer: u32,
        used: usize,
        expected: usize,
    },
    #[error("checkpoint signature on anonymous key did not verify")]
    CheckpointSignatureInvalid,
    #[error("no parser/router installed for the round's current phase")]
    NotReady,
}

pub type Result<T> = std::result::Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrong_server_message() {
        let e = ServerError::WrongServer {
            expected: 3,
            actual: 1,
        };
        assert_eq!(
            e.to_string(),
            "token routes to server 3, but arrived at server 1"
        );
    }

    #[test]
    fn missing_messages_message() {
        let e = ServerError::MissingMessages {
            layer: 2,
            used: 4,
            expected: 5,
        };
        assert_eq!(
            e.to_string(),
            "layer 2 complete but only 4/5 installed keys were used"
        );
    }

    #[test]
    fn unknown_destination_message() {
        let e = ServerError::UnknownDestination(7);
        assert_eq!(
            e.to_string(),
            "no outgoing buffer registered for destination 7"
        );
    }

    #[test]
    fn codec_error_converts_via_from() {
        let e: ServerError = DuskmeshError::DecodeError("short".into()).into();
        assert!(matches!(e, ServerError::Codec(_)));
    }
}
