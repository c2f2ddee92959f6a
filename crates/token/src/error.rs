use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("point is not in the prime-order subgroup")]
    BadElement,
    #[error("blind signature does not verify against its hash")]
    VerificationFailed,
    #[error("invalid token bytes: {0}")]
    InvalidBytes(String),
}
