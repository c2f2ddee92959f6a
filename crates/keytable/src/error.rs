use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyTableError {
    #[error("key already installed for this lookup key: {0}")]
    Duplicate(String),
    #[error("no key installed for lookup key: {0}")]
    NotFound(String),
    #[error("invalid peer key: {0}")]
    InvalidKey(String),
}
