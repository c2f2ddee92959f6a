use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShuffleError {
    #[error("shuffle buffer is full (capacity {0})")]
    LinkOverflow(usize),
    #[error("read attempted before shuffle() was called")]
    NotShuffled,
}
