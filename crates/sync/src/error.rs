use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("contributor id {0} is out of range for this layer's threshold")]
    BadMetadata(usize),
    #[error("contributor id {0} already called sync_once for this layer")]
    AlreadyStarted(usize),
}
