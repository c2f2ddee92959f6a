use thiserror::Error;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("tls configuration error: {0}")]
    Tls(String),
    #[error("signature on incoming stream chunk did not verify")]
    SignatureInvalid,
    #[error("connection to server {0} is not established")]
    NotConnected(u32),
    #[error("connection closed during shutdown")]
    Closed,
    #[error("framing codec error: {0}")]
    Codec(#[from] duskmesh_core::DuskmeshError),
}
