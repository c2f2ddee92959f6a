//! Signed message framing: `metadata_header ‖ payload ‖ signature`, where
//! the signature covers a running SHA-256 over the header and payload
//! rather than the (potentially large) payload directly — grounded on the
//! Go prototype's `PreHashSign`/`PreHashVerify` pair in `batching.go`.

use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use duskmesh_core::MetadataHeader;
use duskmesh_crypto::{ExpandedVerificationKey, SigningKeypair};

use crate::error::NetworkError;

fn running_hash(header_bytes: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(header_bytes);
    hasher.update(payload);
    hasher.finalize().into()
}

/// Write one signed, length-framed message: a fixed-size metadata header
/// followed by `payload` followed by a 64-byte Ed25519 signature over the
/// digest of both.
pub async fn write_framed<W: AsyncWrite + Unpin>(
    writer: &mut W,
    header: &MetadataHeader,
    payload: &[u8],
    signing_key: &SigningKeypair,
) -> Result<(), NetworkError> {
    let mut header_bytes = [0u8; MetadataHeader::LEN];
    header.pack_into(&mut header_bytes)?;

    let digest = running_hash(&header_bytes, payload);
    let signature = signing_key.sign(&digest);

    writer.write_all(&header_bytes).await?;
    writer.write_all(payload).await?;
    writer.write_all(&signature).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one signed, length-framed message whose payload is exactly
/// `payload_len` bytes, verifying the trailing signature against
/// `verifying_key` before returning.
pub async fn read_framed<R: AsyncRead + Unpin>(
    reader: &mut R,
    payload_len: usize,
    verifying_key: &ExpandedVerificationKey,
) -> Result<(MetadataHeader, Vec<u8>), NetworkError> {
    let mut header_bytes = [0u8; MetadataHeader::LEN];
    reader.read_exact(&mut header_bytes).await?;
    let header = MetadataHeader::interpret_from(&header_bytes)?;

    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    let mut signature = [0u8; 64];
    reader.read_exact(&mut signature).await?;

    let digest = running_hash(&header_bytes, &payload);
    if !verifying_key.verify(&digest, &signature) {
        return Err(NetworkError::SignatureInvalid);
    }

    Ok((header, payload))
}

/// Read one signed, length-framed message whose payload length isn't known
/// ahead of time: used for path-establishment frames, which (unlike a
/// lightning layer's dummy-padded bins) carry exactly as many elements as
/// were actually written. `message_size` is the fixed per-element length;
/// the element count comes from the header's own `num_messages` field.
pub async fn read_framed_dynamic<R: AsyncRead + Unpin>(
    reader: &mut R,
    message_size: usize,
    verifying_key: &ExpandedVerificationKey,
) -> Result<(MetadataHeader, Vec<u8>), NetworkError> {
    let mut header_bytes = [0u8; MetadataHeader::LEN];
    reader.read_exact(&mut header_bytes).await?;
    let header = MetadataHeader::interpret_from(&header_bytes)?;

    let payload_len = header.num_messages as usize * message_size;
    let mut payload = vec![0u8; payload_len];
    reader.read_exact(&mut payload).await?;

    let mut signature = [0u8; 64];
    reader.read_exact(&mut signature).await?;

    let digest = running_hash(&header_bytes, &payload);
    if !verifying_key.verify(&digest, &signature) {
        return Err(NetworkError::SignatureInvalid);
    }

    Ok((header, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use duskmesh_core::MessageType;

    fn sample_header() -> MetadataHeader {
        MetadataHeader {
            num_messages: 4,
            message_type: MessageType::LightningForward as u32,
            round: 1,
            layer: 2,
            sender: 3,
            dest: 5,
            group: 0,
        }
    }

    #[tokio::test]
    async fn write_then_read_roundtrips() {
        let signing_key = SigningKeypair::generate();
        let expanded = ExpandedVerificationKey::expand(&signing_key.public_key_bytes()).unwrap();
        let header = sample_header();
        let payload = vec![7u8; 128];

        let mut buf = Vec::new();
        write_framed(&mut buf, &header, &payload, &signing_key)
            .await
            .unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let (read_header, read_payload) = read_framed(&mut cursor, 128, &expanded).await.unwrap();

        assert_eq!(read_header.round, header.round);
        assert_eq!(read_header.layer, header.layer);
        assert_eq!(read_payload, payload);
    }

    #[tokio::test]
    async fn tampered_payload_fails_verification() {
        let signing_key = SigningKeypair::generate();
        let expanded = ExpandedVerificationKey::expand(&signing_key.public_key_bytes()).unwrap();
        let header = sample_header();
        let payload = vec![1u8; 64];

        let mut buf = Vec::new();
        write_framed(&mut buf, &header, &payload, &signing_key)
            .await
            .unwrap();
        buf[MetadataHeader::LEN] ^= 0xFF;

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_framed(&mut cursor, 64, &expanded).await;
        assert!(matches!(result, Err(NetworkError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn wrong_verifying_key_fails() {
        let signing_key = SigningKeypair::generate();
        let other = SigningKeypair::generate();
        let expanded = ExpandedVerificationKey::expand(&other.public_key_bytes()).unwrap();
        let header = sample_header();
        let payload = vec![3u8; 32];

        let mut buf = Vec::new();
        write_framed(&mut buf, &header, &payload, &signing_key)
            .await
            .unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let result = read_framed(&mut cursor, 32, &expanded).await;
        assert!(matches!(result, Err(NetworkError::SignatureInvalid)));
    }

    #[tokio::test]
    async fn dynamic_read_derives_payload_len_from_header() {
        let signing_key = SigningKeypair::generate();
        let expanded = ExpandedVerificationKey::expand(&signing_key.public_key_bytes()).unwrap();
        let mut header = sample_header();
        header.num_messages = 3;
        let payload = vec![5u8; 3 * 32];

        let mut buf = Vec::new();
        write_framed(&mut buf, &header, &payload, &signing_key)
            .await
            .unwrap();

        let mut cursor = std::io::Cursor::new(buf);
        let (read_header, read_payload) = read_framed_dynamic(&mut cursor, 32, &expanded)
            .await
            .unwrap();
        assert_eq!(read_header.num_messages, 3);
        assert_eq!(read_payload, payload);
    }
}
