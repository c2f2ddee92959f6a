//! The metadata header that frames every inter-server chunk, and the
//! tagged discriminator that selects a message handler.

use crate::{DuskmeshError, Result};

/// Size in bytes of a packed `MetadataHeader`: 7 little-endian u32 fields.
pub const METADATA_HEADER_SIZE: usize = 28;

/// Message-type discriminant carried in the metadata header. Selects which
/// of the worker pool's four handlers (plus control-plane message shapes)
/// processes a chunked stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageType {
    LightningForward = 0,
    LightningReverse = 1,
    PathForward = 2,
    CheckpointToken = 3,
    CheckpointSignature = 4,
    KeyShare = 5,
    ClientRegister = 6,
    ClientTokenRequest = 7,
    ClientMessageSubmission = 8,
    ClientGetReceipt = 9,
}

impl MessageType {
    pub fn from_u32(v: u32) -> Result<Self> {
        Ok(match v {
            0 => MessageType::LightningForward,
            1 => MessageType::LightningReverse,
            2 => MessageType::PathForward,
            3 => MessageType::CheckpointToken,
            4 => MessageType::CheckpointSignature,
            5 => MessageType::KeyShare,
            6 => MessageType::ClientRegister,
            7 => MessageType::ClientTokenRequest,
            8 => MessageType::ClientMessageSubmission,
            9 => MessageType::ClientGetReceipt,
            other => return Err(DuskmeshError::DecodeError(format!("unknown message type {other}"))),
        })
    }
}

/// `(num_messages, type, round, layer, sender, dest, group)`, little-endian,
/// prepended to every inter-server chunked stream. A trailing 64-byte
/// signature (carried alongside, not part of this struct) covers the
/// concatenation of this header and every chunk payload byte of the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataHeader {
    pub num_messages: u32,
    pub message_type: u32,
    pub round: u32,
    pub layer: u32,
    pub sender: u32,
    pub dest: u32,
    pub group: u32,
}

impl MetadataHeader {
    pub const LEN: usize = METADATA_HEADER_SIZE;

    pub fn len(&self) -> usize {
        Self::LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pack_into(&self, buf: &mut [u8]) -> Result<()> {
        if buf.len() != Self::LEN {
            return Err(DuskmeshError::DecodeError(format!(
                "metadata header buffer must be {} bytes, got {}",
                Self::LEN,
                buf.len()
            )));
        }
        buf[0..4].copy_from_slice(&self.num_messages.to_le_bytes());
        buf[4..8].copy_from_slice(&self.message_type.to_le_bytes());
        buf[8..12].copy_from_slice(&self.round.to_le_bytes());
        buf[12..16].copy_from_slice(&self.layer.to_le_bytes());
        buf[16..20].copy_from_slice(&self.sender.to_le_bytes());
        buf[20..24].copy_from_slice(&self.dest.to_le_bytes());
        buf[24..28].copy_from_slice(&self.group.to_le_bytes());
        Ok(())
    }

    pub fn interpret_from(buf: &[u8]) -> Result<Self> {
        if buf.len() != Self::LEN {
            return Err(DuskmeshError::DecodeError(format!(
                "metadata header buffer must be {} bytes, got {}",
                Self::LEN,
                buf.len()
            )));
        }
        let read_u32 = |off: usize| u32::from_le_bytes(buf[off..off + 4].try_into().unwrap());
        Ok(MetadataHeader {
            num_messages: read_u32(0),
            message_type: read_u32(4),
            round: read_u32(8),
            layer: read_u32(12),
            sender: read_u32(16),
            dest: read_u32(20),
            group: read_u32(24),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_roundtrip() {
        for v in 0..10u32 {
            let mt = MessageType::from_u32(v).unwrap();
            assert_eq!(mt as u32, v);
        }
    }

    #[test]
    fn message_type_rejects_unknown() {
        assert!(MessageType::from_u32(10).is_err());
    }

    #[test]
    fn metadata_header_roundtrip() {
        let h = MetadataHeader {
            num_messages: 100,
            message_type: MessageType::LightningForward as u32,
            round: 7,
            layer: 2,
            sender: 3,
            dest: 4,
            group: 0,
        };
        let mut buf = [0u8; METADATA_HEADER_SIZE];
        h.pack_into(&mut buf).unwrap();
        let back = MetadataHeader::interpret_from(&buf).unwrap();
        assert_eq!(h, back);
    }

    #[test]
    fn metadata_header_rejects_short_buffer() {
        let buf = [0u8; 10];
        assert!(MetadataHeader::interpret_from(&buf).is_err());
    }

    #[test]
    fn metadata_header_rejects_wrong_size_pack() {
        let h = MetadataHeader {
            num_messages: 1,
            message_type: 0,
            round: 0,
            layer: 0,
            sender: 0,
            dest: 0,
            group: 0,
        };
        let mut buf = [0u8; 27];
        assert!(h.pack_into(&mut buf).is_err());
    }

    #[test]
    fn metadata_header_is_little_endian() {
        let h = MetadataHeader {
            num_messages: 1,
            message_type: 0,
            round: 0,
            layer: 0,
            sender: 0,
            dest: 0,
            group: 0,
        };
        let mut buf = [0u8; METADATA_HEADER_SIZE];
        h.pack_into(&mut buf).unwrap();
        assert_eq!(&buf[0..4], &[1, 0, 0, 0]);
    }
}
