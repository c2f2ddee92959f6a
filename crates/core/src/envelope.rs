//! Fixed-length envelope codecs (§4.A).
//!
//! Every envelope exposes `len()` / `pack_into(buf)` (allocation-free,
//! writes into a caller-owned buffer) and a borrowing `*View::interpret_from`
//! constructor that retains slices into the caller's buffer rather than
//! copying the payload. Length mismatches are fatal `DecodeError`s.

use crate::{DuskmeshError, Result, POINT_SIZE, SIGNATURE_SIZE, TOKEN_SIZE};

fn check_len(what: &str, expected: usize, got: usize) -> Result<()> {
    if expected != got {
        return Err(DuskmeshError::DecodeError(format!(
            "{what}: expected {expected} bytes, got {got}"
        )));
    }
    Ok(())
}

fn check_min_len(what: &str, min: usize, got: usize) -> Result<()> {
    if got < min {
        return Err(DuskmeshError::DecodeError(format!(
            "{what}: expected at least {min} bytes, got {got}"
        )));
    }
    Ok(())
}

/// `(lookup_key: 32B) ‖ encrypted_payload ‖ signature(64B)`. Dummies use
/// lookup_key = all-zero. `signed_ciphertext` below is the concatenation of
/// the ciphertext and the trailing signature, matching the wire layout.
#[derive(Debug, Clone)]
pub struct LightningEnvelope {
    pub lookup_key: [u8; POINT_SIZE],
    pub signed_ciphertext: Vec<u8>,
}

impl LightningEnvelope {
    pub fn len(&self) -> usize {
        POINT_SIZE + self.signed_ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pack_into(&self, buf: &mut [u8]) -> Result<()> {
        check_len("LightningEnvelope::pack_into", self.len(), buf.len())?;
        buf[..POINT_SIZE].copy_from_slice(&self.lookup_key);
        buf[POINT_SIZE..].copy_from_slice(&self.signed_ciphertext);
        Ok(())
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len()];
        // pack_into cannot fail here because buf was sized from self.len()
        self.pack_into(&mut buf).expect("sized buffer");
        buf
    }

    pub fn is_dummy(&self) -> bool {
        self.lookup_key == [0u8; POINT_SIZE]
    }
}

/// Borrowing view over a `LightningEnvelope` read off the wire.
pub struct LightningEnvelopeView<'a> {
    pub lookup_key: [u8; POINT_SIZE],
    pub signed_ciphertext: &'a [u8],
    raw: &'a [u8],
}

impl<'a> LightningEnvelopeView<'a> {
    pub fn interpret_from(buf: &'a [u8]) -> Result<Self> {
        check_min_len("LightningEnvelopeView", POINT_SIZE + SIGNATURE_SIZE, buf.len())?;
        let mut lookup_key = [0u8; POINT_SIZE];
        lookup_key.copy_from_slice(&buf[..POINT_SIZE]);
        Ok(Self {
            lookup_key,
            signed_ciphertext: &buf[POINT_SIZE..],
            raw: buf,
        })
    }

    pub fn ciphertext(&self) -> &'a [u8] {
        &self.signed_ciphertext[..self.signed_ciphertext.len() - SIGNATURE_SIZE]
    }

    pub fn signature(&self) -> [u8; SIGNATURE_SIZE] {
        let mut sig = [0u8; SIGNATURE_SIZE];
        let start = self.signed_ciphertext.len() - SIGNATURE_SIZE;
        sig.copy_from_slice(&self.signed_ciphertext[start..]);
        sig
    }

    pub fn is_dummy(&self) -> bool {
        self.lookup_key == [0u8; POINT_SIZE]
    }

    /// The full envelope bytes, e.g. for computing a rolling stream hash.
    pub fn raw(&self) -> &'a [u8] {
        self.raw
    }
}

/// `(in_key: 32B) ‖ in_token: 48B ‖ encrypted_payload ‖ signature`.
#[derive(Debug, Clone)]
pub struct PathEstablishmentEnvelope {
    pub in_key: [u8; POINT_SIZE],
    pub in_token: [u8; TOKEN_SIZE],
    pub signed_ciphertext: Vec<u8>,
}

impl PathEstablishmentEnvelope {
    pub fn len(&self) -> usize {
        POINT_SIZE + TOKEN_SIZE + self.signed_ciphertext.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pack_into(&self, buf: &mut [u8]) -> Result<()> {
        check_len("PathEstablishmentEnvelope::pack_into", self.len(), buf.len())?;
        let mut pos = 0;
        buf[pos..pos + POINT_SIZE].copy_from_slice(&self.in_key);
        pos += POINT_SIZE;
        buf[pos..pos + TOKEN_SIZE].copy_from_slice(&self.in_token);
        pos += TOKEN_SIZE;
        buf[pos..].copy_from_slice(&self.signed_ciphertext);
        Ok(())
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len()];
        self.pack_into(&mut buf).expect("sized buffer");
        buf
    }
}

pub struct PathEstablishmentEnvelopeView<'a> {
    pub in_key: [u8; POINT_SIZE],
    pub in_token: [u8; TOKEN_SIZE],
    pub signed_ciphertext: &'a [u8],
}

impl<'a> PathEstablishmentEnvelopeView<'a> {
    pub fn interpret_from(buf: &'a [u8]) -> Result<Self> {
        check_min_len(
            "PathEstablishmentEnvelopeView",
            POINT_SIZE + TOKEN_SIZE + SIGNATURE_SIZE,
            buf.len(),
        )?;
        let mut in_key = [0u8; POINT_SIZE];
        in_key.copy_from_slice(&buf[..POINT_SIZE]);
        let mut in_token = [0u8; TOKEN_SIZE];
        in_token.copy_from_slice(&buf[POINT_SIZE..POINT_SIZE + TOKEN_SIZE]);
        Ok(Self {
            in_key,
            in_token,
            signed_ciphertext: &buf[POINT_SIZE + TOKEN_SIZE..],
        })
    }

    pub fn ciphertext(&self) -> &'a [u8] {
        &self.signed_ciphertext[..self.signed_ciphertext.len() - SIGNATURE_SIZE]
    }

    pub fn signature(&self) -> [u8; SIGNATURE_SIZE] {
        let mut sig = [0u8; SIGNATURE_SIZE];
        let start = self.signed_ciphertext.len() - SIGNATURE_SIZE;
        sig.copy_from_slice(&self.signed_ciphertext[start..]);
        sig
    }
}

/// The path payload obtained after decrypting a `PathEstablishmentEnvelope`:
/// `out_key ‖ out_token ‖ boomerang_envelope ‖ next_path_envelope`. The
/// boomerang length is fixed per layer and must be supplied by the caller.
#[derive(Debug, Clone)]
pub struct PathEstablishmentInfo {
    pub out_key: [u8; POINT_SIZE],
    pub out_token: [u8; TOKEN_SIZE],
    pub boomerang_envelope: Vec<u8>,
    pub next_envelope: Vec<u8>,
}

impl PathEstablishmentInfo {
    pub fn len(&self) -> usize {
        POINT_SIZE + TOKEN_SIZE + self.boomerang_envelope.len() + self.next_envelope.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut b = vec![0u8; self.len()];
        let mut pos = 0;
        b[pos..pos + POINT_SIZE].copy_from_slice(&self.out_key);
        pos += POINT_SIZE;
        b[pos..pos + TOKEN_SIZE].copy_from_slice(&self.out_token);
        pos += TOKEN_SIZE;
        b[pos..pos + self.boomerang_envelope.len()].copy_from_slice(&self.boomerang_envelope);
        pos += self.boomerang_envelope.len();
        b[pos..].copy_from_slice(&self.next_envelope);
        b
    }
}

pub struct PathEstablishmentInfoView<'a> {
    pub out_key: [u8; POINT_SIZE],
    pub out_token: [u8; TOKEN_SIZE],
    pub boomerang_envelope: &'a [u8],
    pub next_envelope: &'a [u8],
}

impl<'a> PathEstablishmentInfoView<'a> {
    pub fn interpret_from(buf: &'a [u8], boomerang_length: usize) -> Result<Self> {
        check_min_len(
            "PathEstablishmentInfoView",
            POINT_SIZE + TOKEN_SIZE + boomerang_length,
            buf.len(),
        )?;
        let mut out_key = [0u8; POINT_SIZE];
        out_key.copy_from_slice(&buf[..POINT_SIZE]);
        let mut out_token = [0u8; TOKEN_SIZE];
        out_token.copy_from_slice(&buf[POINT_SIZE..POINT_SIZE + TOKEN_SIZE]);
        let mut pos = POINT_SIZE + TOKEN_SIZE;
        let boomerang_envelope = &buf[pos..pos + boomerang_length];
        pos += boomerang_length;
        let next_envelope = &buf[pos..];
        Ok(Self {
            out_key,
            out_token,
            boomerang_envelope,
            next_envelope,
        })
    }
}

/// `anonymous_verification_key ‖ signature_over_payload ‖ payload`, the
/// terminal envelope delivered to (or from) an anytrust group's trustee
/// router.
#[derive(Debug, Clone)]
pub struct FinalLightningMessage {
    pub anonymous_verification_key: [u8; POINT_SIZE],
    pub signature: [u8; SIGNATURE_SIZE],
    pub message: Vec<u8>,
}

impl FinalLightningMessage {
    pub fn len(&self) -> usize {
        POINT_SIZE + SIGNATURE_SIZE + self.message.len()
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pack_into(&self, buf: &mut [u8]) -> Result<()> {
        check_len("FinalLightningMessage::pack_into", self.len(), buf.len())?;
        let mut pos = 0;
        buf[pos..pos + POINT_SIZE].copy_from_slice(&self.anonymous_verification_key);
        pos += POINT_SIZE;
        buf[pos..pos + SIGNATURE_SIZE].copy_from_slice(&self.signature);
        pos += SIGNATURE_SIZE;
        buf[pos..].copy_from_slice(&self.message);
        Ok(())
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.len()];
        self.pack_into(&mut buf).expect("sized buffer");
        buf
    }
}

pub struct FinalLightningMessageView<'a> {
    pub anonymous_verification_key: [u8; POINT_SIZE],
    pub signature: [u8; SIGNATURE_SIZE],
    pub message: &'a [u8],
}

impl<'a> FinalLightningMessageView<'a> {
    pub fn interpret_from(buf: &'a [u8]) -> Result<Self> {
        check_min_len(
            "FinalLightningMessageView",
            POINT_SIZE + SIGNATURE_SIZE,
            buf.len(),
        )?;
        let mut key = [0u8; POINT_SIZE];
        key.copy_from_slice(&buf[..POINT_SIZE]);
        let mut sig = [0u8; SIGNATURE_SIZE];
        sig.copy_from_slice(&buf[POINT_SIZE..POINT_SIZE + SIGNATURE_SIZE]);
        Ok(Self {
            anonymous_verification_key: key,
            signature: sig,
            message: &buf[POINT_SIZE + SIGNATURE_SIZE..],
        })
    }
}

/// `anonymous_verification_key ‖ token`, collected per-path by the
/// checkpoint sender into the group's shuffle buffer.
#[derive(Debug, Clone)]
pub struct CheckpointRequest {
    pub anonymous_verification_key: [u8; POINT_SIZE],
    pub token: [u8; TOKEN_SIZE],
}

impl CheckpointRequest {
    pub const LEN: usize = POINT_SIZE + TOKEN_SIZE;

    pub fn len(&self) -> usize {
        Self::LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pack_into(&self, buf: &mut [u8]) -> Result<()> {
        check_len("CheckpointRequest::pack_into", Self::LEN, buf.len())?;
        buf[..POINT_SIZE].copy_from_slice(&self.anonymous_verification_key);
        buf[POINT_SIZE..].copy_from_slice(&self.token);
        Ok(())
    }

    pub fn interpret_from(buf: &[u8]) -> Result<Self> {
        check_len("CheckpointRequest::interpret_from", Self::LEN, buf.len())?;
        let mut key = [0u8; POINT_SIZE];
        key.copy_from_slice(&buf[..POINT_SIZE]);
        let mut token = [0u8; TOKEN_SIZE];
        token.copy_from_slice(&buf[POINT_SIZE..]);
        Ok(Self {
            anonymous_verification_key: key,
            token,
        })
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        self.pack_into(&mut buf).expect("sized buffer");
        buf
    }
}

/// `lookup_key ‖ partial_point` — a single responder's contribution toward
/// reconstructing the group-shared secret for one path.
#[derive(Debug, Clone)]
pub struct CheckpointResponse {
    pub lookup_key: [u8; POINT_SIZE],
    pub partial_point: [u8; POINT_SIZE],
}

impl CheckpointResponse {
    pub const LEN: usize = POINT_SIZE + POINT_SIZE;

    pub fn len(&self) -> usize {
        Self::LEN
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pack_into(&self, buf: &mut [u8]) -> Result<()> {
        check_len("CheckpointResponse::pack_into", Self::LEN, buf.len())?;
        buf[..POINT_SIZE].copy_from_slice(&self.lookup_key);
        buf[POINT_SIZE..].copy_from_slice(&self.partial_point);
        Ok(())
    }

    pub fn interpret_from(buf: &[u8]) -> Result<Self> {
        check_len("CheckpointResponse::interpret_from", Self::LEN, buf.len())?;
        let mut lookup_key = [0u8; POINT_SIZE];
        lookup_key.copy_from_slice(&buf[..POINT_SIZE]);
        let mut partial_point = [0u8; POINT_SIZE];
        partial_point.copy_from_slice(&buf[POINT_SIZE..]);
        Ok(Self {
            lookup_key,
            partial_point,
        })
    }

    pub fn marshal(&self) -> Vec<u8> {
        let mut buf = vec![0u8; Self::LEN];
        self.pack_into(&mut buf).expect("sized buffer");
        buf
    }
}

/// Packs the domain-separated message a blind-signature token signs:
/// `round ‖ layer ‖ server ‖ key`, matching the path-establishment parser's
/// token verification step (§4.H).
pub fn token_content(round: u32, layer: u32, server: u32, key: &[u8; POINT_SIZE]) -> Vec<u8> {
    let mut b = vec![0u8; 12 + POINT_SIZE];
    b[0..4].copy_from_slice(&round.to_le_bytes());
    b[4..8].copy_from_slice(&layer.to_le_bytes());
    b[8..12].copy_from_slice(&server.to_le_bytes());
    b[12..].copy_from_slice(key);
    b
}
