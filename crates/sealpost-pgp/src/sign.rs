//! Signature engine: v4 binary-document signatures with Ed25519.
//!
//! Signing is streaming: a [`SignatureHasher`] absorbs literal data chunks
//! while they are being encrypted, so arbitrarily large inputs are signed
//! in one pass without materializing the plaintext.
//!
//! The signature binds the SHA-256 digest of the data, the creation time,
//! and the signer's key identity (fingerprint subpacket plus key ID), then
//! seals the digest with Ed25519. Any plaintext modification changes the
//! digest and invalidates the signature.

use bytes::BufMut as _;
use ed25519_dalek::{Signature, Signer as _};
use sha2::{Digest as _, Sha256};

use crate::{
    algo::{HashAlgorithm, PublicKeyAlgorithm},
    error::MessageError,
    keys::{KeyId, SignerKey, VerifierKey},
    mpi::{read_mpi_fixed, write_mpi},
    packet::{Tag, write_packet},
};

/// Signature type for a binary document.
const SIG_TYPE_BINARY: u8 = 0x00;

/// Subpacket type: signature creation time.
const SUBPACKET_CREATED: u8 = 2;
/// Subpacket type: issuer key ID.
const SUBPACKET_ISSUER: u8 = 16;
/// Subpacket type: issuer fingerprint.
const SUBPACKET_ISSUER_FINGERPRINT: u8 = 33;

/// Streaming digest over the literal data of a message.
///
/// Feed plaintext chunks with [`update`](Self::update); pass the finished
/// hasher to [`build_signature`] or [`verify_signature`].
pub struct SignatureHasher {
    hasher: Sha256,
}

impl SignatureHasher {
    /// Start a digest with the given hash algorithm.
    ///
    /// Only SHA-256 is accepted for new signatures; SHA-1 is too weak and
    /// SHA-512 is reserved for key KDF parameters.
    pub fn new(hash: HashAlgorithm) -> Result<Self, MessageError> {
        if hash != HashAlgorithm::Sha256 {
            return Err(MessageError::UnsupportedHash { algorithm: hash.to_u8() });
        }
        Ok(Self { hasher: Sha256::new() })
    }

    /// Absorb a chunk of literal data.
    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    /// Finish the v4 digest: literal data, hashed signature metadata, then
    /// the fixed trailer.
    fn finalize(mut self, hashed_area: &[u8]) -> [u8; 32] {
        self.hasher.update([
            4,
            SIG_TYPE_BINARY,
            PublicKeyAlgorithm::EdDsaLegacy.to_u8(),
            HashAlgorithm::Sha256.to_u8(),
        ]);
        // INVARIANT: hashed areas built by this crate are far below u16::MAX
        self.hasher.update((hashed_area.len() as u16).to_be_bytes());
        self.hasher.update(hashed_area);
        self.hasher.update([0x04, 0xFF]);
        self.hasher.update((6 + hashed_area.len() as u32).to_be_bytes());
        self.hasher.finalize().into()
    }
}

/// Build a one-pass signature packet (tag 4).
///
/// Emitted before the literal data so a streaming verifier knows which
/// digest to run while reading.
pub fn one_pass_packet(signer: &SignerKey, hash: HashAlgorithm) -> Result<Vec<u8>, MessageError> {
    if hash != HashAlgorithm::Sha256 {
        return Err(MessageError::UnsupportedHash { algorithm: hash.to_u8() });
    }
    let mut body = Vec::with_capacity(13);
    body.push(3); // one-pass version
    body.push(SIG_TYPE_BINARY);
    body.push(hash.to_u8());
    body.push(PublicKeyAlgorithm::EdDsaLegacy.to_u8());
    body.extend_from_slice(&signer.key_id().0);
    body.push(1); // not nested: the only signature over this data

    let mut packet = Vec::with_capacity(body.len() + 2);
    write_packet(&mut packet, Tag::OnePassSignature, &body);
    Ok(packet)
}

/// Finish the digest and build the signature packet (tag 2).
///
/// `created_at` is wall-clock seconds since the Unix epoch, supplied by
/// the caller so this crate stays clock-free.
pub fn build_signature(hasher: SignatureHasher, signer: &SignerKey, created_at: u32) -> Vec<u8> {
    // Hashed subpackets: creation time and issuer fingerprint
    let mut hashed = Vec::with_capacity(29);
    hashed.extend_from_slice(&[5, SUBPACKET_CREATED]);
    hashed.extend_from_slice(&created_at.to_be_bytes());
    hashed.extend_from_slice(&[22, SUBPACKET_ISSUER_FINGERPRINT, 4]);
    hashed.extend_from_slice(&signer.fingerprint().0);

    // Unhashed: issuer key ID (redundant with the fingerprint, kept for
    // verifiers that only index by key ID)
    let mut unhashed = Vec::with_capacity(10);
    unhashed.extend_from_slice(&[9, SUBPACKET_ISSUER]);
    unhashed.extend_from_slice(&signer.key_id().0);

    let digest = hasher.finalize(&hashed);
    let signature = signer.signing.sign(&digest);
    let sig_bytes = signature.to_bytes();

    let mut body = Vec::with_capacity(6 + hashed.len() + unhashed.len() + 2 + 70);
    body.push(4); // signature version
    body.push(SIG_TYPE_BINARY);
    body.push(PublicKeyAlgorithm::EdDsaLegacy.to_u8());
    body.push(HashAlgorithm::Sha256.to_u8());
    body.put_u16(hashed.len() as u16);
    body.extend_from_slice(&hashed);
    body.put_u16(unhashed.len() as u16);
    body.extend_from_slice(&unhashed);
    body.extend_from_slice(&digest[..2]);
    write_mpi(&mut body, &sig_bytes[..32]);
    write_mpi(&mut body, &sig_bytes[32..]);

    let mut packet = Vec::with_capacity(body.len() + 3);
    write_packet(&mut packet, Tag::Signature, &body);
    packet
}

/// One-pass signature packet contents.
#[derive(Debug, Clone, Copy)]
pub struct OnePassInfo {
    /// Hash algorithm the verifier must run
    pub hash: HashAlgorithm,
    /// Key ID of the announced signer
    pub key_id: KeyId,
}

/// Parse a one-pass signature packet body.
pub fn parse_one_pass(body: &[u8]) -> Result<OnePassInfo, MessageError> {
    if body.len() < 13 {
        return Err(MessageError::MalformedMessage { reason: "one-pass packet too short".into() });
    }
    if body[0] != 3 {
        return Err(MessageError::MalformedMessage {
            reason: format!("one-pass version {} (expected 3)", body[0]),
        });
    }
    if body[1] != SIG_TYPE_BINARY {
        return Err(MessageError::MalformedMessage {
            reason: format!("one-pass signature type {:#04x}", body[1]),
        });
    }
    let hash = HashAlgorithm::from_u8(body[2])
        .ok_or(MessageError::UnsupportedHash { algorithm: body[2] })?;
    if PublicKeyAlgorithm::from_u8(body[3]) != Some(PublicKeyAlgorithm::EdDsaLegacy) {
        return Err(MessageError::SignatureInvalid {
            reason: format!("unsupported signing algorithm {}", body[3]),
        });
    }
    let mut key_id = [0u8; 8];
    key_id.copy_from_slice(&body[4..12]);
    Ok(OnePassInfo { hash, key_id: KeyId(key_id) })
}

/// A parsed v4 signature packet.
pub struct ParsedSignature {
    /// Hashed subpacket area, verbatim (rehashed during verification)
    hashed_area: Vec<u8>,
    /// Creation time from the hashed area
    created_at: Option<u32>,
    /// Issuer key ID from either subpacket area
    issuer: Option<KeyId>,
    /// Two-octet digest prefix
    left16: [u8; 2],
    /// Ed25519 signature halves
    r: [u8; 32],
    s: [u8; 32],
}

impl ParsedSignature {
    /// Signature creation time, when the subpacket was present.
    pub fn created_at(&self) -> Option<u32> {
        self.created_at
    }

    /// Announced issuer key ID, when present.
    pub fn issuer(&self) -> Option<KeyId> {
        self.issuer
    }
}

/// Parse a signature packet body.
pub fn parse_signature(body: &[u8]) -> Result<ParsedSignature, MessageError> {
    let mut input = body;

    let header = take(&mut input, 4)?;
    if header[0] != 4 {
        return Err(MessageError::MalformedMessage {
            reason: format!("signature version {} (expected 4)", header[0]),
        });
    }
    if header[1] != SIG_TYPE_BINARY {
        return Err(MessageError::MalformedMessage {
            reason: format!("signature type {:#04x}", header[1]),
        });
    }
    if PublicKeyAlgorithm::from_u8(header[2]) != Some(PublicKeyAlgorithm::EdDsaLegacy) {
        return Err(MessageError::SignatureInvalid {
            reason: format!("unsupported signing algorithm {}", header[2]),
        });
    }
    if HashAlgorithm::from_u8(header[3]) != Some(HashAlgorithm::Sha256) {
        return Err(MessageError::UnsupportedHash { algorithm: header[3] });
    }

    let hashed_len = take_u16(&mut input)? as usize;
    let hashed_area = take(&mut input, hashed_len)?.to_vec();
    let unhashed_len = take_u16(&mut input)? as usize;
    let unhashed_area = take(&mut input, unhashed_len)?;

    let hashed_info = scan_subpackets(&hashed_area, true)?;
    let unhashed_info = scan_subpackets(unhashed_area, false)?;

    let left16_bytes = take(&mut input, 2)?;
    let left16 = [left16_bytes[0], left16_bytes[1]];

    let r: [u8; 32] = read_mpi_fixed(&mut input)?;
    let s: [u8; 32] = read_mpi_fixed(&mut input)?;

    Ok(ParsedSignature {
        hashed_area,
        created_at: hashed_info.created_at,
        issuer: hashed_info.issuer.or(unhashed_info.issuer),
        left16,
        r,
        s,
    })
}

/// Verify a signature against the digest accumulated in `hasher`.
///
/// The digest prefix is checked before the curve operation so corrupted
/// messages fail fast with a precise reason.
pub fn verify_signature(
    hasher: SignatureHasher,
    signature: &ParsedSignature,
    verifier: &VerifierKey,
) -> Result<(), MessageError> {
    if let Some(issuer) = signature.issuer {
        if issuer != verifier.key_id() {
            return Err(MessageError::SignatureInvalid {
                reason: format!("signed by {issuer}, not by the supplied key"),
            });
        }
    }

    let digest = hasher.finalize(&signature.hashed_area);
    if digest[..2] != signature.left16 {
        return Err(MessageError::SignatureInvalid { reason: "digest prefix mismatch".into() });
    }

    let mut sig_bytes = [0u8; 64];
    sig_bytes[..32].copy_from_slice(&signature.r);
    sig_bytes[32..].copy_from_slice(&signature.s);
    let sig = Signature::from_bytes(&sig_bytes);

    verifier
        .verifying
        .verify_strict(&digest, &sig)
        .map_err(|_| MessageError::SignatureInvalid { reason: "eddsa verification failed".into() })
}

struct SubpacketInfo {
    created_at: Option<u32>,
    issuer: Option<KeyId>,
}

/// Walk a subpacket area, extracting the fields this crate understands.
///
/// Unknown subpackets are skipped unless marked critical in the hashed
/// area, in which case the signature must be rejected.
fn scan_subpackets(mut area: &[u8], hashed: bool) -> Result<SubpacketInfo, MessageError> {
    let mut info = SubpacketInfo { created_at: None, issuer: None };

    while !area.is_empty() {
        let first = take(&mut area, 1)?[0];
        let len = match first {
            0..=191 => first as usize,
            192..=254 => {
                let second = take(&mut area, 1)?[0];
                ((first as usize - 192) << 8) + second as usize + 192
            },
            255 => {
                let bytes = take(&mut area, 4)?;
                u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize
            },
        };
        if len == 0 {
            return Err(MessageError::MalformedMessage { reason: "empty subpacket".into() });
        }
        let content = take(&mut area, len)?;
        let critical = content[0] & 0x80 != 0;
        let sub_type = content[0] & 0x7F;
        let data = &content[1..];

        match sub_type {
            SUBPACKET_CREATED if data.len() == 4 => {
                info.created_at = Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]));
            },
            SUBPACKET_ISSUER if data.len() == 8 => {
                let mut id = [0u8; 8];
                id.copy_from_slice(data);
                info.issuer = Some(KeyId(id));
            },
            SUBPACKET_ISSUER_FINGERPRINT if data.len() == 21 && data[0] == 4 => {
                // v4 fingerprint: key ID is the tail
                let mut id = [0u8; 8];
                id.copy_from_slice(&data[13..]);
                info.issuer.get_or_insert(KeyId(id));
            },
            _ if critical && hashed => {
                return Err(MessageError::SignatureInvalid {
                    reason: format!("unknown critical subpacket {sub_type}"),
                });
            },
            _ => {},
        }
    }
    Ok(info)
}

fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8], MessageError> {
    if input.len() < len {
        return Err(MessageError::MalformedMessage { reason: "truncated signature packet".into() });
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

fn take_u16(input: &mut &[u8]) -> Result<u16, MessageError> {
    let bytes = take(input, 2)?;
    Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
}
