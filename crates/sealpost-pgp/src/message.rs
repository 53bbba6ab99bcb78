//! Message assembly: the top-level encrypt-and-sign operation and its
//! inverse.
//!
//! Packet order is deterministic: the session key packet strictly precedes
//! the encrypted data packet. Inside the encrypted body the layout is
//! one-pass signature, literal data, signature, so a streaming verifier
//! can hash while reading.
//!
//! Armor is applied at the boundary as a pure transform; nothing
//! cryptographic depends on it.

use std::io::{Read, Write};

use crate::{
    algo::{HashAlgorithm, SymmetricAlgorithm},
    armor::{ArmorWriter, BlockKind, is_armored},
    ecdh,
    encrypt::{
        LiteralWriter, SeipdWriter, decrypt_sed, decrypt_seipd, parse_literal, parse_pkesk,
    },
    error::MessageError,
    keys::{DecryptionKey, KeyId, RecipientKey, SignerKey, VerifierKey},
    packet::{PacketReader, Tag},
    session::SessionKey,
    sign::{
        SignatureHasher, build_signature, one_pass_packet, parse_one_pass, parse_signature,
        verify_signature,
    },
};

/// Read chunk size for streaming input.
const READ_CHUNK: usize = 8192;

/// Output shaping for [`encrypt_and_sign`].
#[derive(Debug, Clone, Copy)]
pub struct EncryptOptions {
    /// ASCII-armor the message (default on)
    pub armor: bool,
    /// Emit a v1 SEIPD packet with MDC; disabling falls back to the legacy
    /// unprotected packet (default on)
    pub integrity_protection: bool,
}

impl Default for EncryptOptions {
    fn default() -> Self {
        Self { armor: true, integrity_protection: true }
    }
}

/// Metadata about a produced message.
#[derive(Debug, Clone, Copy)]
pub struct EncryptSummary {
    /// Plaintext octets consumed
    pub plaintext_len: u64,
    /// Message octets written (armored length when armor is on)
    pub message_len: u64,
    /// Encryption key the session key was wrapped to
    pub recipient: KeyId,
    /// Signing key
    pub signer: KeyId,
}

/// Metadata about a decrypted and verified message.
#[derive(Debug, Clone, Copy)]
pub struct DecryptSummary {
    /// Plaintext octets recovered
    pub plaintext_len: u64,
    /// Key that produced the embedded signature
    pub signer: KeyId,
    /// Signature creation time, when present
    pub signature_created_at: Option<u32>,
    /// Modification timestamp from the literal data header
    pub literal_timestamp: u32,
}

/// Encrypt `source` to `recipient` and sign with `signer`, writing the
/// OpenPGP message to `sink`.
///
/// Input is consumed in chunks; memory use is independent of input size.
/// `created_at` is wall-clock seconds since the Unix epoch for the
/// signature packet (the caller owns the clock).
///
/// The signature is computed over the plaintext and travels inside the
/// encrypted body: tampering is only detectable after decryption, and the
/// signature itself is confidential to the recipient.
pub fn encrypt_and_sign(
    source: &mut impl Read,
    sink: &mut impl Write,
    recipient: &RecipientKey,
    signer: &SignerKey,
    created_at: u64,
    options: &EncryptOptions,
) -> Result<EncryptSummary, MessageError> {
    let mut counting = CountingWriter { inner: sink, written: 0 };

    let plaintext_len = if options.armor {
        let armor = ArmorWriter::new(&mut counting, BlockKind::Message);
        let (len, armor) = write_message(armor, source, recipient, signer, created_at, options)?;
        armor.finish()?;
        len
    } else {
        let (len, _) = write_message(&mut counting, source, recipient, signer, created_at, options)?;
        len
    };

    Ok(EncryptSummary {
        plaintext_len,
        message_len: counting.written,
        recipient: recipient.key_id(),
        signer: signer.key_id(),
    })
}

/// Decrypt an OpenPGP message (armored or binary) with `decryption` and
/// verify its embedded signature against `verifier`, writing the recovered
/// plaintext to `sink`.
///
/// Nothing is written until the MDC and the signature have both verified;
/// a tampered message produces an error and no output.
pub fn decrypt_and_verify(
    source: &mut impl Read,
    sink: &mut impl Write,
    decryption: &DecryptionKey,
    verifier: &VerifierKey,
) -> Result<DecryptSummary, MessageError> {
    let mut raw = Vec::new();
    source.read_to_end(&mut raw)?;

    let binary = if is_armored(&raw) {
        let text = std::str::from_utf8(&raw).map_err(|_| MessageError::MalformedMessage {
            reason: "armored message is not valid utf-8".into(),
        })?;
        let (kind, binary) = crate::armor::decode(text)?;
        if kind != BlockKind::Message {
            return Err(MessageError::MalformedMessage {
                reason: "armored block is not a message".into(),
            });
        }
        binary
    } else {
        raw
    };

    // Outer grammar: PKESK packets, then one encrypted data packet
    let mut reader = PacketReader::new(&binary);
    let mut session: Option<SessionKey> = None;
    let mut saw_any_pkesk = false;
    let mut inner: Option<zeroize::Zeroizing<Vec<u8>>> = None;

    while let Some(packet) = reader.next_packet()? {
        match packet.tag() {
            Some(Tag::PublicKeyEncryptedSessionKey) => {
                saw_any_pkesk = true;
                let pkesk = parse_pkesk(&packet.body)?;
                let wildcard = pkesk.key_id == KeyId([0u8; 8]);
                if pkesk.key_id != decryption.key_id() && !wildcard {
                    continue;
                }
                if pkesk.algorithm != crate::algo::PublicKeyAlgorithm::Ecdh.to_u8() {
                    continue;
                }
                if session.is_none() {
                    match ecdh::unwrap_session_key(pkesk.ephemeral, &pkesk.wrapped, decryption) {
                        Ok(key) => session = Some(key),
                        // A wildcard entry for someone else fails here;
                        // keep scanning
                        Err(_) if wildcard => {},
                        Err(err) => return Err(err),
                    }
                }
            },
            Some(Tag::SymEncryptedIntegrityProtected | Tag::SymEncryptedData) => {
                let Some(session) = session.as_ref() else {
                    // Session key packets were present but none addressed
                    // the supplied key
                    if saw_any_pkesk {
                        return Err(MessageError::NoMatchingSessionKey {
                            key_id: decryption.key_id().to_string(),
                        });
                    }
                    return Err(MessageError::MalformedMessage {
                        reason: "encrypted data before any session key packet".into(),
                    });
                };
                inner = Some(if packet.tag() == Some(Tag::SymEncryptedIntegrityProtected) {
                    decrypt_seipd(&packet.body, session)?
                } else {
                    decrypt_sed(&packet.body, session)?
                });
                break;
            },
            _ => {
                return Err(MessageError::MalformedMessage {
                    reason: format!("unexpected packet tag {} in message", packet.tag),
                });
            },
        }
    }

    let Some(inner) = inner else {
        return Err(MessageError::MalformedMessage {
            reason: "no encrypted data packet in message".into(),
        });
    };

    // Inner grammar: one-pass signature, literal data, signature
    let mut reader = PacketReader::new(&inner);
    let mut one_pass = None;
    let mut literal_data: Option<Vec<u8>> = None;
    let mut literal_timestamp = 0u32;
    let mut signature = None;

    while let Some(packet) = reader.next_packet()? {
        match packet.tag() {
            Some(Tag::OnePassSignature) if one_pass.is_none() && literal_data.is_none() => {
                one_pass = Some(parse_one_pass(&packet.body)?);
            },
            Some(Tag::LiteralData) if literal_data.is_none() => {
                let literal = parse_literal(&packet.body)?;
                literal_timestamp = literal.timestamp;
                literal_data = Some(literal.data.to_vec());
            },
            Some(Tag::Signature) if literal_data.is_some() && signature.is_none() => {
                signature = Some(parse_signature(&packet.body)?);
            },
            _ => {
                return Err(MessageError::MalformedMessage {
                    reason: format!("unexpected packet tag {} in encrypted body", packet.tag),
                });
            },
        }
    }

    let Some(data) = literal_data else {
        return Err(MessageError::MalformedMessage {
            reason: "no literal data in encrypted body".into(),
        });
    };
    let Some(signature) = signature else {
        return Err(MessageError::SignatureInvalid { reason: "message is not signed".into() });
    };

    let hash = one_pass.map_or(HashAlgorithm::Sha256, |op| op.hash);
    let mut hasher = SignatureHasher::new(hash)?;
    hasher.update(&data);
    verify_signature(hasher, &signature, verifier)?;

    if let (Some(op), Some(issuer)) = (one_pass, signature.issuer()) {
        if op.key_id != issuer {
            return Err(MessageError::MalformedMessage {
                reason: "one-pass and signature packets disagree on the signer".into(),
            });
        }
    }

    sink.write_all(&data)?;

    Ok(DecryptSummary {
        plaintext_len: data.len() as u64,
        signer: signature.issuer().unwrap_or_else(|| verifier.key_id()),
        signature_created_at: signature.created_at(),
        literal_timestamp,
    })
}

/// Write the binary message: PKESK, then the encrypted body containing
/// one-pass signature, literal data, and the signature.
fn write_message<W: Write>(
    out: W,
    source: &mut impl Read,
    recipient: &RecipientKey,
    signer: &SignerKey,
    created_at: u64,
    options: &EncryptOptions,
) -> Result<(u64, W), MessageError> {
    let created = u32::try_from(created_at).unwrap_or(u32::MAX);

    let session = SessionKey::generate(SymmetricAlgorithm::Aes256);
    let mut ephemeral_seed = [0u8; 32];
    let mut prefix_random = [0u8; 16];
    #[allow(clippy::expect_used)]
    {
        getrandom::fill(&mut ephemeral_seed)
            .expect("invariant: OS RNG failure is unrecoverable - cannot encrypt securely");
        getrandom::fill(&mut prefix_random)
            .expect("invariant: OS RNG failure is unrecoverable - cannot encrypt securely");
    }

    let pkesk = crate::encrypt::build_pkesk(&session, recipient, ephemeral_seed)?;

    let mut out = out;
    out.write_all(&pkesk)?;

    let mut body =
        SeipdWriter::new(out, &session, options.integrity_protection, prefix_random)?;

    let one_pass = one_pass_packet(signer, HashAlgorithm::Sha256)?;
    body.write_plaintext(&one_pass)?;

    let mut hasher = SignatureHasher::new(HashAlgorithm::Sha256)?;
    let mut literal = LiteralWriter::new(&mut body, created)?;
    let mut plaintext_len = 0u64;
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        let read = match source.read(&mut chunk) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        };
        hasher.update(&chunk[..read]);
        literal.write_data(&chunk[..read])?;
        plaintext_len += read as u64;
    }
    literal.finish()?;

    let signature = build_signature(hasher, signer, created);
    body.write_plaintext(&signature)?;

    let out = body.finish()?;
    Ok((plaintext_len, out))
}

/// Write adapter that counts octets passed through.
struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;
    use x25519_dalek::{PublicKey, StaticSecret};

    use super::*;
    use crate::keys::Fingerprint;

    fn fixture() -> (RecipientKey, DecryptionKey, SignerKey, VerifierKey) {
        let scalar = StaticSecret::from([51u8; 32]);
        let point = PublicKey::from(&scalar).to_bytes();
        let enc_fingerprint = Fingerprint([1u8; 20]);

        let recipient = RecipientKey {
            fingerprint: enc_fingerprint,
            created: 100,
            point,
            kdf_hash: HashAlgorithm::Sha256,
            kdf_cipher: SymmetricAlgorithm::Aes256,
        };
        let decryption = DecryptionKey {
            fingerprint: enc_fingerprint,
            scalar,
            kdf_hash: HashAlgorithm::Sha256,
            kdf_cipher: SymmetricAlgorithm::Aes256,
        };

        let signing = SigningKey::from_bytes(&[52u8; 32]);
        let verifying = signing.verifying_key();
        let sign_fingerprint = Fingerprint([2u8; 20]);
        let signer = SignerKey { fingerprint: sign_fingerprint, signing };
        let verifier = VerifierKey { fingerprint: sign_fingerprint, verifying };

        (recipient, decryption, signer, verifier)
    }

    fn round_trip(plaintext: &[u8], options: &EncryptOptions) -> Vec<u8> {
        let (recipient, decryption, signer, verifier) = fixture();

        let mut message = Vec::new();
        let summary = encrypt_and_sign(
            &mut &plaintext[..],
            &mut message,
            &recipient,
            &signer,
            1_700_000_000,
            options,
        )
        .unwrap();
        assert_eq!(summary.plaintext_len, plaintext.len() as u64);
        assert_eq!(summary.message_len, message.len() as u64);

        let mut recovered = Vec::new();
        let summary =
            decrypt_and_verify(&mut message.as_slice(), &mut recovered, &decryption, &verifier)
                .unwrap();
        assert_eq!(summary.plaintext_len, plaintext.len() as u64);
        assert_eq!(summary.signature_created_at, Some(1_700_000_000));
        recovered
    }

    #[test]
    fn binary_round_trip() {
        let plaintext = b"attack at dawn";
        let options = EncryptOptions { armor: false, integrity_protection: true };
        assert_eq!(round_trip(plaintext, &options), plaintext);
    }

    #[test]
    fn armored_round_trip() {
        let plaintext = b"attack at dawn";
        let options = EncryptOptions::default();
        assert_eq!(round_trip(plaintext, &options), plaintext);
    }

    #[test]
    fn empty_plaintext_round_trip() {
        let options = EncryptOptions::default();
        assert_eq!(round_trip(b"", &options), b"");
    }

    #[test]
    fn legacy_unprotected_round_trip() {
        let plaintext = b"no mdc here";
        let options = EncryptOptions { armor: false, integrity_protection: false };
        assert_eq!(round_trip(plaintext, &options), plaintext);
    }

    #[test]
    fn large_input_round_trip() {
        let plaintext: Vec<u8> = (0..100_000u32).map(|i| (i % 241) as u8).collect();
        let options = EncryptOptions { armor: false, integrity_protection: true };
        assert_eq!(round_trip(&plaintext, &options), plaintext);
    }

    #[test]
    fn same_plaintext_produces_different_messages() {
        let (recipient, _, signer, _) = fixture();
        let options = EncryptOptions { armor: false, integrity_protection: true };

        let mut first = Vec::new();
        let mut second = Vec::new();
        encrypt_and_sign(&mut &b"same"[..], &mut first, &recipient, &signer, 1, &options).unwrap();
        encrypt_and_sign(&mut &b"same"[..], &mut second, &recipient, &signer, 1, &options).unwrap();

        // Fresh session key and ephemeral per message
        assert_ne!(first, second);
    }

    #[test]
    fn message_starts_with_session_key_packet() {
        let (recipient, _, signer, _) = fixture();
        let options = EncryptOptions { armor: false, integrity_protection: true };

        let mut message = Vec::new();
        encrypt_and_sign(&mut &b"x"[..], &mut message, &recipient, &signer, 1, &options).unwrap();

        let mut reader = PacketReader::new(&message);
        let first = reader.next_packet().unwrap().unwrap();
        assert_eq!(first.tag(), Some(Tag::PublicKeyEncryptedSessionKey));
        let second = reader.next_packet().unwrap().unwrap();
        assert_eq!(second.tag(), Some(Tag::SymEncryptedIntegrityProtected));
        assert!(reader.next_packet().unwrap().is_none());
    }

    #[test]
    fn wrong_decryption_key_is_rejected() {
        let (recipient, _, signer, verifier) = fixture();
        let options = EncryptOptions { armor: false, integrity_protection: true };

        let mut message = Vec::new();
        encrypt_and_sign(&mut &b"x"[..], &mut message, &recipient, &signer, 1, &options).unwrap();

        let wrong_scalar = StaticSecret::from([99u8; 32]);
        let wrong = DecryptionKey {
            fingerprint: Fingerprint([9u8; 20]),
            scalar: wrong_scalar,
            kdf_hash: HashAlgorithm::Sha256,
            kdf_cipher: SymmetricAlgorithm::Aes256,
        };

        let mut out = Vec::new();
        let result = decrypt_and_verify(&mut message.as_slice(), &mut out, &wrong, &verifier);
        assert!(matches!(result, Err(MessageError::NoMatchingSessionKey { .. })));
        assert!(out.is_empty(), "no output on failure");
    }

    #[test]
    fn wrong_verifier_rejects_and_writes_nothing() {
        let (recipient, decryption, signer, _) = fixture();
        let options = EncryptOptions { armor: false, integrity_protection: true };

        let mut message = Vec::new();
        encrypt_and_sign(&mut &b"x"[..], &mut message, &recipient, &signer, 1, &options).unwrap();

        let other = SigningKey::from_bytes(&[77u8; 32]);
        let wrong = VerifierKey {
            fingerprint: Fingerprint([7u8; 20]),
            verifying: other.verifying_key(),
        };

        let mut out = Vec::new();
        let result = decrypt_and_verify(&mut message.as_slice(), &mut out, &decryption, &wrong);
        assert!(matches!(result, Err(MessageError::SignatureInvalid { .. })));
        assert!(out.is_empty(), "no output on failure");
    }

    #[test]
    fn truncated_message_is_rejected() {
        let (recipient, decryption, signer, verifier) = fixture();
        let options = EncryptOptions { armor: false, integrity_protection: true };

        let mut message = Vec::new();
        encrypt_and_sign(&mut &b"hello"[..], &mut message, &recipient, &signer, 1, &options)
            .unwrap();
        message.truncate(message.len() - 5);

        let mut out = Vec::new();
        let result =
            decrypt_and_verify(&mut message.as_slice(), &mut out, &decryption, &verifier);
        assert!(result.is_err());
        assert!(out.is_empty());
    }
}
