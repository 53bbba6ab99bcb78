//! Encryption engine: streaming AES-CFB packet bodies.
//!
//! The encrypted payload is built incrementally: plaintext chunks are
//! hashed for the MDC, encrypted through a stateful CFB keystream, and
//! written out as partial-length packet segments. Memory use is O(chunk)
//! regardless of input size.
//!
//! Two body formats exist:
//! - [`SeipdWriter`] with integrity protection (tag 18, v1): plain CFB with
//!   a zero IV, SHA-1 MDC trailer over the whole decrypted body
//! - tag 9 without protection: the legacy CFB variant that resynchronizes
//!   the IV after the random prefix; accepted for compatibility, emitted
//!   only when integrity protection is explicitly disabled

use std::io::Write;

use aes::{Aes128, Aes192, Aes256};
use cfb_mode::{BufDecryptor, BufEncryptor, cipher::KeyIvInit as _};
use sha1::{Digest as _, Sha1};
use zeroize::Zeroizing;

use crate::{
    algo::{PublicKeyAlgorithm, SymmetricAlgorithm},
    ecdh,
    error::MessageError,
    keys::{KeyId, RecipientKey},
    mpi::{read_mpi_fixed, write_mpi},
    packet::{PartialBodyWriter, Tag, write_packet},
    session::SessionKey,
};

/// CFB prefix: one cipher block of random plus two repeated octets.
const PREFIX_LEN: usize = 18;

/// MDC packet on the wire: fixed header 0xD3 0x14 plus a SHA-1 digest.
const MDC_LEN: usize = 22;

/// Encrypt `data` in place with AES-CFB (one-shot).
///
/// # Panics
///
/// Panics if `key` or `iv` widths do not match the cipher; callers derive
/// both at cipher width.
#[cfg(feature = "test-utils")]
#[allow(clippy::expect_used)]
pub(crate) fn cfb_encrypt_in_place(
    cipher: SymmetricAlgorithm,
    key: &[u8],
    iv: &[u8],
    data: &mut [u8],
) {
    match cipher {
        SymmetricAlgorithm::Aes128 => BufEncryptor::<Aes128>::new_from_slices(key, iv)
            .expect("invariant: key and iv widths checked by caller")
            .encrypt(data),
        SymmetricAlgorithm::Aes192 => BufEncryptor::<Aes192>::new_from_slices(key, iv)
            .expect("invariant: key and iv widths checked by caller")
            .encrypt(data),
        SymmetricAlgorithm::Aes256 => BufEncryptor::<Aes256>::new_from_slices(key, iv)
            .expect("invariant: key and iv widths checked by caller")
            .encrypt(data),
    }
}

/// Decrypt `data` in place with AES-CFB (one-shot).
///
/// # Panics
///
/// Panics if `key` or `iv` widths do not match the cipher; callers derive
/// both at cipher width.
#[allow(clippy::expect_used)]
pub(crate) fn cfb_decrypt_in_place(
    cipher: SymmetricAlgorithm,
    key: &[u8],
    iv: &[u8],
    data: &mut [u8],
) {
    match cipher {
        SymmetricAlgorithm::Aes128 => BufDecryptor::<Aes128>::new_from_slices(key, iv)
            .expect("invariant: key and iv widths checked by caller")
            .decrypt(data),
        SymmetricAlgorithm::Aes192 => BufDecryptor::<Aes192>::new_from_slices(key, iv)
            .expect("invariant: key and iv widths checked by caller")
            .decrypt(data),
        SymmetricAlgorithm::Aes256 => BufDecryptor::<Aes256>::new_from_slices(key, iv)
            .expect("invariant: key and iv widths checked by caller")
            .decrypt(data),
    }
}

/// Stateful CFB encryptor usable across chunk boundaries.
enum CfbStream {
    Aes128(Box<BufEncryptor<Aes128>>),
    Aes192(Box<BufEncryptor<Aes192>>),
    Aes256(Box<BufEncryptor<Aes256>>),
}

impl CfbStream {
    #[allow(clippy::expect_used)]
    fn new(session: &SessionKey, iv: &[u8]) -> Self {
        match session.algorithm() {
            SymmetricAlgorithm::Aes128 => Self::Aes128(Box::new(
                BufEncryptor::new_from_slices(session.as_bytes(), iv)
                    .expect("invariant: session key width matches its cipher"),
            )),
            SymmetricAlgorithm::Aes192 => Self::Aes192(Box::new(
                BufEncryptor::new_from_slices(session.as_bytes(), iv)
                    .expect("invariant: session key width matches its cipher"),
            )),
            SymmetricAlgorithm::Aes256 => Self::Aes256(Box::new(
                BufEncryptor::new_from_slices(session.as_bytes(), iv)
                    .expect("invariant: session key width matches its cipher"),
            )),
        }
    }

    fn encrypt(&mut self, data: &mut [u8]) {
        match self {
            Self::Aes128(enc) => enc.encrypt(data),
            Self::Aes192(enc) => enc.encrypt(data),
            Self::Aes256(enc) => enc.encrypt(data),
        }
    }
}

/// Streaming writer for the encrypted data packet.
///
/// Accepts plaintext through [`Write`]; ciphertext flows to the inner
/// writer as partial-length segments. With integrity protection the body
/// is a v1 SEIPD packet (tag 18) and [`finish`](Self::finish) appends the
/// MDC; without it a legacy tag 9 packet is produced.
pub struct SeipdWriter<W: Write> {
    partial: PartialBodyWriter<W>,
    cipher: CfbStream,
    mdc: Option<Sha1>,
    scratch: Vec<u8>,
}

impl<W: Write> SeipdWriter<W> {
    /// Start an encrypted body.
    ///
    /// `prefix_random` is the one-block random CFB prefix; callers pass
    /// CSPRNG output (or fixed bytes under test).
    pub fn new(
        inner: W,
        session: &SessionKey,
        integrity_protection: bool,
        prefix_random: [u8; 16],
    ) -> std::io::Result<Self> {
        let tag = if integrity_protection {
            Tag::SymEncryptedIntegrityProtected
        } else {
            Tag::SymEncryptedData
        };
        let mut partial = PartialBodyWriter::new(inner, tag);

        // Version octet of the SEIPD body is not encrypted
        if integrity_protection {
            partial.write_body(&[1])?;
        }

        let mut prefix = [0u8; PREFIX_LEN];
        prefix[..16].copy_from_slice(&prefix_random);
        prefix[16] = prefix_random[14];
        prefix[17] = prefix_random[15];

        let mut mdc = None;
        if integrity_protection {
            let mut hasher = Sha1::new();
            hasher.update(prefix);
            mdc = Some(hasher);
        }

        let zero_iv = [0u8; 16];
        let mut cipher = CfbStream::new(session, &zero_iv);
        cipher.encrypt(&mut prefix);
        partial.write_body(&prefix)?;

        // Legacy CFB resynchronization: without integrity protection the
        // data stream restarts with the last prefix ciphertext block as IV
        if !integrity_protection {
            cipher = CfbStream::new(session, &prefix[2..]);
        }

        Ok(Self { partial, cipher, mdc, scratch: Vec::new() })
    }

    /// Encrypt and emit a plaintext chunk.
    pub fn write_plaintext(&mut self, data: &[u8]) -> std::io::Result<()> {
        if let Some(mdc) = &mut self.mdc {
            mdc.update(data);
        }
        self.scratch.clear();
        self.scratch.extend_from_slice(data);
        self.cipher.encrypt(&mut self.scratch);
        self.partial.write_body(&self.scratch)
    }

    /// Append the MDC (when enabled), close the packet, and return the
    /// inner writer.
    pub fn finish(self) -> std::io::Result<W> {
        let Self { mut partial, mut cipher, mdc, mut scratch } = self;

        if let Some(mut mdc) = mdc {
            // The MDC digest covers its own packet header
            mdc.update([0xD3, 0x14]);
            let digest = mdc.finalize();

            scratch.clear();
            scratch.extend_from_slice(&[0xD3, 0x14]);
            scratch.extend_from_slice(&digest);
            cipher.encrypt(&mut scratch);
            partial.write_body(&scratch)?;
        }

        partial.finish()
    }
}

impl<W: Write> Write for SeipdWriter<W> {
    /// Plaintext in, ciphertext to the inner writer.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.write_plaintext(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Decrypt a v1 SEIPD body (tag 18): CFB with zero IV, prefix repeat
/// check, MDC verification. Returns the inner packet stream.
pub(crate) fn decrypt_seipd(
    body: &[u8],
    session: &SessionKey,
) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    let Some((&version, ciphertext)) = body.split_first() else {
        return Err(MessageError::MalformedMessage { reason: "empty encrypted body".into() });
    };
    if version != 1 {
        return Err(MessageError::MalformedMessage {
            reason: format!("seipd version {version} (expected 1)"),
        });
    }
    if ciphertext.len() < PREFIX_LEN + MDC_LEN {
        return Err(MessageError::MalformedMessage { reason: "encrypted body too short".into() });
    }

    let mut data = Zeroizing::new(ciphertext.to_vec());
    let zero_iv = [0u8; 16];
    cfb_decrypt_in_place(session.algorithm(), session.as_bytes(), &zero_iv, &mut data);

    // Prefix repeat: quick wrong-key check before the full MDC pass
    if data[14..16] != data[16..18] {
        return Err(MessageError::IntegrityCheckFailed);
    }

    let mdc_start = data.len() - MDC_LEN;
    if data[mdc_start] != 0xD3 || data[mdc_start + 1] != 0x14 {
        return Err(MessageError::IntegrityCheckFailed);
    }
    let digest = Sha1::digest(&data[..mdc_start + 2]);
    if digest.as_slice() != &data[mdc_start + 2..] {
        return Err(MessageError::IntegrityCheckFailed);
    }

    Ok(Zeroizing::new(data[PREFIX_LEN..mdc_start].to_vec()))
}

/// Decrypt a legacy tag 9 body: CFB with resynchronization after the
/// prefix, no integrity protection beyond the prefix repeat.
pub(crate) fn decrypt_sed(
    body: &[u8],
    session: &SessionKey,
) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    if body.len() < PREFIX_LEN {
        return Err(MessageError::MalformedMessage { reason: "encrypted body too short".into() });
    }

    let zero_iv = [0u8; 16];
    let mut prefix = [0u8; PREFIX_LEN];
    prefix.copy_from_slice(&body[..PREFIX_LEN]);
    cfb_decrypt_in_place(session.algorithm(), session.as_bytes(), &zero_iv, &mut prefix);
    if prefix[14..16] != prefix[16..18] {
        return Err(MessageError::IntegrityCheckFailed);
    }

    let mut data = Zeroizing::new(body[PREFIX_LEN..].to_vec());
    cfb_decrypt_in_place(
        session.algorithm(),
        session.as_bytes(),
        &body[2..PREFIX_LEN],
        &mut data,
    );
    Ok(data)
}

/// Streaming writer for a literal data packet (tag 11, format `b`).
pub struct LiteralWriter<W: Write> {
    partial: PartialBodyWriter<W>,
}

impl<W: Write> LiteralWriter<W> {
    /// Start a binary literal packet with no filename and the given
    /// modification timestamp.
    pub fn new(inner: W, timestamp: u32) -> std::io::Result<Self> {
        let mut partial = PartialBodyWriter::new(inner, Tag::LiteralData);
        partial.write_body(&[b'b', 0])?;
        partial.write_body(&timestamp.to_be_bytes())?;
        Ok(Self { partial })
    }

    /// Append literal data.
    pub fn write_data(&mut self, data: &[u8]) -> std::io::Result<()> {
        self.partial.write_body(data)
    }

    /// Close the packet and return the inner writer.
    pub fn finish(self) -> std::io::Result<W> {
        self.partial.finish()
    }
}

/// Parsed literal data packet.
pub(crate) struct LiteralData<'a> {
    /// Modification timestamp from the header
    pub timestamp: u32,
    /// The raw data octets (what signatures cover)
    pub data: &'a [u8],
}

/// Parse a literal data packet body.
pub(crate) fn parse_literal(body: &[u8]) -> Result<LiteralData<'_>, MessageError> {
    if body.len() < 6 {
        return Err(MessageError::MalformedMessage { reason: "literal packet too short".into() });
    }
    let format = body[0];
    if !matches!(format, b'b' | b't' | b'u') {
        return Err(MessageError::MalformedMessage {
            reason: format!("unknown literal format {format:#04x}"),
        });
    }
    let name_len = body[1] as usize;
    if body.len() < 6 + name_len {
        return Err(MessageError::MalformedMessage { reason: "literal packet too short".into() });
    }
    let after_name = &body[2 + name_len..];
    let timestamp = u32::from_be_bytes([after_name[0], after_name[1], after_name[2], after_name[3]]);
    Ok(LiteralData { timestamp, data: &after_name[4..] })
}

/// Build a PKESK packet (tag 1) wrapping `session` for `recipient`.
pub(crate) fn build_pkesk(
    session: &SessionKey,
    recipient: &RecipientKey,
    ephemeral_seed: [u8; 32],
) -> Result<Vec<u8>, MessageError> {
    let wrapped = ecdh::wrap_session_key(session, recipient, ephemeral_seed)?;

    let mut body = Vec::with_capacity(12 + 35 + 1 + wrapped.wrapped.len());
    body.push(3); // PKESK version
    body.extend_from_slice(&recipient.key_id().0);
    body.push(PublicKeyAlgorithm::Ecdh.to_u8());

    let mut point = [0u8; 33];
    point[0] = 0x40;
    point[1..].copy_from_slice(&wrapped.ephemeral);
    write_mpi(&mut body, &point);

    // INVARIANT: wrapped payloads are 48 octets for every profile cipher
    body.push(wrapped.wrapped.len() as u8);
    body.extend_from_slice(&wrapped.wrapped);

    let mut packet = Vec::with_capacity(body.len() + 3);
    write_packet(&mut packet, Tag::PublicKeyEncryptedSessionKey, &body);
    Ok(packet)
}

/// Parsed PKESK packet.
pub(crate) struct ParsedPkesk {
    /// Recipient key ID (all zeros means "wildcard")
    pub key_id: KeyId,
    /// Raw public-key algorithm identifier
    pub algorithm: u8,
    /// Ephemeral X25519 share
    pub ephemeral: [u8; 32],
    /// RFC 3394 wrapped session key payload
    pub wrapped: Vec<u8>,
}

/// Parse a PKESK packet body.
pub(crate) fn parse_pkesk(body: &[u8]) -> Result<ParsedPkesk, MessageError> {
    let mut input = body;
    let header = take(&mut input, 10)?;
    if header[0] != 3 {
        return Err(MessageError::MalformedMessage {
            reason: format!("pkesk version {} (expected 3)", header[0]),
        });
    }
    let mut key_id = [0u8; 8];
    key_id.copy_from_slice(&header[1..9]);
    let algorithm = header[9];

    let point: [u8; 33] = read_mpi_fixed(&mut input)?;
    if point[0] != 0x40 {
        return Err(MessageError::MalformedMessage {
            reason: "ephemeral point missing native prefix".into(),
        });
    }
    let mut ephemeral = [0u8; 32];
    ephemeral.copy_from_slice(&point[1..]);

    let wrapped_len = take(&mut input, 1)?[0] as usize;
    let wrapped = take(&mut input, wrapped_len)?.to_vec();

    Ok(ParsedPkesk { key_id: KeyId(key_id), algorithm, ephemeral, wrapped })
}

fn take<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8], MessageError> {
    if input.len() < len {
        return Err(MessageError::MalformedMessage { reason: "truncated session key packet".into() });
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketReader;

    fn test_session() -> SessionKey {
        SessionKey::from_bytes(SymmetricAlgorithm::Aes256, &[0x33; 32]).unwrap()
    }

    fn seipd_body(wire: &[u8]) -> Vec<u8> {
        let mut reader = PacketReader::new(wire);
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.tag(), Some(Tag::SymEncryptedIntegrityProtected));
        packet.body.to_vec()
    }

    #[test]
    fn seipd_round_trip() {
        let session = test_session();

        let mut wire = Vec::new();
        let mut writer = SeipdWriter::new(&mut wire, &session, true, [0xAB; 16]).unwrap();
        writer.write_plaintext(b"inner packet bytes").unwrap();
        writer.finish().unwrap();

        let inner = decrypt_seipd(&seipd_body(&wire), &session).unwrap();
        assert_eq!(inner.as_slice(), b"inner packet bytes");
    }

    #[test]
    fn seipd_streams_across_chunks() {
        let session = test_session();
        let plaintext: Vec<u8> = (0..50_000u32).map(|i| (i % 251) as u8).collect();

        let mut wire = Vec::new();
        let mut writer = SeipdWriter::new(&mut wire, &session, true, [0x01; 16]).unwrap();
        for chunk in plaintext.chunks(997) {
            writer.write_plaintext(chunk).unwrap();
        }
        writer.finish().unwrap();

        let inner = decrypt_seipd(&seipd_body(&wire), &session).unwrap();
        assert_eq!(inner.as_slice(), plaintext.as_slice());
    }

    #[test]
    fn seipd_empty_plaintext() {
        let session = test_session();

        let mut wire = Vec::new();
        let writer = SeipdWriter::new(&mut wire, &session, true, [0x02; 16]).unwrap();
        writer.finish().unwrap();

        let inner = decrypt_seipd(&seipd_body(&wire), &session).unwrap();
        assert!(inner.is_empty());
    }

    #[test]
    fn tampered_ciphertext_fails_mdc() {
        let session = test_session();

        let mut wire = Vec::new();
        let mut writer = SeipdWriter::new(&mut wire, &session, true, [0x03; 16]).unwrap();
        writer.write_plaintext(b"protect me").unwrap();
        writer.finish().unwrap();

        let mut body = seipd_body(&wire);
        let mid = body.len() / 2;
        body[mid] ^= 0x01;

        let result = decrypt_seipd(&body, &session);
        assert!(matches!(result, Err(MessageError::IntegrityCheckFailed)));
    }

    #[test]
    fn wrong_session_key_fails_prefix_check() {
        let session = test_session();
        let wrong = SessionKey::from_bytes(SymmetricAlgorithm::Aes256, &[0x44; 32]).unwrap();

        let mut wire = Vec::new();
        let mut writer = SeipdWriter::new(&mut wire, &session, true, [0x04; 16]).unwrap();
        writer.write_plaintext(b"secret").unwrap();
        writer.finish().unwrap();

        let result = decrypt_seipd(&seipd_body(&wire), &wrong);
        assert!(matches!(result, Err(MessageError::IntegrityCheckFailed)));
    }

    #[test]
    fn sed_round_trip_with_resync() {
        let session = test_session();

        let mut wire = Vec::new();
        let mut writer = SeipdWriter::new(&mut wire, &session, false, [0x05; 16]).unwrap();
        writer.write_plaintext(b"legacy body").unwrap();
        writer.finish().unwrap();

        let mut reader = PacketReader::new(&wire);
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.tag(), Some(Tag::SymEncryptedData));

        let inner = decrypt_sed(&packet.body, &session).unwrap();
        assert_eq!(inner.as_slice(), b"legacy body");
    }

    #[test]
    fn literal_round_trip() {
        let mut wire = Vec::new();
        let mut writer = LiteralWriter::new(&mut wire, 1_700_000_000).unwrap();
        writer.write_data(b"the payload").unwrap();
        writer.finish().unwrap();

        let mut reader = PacketReader::new(&wire);
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.tag(), Some(Tag::LiteralData));

        let literal = parse_literal(&packet.body).unwrap();
        assert_eq!(literal.timestamp, 1_700_000_000);
        assert_eq!(literal.data, b"the payload");
    }

    #[test]
    fn literal_with_filename_is_parsed() {
        // format 'b', 4-octet name, timestamp, data
        let mut body = vec![b'b', 4];
        body.extend_from_slice(b"name");
        body.extend_from_slice(&7u32.to_be_bytes());
        body.extend_from_slice(b"data");

        let literal = parse_literal(&body).unwrap();
        assert_eq!(literal.timestamp, 7);
        assert_eq!(literal.data, b"data");
    }

    #[test]
    fn pkesk_round_trip() {
        use x25519_dalek::{PublicKey, StaticSecret};

        use crate::{algo::HashAlgorithm, keys::Fingerprint};

        let scalar = StaticSecret::from([21u8; 32]);
        let recipient = RecipientKey {
            fingerprint: Fingerprint([6u8; 20]),
            created: 0,
            point: PublicKey::from(&scalar).to_bytes(),
            kdf_hash: HashAlgorithm::Sha256,
            kdf_cipher: SymmetricAlgorithm::Aes256,
        };

        let session = test_session();
        let wire = build_pkesk(&session, &recipient, [9u8; 32]).unwrap();

        let mut reader = PacketReader::new(&wire);
        let packet = reader.next_packet().unwrap().unwrap();
        assert_eq!(packet.tag(), Some(Tag::PublicKeyEncryptedSessionKey));

        let pkesk = parse_pkesk(&packet.body).unwrap();
        assert_eq!(pkesk.key_id, recipient.key_id());
        assert_eq!(pkesk.algorithm, PublicKeyAlgorithm::Ecdh.to_u8());
        assert_eq!(pkesk.wrapped.len(), 48);
    }
}
