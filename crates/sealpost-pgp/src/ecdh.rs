//! Session key wrap and unwrap: ECDH over Curve25519 (RFC 6637).
//!
//! A fresh ephemeral X25519 share is combined with the recipient's point;
//! the shared secret feeds a one-step concatenation KDF whose output keys
//! an AES key wrap (RFC 3394) over the padded session key payload.
//!
//! # Security
//!
//! - A fresh ephemeral secret per message makes the wrap non-deterministic
//! - The KDF binds the recipient's curve OID, KDF parameters, and
//!   fingerprint, so a wrap cannot be replayed against a different key
//! - Non-contributory (small-order) peer points are rejected
//! - Shared secrets and KEKs are zeroized after use

use aes::{Aes128, Aes192, Aes256, cipher::Key};
use aes_kw::{KekAes128, KekAes192, KekAes256};
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::Zeroizing;

use crate::{
    algo::{PublicKeyAlgorithm, SymmetricAlgorithm},
    error::MessageError,
    keys::{DecryptionKey, Fingerprint, RecipientKey, parser::OID_CURVE25519},
    session::SessionKey,
};

/// Fixed KDF label from RFC 6637 §8 (20 octets, space padded).
const ANONYMOUS_SENDER: &[u8; 20] = b"Anonymous Sender    ";

/// Key wrap payloads are padded to a multiple of eight octets.
const WRAP_BLOCK: usize = 8;

/// A session key wrapped to one recipient.
pub(crate) struct WrappedSessionKey {
    /// Ephemeral X25519 public share
    pub ephemeral: [u8; 32],
    /// RFC 3394 wrapped payload
    pub wrapped: Vec<u8>,
}

/// Wrap `session` under the recipient's public point.
///
/// `ephemeral_seed` becomes the per-message ephemeral secret; callers pass
/// CSPRNG output (or fixed bytes under test).
pub(crate) fn wrap_session_key(
    session: &SessionKey,
    recipient: &RecipientKey,
    ephemeral_seed: [u8; 32],
) -> Result<WrappedSessionKey, MessageError> {
    let ephemeral_secret = StaticSecret::from(ephemeral_seed);
    let ephemeral = PublicKey::from(&ephemeral_secret).to_bytes();

    let shared = ephemeral_secret.diffie_hellman(&PublicKey::from(recipient.point));
    if !shared.was_contributory() {
        return Err(MessageError::EncryptionKeyInvalid {
            reason: "recipient point is small-order".into(),
        });
    }

    let kek = derive_kek(
        shared.as_bytes(),
        recipient.fingerprint,
        recipient.kdf_hash,
        recipient.kdf_cipher,
    )?;

    // Payload: cipher id, session key, checksum, then 05-padding to the
    // wrap block size
    let mut payload = Zeroizing::new(Vec::with_capacity(40));
    payload.push(session.algorithm().to_u8());
    payload.extend_from_slice(session.as_bytes());
    payload.extend_from_slice(&session.checksum().to_be_bytes());
    let pad = WRAP_BLOCK - (payload.len() % WRAP_BLOCK);
    payload.extend(std::iter::repeat_n(pad as u8, pad));

    let wrapped = wrap(&kek, recipient.kdf_cipher, &payload)?;
    Ok(WrappedSessionKey { ephemeral, wrapped })
}

/// Unwrap a session key with the recipient's secret scalar.
///
/// Every failure mode (DH mismatch, wrap integrity, padding, checksum)
/// collapses into [`MessageError::SessionKeyUnwrap`].
pub(crate) fn unwrap_session_key(
    ephemeral: [u8; 32],
    wrapped: &[u8],
    key: &DecryptionKey,
) -> Result<SessionKey, MessageError> {
    let shared = key.scalar.diffie_hellman(&PublicKey::from(ephemeral));
    if !shared.was_contributory() {
        return Err(MessageError::SessionKeyUnwrap);
    }

    let kek = derive_kek(shared.as_bytes(), key.fingerprint, key.kdf_hash, key.kdf_cipher)?;
    let payload =
        Zeroizing::new(unwrap(&kek, key.kdf_cipher, wrapped).ok_or(MessageError::SessionKeyUnwrap)?);

    if payload.len() < 4 {
        return Err(MessageError::SessionKeyUnwrap);
    }
    let pad = payload[payload.len() - 1] as usize;
    if pad == 0 || pad > WRAP_BLOCK || pad + 3 > payload.len() {
        return Err(MessageError::SessionKeyUnwrap);
    }
    let (body, padding) = payload.split_at(payload.len() - pad);
    if padding.iter().any(|&b| b as usize != pad) {
        return Err(MessageError::SessionKeyUnwrap);
    }

    let cipher = SymmetricAlgorithm::from_u8(body[0])
        .ok_or(MessageError::UnsupportedCipher { algorithm: body[0] })?;
    let (key_bytes, checksum) = body[1..].split_at(body.len() - 3);
    let expected = u16::from_be_bytes([checksum[0], checksum[1]]);

    let session = SessionKey::from_bytes(cipher, key_bytes)
        .map_err(|_| MessageError::SessionKeyUnwrap)?;
    if session.checksum() != expected {
        return Err(MessageError::SessionKeyUnwrap);
    }
    Ok(session)
}

/// One-step concatenation KDF: hash of counter 1, the shared secret, and
/// the recipient's KDF parameter block; truncated to the KEK width.
fn derive_kek(
    shared: &[u8],
    fingerprint: Fingerprint,
    hash: crate::algo::HashAlgorithm,
    cipher: SymmetricAlgorithm,
) -> Result<Zeroizing<Vec<u8>>, MessageError> {
    let kek_len = cipher.key_size();
    if hash.digest_len() < kek_len {
        return Err(MessageError::EncryptionKeyInvalid {
            reason: format!("kdf digest ({} octets) narrower than kek ({kek_len})", hash.digest_len()),
        });
    }

    // Capacity: 4 (counter) + 32 (shared) + 56 (param block)
    let mut input = Zeroizing::new(Vec::with_capacity(92));
    input.extend_from_slice(&1u32.to_be_bytes());
    input.extend_from_slice(shared);
    input.push(OID_CURVE25519.len() as u8);
    input.extend_from_slice(OID_CURVE25519);
    input.push(PublicKeyAlgorithm::Ecdh.to_u8());
    input.extend_from_slice(&[0x03, 0x01, hash.to_u8(), cipher.to_u8()]);
    input.extend_from_slice(ANONYMOUS_SENDER);
    input.extend_from_slice(&fingerprint.0);

    let mut digest = Zeroizing::new(hash.digest(&input));
    digest.truncate(kek_len);
    Ok(digest)
}

fn wrap(
    kek: &[u8],
    cipher: SymmetricAlgorithm,
    payload: &[u8],
) -> Result<Vec<u8>, MessageError> {
    let result = match cipher {
        SymmetricAlgorithm::Aes128 => {
            KekAes128::from(Key::<Aes128>::from(to_array::<16>(kek))).wrap_vec(payload)
        },
        SymmetricAlgorithm::Aes192 => {
            KekAes192::from(Key::<Aes192>::from(to_array::<24>(kek))).wrap_vec(payload)
        },
        SymmetricAlgorithm::Aes256 => {
            KekAes256::from(Key::<Aes256>::from(to_array::<32>(kek))).wrap_vec(payload)
        },
    };
    // INVARIANT: the payload is padded to the wrap block size above, the
    // only input condition RFC 3394 wrapping can reject
    let Ok(wrapped) = result else {
        unreachable!("aes-kw wrap cannot fail on block-aligned input");
    };
    Ok(wrapped)
}

fn unwrap(kek: &[u8], cipher: SymmetricAlgorithm, wrapped: &[u8]) -> Option<Vec<u8>> {
    match cipher {
        SymmetricAlgorithm::Aes128 => {
            KekAes128::from(Key::<Aes128>::from(to_array::<16>(kek))).unwrap_vec(wrapped)
        },
        SymmetricAlgorithm::Aes192 => {
            KekAes192::from(Key::<Aes192>::from(to_array::<24>(kek))).unwrap_vec(wrapped)
        },
        SymmetricAlgorithm::Aes256 => {
            KekAes256::from(Key::<Aes256>::from(to_array::<32>(kek))).unwrap_vec(wrapped)
        },
    }
    .ok()
}

/// Copy a KEK slice into a fixed array.
///
/// # Panics
///
/// Panics if `bytes` is narrower than `N`; `derive_kek` guarantees the
/// width before any KEK reaches here.
fn to_array<const N: usize>(bytes: &[u8]) -> [u8; N] {
    #[allow(clippy::expect_used)]
    <[u8; N]>::try_from(&bytes[..N]).expect("invariant: kek width checked by derive_kek")
}
