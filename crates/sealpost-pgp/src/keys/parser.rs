//! Packet-level key parsing: public fields, curve OIDs, and secret
//! material unlock (S2K + CFB + checksum).

use sha1::{Digest as _, Sha1};
use zeroize::Zeroizing;

use super::{Fingerprint, KeyError};
use crate::{
    algo::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm},
    encrypt::cfb_decrypt_in_place,
    mpi::read_mpi_fixed,
    s2k::S2k,
};

/// Curve OID for Ed25519 (1.3.6.1.4.1.11591.15.1).
pub(crate) const OID_ED25519: &[u8] = &[0x2B, 0x06, 0x01, 0x04, 0x01, 0xDA, 0x47, 0x0F, 0x01];

/// Curve OID for Curve25519 (1.3.6.1.4.1.3029.1.5.1).
pub(crate) const OID_CURVE25519: &[u8] =
    &[0x2B, 0x06, 0x01, 0x04, 0x01, 0x97, 0x55, 0x01, 0x05, 0x01];

/// Public material of a parsed key packet.
pub(crate) enum PublicMaterial {
    /// EdDSA signing key
    Signing {
        /// Compressed Ed25519 point
        public: [u8; 32],
    },
    /// ECDH encryption key with its provisioned KDF parameters
    Encryption {
        /// Curve25519 point
        point: [u8; 32],
        /// KDF digest from the key's parameter block
        kdf_hash: HashAlgorithm,
        /// Key-wrap cipher from the key's parameter block
        kdf_cipher: SymmetricAlgorithm,
    },
}

/// Parsed public key packet (tag 6 or 14, or the public prefix of 5/7).
pub(crate) struct ParsedPublicKey {
    pub(crate) created: u32,
    pub(crate) fingerprint: Fingerprint,
    pub(crate) material: PublicMaterial,
}

/// Secret scalar paired with the public material's algorithm.
pub(crate) enum SecretMaterial {
    /// Ed25519 seed
    Signing {
        /// 32-octet seed, big-endian MPI on the wire
        seed: Zeroizing<[u8; 32]>,
    },
    /// X25519 scalar
    Encryption {
        /// Little-endian scalar (wire MPI is big-endian)
        scalar: Zeroizing<[u8; 32]>,
    },
}

/// Parsed and unlocked secret key packet (tag 5 or 7).
pub(crate) struct ParsedSecretKey {
    pub(crate) public: ParsedPublicKey,
    pub(crate) secret: SecretMaterial,
}

/// Parse a public key packet body.
pub(crate) fn parse_public_key(body: &[u8]) -> Result<ParsedPublicKey, KeyError> {
    let (parsed, _rest) = parse_public_fields(body)?;
    Ok(parsed)
}

/// Parse the public fields of a key packet, returning the remainder (the
/// secret portion for tags 5/7, empty for 6/14).
fn parse_public_fields(body: &[u8]) -> Result<(ParsedPublicKey, &[u8]), KeyError> {
    let mut input = body;

    let version = take_one(&mut input)?;
    if version != 4 {
        return Err(KeyError::UnsupportedVersion { version });
    }
    let created = take_u32(&mut input)?;
    let algorithm_id = take_one(&mut input)?;
    let algorithm = PublicKeyAlgorithm::from_u8(algorithm_id)
        .ok_or(KeyError::UnsupportedAlgorithm { algorithm: algorithm_id })?;

    let material = match algorithm {
        PublicKeyAlgorithm::EdDsaLegacy => {
            expect_oid(&mut input, OID_ED25519)?;
            PublicMaterial::Signing { public: read_native_point(&mut input)? }
        },
        PublicKeyAlgorithm::Ecdh => {
            expect_oid(&mut input, OID_CURVE25519)?;
            let point = read_native_point(&mut input)?;
            let (kdf_hash, kdf_cipher) = read_kdf_parameters(&mut input)?;
            PublicMaterial::Encryption { point, kdf_hash, kdf_cipher }
        },
    };

    // v4 fingerprint: SHA-1 over 0x99, two-octet length, public body
    let consumed = body.len() - input.len();
    let mut hasher = Sha1::new();
    hasher.update([0x99]);
    hasher.update((consumed as u16).to_be_bytes());
    hasher.update(&body[..consumed]);
    let fingerprint = Fingerprint(hasher.finalize().into());

    Ok((ParsedPublicKey { created, fingerprint, material }, input))
}

/// Parse a secret key packet body, unlocking protected material.
pub(crate) fn parse_secret_key(
    body: &[u8],
    passphrase: Option<&str>,
) -> Result<ParsedSecretKey, KeyError> {
    let (public, mut rest) = parse_public_fields(body)?;
    let usage = take_one(&mut rest)?;

    let cleartext: Zeroizing<Vec<u8>> = match usage {
        // Unprotected: MPI data followed by a two-octet sum
        0 => {
            if rest.len() < 2 {
                return Err(KeyError::Malformed { reason: "truncated secret key data".into() });
            }
            let (data, trailer) = rest.split_at(rest.len() - 2);
            let expected = u16::from_be_bytes([trailer[0], trailer[1]]);
            if octet_sum(data) != expected {
                return Err(KeyError::Malformed { reason: "secret key checksum mismatch".into() });
            }
            Zeroizing::new(data.to_vec())
        },
        // Protected: S2K-derived key, CFB encryption, SHA-1 (254) or
        // two-octet (255) trailer over the cleartext
        254 | 255 => {
            let cipher_id = take_one(&mut rest)?;
            let cipher = SymmetricAlgorithm::from_u8(cipher_id)
                .ok_or(KeyError::UnsupportedAlgorithm { algorithm: cipher_id })?;
            let s2k = S2k::parse(&mut rest)?;
            let iv = take_bytes(&mut rest, cipher.block_size())?;
            let Some(passphrase) = passphrase else {
                return Err(KeyError::PassphraseRequired);
            };

            let key = s2k.derive(passphrase.as_bytes(), cipher.key_size());
            let mut data = Zeroizing::new(rest.to_vec());
            cfb_decrypt_in_place(cipher, &key, iv, &mut data);

            let trailer_len = if usage == 254 { 20 } else { 2 };
            if data.len() < trailer_len {
                return Err(KeyError::Malformed { reason: "truncated secret key data".into() });
            }
            let split = data.len() - trailer_len;
            let (clear, trailer) = data.split_at(split);
            let ok = if usage == 254 {
                Sha1::digest(clear).as_slice() == trailer
            } else {
                octet_sum(clear) == u16::from_be_bytes([trailer[0], trailer[1]])
            };
            if !ok {
                return Err(KeyError::InvalidPassphrase);
            }
            Zeroizing::new(clear.to_vec())
        },
        other => {
            return Err(KeyError::Malformed {
                reason: format!("unsupported secret key protection mode {other}"),
            });
        },
    };

    let mut clear = cleartext.as_slice();
    let secret = match &public.material {
        PublicMaterial::Signing { .. } => {
            let seed: [u8; 32] = read_mpi_fixed(&mut clear)
                .map_err(|_| KeyError::Malformed { reason: "bad eddsa secret mpi".into() })?;
            SecretMaterial::Signing { seed: Zeroizing::new(seed) }
        },
        PublicMaterial::Encryption { .. } => {
            // Wire MPI is big-endian; X25519 wants little-endian
            let mut scalar: [u8; 32] = read_mpi_fixed(&mut clear)
                .map_err(|_| KeyError::Malformed { reason: "bad ecdh secret mpi".into() })?;
            scalar.reverse();
            SecretMaterial::Encryption { scalar: Zeroizing::new(scalar) }
        },
    };

    Ok(ParsedSecretKey { public, secret })
}

/// Read a one-octet-length curve OID and require it to match.
fn expect_oid(input: &mut &[u8], expected: &[u8]) -> Result<(), KeyError> {
    let len = take_one(input)? as usize;
    let oid = take_bytes(input, len)?;
    if oid != expected {
        return Err(KeyError::UnsupportedCurve { oid: to_hex(oid) });
    }
    Ok(())
}

/// Read an MPI-wrapped native point: 0x40 prefix plus 32 octets.
fn read_native_point(input: &mut &[u8]) -> Result<[u8; 32], KeyError> {
    let wrapped: [u8; 33] = read_mpi_fixed(input)
        .map_err(|_| KeyError::Malformed { reason: "bad curve point mpi".into() })?;
    if wrapped[0] != 0x40 {
        return Err(KeyError::Malformed { reason: "curve point missing native prefix".into() });
    }
    let mut point = [0u8; 32];
    point.copy_from_slice(&wrapped[1..]);
    Ok(point)
}

/// Read ECDH KDF parameters: size octet, reserved 0x01, hash, cipher.
fn read_kdf_parameters(
    input: &mut &[u8],
) -> Result<(HashAlgorithm, SymmetricAlgorithm), KeyError> {
    let size = take_one(input)? as usize;
    let fields = take_bytes(input, size)?;
    if fields.len() < 3 || fields[0] != 0x01 {
        return Err(KeyError::Malformed { reason: "bad ecdh kdf parameters".into() });
    }
    let hash = HashAlgorithm::from_u8(fields[1])
        .ok_or(KeyError::UnsupportedAlgorithm { algorithm: fields[1] })?;
    let cipher = SymmetricAlgorithm::from_u8(fields[2])
        .ok_or(KeyError::UnsupportedAlgorithm { algorithm: fields[2] })?;
    Ok((hash, cipher))
}

fn take_one(input: &mut &[u8]) -> Result<u8, KeyError> {
    let Some(&byte) = input.first() else {
        return Err(KeyError::Malformed { reason: "truncated key packet".into() });
    };
    *input = &input[1..];
    Ok(byte)
}

fn take_u32(input: &mut &[u8]) -> Result<u32, KeyError> {
    let bytes = take_bytes(input, 4)?;
    Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn take_bytes<'a>(input: &mut &'a [u8], len: usize) -> Result<&'a [u8], KeyError> {
    if input.len() < len {
        return Err(KeyError::Malformed { reason: "truncated key packet".into() });
    }
    let (head, tail) = input.split_at(len);
    *input = tail;
    Ok(head)
}

fn octet_sum(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
}

fn to_hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        // INVARIANT: writing to a String cannot fail
        let _ = write!(out, "{byte:02x}");
    }
    out
}
