//! String-to-key (RFC 9580 §3.7): derives the symmetric key that protects
//! secret key material from a passphrase.
//!
//! # Security
//!
//! - Deterministic: same specifier and passphrase always produce the same
//!   key (the specifier is stored alongside the protected material)
//! - Derived keys are zeroized when dropped
//! - Iterated-salted is what modern tooling writes; simple and salted are
//!   accepted for legacy keys

use sha1::{Digest as _, Sha1};
use sha2::{Sha256, Sha512};
use zeroize::Zeroizing;

use crate::{algo::HashAlgorithm, keys::KeyError};

/// An S2K specifier parsed from a secret key packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum S2k {
    /// Type 0: hash of the passphrase alone.
    Simple {
        /// Digest algorithm
        hash: HashAlgorithm,
    },
    /// Type 1: hash of salt then passphrase.
    Salted {
        /// Digest algorithm
        hash: HashAlgorithm,
        /// Eight-octet salt
        salt: [u8; 8],
    },
    /// Type 3: salt then passphrase, fed repeatedly until the decoded
    /// octet count is reached.
    IteratedSalted {
        /// Digest algorithm
        hash: HashAlgorithm,
        /// Eight-octet salt
        salt: [u8; 8],
        /// Encoded iteration count
        count_code: u8,
    },
}

impl S2k {
    /// Parse a specifier, advancing `input` past it.
    pub fn parse(input: &mut &[u8]) -> Result<Self, KeyError> {
        let kind = take_one(input)?;
        let hash_id = take_one(input)?;
        let hash = HashAlgorithm::from_u8(hash_id)
            .ok_or(KeyError::UnsupportedAlgorithm { algorithm: hash_id })?;

        match kind {
            0 => Ok(Self::Simple { hash }),
            1 => Ok(Self::Salted { hash, salt: take_salt(input)? }),
            3 => {
                let salt = take_salt(input)?;
                let count_code = take_one(input)?;
                Ok(Self::IteratedSalted { hash, salt, count_code })
            },
            other => {
                Err(KeyError::Malformed { reason: format!("unknown s2k specifier type {other}") })
            },
        }
    }

    /// Serialize the specifier.
    pub fn serialize(&self, out: &mut Vec<u8>) {
        match self {
            Self::Simple { hash } => out.extend_from_slice(&[0, hash.to_u8()]),
            Self::Salted { hash, salt } => {
                out.extend_from_slice(&[1, hash.to_u8()]);
                out.extend_from_slice(salt);
            },
            Self::IteratedSalted { hash, salt, count_code } => {
                out.extend_from_slice(&[3, hash.to_u8()]);
                out.extend_from_slice(salt);
                out.push(*count_code);
            },
        }
    }

    /// Derive `key_len` octets from `passphrase`.
    ///
    /// When the digest is narrower than the key, additional hash contexts
    /// preloaded with runs of zero octets produce the remaining material.
    pub fn derive(&self, passphrase: &[u8], key_len: usize) -> Zeroizing<Vec<u8>> {
        let hash = match self {
            Self::Simple { hash } | Self::Salted { hash, .. } | Self::IteratedSalted { hash, .. } => *hash,
        };
        let contexts = key_len.div_ceil(hash.digest_len());

        let mut key = Zeroizing::new(Vec::with_capacity(contexts * hash.digest_len()));
        for context in 0..contexts {
            let mut hasher = Hasher::new(hash);
            // Context i is preloaded with i zero octets so each context
            // produces distinct material from the same inputs
            for _ in 0..context {
                hasher.update(&[0]);
            }
            match self {
                Self::Simple { .. } => hasher.update(passphrase),
                Self::Salted { salt, .. } => {
                    hasher.update(salt);
                    hasher.update(passphrase);
                },
                Self::IteratedSalted { salt, count_code, .. } => {
                    let block_len = salt.len() + passphrase.len();
                    // At least one full salt+passphrase copy is always hashed
                    let total = decode_count(*count_code).max(block_len);
                    let mut fed = 0usize;
                    while fed + block_len <= total {
                        hasher.update(salt);
                        hasher.update(passphrase);
                        fed += block_len;
                    }
                    let mut remaining = total - fed;
                    if remaining > 0 {
                        let take = remaining.min(salt.len());
                        hasher.update(&salt[..take]);
                        remaining -= take;
                        hasher.update(&passphrase[..remaining]);
                    }
                },
            }
            key.extend_from_slice(&hasher.finalize());
        }
        key.truncate(key_len);
        key
    }
}

/// Decode an iterated-salted octet count: `(16 + low nibble) << (high
/// nibble + 6)`, ranging 1024..=65_011_712.
pub fn decode_count(code: u8) -> usize {
    (16 + (code as usize & 15)) << ((code >> 4) + 6)
}

enum Hasher {
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Box<Sha512>),
}

impl Hasher {
    fn new(hash: HashAlgorithm) -> Self {
        match hash {
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Box::new(Sha512::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha1(h) => h.update(data),
            Self::Sha256(h) => h.update(data),
            Self::Sha512(h) => h.update(data),
        }
    }

    fn finalize(self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(match self {
            Self::Sha1(h) => h.finalize().to_vec(),
            Self::Sha256(h) => h.finalize().to_vec(),
            Self::Sha512(h) => h.finalize().to_vec(),
        })
    }
}

fn take_one(input: &mut &[u8]) -> Result<u8, KeyError> {
    let Some(&byte) = input.first() else {
        return Err(KeyError::Malformed { reason: "truncated s2k specifier".into() });
    };
    *input = &input[1..];
    Ok(byte)
}

fn take_salt(input: &mut &[u8]) -> Result<[u8; 8], KeyError> {
    if input.len() < 8 {
        return Err(KeyError::Malformed { reason: "truncated s2k salt".into() });
    }
    let mut salt = [0u8; 8];
    salt.copy_from_slice(&input[..8]);
    *input = &input[8..];
    Ok(salt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iterated() -> S2k {
        S2k::IteratedSalted {
            hash: HashAlgorithm::Sha256,
            salt: *b"\x01\x02\x03\x04\x05\x06\x07\x08",
            count_code: 0x60,
        }
    }

    #[test]
    fn parse_round_trip() {
        for s2k in [
            S2k::Simple { hash: HashAlgorithm::Sha1 },
            S2k::Salted { hash: HashAlgorithm::Sha256, salt: [7u8; 8] },
            iterated(),
        ] {
            let mut wire = Vec::new();
            s2k.serialize(&mut wire);
            let mut input = wire.as_slice();
            assert_eq!(S2k::parse(&mut input).unwrap(), s2k);
            assert!(input.is_empty());
        }
    }

    #[test]
    fn derivation_is_deterministic() {
        let s2k = iterated();
        let key1 = s2k.derive(b"correct horse", 32);
        let key2 = s2k.derive(b"correct horse", 32);
        assert_eq!(key1.as_slice(), key2.as_slice());
        assert_eq!(key1.len(), 32);
    }

    #[test]
    fn different_passphrases_produce_different_keys() {
        let s2k = iterated();
        assert_ne!(s2k.derive(b"alpha", 32).as_slice(), s2k.derive(b"beta", 32).as_slice());
    }

    #[test]
    fn different_salts_produce_different_keys() {
        let a = S2k::Salted { hash: HashAlgorithm::Sha256, salt: [1u8; 8] };
        let b = S2k::Salted { hash: HashAlgorithm::Sha256, salt: [2u8; 8] };
        assert_ne!(a.derive(b"pass", 32).as_slice(), b.derive(b"pass", 32).as_slice());
    }

    #[test]
    fn key_wider_than_digest_uses_preloaded_contexts() {
        // SHA-1 produces 20 octets; a 32-octet key needs two contexts
        let s2k = S2k::Salted { hash: HashAlgorithm::Sha1, salt: [9u8; 8] };
        let key = s2k.derive(b"pass", 32);
        assert_eq!(key.len(), 32);
        // The two context outputs must differ
        assert_ne!(key[..16], key[16..]);
    }

    #[test]
    fn count_decoding_spans_the_documented_range() {
        assert_eq!(decode_count(0x00), 1024);
        assert_eq!(decode_count(0xFF), 65_011_712);
        // GnuPG's historical default
        assert_eq!(decode_count(0x60), 65536);
    }

    #[test]
    fn simple_s2k_matches_plain_digest() {
        let s2k = S2k::Simple { hash: HashAlgorithm::Sha256 };
        let key = s2k.derive(b"pass", 32);
        assert_eq!(key.as_slice(), HashAlgorithm::Sha256.digest(b"pass").as_slice());
    }

    #[test]
    fn unknown_specifier_type_is_rejected() {
        let wire = [2u8, 8];
        let mut input = &wire[..];
        assert!(matches!(S2k::parse(&mut input), Err(KeyError::Malformed { .. })));
    }

    #[test]
    fn unsupported_hash_is_rejected() {
        // MD5 (1) is outside the profile
        let wire = [0u8, 1];
        let mut input = &wire[..];
        assert!(matches!(S2k::parse(&mut input), Err(KeyError::UnsupportedAlgorithm { algorithm: 1 })));
    }
}
