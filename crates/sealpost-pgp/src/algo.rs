//! Algorithm identifiers from the OpenPGP registry.
//!
//! Only the algorithms in the Sealpost profile are representable. Registry
//! values outside the profile surface as `Unsupported*` errors at the parse
//! boundary, carrying the raw identifier for diagnostics.

use sha1::{Digest as _, Sha1};
use sha2::{Sha256, Sha512};

/// Public-key algorithms (RFC 9580 §9.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicKeyAlgorithm {
    /// ECDH over Curve25519 (18), used for session key wrap.
    Ecdh,
    /// EdDSA legacy (22), Ed25519 signatures.
    EdDsaLegacy,
}

impl PublicKeyAlgorithm {
    /// Registry identifier.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Ecdh => 18,
            Self::EdDsaLegacy => 22,
        }
    }

    /// Parse a registry identifier; `None` for algorithms outside the
    /// profile (RSA, DSA, ElGamal, ECDSA, ...).
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            18 => Some(Self::Ecdh),
            22 => Some(Self::EdDsaLegacy),
            _ => None,
        }
    }
}

/// Symmetric cipher algorithms (RFC 9580 §9.3).
///
/// All profile ciphers are AES variants with a 16-byte block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymmetricAlgorithm {
    /// AES with a 128-bit key (7).
    Aes128,
    /// AES with a 192-bit key (8).
    Aes192,
    /// AES with a 256-bit key (9). The cipher Sealpost emits.
    Aes256,
}

impl SymmetricAlgorithm {
    /// Registry identifier.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Aes128 => 7,
            Self::Aes192 => 8,
            Self::Aes256 => 9,
        }
    }

    /// Parse a registry identifier; `None` outside the AES family.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            7 => Some(Self::Aes128),
            8 => Some(Self::Aes192),
            9 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// Key size in bytes.
    pub fn key_size(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }

    /// Cipher block size in bytes (16 for the whole AES family).
    pub fn block_size(self) -> usize {
        16
    }
}

/// Hash algorithms (RFC 9580 §9.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    /// SHA-1 (2). Format-mandated for the MDC and v4 fingerprints; accepted
    /// in legacy S2K specifiers, never chosen for signatures.
    Sha1,
    /// SHA-256 (8). The signature and KDF hash of the profile.
    Sha256,
    /// SHA-512 (10). Accepted in key KDF parameters.
    Sha512,
}

impl HashAlgorithm {
    /// Registry identifier.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::Sha1 => 2,
            Self::Sha256 => 8,
            Self::Sha512 => 10,
        }
    }

    /// Parse a registry identifier; `None` outside the profile.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            2 => Some(Self::Sha1),
            8 => Some(Self::Sha256),
            10 => Some(Self::Sha512),
            _ => None,
        }
    }

    /// Digest size in bytes.
    pub fn digest_len(self) -> usize {
        match self {
            Self::Sha1 => 20,
            Self::Sha256 => 32,
            Self::Sha512 => 64,
        }
    }

    /// One-shot digest of `data`.
    pub fn digest(self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_round_trip() {
        for alg in [PublicKeyAlgorithm::Ecdh, PublicKeyAlgorithm::EdDsaLegacy] {
            assert_eq!(PublicKeyAlgorithm::from_u8(alg.to_u8()), Some(alg));
        }
        for alg in
            [SymmetricAlgorithm::Aes128, SymmetricAlgorithm::Aes192, SymmetricAlgorithm::Aes256]
        {
            assert_eq!(SymmetricAlgorithm::from_u8(alg.to_u8()), Some(alg));
        }
        for alg in [HashAlgorithm::Sha1, HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert_eq!(HashAlgorithm::from_u8(alg.to_u8()), Some(alg));
        }
    }

    #[test]
    fn rsa_is_outside_the_profile() {
        assert_eq!(PublicKeyAlgorithm::from_u8(1), None);
    }

    #[test]
    fn digest_lengths_match_output() {
        for alg in [HashAlgorithm::Sha1, HashAlgorithm::Sha256, HashAlgorithm::Sha512] {
            assert_eq!(alg.digest(b"abc").len(), alg.digest_len());
        }
    }

    #[test]
    fn sha256_known_vector() {
        let digest = HashAlgorithm::Sha256.digest(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
