//! Per-message session keys.
//!
//! A session key encrypts exactly one message and is never derived from
//! input content. Generation draws from the OS CSPRNG; the test seam
//! accepts caller-provided bytes so message construction can be exercised
//! deterministically.

use zeroize::Zeroizing;

use crate::{algo::SymmetricAlgorithm, error::MessageError};

/// A one-time symmetric key for the message body.
///
/// Held only in memory and zeroized on drop. Reuse across messages would
/// break confidentiality; nothing in this crate stores or returns a
/// session key beyond the encryption call that consumes it.
pub struct SessionKey {
    algorithm: SymmetricAlgorithm,
    key: Zeroizing<Vec<u8>>,
}

impl SessionKey {
    /// Generate a fresh session key from the OS CSPRNG.
    ///
    /// # Panics
    ///
    /// Panics if the OS RNG fails. This is intentional - a process without
    /// functioning cryptographic randomness cannot operate securely, and
    /// continuing would compromise every message.
    pub fn generate(algorithm: SymmetricAlgorithm) -> Self {
        let mut key = Zeroizing::new(vec![0u8; algorithm.key_size()]);
        #[allow(clippy::expect_used)]
        getrandom::fill(&mut key)
            .expect("invariant: OS RNG failure is unrecoverable - cannot encrypt securely");
        Self { algorithm, key }
    }

    /// Construct a session key from explicit bytes.
    ///
    /// Used by the decryption path (unwrapped keys) and by deterministic
    /// tests. Rejects bytes of the wrong width for the algorithm.
    pub fn from_bytes(algorithm: SymmetricAlgorithm, bytes: &[u8]) -> Result<Self, MessageError> {
        if bytes.len() != algorithm.key_size() {
            return Err(MessageError::MalformedMessage {
                reason: format!(
                    "session key width {} does not match cipher ({} expected)",
                    bytes.len(),
                    algorithm.key_size()
                ),
            });
        }
        Ok(Self { algorithm, key: Zeroizing::new(bytes.to_vec()) })
    }

    /// Cipher this key belongs to.
    pub fn algorithm(&self) -> SymmetricAlgorithm {
        self.algorithm
    }

    /// Raw key octets.
    pub fn as_bytes(&self) -> &[u8] {
        &self.key
    }

    /// Two-octet checksum (sum of key octets mod 65536) carried inside the
    /// wrapped session key payload.
    pub fn checksum(&self) -> u16 {
        self.key.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)))
    }
}

impl std::fmt::Debug for SessionKey {
    /// Key material is never printed.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionKey").field("algorithm", &self.algorithm).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_have_cipher_width() {
        for alg in
            [SymmetricAlgorithm::Aes128, SymmetricAlgorithm::Aes192, SymmetricAlgorithm::Aes256]
        {
            let key = SessionKey::generate(alg);
            assert_eq!(key.as_bytes().len(), alg.key_size());
        }
    }

    #[test]
    fn generated_keys_differ() {
        let a = SessionKey::generate(SymmetricAlgorithm::Aes256);
        let b = SessionKey::generate(SymmetricAlgorithm::Aes256);
        // Extremely unlikely to be equal if random
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn from_bytes_rejects_wrong_width() {
        let result = SessionKey::from_bytes(SymmetricAlgorithm::Aes256, &[0u8; 16]);
        assert!(matches!(result, Err(MessageError::MalformedMessage { .. })));
    }

    #[test]
    fn checksum_is_the_octet_sum() {
        let key = SessionKey::from_bytes(SymmetricAlgorithm::Aes128, &[1u8; 16]).unwrap();
        assert_eq!(key.checksum(), 16);

        let key = SessionKey::from_bytes(SymmetricAlgorithm::Aes128, &[0xFFu8; 16]).unwrap();
        assert_eq!(key.checksum(), 16 * 0xFF);
    }

    #[test]
    fn debug_does_not_leak_key_material() {
        let key = SessionKey::from_bytes(SymmetricAlgorithm::Aes256, &[0xABu8; 32]).unwrap();
        let printed = format!("{key:?}");
        assert!(!printed.contains("ab, ab"));
        assert!(!printed.to_lowercase().contains("abab"));
    }
}
