//! Error type for message-level operations (sign, encrypt, assemble,
//! decrypt, verify).
//!
//! Key loading has its own error type ([`crate::keys::KeyError`]); the
//! operations here take already-loaded key material.

use thiserror::Error;

use crate::{armor::ArmorError, packet::PacketError};

/// Errors from signing, encryption, assembly, and their inverses.
#[derive(Debug, Error)]
pub enum MessageError {
    /// Requested or embedded hash algorithm is outside the profile
    #[error("unsupported hash algorithm {algorithm}")]
    UnsupportedHash {
        /// Raw registry identifier
        algorithm: u8,
    },

    /// Requested or embedded symmetric cipher is outside the profile
    #[error("unsupported cipher algorithm {algorithm}")]
    UnsupportedCipher {
        /// Raw registry identifier
        algorithm: u8,
    },

    /// Recipient key material cannot be used for encryption
    /// (wrong point length, small-order point, bad KDF parameters)
    #[error("encryption key invalid: {reason}")]
    EncryptionKeyInvalid {
        /// Reason the key was rejected
        reason: String,
    },

    /// Message structure violates the expected packet grammar
    #[error("malformed message: {reason}")]
    MalformedMessage {
        /// Grammar rule that was violated
        reason: String,
    },

    /// No session key packet addressed to the supplied decryption key
    #[error("no session key packet for key {key_id}")]
    NoMatchingSessionKey {
        /// Hex key ID of the decryption key
        key_id: String,
    },

    /// Session key unwrap failed. ECDH mismatch, key-wrap integrity,
    /// padding, and checksum failures all collapse into this variant.
    #[error("session key unwrap failed")]
    SessionKeyUnwrap,

    /// CFB prefix or MDC check failed after decryption (tamper)
    #[error("integrity check failed")]
    IntegrityCheckFailed,

    /// Embedded signature does not verify against the supplied key
    #[error("signature invalid: {reason}")]
    SignatureInvalid {
        /// What failed: digest prefix, curve verification, or key mismatch
        reason: String,
    },

    /// Packet-level parse failure
    #[error(transparent)]
    Packet(#[from] PacketError),

    /// Armor decode failure
    #[error(transparent)]
    Armor(#[from] ArmorError),

    /// I/O failure while streaming plaintext or ciphertext.
    ///
    /// Not attributable to bad input; callers should treat it as a server
    /// fault, not a client error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl MessageError {
    /// Returns true if the error indicates bad input rather than an
    /// environment fault. Client errors are deterministic: retrying with
    /// the same input cannot succeed.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_is_not_a_client_error() {
        let err = MessageError::Io(std::io::Error::other("disk gone"));
        assert!(!err.is_client_error());
    }

    #[test]
    fn tamper_is_a_client_error() {
        assert!(MessageError::IntegrityCheckFailed.is_client_error());
    }

    #[test]
    fn error_display() {
        let err = MessageError::UnsupportedCipher { algorithm: 4 };
        assert_eq!(err.to_string(), "unsupported cipher algorithm 4");
    }
}
