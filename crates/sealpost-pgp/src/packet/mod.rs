//! OpenPGP packet grammar: tags, length encodings, reader, writer.
//!
//! A packet is `[header: tag + body length][body]`. New-format headers carry
//! one-, two-, or five-octet definite lengths, or a chain of power-of-two
//! partial lengths ending in a definite segment. Old-format headers appear
//! in keys exported by legacy tooling and are accepted on read, never
//! written.
//!
//! # Invariants
//!
//! - Bounds Before Bytes: every length claim is validated against the
//!   remaining input before a body slice is taken. Malformed headers are
//!   rejected without copying data.
//! - Partial bodies are assembled in order; only the final segment may use
//!   a definite length.

mod reader;
mod writer;

pub use reader::{PacketReader, RawPacket};
use thiserror::Error;
pub use writer::{PartialBodyWriter, encode_length, write_header, write_packet};

/// Packet type tags used by the Sealpost profile (RFC 9580 §5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tag {
    /// Public-Key Encrypted Session Key (1)
    PublicKeyEncryptedSessionKey,
    /// Signature (2)
    Signature,
    /// One-Pass Signature (4)
    OnePassSignature,
    /// Secret Key (5)
    SecretKey,
    /// Public Key (6)
    PublicKey,
    /// Secret Subkey (7)
    SecretSubkey,
    /// Symmetrically Encrypted Data, no integrity protection (9)
    SymEncryptedData,
    /// Literal Data (11)
    LiteralData,
    /// Trust (12), ignored on read
    Trust,
    /// User ID (13)
    UserId,
    /// Public Subkey (14)
    PublicSubkey,
    /// User Attribute (17), ignored on read
    UserAttribute,
    /// Symmetrically Encrypted Integrity Protected Data (18)
    SymEncryptedIntegrityProtected,
    /// Modification Detection Code (19)
    ModificationDetectionCode,
}

impl Tag {
    /// Registry value of the tag.
    pub fn to_u8(self) -> u8 {
        match self {
            Self::PublicKeyEncryptedSessionKey => 1,
            Self::Signature => 2,
            Self::OnePassSignature => 4,
            Self::SecretKey => 5,
            Self::PublicKey => 6,
            Self::SecretSubkey => 7,
            Self::SymEncryptedData => 9,
            Self::LiteralData => 11,
            Self::Trust => 12,
            Self::UserId => 13,
            Self::PublicSubkey => 14,
            Self::UserAttribute => 17,
            Self::SymEncryptedIntegrityProtected => 18,
            Self::ModificationDetectionCode => 19,
        }
    }

    /// Parse a registry value; `None` for tags outside the profile
    /// (compressed data, marker, ...).
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::PublicKeyEncryptedSessionKey),
            2 => Some(Self::Signature),
            4 => Some(Self::OnePassSignature),
            5 => Some(Self::SecretKey),
            6 => Some(Self::PublicKey),
            7 => Some(Self::SecretSubkey),
            9 => Some(Self::SymEncryptedData),
            11 => Some(Self::LiteralData),
            12 => Some(Self::Trust),
            13 => Some(Self::UserId),
            14 => Some(Self::PublicSubkey),
            17 => Some(Self::UserAttribute),
            18 => Some(Self::SymEncryptedIntegrityProtected),
            19 => Some(Self::ModificationDetectionCode),
            _ => None,
        }
    }
}

/// Errors from packet-level parsing and encoding.
#[derive(Debug, Error)]
pub enum PacketError {
    /// First octet does not have the packet marker bit set
    #[error("not an openpgp packet: leading octet {octet:#04x}")]
    NotAPacket {
        /// The offending octet
        octet: u8,
    },

    /// Input ended before the claimed body length
    #[error("truncated packet: expected {expected} bytes, have {actual}")]
    Truncated {
        /// Bytes the header claimed
        expected: usize,
        /// Bytes actually available
        actual: usize,
    },

    /// Structurally invalid packet contents
    #[error("malformed packet: {reason}")]
    Malformed {
        /// Grammar rule that was violated
        reason: String,
    },
}
