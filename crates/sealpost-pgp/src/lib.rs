//! Sealpost OpenPGP Core
//!
//! Encrypt-and-sign for arbitrary binary payloads in the OpenPGP message
//! format. Format logic (packet grammar, key parsing, S2K, armor, MDC) lives
//! here; cryptographic primitives come from vetted implementations
//! (RustCrypto block ciphers, dalek curves).
//!
//! # Message Pipeline
//!
//! ```text
//! Recipient public key ──► ECDH wrap ──► PKESK packet
//!                                            │
//! Plaintext ──► one-pass sig ── literal ── signature ──► SEIPD (AES-CFB + MDC)
//!                    ▲                        │
//!                    └── Ed25519 over SHA-256 ┘
//! ```
//!
//! The plaintext is signed first and the signature travels inside the
//! encrypted payload, so the signature is confidential to the recipient and
//! tampering is detected only after successful decryption.
//!
//! # Security
//!
//! Confidentiality:
//! - Fresh AES-256 session key per message, wrapped to the recipient with
//!   RFC 6637 ECDH over Curve25519
//! - Session keys, KEKs, and unlocked secret scalars are zeroized on drop
//!
//! Authenticity:
//! - Ed25519 signature over the SHA-256 digest of the literal data plus the
//!   v4 signature trailer
//! - Signer key ID and creation time embedded for downstream verification
//!
//! Integrity:
//! - SHA-1 MDC over the full decrypted body (format-mandated); any byte flip
//!   in the assembled message fails decryption, unwrap, or verification
//!
//! All operations are synchronous and parameterized purely by explicit
//! arguments. Callers provide the signature timestamp, so outputs are
//! reproducible under test seams; session keys and CFB prefixes always come
//! from the OS CSPRNG.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod algo;
pub mod armor;
mod ecdh;
pub mod encrypt;
mod error;
pub mod keys;
pub mod message;
pub mod mpi;
pub mod packet;
pub mod s2k;
pub mod session;
pub mod sign;

#[cfg(feature = "test-utils")]
pub mod testkeys;

pub use algo::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm};
pub use error::MessageError;
pub use keys::{
    DecryptionKey, Fingerprint, KeyError, KeyId, KeyRole, PublicKeyBlock, RecipientKey,
    SecretKeyBlock, SignerKey, VerifierKey,
};
pub use message::{
    DecryptSummary, EncryptOptions, EncryptSummary, decrypt_and_verify, encrypt_and_sign,
};
pub use session::SessionKey;
