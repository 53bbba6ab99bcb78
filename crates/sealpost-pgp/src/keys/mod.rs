//! Key material loading.
//!
//! Decodes caller-supplied key blobs (armored or raw packets) into typed
//! key values. A [`SignerKey`] is unlocked by construction: passphrase
//! verification happens during parsing, so no locked key can reach the
//! signature engine.
//!
//! Binding-signature verification is deliberately out of scope: packets
//! are parsed structurally and keys selected by algorithm capability.
//! Trust decisions belong to whoever provisions the configuration.

pub(crate) mod parser;

use ed25519_dalek::{SigningKey, VerifyingKey};
pub(crate) use parser::{ParsedPublicKey, PublicMaterial, SecretMaterial};
use thiserror::Error;
use x25519_dalek::StaticSecret;
use zeroize::Zeroizing;

use crate::{
    algo::{HashAlgorithm, SymmetricAlgorithm},
    armor::{self, ArmorError, BlockKind},
    packet::{PacketError, PacketReader, Tag},
};

/// Expected role of a key block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    /// Transferable public key (encryption, verification)
    Public,
    /// Transferable secret key (signing, decryption)
    Secret,
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Public => write!(f, "public"),
            Self::Secret => write!(f, "secret"),
        }
    }
}

/// Errors from key material loading.
#[derive(Debug, Error)]
pub enum KeyError {
    /// Key block structure is unparseable
    #[error("malformed key: {reason}")]
    Malformed {
        /// What failed to parse
        reason: String,
    },

    /// Algorithm identifier outside the profile (RSA, DSA, Camellia, ...)
    #[error("unsupported algorithm {algorithm}")]
    UnsupportedAlgorithm {
        /// Raw registry identifier
        algorithm: u8,
    },

    /// ECC key on a curve outside the profile (NIST, Brainpool, ...)
    #[error("unsupported curve oid {oid}")]
    UnsupportedCurve {
        /// Hex-encoded curve OID
        oid: String,
    },

    /// Key packet version other than 4
    #[error("unsupported key version {version}")]
    UnsupportedVersion {
        /// Version octet from the packet
        version: u8,
    },

    /// Secret key material is passphrase-protected and no passphrase was
    /// supplied
    #[error("passphrase required to unlock secret key")]
    PassphraseRequired,

    /// Passphrase did not decrypt the secret key material (checksum
    /// mismatch after S2K + CFB)
    #[error("invalid passphrase for secret key")]
    InvalidPassphrase,

    /// A public block was supplied where a secret one was expected, or
    /// vice versa
    #[error("wrong key role: expected a {expected} key block")]
    WrongRole {
        /// The role the caller asked for
        expected: KeyRole,
    },

    /// No encryption-capable (ECDH) key in the block
    #[error("no encryption-capable key in block")]
    NoEncryptionKey,

    /// No signing-capable (EdDSA) key in the block
    #[error("no signing-capable key in block")]
    NoSigningKey,

    /// Armor decode failure
    #[error(transparent)]
    Armor(#[from] ArmorError),

    /// Packet-level parse failure
    #[error(transparent)]
    Packet(#[from] PacketError),
}

/// A v4 key fingerprint: SHA-1 over the public key packet body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint(pub [u8; 20]);

impl Fingerprint {
    /// The low eight octets, used in PKESK and signature packets.
    pub fn key_id(&self) -> KeyId {
        let mut id = [0u8; 8];
        id.copy_from_slice(&self.0[12..]);
        KeyId(id)
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// An eight-octet key ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyId(pub [u8; 8]);

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

/// Encryption-capable key selected from a public block.
///
/// Carries the Curve25519 point and the KDF parameters the key was
/// provisioned with; both feed the RFC 6637 session key wrap.
#[derive(Debug, Clone)]
pub struct RecipientKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) created: u32,
    pub(crate) point: [u8; 32],
    pub(crate) kdf_hash: HashAlgorithm,
    pub(crate) kdf_cipher: SymmetricAlgorithm,
}

impl RecipientKey {
    /// Load from an armored or binary public key block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        PublicKeyBlock::from_bytes(bytes)?.encryption_key()
    }

    /// Fingerprint of the selected encryption key.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Key ID of the selected encryption key.
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }

    /// Key creation time (seconds since the Unix epoch).
    pub fn created(&self) -> u32 {
        self.created
    }
}

/// Verification-capable key selected from a public block.
pub struct VerifierKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) verifying: VerifyingKey,
}

impl VerifierKey {
    /// Load from an armored or binary public key block.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        PublicKeyBlock::from_bytes(bytes)?.verifying_key()
    }

    /// Key ID of the verification key.
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }
}

/// Unlocked signing key.
///
/// Construction requires a successful passphrase check when the material
/// is protected, so a value of this type is always usable for signing.
pub struct SignerKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) signing: SigningKey,
}

impl SignerKey {
    /// Load and unlock from an armored or binary secret key block.
    pub fn from_bytes(bytes: &[u8], passphrase: Option<&str>) -> Result<Self, KeyError> {
        SecretKeyBlock::from_bytes(bytes, passphrase)?.signing_key()
    }

    /// Fingerprint of the signing key.
    pub fn fingerprint(&self) -> Fingerprint {
        self.fingerprint
    }

    /// Key ID of the signing key.
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }
}

/// Unlocked decryption key (ECDH secret scalar).
///
/// Only the decrypt-and-verify path uses this; the service's
/// encrypt-and-sign flow never handles a recipient secret.
pub struct DecryptionKey {
    pub(crate) fingerprint: Fingerprint,
    pub(crate) scalar: StaticSecret,
    pub(crate) kdf_hash: HashAlgorithm,
    pub(crate) kdf_cipher: SymmetricAlgorithm,
}

impl DecryptionKey {
    /// Load and unlock from an armored or binary secret key block.
    pub fn from_bytes(bytes: &[u8], passphrase: Option<&str>) -> Result<Self, KeyError> {
        SecretKeyBlock::from_bytes(bytes, passphrase)?.decryption_key()
    }

    /// Key ID of the decryption key.
    pub fn key_id(&self) -> KeyId {
        self.fingerprint.key_id()
    }
}

/// A parsed transferable public key: primary plus subkeys.
pub struct PublicKeyBlock {
    primary: ParsedPublicKey,
    subkeys: Vec<ParsedPublicKey>,
}

impl PublicKeyBlock {
    /// Parse an armored or binary public key block.
    ///
    /// User ID, signature, and trust packets are skipped structurally;
    /// subkeys on unsupported algorithms are tolerated as long as a usable
    /// key remains for the requested operation.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, KeyError> {
        let binary = decode_block(bytes, KeyRole::Public)?;
        let mut reader = PacketReader::new(&binary);

        let mut primary: Option<ParsedPublicKey> = None;
        let mut subkeys = Vec::new();

        while let Some(packet) = reader.next_packet()? {
            match packet.tag() {
                Some(Tag::PublicKey) if primary.is_none() => {
                    primary = Some(parser::parse_public_key(&packet.body)?);
                },
                Some(Tag::SecretKey | Tag::SecretSubkey) => {
                    return Err(KeyError::WrongRole { expected: KeyRole::Public });
                },
                Some(Tag::PublicSubkey) => {
                    // Tolerate subkeys outside the profile; selection
                    // decides whether anything usable remains
                    if let Ok(subkey) = parser::parse_public_key(&packet.body) {
                        subkeys.push(subkey);
                    }
                },
                _ => {},
            }
        }

        let primary = primary
            .ok_or_else(|| KeyError::Malformed { reason: "no public key packet in block".into() })?;
        Ok(Self { primary, subkeys })
    }

    /// Select the encryption key: first ECDH subkey, else an ECDH primary.
    pub fn encryption_key(&self) -> Result<RecipientKey, KeyError> {
        for key in self.subkeys.iter().chain(std::iter::once(&self.primary)) {
            if let PublicMaterial::Encryption { point, kdf_hash, kdf_cipher } = &key.material {
                return Ok(RecipientKey {
                    fingerprint: key.fingerprint,
                    created: key.created,
                    point: *point,
                    kdf_hash: *kdf_hash,
                    kdf_cipher: *kdf_cipher,
                });
            }
        }
        Err(KeyError::NoEncryptionKey)
    }

    /// Select the verification key: EdDSA primary, else the first EdDSA
    /// subkey.
    pub fn verifying_key(&self) -> Result<VerifierKey, KeyError> {
        for key in std::iter::once(&self.primary).chain(self.subkeys.iter()) {
            if let PublicMaterial::Signing { public } = &key.material {
                let verifying = VerifyingKey::from_bytes(public).map_err(|_| {
                    KeyError::Malformed { reason: "eddsa public key is not a valid point".into() }
                })?;
                return Ok(VerifierKey { fingerprint: key.fingerprint, verifying });
            }
        }
        Err(KeyError::NoSigningKey)
    }
}

/// A parsed and unlocked transferable secret key.
pub struct SecretKeyBlock {
    primary: parser::ParsedSecretKey,
    subkeys: Vec<parser::ParsedSecretKey>,
}

impl SecretKeyBlock {
    /// Parse an armored or binary secret key block, unlocking protected
    /// material with `passphrase`.
    ///
    /// The same passphrase unlocks primary and subkeys, matching how key
    /// export tools protect them.
    pub fn from_bytes(bytes: &[u8], passphrase: Option<&str>) -> Result<Self, KeyError> {
        let binary = decode_block(bytes, KeyRole::Secret)?;
        let mut reader = PacketReader::new(&binary);

        let mut primary: Option<parser::ParsedSecretKey> = None;
        let mut subkeys = Vec::new();

        while let Some(packet) = reader.next_packet()? {
            match packet.tag() {
                Some(Tag::SecretKey) if primary.is_none() => {
                    primary = Some(parser::parse_secret_key(&packet.body, passphrase)?);
                },
                Some(Tag::PublicKey) => {
                    return Err(KeyError::WrongRole { expected: KeyRole::Secret });
                },
                Some(Tag::SecretSubkey) => {
                    subkeys.push(parser::parse_secret_key(&packet.body, passphrase)?);
                },
                _ => {},
            }
        }

        let primary = primary
            .ok_or_else(|| KeyError::Malformed { reason: "no secret key packet in block".into() })?;
        Ok(Self { primary, subkeys })
    }

    /// Select the signing key: EdDSA primary, else the first EdDSA subkey.
    pub fn signing_key(&self) -> Result<SignerKey, KeyError> {
        for key in std::iter::once(&self.primary).chain(self.subkeys.iter()) {
            if let SecretMaterial::Signing { seed } = &key.secret {
                return Ok(SignerKey {
                    fingerprint: key.public.fingerprint,
                    signing: SigningKey::from_bytes(seed),
                });
            }
        }
        Err(KeyError::NoSigningKey)
    }

    /// Select the decryption key: first ECDH subkey, else an ECDH primary.
    pub fn decryption_key(&self) -> Result<DecryptionKey, KeyError> {
        for key in self.subkeys.iter().chain(std::iter::once(&self.primary)) {
            if let SecretMaterial::Encryption { scalar } = &key.secret {
                let PublicMaterial::Encryption { kdf_hash, kdf_cipher, .. } = &key.public.material
                else {
                    // Parser pairs secret and public material by algorithm
                    continue;
                };
                return Ok(DecryptionKey {
                    fingerprint: key.public.fingerprint,
                    scalar: StaticSecret::from(**scalar),
                    kdf_hash: *kdf_hash,
                    kdf_cipher: *kdf_cipher,
                });
            }
        }
        Err(KeyError::NoEncryptionKey)
    }
}

/// De-armor a key block when armored, enforcing the expected role label;
/// raw packet input passes through untouched.
fn decode_block(bytes: &[u8], expected: KeyRole) -> Result<Zeroizing<Vec<u8>>, KeyError> {
    if !armor::is_armored(bytes) {
        return Ok(Zeroizing::new(bytes.to_vec()));
    }
    let text = std::str::from_utf8(bytes)
        .map_err(|_| KeyError::Malformed { reason: "armored key is not valid utf-8".into() })?;
    let (kind, binary) = armor::decode(text)?;
    match (kind, expected) {
        (BlockKind::PublicKey, KeyRole::Public) | (BlockKind::PrivateKey, KeyRole::Secret) => {
            Ok(Zeroizing::new(binary))
        },
        (BlockKind::PublicKey | BlockKind::PrivateKey, _) => {
            Err(KeyError::WrongRole { expected })
        },
        _ => Err(KeyError::Malformed { reason: "armored block is not a key".into() }),
    }
}
