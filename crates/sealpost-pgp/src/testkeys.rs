//! Deterministic fixture keys for tests (feature `test-utils`).
//!
//! Builds transferable key blocks from fixed seeds: an Ed25519 primary for
//! signing plus an X25519 encryption subkey, the layout modern key tooling
//! produces for Curve25519 keys. Key generation is not a service
//! operation; this module exists so integration tests can exercise the
//! load → encrypt → decrypt pipeline without shipping binary fixtures.

use ed25519_dalek::SigningKey;
use x25519_dalek::{PublicKey, StaticSecret};

use crate::{
    algo::{HashAlgorithm, PublicKeyAlgorithm, SymmetricAlgorithm},
    armor::{self, BlockKind},
    encrypt::cfb_encrypt_in_place,
    keys::parser::{OID_CURVE25519, OID_ED25519},
    mpi::write_mpi,
    packet::{Tag, write_packet},
    s2k::S2k,
};

/// A complete fixture key pair in every shape the loader accepts.
pub struct TestKeyPair {
    /// Transferable public key, raw packets
    pub public_binary: Vec<u8>,
    /// Transferable public key, armored
    pub public_armored: String,
    /// Transferable secret key, raw packets
    pub secret_binary: Vec<u8>,
    /// Transferable secret key, armored
    pub secret_armored: String,
}

/// Builder for deterministic fixture keys.
pub struct TestKeyBuilder {
    ed_seed: [u8; 32],
    x_seed: [u8; 32],
    created_at: u32,
    passphrase: Option<String>,
    user_id: String,
}

impl TestKeyBuilder {
    /// Derive all key material from a single seed octet.
    pub fn from_seed(seed: u8) -> Self {
        let mut ed_seed = [0u8; 32];
        let mut x_seed = [0u8; 32];
        for (i, byte) in ed_seed.iter_mut().enumerate() {
            *byte = seed.wrapping_add(i as u8);
        }
        for (i, byte) in x_seed.iter_mut().enumerate() {
            *byte = seed.wrapping_mul(3).wrapping_add(i as u8) | 0x01;
        }
        Self {
            ed_seed,
            x_seed,
            created_at: 1_700_000_000,
            passphrase: None,
            user_id: "Fixture Key <fixture@sealpost.invalid>".to_string(),
        }
    }

    /// Protect the secret key material with a passphrase.
    pub fn passphrase(mut self, passphrase: &str) -> Self {
        self.passphrase = Some(passphrase.to_string());
        self
    }

    /// Override the key creation timestamp.
    pub fn created_at(mut self, created_at: u32) -> Self {
        self.created_at = created_at;
        self
    }

    /// Build the transferable key blocks.
    pub fn build(self) -> TestKeyPair {
        let signing = SigningKey::from_bytes(&self.ed_seed);
        let ed_public = signing.verifying_key().to_bytes();

        let x_secret = StaticSecret::from(self.x_seed);
        let x_point = PublicKey::from(&x_secret).to_bytes();

        let primary_public = public_body(
            self.created_at,
            PublicKeyAlgorithm::EdDsaLegacy,
            OID_ED25519,
            &ed_public,
            false,
        );
        let subkey_public = public_body(
            self.created_at,
            PublicKeyAlgorithm::Ecdh,
            OID_CURVE25519,
            &x_point,
            true,
        );

        let mut public_binary = Vec::new();
        write_packet(&mut public_binary, Tag::PublicKey, &primary_public);
        write_packet(&mut public_binary, Tag::UserId, self.user_id.as_bytes());
        write_packet(&mut public_binary, Tag::PublicSubkey, &subkey_public);

        // Secret MPIs are big-endian on the wire; the X25519 scalar is
        // little-endian in memory
        let mut x_seed_be = self.x_seed;
        x_seed_be.reverse();

        let mut primary_secret = primary_public.clone();
        append_secret_fields(&mut primary_secret, &self.ed_seed, self.passphrase.as_deref(), 0xA1);
        let mut subkey_secret = subkey_public.clone();
        append_secret_fields(&mut subkey_secret, &x_seed_be, self.passphrase.as_deref(), 0xB2);

        let mut secret_binary = Vec::new();
        write_packet(&mut secret_binary, Tag::SecretKey, &primary_secret);
        write_packet(&mut secret_binary, Tag::UserId, self.user_id.as_bytes());
        write_packet(&mut secret_binary, Tag::SecretSubkey, &subkey_secret);

        TestKeyPair {
            public_armored: armor::encode(BlockKind::PublicKey, &public_binary),
            public_binary,
            secret_armored: armor::encode(BlockKind::PrivateKey, &secret_binary),
            secret_binary,
        }
    }
}

/// Serialize the public fields of a key packet.
fn public_body(
    created_at: u32,
    algorithm: PublicKeyAlgorithm,
    oid: &[u8],
    point: &[u8; 32],
    kdf_params: bool,
) -> Vec<u8> {
    let mut body = Vec::with_capacity(60);
    body.push(4);
    body.extend_from_slice(&created_at.to_be_bytes());
    body.push(algorithm.to_u8());
    body.push(oid.len() as u8);
    body.extend_from_slice(oid);

    let mut wrapped = [0u8; 33];
    wrapped[0] = 0x40;
    wrapped[1..].copy_from_slice(point);
    write_mpi(&mut body, &wrapped);

    if kdf_params {
        body.extend_from_slice(&[
            0x03,
            0x01,
            HashAlgorithm::Sha256.to_u8(),
            SymmetricAlgorithm::Aes256.to_u8(),
        ]);
    }
    body
}

/// Append the secret portion of a key packet: unprotected with a two-octet
/// sum, or S2K-protected AES-CFB with a SHA-1 trailer.
fn append_secret_fields(
    body: &mut Vec<u8>,
    secret_be: &[u8; 32],
    passphrase: Option<&str>,
    tweak: u8,
) {
    let mut cleartext = Vec::with_capacity(34);
    write_mpi(&mut cleartext, secret_be);

    match passphrase {
        None => {
            let checksum =
                cleartext.iter().fold(0u16, |acc, &b| acc.wrapping_add(u16::from(b)));
            body.push(0);
            body.extend_from_slice(&cleartext);
            body.extend_from_slice(&checksum.to_be_bytes());
        },
        Some(passphrase) => {
            use sha1::{Digest as _, Sha1};

            let cipher = SymmetricAlgorithm::Aes256;
            let s2k = S2k::IteratedSalted {
                hash: HashAlgorithm::Sha256,
                salt: [tweak; 8],
                count_code: 0x60,
            };
            let iv = [tweak.wrapping_add(1); 16];
            let key = s2k.derive(passphrase.as_bytes(), cipher.key_size());

            let mut data = cleartext;
            let digest = Sha1::digest(&data);
            data.extend_from_slice(&digest);
            cfb_encrypt_in_place(cipher, &key, &iv, &mut data);

            body.push(254);
            body.push(cipher.to_u8());
            s2k.serialize(body);
            body.extend_from_slice(&iv);
            body.extend_from_slice(&data);
        },
    }
}
