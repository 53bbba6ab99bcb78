//! Fuzz target for message decryption.
//!
//! Feeds arbitrary bytes to `decrypt_and_verify` with a fixed fixture
//! key pair. Every outcome but a clean error is a bug; no input may panic
//! or produce output.

#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use sealpost_pgp::{DecryptionKey, VerifierKey, decrypt_and_verify, testkeys::TestKeyBuilder};

fn keys() -> &'static (DecryptionKey, VerifierKey) {
    static KEYS: OnceLock<(DecryptionKey, VerifierKey)> = OnceLock::new();
    KEYS.get_or_init(|| {
        let pair = TestKeyBuilder::from_seed(42).build();
        (
            DecryptionKey::from_bytes(&pair.secret_binary, None).expect("fixture"),
            VerifierKey::from_bytes(&pair.public_binary).expect("fixture"),
        )
    })
}

fuzz_target!(|data: &[u8]| {
    let (decryption, verifier) = keys();
    let mut out = Vec::new();
    let result = decrypt_and_verify(&mut &data[..], &mut out, decryption, verifier);
    if result.is_err() {
        assert!(out.is_empty(), "no output on failure");
    }
});
