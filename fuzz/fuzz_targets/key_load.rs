//! Fuzz target for the key material loader.
//!
//! Exercises both roles and the passphrase path with arbitrary bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealpost_pgp::{RecipientKey, SignerKey};

fuzz_target!(|data: &[u8]| {
    let _ = RecipientKey::from_bytes(data);
    let _ = SignerKey::from_bytes(data, None);
    let _ = SignerKey::from_bytes(data, Some("fuzz"));
});
