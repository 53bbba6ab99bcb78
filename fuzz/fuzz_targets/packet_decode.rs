//! Fuzz target for the packet parser.
//!
//! Arbitrary byte sequences must never panic the parser: malformed
//! headers, inflated length claims, and broken partial-length chains all
//! return errors.

#![no_main]

use libfuzzer_sys::fuzz_target;
use sealpost_pgp::packet::PacketReader;

fuzz_target!(|data: &[u8]| {
    let mut reader = PacketReader::new(data);
    // Walk the whole sequence; any packet may fail, none may panic
    while let Ok(Some(_)) = reader.next_packet() {}
});
