//! Fuzz target: `layout::decode_payload`
//!
//! Skips the CRC so the field decoder itself sees hostile input: short
//! buffers, out-of-range enum bytes, stray flag bits and unterminated
//! text fields.
//!
//! cargo fuzz run fuzz_payload_decode

#![no_main]

use gasctl::config::layout;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(settings) = layout::decode_payload(data) {
        let encoded = layout::encode_payload(&settings);
        assert_eq!(encoded.as_slice(), &data[..layout::PAYLOAD_LEN]);
    }
});
