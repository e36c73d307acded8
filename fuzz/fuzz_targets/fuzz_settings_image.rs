//! Fuzz target: `envelope::validate`
//!
//! Feeds arbitrary bytes to the settings image validator.  It must never
//! panic, and anything it accepts must re-seal to the very same bytes.
//!
//! cargo fuzz run fuzz_settings_image

#![no_main]

use gasctl::envelope::{self, DESCRIPTOR_LEN};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(settings) = envelope::validate(data) {
        let resealed = envelope::seal(&settings);
        assert_eq!(
            resealed.as_bytes(),
            &data[..DESCRIPTOR_LEN],
            "accepted image must be canonical"
        );
    }
});
