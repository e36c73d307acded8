//! Integrity envelope around the settings payload.
//!
//! ```text
//!  0        4          8                         8+P        12+P      16+P
//!  ┌────────┬──────────┬─────────────────────────┬──────────┬─────────┐
//!  │ MAGIC  │ version  │ Settings payload (P B)  │ MAGIC    │ CRC-32  │
//!  └────────┴──────────┴─────────────────────────┴──────────┴─────────┘
//! ```
//!
//! All words are little-endian.  The CRC is CRC-32/ISO-HDLC over the
//! payload bytes only, the same algorithm the configuration tool uses.

use core::fmt;

use crate::config::Settings;
use crate::config::layout::{self, LayoutError, PAYLOAD_LEN};

/// Sentinel stamped at both ends of a valid descriptor.
pub const MAGIC: u32 = 0x8765_4321;
/// Word read from never-programmed flash.
pub const ERASED_WORD: u32 = 0xFFFF_FFFF;
/// Layout version this build reads and writes.
pub const CONFIGURATION_VERSION: u32 = 6;

pub const HEADER_LEN: usize = 8;
pub const TRAILER_LEN: usize = 8;
pub const DESCRIPTOR_LEN: usize = HEADER_LEN + PAYLOAD_LEN + TRAILER_LEN;

const _: () = assert!(MAGIC != ERASED_WORD);

// ---------------------------------------------------------------------------
// CRC-32
// ---------------------------------------------------------------------------

const CRC_POLY: u32 = 0xEDB8_8320;

const CRC_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut k = 0;
        while k < 8 {
            c = if c & 1 != 0 { CRC_POLY ^ (c >> 1) } else { c >> 1 };
            k += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
};

/// CRC-32/ISO-HDLC (the zlib / Ethernet CRC).
pub fn crc32(data: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in data {
        crc = CRC_TABLE[((crc ^ b as u32) & 0xFF) as usize] ^ (crc >> 8);
    }
    !crc
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Which integrity check rejected an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrityError {
    /// Image shorter than the descriptor it claims to be.
    Truncated { len: usize },
    /// Region was never programmed (all bytes 0xFF).
    Erased,
    /// A begin or end sentinel is wrong.
    BadMagic { begin: u32, end: u32 },
    /// Image was written by a different layout version.
    VersionMismatch { found: u32, supported: u32 },
    /// Stored CRC does not match the payload.
    CrcMismatch { stored: u32, computed: u32 },
    /// CRC-valid payload holds a value no enum accepts.
    Malformed(LayoutError),
    /// Payload decodes but a field is outside its permitted range.
    OutOfRange(&'static str),
}

impl fmt::Display for IntegrityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { len } => {
                write!(f, "image truncated ({len} of {DESCRIPTOR_LEN} bytes)")
            }
            Self::Erased => write!(f, "flash erased"),
            Self::BadMagic { begin, end } => {
                write!(f, "bad magic (begin 0x{begin:08X}, end 0x{end:08X})")
            }
            Self::VersionMismatch { found, supported } => {
                write!(f, "version {found}, supported {supported}")
            }
            Self::CrcMismatch { stored, computed } => {
                write!(f, "CRC mismatch (stored 0x{stored:08X}, computed 0x{computed:08X})")
            }
            Self::Malformed(e) => write!(f, "malformed payload: {e}"),
            Self::OutOfRange(msg) => write!(f, "settings out of range: {msg}"),
        }
    }
}

impl IntegrityError {
    /// `true` when the image is damaged, as opposed to absent or merely
    /// written by another version.
    pub fn is_corruption(&self) -> bool {
        !matches!(self, Self::Erased | Self::VersionMismatch { .. })
    }
}

// ---------------------------------------------------------------------------
// Sealed descriptor
// ---------------------------------------------------------------------------

/// A sealed, self-validating settings image ready to be written to flash.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingsDescriptor {
    bytes: Vec<u8>,
}

impl SettingsDescriptor {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_LEN..HEADER_LEN + PAYLOAD_LEN]
    }

    pub fn crc(&self) -> u32 {
        read_word(&self.bytes, HEADER_LEN + PAYLOAD_LEN + 4)
    }
}

/// Encode `settings`, stamp both magics and the version and compute the CRC.
pub fn seal(settings: &Settings) -> SettingsDescriptor {
    let payload = layout::encode_payload(settings);
    let crc = crc32(&payload);

    let mut bytes = Vec::with_capacity(DESCRIPTOR_LEN);
    bytes.extend_from_slice(&MAGIC.to_le_bytes());
    bytes.extend_from_slice(&CONFIGURATION_VERSION.to_le_bytes());
    bytes.extend_from_slice(&payload);
    bytes.extend_from_slice(&MAGIC.to_le_bytes());
    bytes.extend_from_slice(&crc.to_le_bytes());
    SettingsDescriptor { bytes }
}

/// Version word of an image, if it is long enough to carry one.
pub fn peek_version(image: &[u8]) -> Option<u32> {
    (image.len() >= HEADER_LEN).then(|| read_word(image, 4))
}

/// Check an image and decode its payload.
///
/// Order: length, erased, begin magic, version, end magic, CRC, field
/// decoding.  The end magic sits behind a payload whose length depends on
/// the version, so it is only checked once the version is known.
pub fn validate(image: &[u8]) -> Result<Settings, IntegrityError> {
    if image.len() < HEADER_LEN {
        return Err(IntegrityError::Truncated { len: image.len() });
    }
    if image.iter().all(|b| *b == 0xFF) {
        return Err(IntegrityError::Erased);
    }

    let begin = read_word(image, 0);
    if begin != MAGIC {
        let end = if image.len() >= DESCRIPTOR_LEN {
            read_word(image, HEADER_LEN + PAYLOAD_LEN)
        } else {
            0
        };
        return Err(IntegrityError::BadMagic { begin, end });
    }

    let version = read_word(image, 4);
    if version != CONFIGURATION_VERSION {
        return Err(IntegrityError::VersionMismatch {
            found: version,
            supported: CONFIGURATION_VERSION,
        });
    }

    if image.len() < DESCRIPTOR_LEN {
        return Err(IntegrityError::Truncated { len: image.len() });
    }
    let end = read_word(image, HEADER_LEN + PAYLOAD_LEN);
    if end != MAGIC {
        return Err(IntegrityError::BadMagic { begin, end });
    }

    let payload = &image[HEADER_LEN..HEADER_LEN + PAYLOAD_LEN];
    let stored = read_word(image, HEADER_LEN + PAYLOAD_LEN + 4);
    let computed = crc32(payload);
    if stored != computed {
        return Err(IntegrityError::CrcMismatch { stored, computed });
    }

    layout::decode_payload(payload).map_err(IntegrityError::Malformed)
}

fn read_word(bytes: &[u8], at: usize) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(word)
}
