//! Fixed-width, NUL-padded text fields.
//!
//! The configuration tool writes display strings as raw byte arrays.  The
//! bytes are kept verbatim so that a sealed image round-trips bit-exactly,
//! even when the tool wrote non-UTF-8 (Latin-1) characters.

use core::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FixedText<const N: usize> {
    bytes: [u8; N],
}

impl<const N: usize> FixedText<N> {
    pub const EMPTY: Self = Self { bytes: [0; N] };

    /// Build from a string, truncating to `N` bytes on a char boundary.
    pub fn new(s: &str) -> Self {
        let mut end = s.len().min(N);
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        let mut bytes = [0u8; N];
        bytes[..end].copy_from_slice(&s.as_bytes()[..end]);
        Self { bytes }
    }

    pub const fn from_bytes(bytes: [u8; N]) -> Self {
        Self { bytes }
    }

    pub const fn as_bytes(&self) -> &[u8; N] {
        &self.bytes
    }

    /// The text up to the first NUL.  Stops early at the first byte that
    /// is not valid UTF-8.
    pub fn as_str(&self) -> &str {
        let end = self.bytes.iter().position(|b| *b == 0).unwrap_or(N);
        let raw = &self.bytes[..end];
        match core::str::from_utf8(raw) {
            Ok(s) => s,
            Err(e) => core::str::from_utf8(&raw[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.bytes[0] == 0
    }
}

impl<const N: usize> Default for FixedText<N> {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl<const N: usize> fmt::Debug for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.as_str())
    }
}

impl<const N: usize> fmt::Display for FixedText<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl<const N: usize> Serialize for FixedText<N> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de, const N: usize> Deserialize<'de> for FixedText<N> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = <heapless::String<64>>::deserialize(deserializer)?;
        if s.len() > N {
            return Err(D::Error::custom("text field too long"));
        }
        Ok(Self::new(&s))
    }
}
