//! Settings flash adapter.
//!
//! Implements [`FlashPort`] over a RAM buffer the size of the settings
//! sector.  The buffer starts erased (all `0xFF`), like a freshly
//! programmed controller.  Faults can be injected for host tests.

use log::{debug, warn};

use crate::app::ports::{FlashError, FlashPort};
use crate::envelope::DESCRIPTOR_LEN;

/// Erased flash byte.
const ERASED: u8 = 0xFF;

pub struct MemoryFlash {
    sector: Vec<u8>,
    fail_writes: bool,
    fail_reads: bool,
    /// Flip one byte of every read-back at this offset.
    corrupt_at: Option<usize>,
    writes: usize,
}

impl Default for MemoryFlash {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryFlash {
    /// Blank sector sized for one settings descriptor.
    pub fn new() -> Self {
        Self::with_capacity(DESCRIPTOR_LEN)
    }

    pub fn with_capacity(len: usize) -> Self {
        Self {
            sector: vec![ERASED; len],
            fail_writes: false,
            fail_reads: false,
            corrupt_at: None,
            writes: 0,
        }
    }

    /// Sector preloaded with `image` (the rest stays erased).
    pub fn with_image(image: &[u8]) -> Self {
        let mut flash = Self::with_capacity(DESCRIPTOR_LEN.max(image.len()));
        flash.sector[..image.len()].copy_from_slice(image);
        flash
    }

    pub fn set_fail_writes(&mut self, fail: bool) {
        self.fail_writes = fail;
    }

    pub fn set_fail_reads(&mut self, fail: bool) {
        self.fail_reads = fail;
    }

    pub fn set_corrupt_at(&mut self, offset: Option<usize>) {
        self.corrupt_at = offset;
    }

    /// Raw sector contents.
    pub fn contents(&self) -> &[u8] {
        &self.sector
    }

    pub fn contents_mut(&mut self) -> &mut [u8] {
        &mut self.sector
    }

    /// Number of successful write or program operations.
    pub fn write_count(&self) -> usize {
        self.writes
    }
}

impl FlashPort for MemoryFlash {
    fn read_image(&mut self) -> Result<Vec<u8>, FlashError> {
        if self.fail_reads {
            return Err(FlashError::ReadFailed);
        }
        let mut image = self.sector.clone();
        if let Some(byte) = self.corrupt_at.and_then(|at| image.get_mut(at)) {
            *byte ^= 0x01;
        }
        Ok(image)
    }

    fn write_image(&mut self, image: &[u8]) -> Result<(), FlashError> {
        if self.fail_writes {
            warn!("flash: write of {} bytes rejected", image.len());
            return Err(FlashError::WriteFailed);
        }
        if image.len() > self.sector.len() {
            return Err(FlashError::OutOfBounds);
        }
        self.sector.fill(ERASED);
        self.sector[..image.len()].copy_from_slice(image);
        self.writes += 1;
        debug!("flash: wrote {} bytes", image.len());
        Ok(())
    }

    fn program(&mut self, offset: usize, bytes: &[u8]) -> Result<(), FlashError> {
        if self.fail_writes {
            return Err(FlashError::WriteFailed);
        }
        let end = offset.checked_add(bytes.len()).ok_or(FlashError::OutOfBounds)?;
        let target = self.sector.get_mut(offset..end).ok_or(FlashError::OutOfBounds)?;
        target.copy_from_slice(bytes);
        self.writes += 1;
        debug!("flash: programmed {} bytes at 0x{:05X}", bytes.len(), offset);
        Ok(())
    }
}
