//! NVS (Non-Volatile Storage) adapter.
//!
//! Implements [`StoragePort`] for the user settings blob.  The backend is
//! a namespaced in-memory map; each subsystem uses its own namespace
//! prefix so keys never collide.

use std::cell::RefCell;
use std::collections::HashMap;

use log::{debug, info};

use crate::app::ports::{StorageError, StoragePort};

/// Largest blob the backend accepts.
const MAX_BLOB_SIZE: usize = 4000;

pub struct NvsAdapter {
    store: RefCell<HashMap<String, Vec<u8>>>,
    /// Entries allowed before writes fail with [`StorageError::Full`].
    capacity: usize,
}

impl Default for NvsAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl NvsAdapter {
    pub fn new() -> Self {
        info!("NvsAdapter: in-memory backend");
        Self::with_capacity(usize::MAX)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            store: RefCell::new(HashMap::new()),
            capacity,
        }
    }

    fn composite_key(namespace: &str, key: &str) -> String {
        format!("{}::{}", namespace, key)
    }
}

impl StoragePort for NvsAdapter {
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        let composite = Self::composite_key(namespace, key);
        let store = self.store.borrow();
        let data = store.get(&composite).ok_or(StorageError::NotFound)?;
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        Ok(len)
    }

    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        if data.len() > MAX_BLOB_SIZE {
            return Err(StorageError::Full);
        }
        let composite = Self::composite_key(namespace, key);
        let mut store = self.store.borrow_mut();
        if !store.contains_key(&composite) && store.len() >= self.capacity {
            return Err(StorageError::Full);
        }
        debug!("nvs: {} <- {} bytes", composite, data.len());
        store.insert(composite, data.to_vec());
        Ok(())
    }

    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError> {
        let composite = Self::composite_key(namespace, key);
        self.store.borrow_mut().remove(&composite);
        Ok(())
    }

    fn exists(&self, namespace: &str, key: &str) -> bool {
        let composite = Self::composite_key(namespace, key);
        self.store.borrow().contains_key(&composite)
    }
}
