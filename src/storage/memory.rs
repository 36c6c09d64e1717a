use std::collections::HashMap;
use std::sync::Mutex;

use super::KeyValueStore;
use crate::error::{Error, Result};

/// Storage that lives only as long as the process.
/// Used for `--in-memory` runs and in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
  entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl KeyValueStore for MemoryStore {
  fn get(&self, key: &str) -> Result<Option<String>> {
    let entries = self.entries.lock().map_err(|_| Error::LockPoisoned)?;
    Ok(entries.get(key).cloned())
  }

  fn set(&self, key: &str, value: &str) -> Result<()> {
    let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned)?;
    entries.insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove(&self, key: &str) -> Result<()> {
    let mut entries = self.entries.lock().map_err(|_| Error::LockPoisoned)?;
    entries.remove(key);
    Ok(())
  }
}
