//! Key/value backends.
//!
//! The contract is deliberately minimal: `get`/`put`/`delete`/`list`, no
//! multi-key atomicity, and a hard per-value size ceiling. Everything the
//! pipeline persists goes through this seam.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::RwLock;
use vigil_core::{Result, VigilError};

/// Per-value size ceiling of the backing medium class (~25 MiB)
pub const VALUE_CEILING: usize = 25 * 1024 * 1024;

/// Backing key/value medium for the indicator store.
///
/// Implementations must tolerate deletes of absent keys and return `None`
/// (not an error) for absent reads.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Read a value, `None` if absent
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Write a value, replacing any previous one
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()>;

    /// Delete a key; absent keys are not an error
    async fn delete(&self, key: &str) -> Result<()>;

    /// List all keys with the given prefix, sorted
    async fn list(&self, prefix: &str) -> Result<Vec<String>>;
}

/// In-memory backend for tests and ephemeral runs.
///
/// Enforces the per-value ceiling so chunking is exercised the same way it
/// would be against a real size-limited medium.
pub struct MemoryKv {
    entries: RwLock<HashMap<String, Vec<u8>>>,
    value_limit: usize,
}

impl MemoryKv {
    /// Create an empty store with the default value ceiling
    #[must_use]
    pub fn new() -> Self {
        Self::with_value_limit(VALUE_CEILING)
    }

    /// Create an empty store with a custom per-value ceiling
    #[must_use]
    pub fn with_value_limit(value_limit: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            value_limit,
        }
    }

    /// Number of stored keys
    pub async fn key_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for MemoryKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if value.len() > self.value_limit {
            return Err(VigilError::StoreWrite(format!(
                "value for '{key}' is {} bytes, over the {} byte ceiling",
                value.len(),
                self.value_limit
            )));
        }
        self.entries.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys: Vec<String> = self
            .entries
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect();
        keys.sort();
        Ok(keys)
    }
}

/// File-per-key backend under a local data directory.
///
/// Keys are percent-encoded into filenames so arbitrary key characters
/// (`:`, `/`) survive the filesystem.
pub struct DiskKv {
    root: PathBuf,
}

impl DiskKv {
    /// Open (creating if needed) a store rooted at `root`
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| VigilError::StoreWrite(format!("create {}: {e}", root.display())))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(encode_key(key))
    }
}

#[async_trait]
impl KvStore for DiskKv {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match tokio::fs::read(self.path_for(key)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(VigilError::StoreRead(format!("read '{key}': {e}"))),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<()> {
        if value.len() > VALUE_CEILING {
            return Err(VigilError::StoreWrite(format!(
                "value for '{key}' is {} bytes, over the {VALUE_CEILING} byte ceiling",
                value.len()
            )));
        }
        tokio::fs::write(self.path_for(key), value)
            .await
            .map_err(|e| VigilError::StoreWrite(format!("write '{key}': {e}")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(VigilError::StoreWrite(format!("delete '{key}': {e}"))),
        }
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut dir = tokio::fs::read_dir(&self.root)
            .await
            .map_err(|e| VigilError::StoreRead(format!("list: {e}")))?;

        let mut keys = Vec::new();
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| VigilError::StoreRead(format!("list: {e}")))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if let Some(key) = decode_key(name) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Percent-encode a key into a safe filename
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for b in key.bytes() {
        if b.is_ascii_alphanumeric() || b == b'.' || b == b'-' || b == b'_' {
            out.push(char::from(b));
        } else {
            out.push('%');
            out.push_str(&format!("{b:02X}"));
        }
    }
    out
}

/// Reverse of [`encode_key`]; `None` for filenames we did not produce
fn decode_key(name: &str) -> Option<String> {
    let mut out = Vec::with_capacity(name.len());
    let bytes = name.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = name.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
