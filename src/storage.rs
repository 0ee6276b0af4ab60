//! Client-side key/value storage backends.
//!
//! The cache and the session gate both persist through this trait. It is
//! deliberately shaped like the browser storage the mechanism originally
//! targeted: string keys, string values, every operation fallible. Callers
//! are expected to swallow failures and degrade to "no persistence".

use crate::error::{PageviewsError, PageviewsResult};
use dashmap::DashMap;
use std::path::PathBuf;

/// Fallible string key/value store.
#[cfg_attr(test, mockall::automock)]
pub trait Storage: Send + Sync {
    fn get_item(&self, key: &str) -> PageviewsResult<Option<String>>;
    fn set_item(&self, key: &str, value: &str) -> PageviewsResult<()>;
    fn remove_item(&self, key: &str) -> PageviewsResult<()>;
}

/// In-memory storage. Used for session-scoped flags, where "session" is
/// the lifetime of the owning `ViewsContext`.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: DashMap<String, String>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn get_item(&self, key: &str) -> PageviewsResult<Option<String>> {
        Ok(self.items.get(key).map(|v| v.value().clone()))
    }

    fn set_item(&self, key: &str, value: &str) -> PageviewsResult<()> {
        self.items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove_item(&self, key: &str) -> PageviewsResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

/// Durable storage backed by one file per key under a directory.
///
/// Keys are percent-encoded into file names so arbitrary slugs cannot
/// escape the storage directory. Writes go through a temp file followed by
/// a rename so a crashed write leaves the previous value intact.
#[derive(Debug)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: PathBuf) -> PageviewsResult<Self> {
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Default location under the platform cache directory.
    pub fn from_default_location() -> PageviewsResult<Self> {
        let dir = dirs::cache_dir()
            .ok_or_else(|| PageviewsError::IoError("No cache directory available".to_string()))?
            .join("pageviews");
        Self::new(dir)
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(encode_key(key))
    }
}

impl Storage for FileStorage {
    fn get_item(&self, key: &str) -> PageviewsResult<Option<String>> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set_item(&self, key: &str, value: &str) -> PageviewsResult<()> {
        let file_name = encode_key(key);
        // `~` never appears in an encoded name, so the staging path can
        // collide with neither another key's staging path nor any final path
        let tmp = self.dir.join(format!("{}~tmp", file_name));
        let path = self.dir.join(file_name);
        std::fs::write(&tmp, value)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_item(&self, key: &str) -> PageviewsResult<()> {
        match std::fs::remove_file(self.path_for(key)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Encode a storage key into a safe file name.
/// Alphanumerics, `-`, `_` and `.` pass through; everything else becomes
/// `%XX`. `.` is escaped at the start so a key can never form `..`.
fn encode_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for (i, b) in key.bytes().enumerate() {
        let safe = b.is_ascii_alphanumeric()
            || b == b'-'
            || b == b'_'
            || (b == b'.' && i != 0);
        if safe {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}
