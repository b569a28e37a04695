//! Durable slot storage.
//!
//! A durable slot is a single named binary cell that survives the process
//! being destroyed and restarted by its host. The contract is deliberately
//! tiny (`put` / `get` by key) because the snapshot protocol only ever needs
//! one key, [`DATABASE_SLOT`].
//!
//! Two backends are provided:
//!
//! - [`MemorySlotStore`] -- a cloneable handle to a shared map. A clone held
//!   outside the service outlives a simulated restart, which is how tests
//!   model the host's stable memory.
//! - [`FileSlotStore`] -- one file per key inside a directory, written
//!   atomically via a temp file and rename.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};

/// Key under which the relational image is checkpointed.
pub const DATABASE_SLOT: &str = "DATABASE";

/// A host facility that keeps binary values across process restarts.
///
/// Methods are synchronous: the suspend hook must finish its write before
/// the host finalizes suspension.
pub trait SlotStore: Send + Sync {
    /// Write `bytes` under `key`, replacing any previous value.
    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Read the value under `key`. A missing key is `Ok(None)`.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
}

// ═══════════════════════════════════════════════════════════════════════
//  In-memory backend
// ═══════════════════════════════════════════════════════════════════════

/// Shared in-memory slot map.
///
/// Cloning yields another handle to the same cells.
#[derive(Clone, Default)]
pub struct MemorySlotStore {
    cells: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    unavailable: Arc<AtomicBool>,
}

impl MemorySlotStore {
    /// Create an empty slot store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate the host facility going away (or coming back).
    ///
    /// While unavailable every call fails with
    /// [`StoreError::SlotUnavailable`].
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn cells(&self, key: &str) -> StoreResult<std::sync::MutexGuard<'_, HashMap<String, Vec<u8>>>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::slot(key, "host facility offline"));
        }
        self.cells
            .lock()
            .map_err(|e| StoreError::slot(key, format!("mutex poisoned: {e}")))
    }
}

impl SlotStore for MemorySlotStore {
    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        self.cells(key)?.insert(key.to_string(), bytes.to_vec());
        debug!(key, bytes = bytes.len(), "slot written");
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.cells(key)?.get(key).cloned())
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  File backend
// ═══════════════════════════════════════════════════════════════════════

/// Directory-backed slot store: key `K` lives in `<dir>/K.slot`.
#[derive(Debug, Clone)]
pub struct FileSlotStore {
    dir: PathBuf,
}

impl FileSlotStore {
    /// Open (creating if needed) a slot directory.
    pub fn open(dir: impl AsRef<Path>) -> StoreResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| StoreError::slot(&dir.display().to_string(), e))?;
        info!(dir = %dir.display(), "durable slot directory ready");
        Ok(Self { dir })
    }

    /// Directory holding the slot files.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> StoreResult<PathBuf> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(StoreError::InvalidArgument(format!(
                "slot key must be non-empty [A-Za-z0-9_-]: {key:?}"
            )));
        }
        Ok(self.dir.join(format!("{key}.slot")))
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
        let tmp = path.with_extension("slot.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, path)?;
        Self::sync_parent(path)
    }

    /// Flush the directory entry so the rename itself survives a crash.
    #[cfg(unix)]
    fn sync_parent(path: &Path) -> io::Result<()> {
        match path.parent() {
            Some(dir) => fs::File::open(dir)?.sync_all(),
            None => Ok(()),
        }
    }

    #[cfg(not(unix))]
    fn sync_parent(_path: &Path) -> io::Result<()> {
        Ok(())
    }
}

impl SlotStore for FileSlotStore {
    fn put(&self, key: &str, bytes: &[u8]) -> StoreResult<()> {
        let path = self.path_for(key)?;
        Self::write_atomic(&path, bytes).map_err(|e| StoreError::slot(key, e))?;
        debug!(key, path = %path.display(), bytes = bytes.len(), "slot written");
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let path = self.path_for(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::slot(key, e)),
        }
    }
}

// ── tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_missing_key_is_none() {
        let slots = MemorySlotStore::new();
        assert!(slots.get(DATABASE_SLOT).unwrap().is_none());
    }

    #[test]
    fn memory_put_replaces_value() {
        let slots = MemorySlotStore::new();
        slots.put(DATABASE_SLOT, b"first").unwrap();
        slots.put(DATABASE_SLOT, b"second").unwrap();
        assert_eq!(slots.get(DATABASE_SLOT).unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn memory_clones_share_cells() {
        let slots = MemorySlotStore::new();
        let survivor = slots.clone();
        slots.put(DATABASE_SLOT, b"image").unwrap();
        drop(slots);
        assert_eq!(survivor.get(DATABASE_SLOT).unwrap().as_deref(), Some(&b"image"[..]));
    }

    #[test]
    fn memory_unavailable_fails_both_ways() {
        let slots = MemorySlotStore::new();
        slots.set_available(false);
        assert!(matches!(
            slots.get(DATABASE_SLOT),
            Err(StoreError::SlotUnavailable { .. })
        ));
        assert!(matches!(
            slots.put(DATABASE_SLOT, b"x"),
            Err(StoreError::SlotUnavailable { .. })
        ));

        slots.set_available(true);
        assert!(slots.get(DATABASE_SLOT).unwrap().is_none());
    }

    #[test]
    fn file_round_trip_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let slots = FileSlotStore::open(dir.path().join("slots")).unwrap();

        assert!(slots.get(DATABASE_SLOT).unwrap().is_none());
        slots.put(DATABASE_SLOT, &[0, 1, 2, 255]).unwrap();
        assert_eq!(slots.get(DATABASE_SLOT).unwrap(), Some(vec![0, 1, 2, 255]));
        assert!(dir.path().join("slots").join("DATABASE.slot").exists());
        assert!(!dir.path().join("slots").join("DATABASE.slot.tmp").exists());
    }

    #[test]
    fn file_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        FileSlotStore::open(dir.path())
            .unwrap()
            .put(DATABASE_SLOT, b"persisted")
            .unwrap();

        let reopened = FileSlotStore::open(dir.path()).unwrap();
        assert_eq!(reopened.get(DATABASE_SLOT).unwrap(), Some(b"persisted".to_vec()));
    }

    #[test]
    fn file_put_leaves_only_the_slot_file() {
        let dir = tempfile::tempdir().unwrap();
        let slots = FileSlotStore::open(dir.path().join("slots")).unwrap();
        slots.put(DATABASE_SLOT, b"first").unwrap();
        slots.put(DATABASE_SLOT, b"second").unwrap();

        let mut names: Vec<String> = fs::read_dir(slots.dir())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, vec!["DATABASE.slot".to_string()]);
        assert_eq!(slots.get(DATABASE_SLOT).unwrap().as_deref(), Some(&b"second"[..]));
    }

    #[test]
    fn file_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let slots = FileSlotStore::open(dir.path()).unwrap();
        assert!(matches!(
            slots.put("../escape", b"x"),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(slots.get(""), Err(StoreError::InvalidArgument(_))));
    }
}
