use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::StoreResult;
use crate::traits::UnitStore;

/// In-memory, path-keyed unit store.
///
/// Intended for tests and embedding. Paths are normalized with
/// `path_clean`, so `a/./b.xml` and `a/sub/../b.xml` name the same file.
pub struct InMemoryUnitStore {
    files: RwLock<BTreeMap<PathBuf, Vec<u8>>>,
}

impl InMemoryUnitStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Number of files currently stored.
    pub fn len(&self) -> usize {
        self.files.read().expect("lock poisoned").len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.files.read().expect("lock poisoned").is_empty()
    }

    /// Total bytes across all stored files.
    pub fn total_bytes(&self) -> u64 {
        self.files
            .read()
            .expect("lock poisoned")
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }

    /// Remove all files from the store.
    pub fn clear(&self) {
        self.files.write().expect("lock poisoned").clear();
    }

    /// All stored paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        self.files.read().expect("lock poisoned").keys().cloned().collect()
    }
}

fn key(path: &Path) -> PathBuf {
    path_clean::clean(path)
}

impl Default for InMemoryUnitStore {
    fn default() -> Self {
        Self::new()
    }
}

impl UnitStore for InMemoryUnitStore {
    fn read(&self, path: &Path) -> StoreResult<Option<Vec<u8>>> {
        let map = self.files.read().expect("lock poisoned");
        Ok(map.get(&key(path)).cloned())
    }

    fn write(&self, path: &Path, data: &[u8]) -> StoreResult<()> {
        let mut map = self.files.write().expect("lock poisoned");
        map.insert(key(path), data.to_vec());
        Ok(())
    }

    fn exists(&self, path: &Path) -> StoreResult<bool> {
        let map = self.files.read().expect("lock poisoned");
        Ok(map.contains_key(&key(path)))
    }

    fn delete(&self, path: &Path) -> StoreResult<bool> {
        let mut map = self.files.write().expect("lock poisoned");
        Ok(map.remove(&key(path)).is_some())
    }
}

impl std::fmt::Debug for InMemoryUnitStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryUnitStore")
            .field("file_count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;

    #[test]
    fn write_and_read() {
        let store = InMemoryUnitStore::new();
        store.write(Path::new("archive/Patient_p1.xml"), b"<a/>").unwrap();
        let data = store.read(Path::new("archive/Patient_p1.xml")).unwrap();
        assert_eq!(data.as_deref(), Some(&b"<a/>"[..]));
    }

    #[test]
    fn paths_are_normalized() {
        let store = InMemoryUnitStore::new();
        store.write(Path::new("archive/./sub/../x.xml"), b"1").unwrap();
        assert!(store.exists(Path::new("archive/x.xml")).unwrap());
        assert_eq!(store.paths(), vec![PathBuf::from("archive/x.xml")]);
    }

    #[test]
    fn overwrite_replaces_content() {
        let store = InMemoryUnitStore::new();
        let path = Path::new("x.xml");
        store.write(path, b"old").unwrap();
        store.write(path, b"new").unwrap();
        assert_eq!(store.read_required(path).unwrap(), b"new");
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_file() {
        let store = InMemoryUnitStore::new();
        assert!(store.read(Path::new("nope.xml")).unwrap().is_none());
        assert!(matches!(
            store.read_required(Path::new("nope.xml")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn delete_present_and_missing() {
        let store = InMemoryUnitStore::new();
        store.write(Path::new("a.xml"), b"a").unwrap();
        assert!(store.delete(Path::new("a.xml")).unwrap());
        assert!(!store.delete(Path::new("a.xml")).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn write_batch_and_totals() {
        let store = InMemoryUnitStore::new();
        store
            .write_batch(&[
                (PathBuf::from("a.xml"), b"12345".to_vec()),
                (PathBuf::from("b.xml"), b"123456789".to_vec()),
            ])
            .unwrap();
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_bytes(), 14);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn concurrent_reads_are_safe() {
        use std::sync::Arc;
        use std::thread;

        let store = Arc::new(InMemoryUnitStore::new());
        store.write(Path::new("shared.xml"), b"shared").unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    let data = store.read(Path::new("shared.xml")).unwrap();
                    assert_eq!(data.as_deref(), Some(&b"shared"[..]));
                })
            })
            .collect();

        for h in handles {
            h.join().expect("thread should not panic");
        }
    }

    #[test]
    fn debug_format() {
        let store = InMemoryUnitStore::new();
        let debug = format!("{store:?}");
        assert!(debug.contains("InMemoryUnitStore"));
        assert!(debug.contains("file_count"));
    }
}
