//! RocksDB storage backend for the netmgr node.

use rocksdb::{ColumnFamilyDescriptor, IteratorMode, Options, DB};
use std::path::Path;

use crate::error::NodeError;

/// Column family names for different data types.
pub const CF_HELD: &str = "held";
pub const CF_PEERS: &str = "peers";

/// RocksDB-backed storage for the netmgr node.
pub struct Storage {
    db: DB,
}

impl Storage {
    /// Open or create a RocksDB database at the given path with column families.
    pub fn open(path: &Path) -> Result<Self, NodeError> {
        std::fs::create_dir_all(path)?;

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors = vec![
            ColumnFamilyDescriptor::new(CF_HELD, Options::default()),
            ColumnFamilyDescriptor::new(CF_PEERS, Options::default()),
        ];

        let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;

        Ok(Self { db })
    }

    /// Put a value into a column family.
    pub fn put(&self, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), NodeError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| NodeError::MissingColumnFamily(cf_name.to_string()))?;
        self.db.put_cf(&cf, key, value)?;
        Ok(())
    }

    /// Get a value from a column family.
    pub fn get(&self, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, NodeError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| NodeError::MissingColumnFamily(cf_name.to_string()))?;
        Ok(self.db.get_cf(&cf, key)?)
    }

    /// Delete a key from a column family.
    pub fn delete(&self, cf_name: &str, key: &[u8]) -> Result<(), NodeError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| NodeError::MissingColumnFamily(cf_name.to_string()))?;
        self.db.delete_cf(&cf, key)?;
        Ok(())
    }

    /// All keys of a column family, in key order.
    pub fn keys(&self, cf_name: &str) -> Result<Vec<Vec<u8>>, NodeError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| NodeError::MissingColumnFamily(cf_name.to_string()))?;
        let mut keys = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, _) = item?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// All key/value pairs of a column family, in key order.
    pub fn entries(&self, cf_name: &str) -> Result<Vec<(Vec<u8>, Vec<u8>)>, NodeError> {
        let cf = self
            .db
            .cf_handle(cf_name)
            .ok_or_else(|| NodeError::MissingColumnFamily(cf_name.to_string()))?;
        let mut entries = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (key, value) = item?;
            entries.push((key.to_vec(), value.to_vec()));
        }
        Ok(entries)
    }

    /// Store a discovered peer record.
    pub fn put_peer(&self, peer_id: &str, data: &[u8]) -> Result<(), NodeError> {
        self.put(CF_PEERS, peer_id.as_bytes(), data)
    }

    /// Get a discovered peer record.
    pub fn get_peer(&self, peer_id: &str) -> Result<Option<Vec<u8>>, NodeError> {
        self.get(CF_PEERS, peer_id.as_bytes())
    }

    pub fn delete_peer(&self, peer_id: &str) -> Result<(), NodeError> {
        self.delete(CF_PEERS, peer_id.as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_dir() -> PathBuf {
        let dir = std::env::temp_dir().join(format!("netmgr-test-{}", uuid::Uuid::now_v7()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_open_storage() {
        let dir = temp_dir();
        let storage = Storage::open(&dir);
        assert!(storage.is_ok());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_put_get_delete_held() {
        let dir = temp_dir();
        let storage = Storage::open(&dir).unwrap();

        storage.put(CF_HELD, b"msg-1", b"record").unwrap();
        assert_eq!(storage.get(CF_HELD, b"msg-1").unwrap(), Some(b"record".to_vec()));

        storage.delete(CF_HELD, b"msg-1").unwrap();
        assert!(storage.get(CF_HELD, b"msg-1").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_unknown_column_family() {
        let dir = temp_dir();
        let storage = Storage::open(&dir).unwrap();

        assert!(matches!(
            storage.get("relationships", b"x"),
            Err(NodeError::MissingColumnFamily(_))
        ));

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_keys_and_entries_are_ordered() {
        let dir = temp_dir();
        let storage = Storage::open(&dir).unwrap();

        storage.put_peer("bob", b"2").unwrap();
        storage.put_peer("alice", b"1").unwrap();

        let keys = storage.keys(CF_PEERS).unwrap();
        assert_eq!(keys, vec![b"alice".to_vec(), b"bob".to_vec()]);
        let entries = storage.entries(CF_PEERS).unwrap();
        assert_eq!(entries[1], (b"bob".to_vec(), b"2".to_vec()));
        assert!(storage.keys(CF_HELD).unwrap().is_empty());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = temp_dir();
        {
            let storage = Storage::open(&dir).unwrap();
            storage.put_peer("carol", b"{}").unwrap();
        }
        let storage = Storage::open(&dir).unwrap();
        assert_eq!(storage.get_peer("carol").unwrap(), Some(b"{}".to_vec()));
        storage.delete_peer("carol").unwrap();
        assert!(storage.get_peer("carol").unwrap().is_none());

        std::fs::remove_dir_all(&dir).ok();
    }
}
