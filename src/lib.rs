//! # btreekv
//!
//! An embedded, single-file, ordered key/value store built around an
//! on-disk B-tree.
//!
//! ## Architecture
//!
//! - **Types** (`types`): page identifiers, page kinds, and the fixed-width
//!   little-endian codec.
//! - **Page layer** (`page`): the on-disk page header and the node
//!   serializer that maps a B-tree node to/from a page's payload.
//! - **Storage layer** (`storage`): the database header and the pager —
//!   file I/O, the free list, page allocation, and overflow chaining.
//! - **Buffer** (`buffer`): the in-memory LRU page cache with sticky pinning.
//! - **B-tree** (`btree`): point lookup, insert-with-split,
//!   delete-with-rebalance, and an in-order cursor.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use btreekv::{Config, Db};
//!
//! let mut db = Db::open("my_database.db")?;
//!
//! db.put(b"hello", b"world")?;
//! assert_eq!(db.get(b"hello")?, Some(b"world".to_vec()));
//! db.delete(b"hello")?;
//!
//! let mut it = db.iter();
//! it.seek_first()?;
//! while it.valid() {
//!     let (k, v) = it.entry()?.unwrap();
//!     println!("{:?} -> {:?}", k, v);
//!     it.next()?;
//! }
//!
//! db.close()?;
//! # Ok::<(), btreekv::StorageError>(())
//! ```

pub mod btree;
pub mod buffer;
pub mod error;
pub mod page;
pub mod storage;
pub mod types;

pub use error::{Result, StorageError};
pub use types::{
    PageId, DEFAULT_CACHE_CAPACITY, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE, MIN_KEYS, PAGE_SIZE,
};

pub use btree::{BTree, Comparator, Iter, LexicographicComparator};
pub use storage::Pager;

use std::path::Path;

use page::PAYLOAD_CAPACITY;

/// Smallest payload a page must be able to carry: an empty children vector,
/// an empty kvs vector, and room for at least one zero-length key/value pair.
const MIN_PAYLOAD_CAPACITY: usize = 4 + 4 + (4 + 4);

/// Database configuration. `page_size` and `min_keys` are
/// construction-time parameters: they take effect when a database file is
/// first created and are thereafter fixed for that file's lifetime.
#[derive(Debug, Clone)]
pub struct Config {
    /// On-disk page size in bytes.
    pub page_size: usize,
    /// Minimum-key degree `t`: non-root nodes hold between `t` and `2t` keys.
    pub min_keys: usize,
    /// Number of Tree pages the in-memory cache retains before evicting.
    pub cache_capacity: usize,
    /// Largest key `put` will accept before returning `KeyTooLarge`.
    pub max_key_size: usize,
    /// Largest value `put` will accept before returning `ValueTooLarge`.
    pub max_value_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            page_size: PAGE_SIZE,
            min_keys: MIN_KEYS,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
        }
    }
}

impl Config {
    /// Reject configuration values this crate cannot honor.
    ///
    /// `page_size` is checked against the crate's compiled-in page size:
    /// the payload codec sizes its buffers off [`types::PAGE_SIZE`] at
    /// compile time, so a mismatched `page_size` here is a caller error
    /// rather than something `open` could adapt to, per this crate's
    /// reading of the "changing `P` in an existing file is not supported"
    /// constraint (see `DESIGN.md`).
    pub fn validate(&self) -> Result<()> {
        if self.page_size != PAGE_SIZE {
            return Err(StorageError::invalid_argument(format!(
                "page_size {} is not supported; this build is compiled for {}",
                self.page_size, PAGE_SIZE
            )));
        }
        if PAYLOAD_CAPACITY < MIN_PAYLOAD_CAPACITY {
            return Err(StorageError::invalid_argument(format!(
                "page_size {} leaves no room for a node payload",
                self.page_size
            )));
        }
        if self.min_keys < 2 {
            return Err(StorageError::invalid_argument(format!(
                "min_keys must be >= 2, got {}",
                self.min_keys
            )));
        }
        if self.max_key_size == 0 {
            return Err(StorageError::invalid_argument("max_key_size must be > 0"));
        }
        if self.max_value_size == 0 {
            return Err(StorageError::invalid_argument("max_value_size must be > 0"));
        }
        Ok(())
    }
}

/// A single node's contents, for interactively inspecting a database file.
/// Keys are rendered lossily as UTF-8 for display; this is a diagnostic
/// convenience, not part of the on-disk format.
#[derive(Debug, Clone)]
pub struct TreeDump {
    pub page_no: u64,
    pub is_leaf: bool,
    pub keys: Vec<String>,
    pub children: Vec<TreeDump>,
}

/// Counters describing a database's current on-disk and in-memory state.
#[derive(Debug, Clone, Copy)]
pub struct DbStats {
    /// High-water mark of allocated pages (the file's logical page count).
    pub total_pages: u64,
    /// Tree pages currently resident in the in-memory cache.
    pub cached_pages: usize,
    /// Configured cache capacity.
    pub cache_capacity: usize,
    /// Height of the tree in levels (0 for an empty database).
    pub tree_height: usize,
    /// Whether the on-disk free list holds any reusable pages.
    pub has_free_pages: bool,
}

/// A single open key/value database: a [`BTree`] paired with the [`Pager`]
/// that backs it.
///
/// No concurrency, no transactions: all operations run to completion on the
/// caller's thread before returning, exactly mirroring the Pager's
/// sequential state-machine contract.
pub struct Db {
    pager: Pager,
    tree: BTree,
    config: Config,
}

impl Db {
    /// Open or create a database at `path` with default configuration.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with_config(path, Config::default())
    }

    /// Open or create a database at `path` with an explicit configuration.
    pub fn open_with_config<P: AsRef<Path>>(path: P, config: Config) -> Result<Self> {
        config.validate()?;
        let pager = Pager::open(path.as_ref(), config.page_size as u64, config.cache_capacity)?;
        let tree = BTree::with_limits(
            config.min_keys,
            config.max_key_size,
            config.max_value_size,
            Box::new(LexicographicComparator),
        );
        Ok(Self { pager, tree, config })
    }

    /// Open or create a database at `path` with a caller-supplied key
    /// ordering instead of the default lexicographic-then-length one.
    pub fn open_with_comparator<P: AsRef<Path>>(
        path: P,
        config: Config,
        comparator: Box<dyn Comparator>,
    ) -> Result<Self> {
        config.validate()?;
        let pager = Pager::open(path.as_ref(), config.page_size as u64, config.cache_capacity)?;
        let tree = BTree::with_limits(config.min_keys, config.max_key_size, config.max_value_size, comparator);
        Ok(Self { pager, tree, config })
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Look up a value by key. `Ok(None)` covers both a missing key and a
    /// database that has never had a key inserted.
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.tree.get(&mut self.pager, key)
    }

    /// Insert or overwrite `key` with `value`.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        self.tree.put(&mut self.pager, key, value)
    }

    /// Delete `key`. Returns whether it was present.
    pub fn delete(&mut self, key: &[u8]) -> Result<bool> {
        self.tree.delete(&mut self.pager, key)
    }

    /// Whether `key` is present.
    pub fn contains(&mut self, key: &[u8]) -> Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// An in-order cursor over this database's key/value pairs, positioned
    /// invalid until one of its `seek*` methods is called.
    pub fn iter(&mut self) -> Iter<'_> {
        self.tree.iter(&mut self.pager)
    }

    /// Collect every key/value pair in comparator order. A convenience
    /// built on [`Db::iter`] for small databases and tests; prefer `iter`
    /// directly when the result set may be large.
    pub fn scan_all(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut it = self.iter();
        it.seek_first()?;
        it.collect_remaining()
    }

    /// Flush every dirty cached page to disk without closing the database.
    /// Not part of the normative surface (§6); a diagnostic/durability
    /// convenience for long-running callers that want a checkpoint.
    pub fn flush(&mut self) -> Result<()> {
        self.pager.prune(0, true)
    }

    /// Flush all dirty pages, write the header, and close the underlying
    /// file. Consumes the database per the Pager's close contract.
    pub fn close(self) -> Result<()> {
        self.pager.close()
    }

    /// Counters describing the database's current on-disk and in-memory
    /// state.
    pub fn stats(&mut self) -> Result<DbStats> {
        let tree_height = self.tree.height(&mut self.pager)?;
        Ok(DbStats {
            total_pages: self.pager.total_pages(),
            cached_pages: self.pager.cached_pages(),
            cache_capacity: self.config.cache_capacity,
            tree_height,
            has_free_pages: self.pager.has_free_pages(),
        })
    }

    /// Trace a key lookup, recording the page visited and the lower-bound
    /// decision made at each level. A diagnostic aid, not a normative API.
    pub fn debug_get(&mut self, key: &[u8]) -> Result<Vec<String>> {
        let mut trace = Vec::new();
        let mut page_no = match self.pager.root_page() {
            Some(root) => root,
            None => {
                trace.push("empty database: no root page".to_string());
                return Ok(trace);
            }
        };
        loop {
            let node = self.pager.get_node(page_no, false)?;
            let i = self.tree.lower_bound(&node.kvs, key);
            trace.push(format!(
                "page {} ({}, {} keys): lower_bound index {}",
                page_no,
                if node.is_leaf { "leaf" } else { "internal" },
                node.kvs.len(),
                i
            ));
            if i < node.kvs.len() && self.tree.keys_eq(&node.kvs[i].0, key) {
                trace.push(format!("matched at index {}", i));
                return Ok(trace);
            }
            if node.is_leaf {
                trace.push("not found".to_string());
                return Ok(trace);
            }
            page_no = node.children[i];
        }
    }

    /// Export the whole tree structure for interactive inspection, keyed
    /// off the current root. `None` for an empty database.
    pub fn dump_tree(&mut self) -> Result<Option<TreeDump>> {
        match self.pager.root_page() {
            Some(root) => Ok(Some(self.dump_node(root)?)),
            None => Ok(None),
        }
    }

    fn dump_node(&mut self, page_no: PageId) -> Result<TreeDump> {
        let node = self.pager.get_node(page_no, false)?;
        let keys = node
            .kvs
            .iter()
            .map(|(k, _)| String::from_utf8_lossy(k).to_string())
            .collect();
        let mut children = Vec::with_capacity(node.children.len());
        for &child in &node.children {
            children.push(self.dump_node(child)?);
        }
        Ok(TreeDump {
            page_no: page_no.value(),
            is_leaf: node.is_leaf,
            keys,
            children,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use tempfile::tempdir;

    #[test]
    fn test_put_get_update_delete_round_trip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(&path)?;

        db.put(b"key1", b"value1")?;
        assert_eq!(db.get(b"key1")?, Some(b"value1".to_vec()));

        db.put(b"key1", b"value2")?;
        assert_eq!(db.get(b"key1")?, Some(b"value2".to_vec()));

        assert!(db.delete(b"key1")?);
        assert_eq!(db.get(b"key1")?, None);

        assert_eq!(db.get(b"nonexistent")?, None);
        assert!(!db.delete(b"nonexistent")?);

        Ok(())
    }

    #[test]
    fn test_scan_all_returns_sorted_pairs() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(&path)?;

        for (k, v) in [("cherry", "3"), ("apple", "1"), ("banana", "2"), ("date", "4")] {
            db.put(k.as_bytes(), v.as_bytes())?;
        }

        let all = db.scan_all()?;
        let keys: Vec<String> = all.into_iter().map(|(k, _)| String::from_utf8(k).unwrap()).collect();
        assert_eq!(keys, vec!["apple", "banana", "cherry", "date"]);

        Ok(())
    }

    #[test]
    fn test_close_and_reopen_preserves_data() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let mut rng = rand::thread_rng();
        let mut pairs: Vec<(Vec<u8>, Vec<u8>)> = Vec::with_capacity(1000);
        for i in 0..1000u32 {
            let value_len = rng.gen_range(1..64);
            let mut value = vec![0u8; value_len];
            rng.fill(value.as_mut_slice());
            // Prefix each key with its index so random suffixes can't collide.
            let key = format!("{:04}-{:08x}", i, rng.gen::<u32>()).into_bytes();
            pairs.push((key, value));
        }

        {
            let mut db = Db::open(&path)?;
            for (key, value) in &pairs {
                db.put(key, value)?;
            }
            db.close()?;
        }

        let mut expected = pairs.clone();
        expected.sort_by(|a, b| a.0.cmp(&b.0));

        {
            let mut db = Db::open(&path)?;
            for (key, value) in &pairs {
                assert_eq!(db.get(key)?, Some(value.clone()));
            }

            let scanned = db.scan_all()?;
            assert_eq!(scanned, expected);
        }

        Ok(())
    }

    #[test]
    fn test_free_list_reuse_keeps_total_pages_flat() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(&path)?;

        for i in 0..100u32 {
            let key = format!("k{:04}", i);
            db.put(key.as_bytes(), key.as_bytes())?;
        }
        for i in 0..100u32 {
            let key = format!("k{:04}", i);
            db.delete(key.as_bytes())?;
        }
        let peak = db.stats()?.total_pages;

        for i in 100..200u32 {
            let key = format!("k{:04}", i);
            db.put(key.as_bytes(), key.as_bytes())?;
        }
        assert_eq!(db.stats()?.total_pages, peak);

        Ok(())
    }

    #[test]
    fn test_overflow_payload_round_trips() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(&path)?;

        let big: Vec<u8> = (0..6400u32).map(|i| (i % 256) as u8).collect();
        db.put(b"big", &big)?;
        assert_eq!(db.get(b"big")?, Some(big));

        Ok(())
    }

    #[test]
    fn test_config_rejects_sub_minimum_min_keys() {
        let config = Config {
            min_keys: 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_rejects_mismatched_page_size() {
        let config = Config {
            page_size: PAGE_SIZE + 1,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_debug_get_traces_every_visited_level() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(&path)?;
        for i in 0..64u32 {
            let key = format!("k{:03}", i);
            db.put(key.as_bytes(), key.as_bytes())?;
        }

        let trace = db.debug_get(b"k032")?;
        assert!(trace.last().unwrap().starts_with("matched"));
        assert!(trace.len() > 1);

        Ok(())
    }

    #[test]
    fn test_dump_tree_is_none_for_empty_database() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut db = Db::open(&path)?;
        assert!(db.dump_tree()?.is_none());
        Ok(())
    }
}
