//! The pager: file I/O, the on-disk free list, page allocation, overflow
//! chaining, and the in-memory Tree page cache.
//!
//! This is the arena of the arena-plus-index model described in the crate's
//! design notes: the cache owns one [`Node`] per page number, and the
//! B-tree and iterator hold only [`PageId`]s. Every access goes through
//! [`Pager::get_node`]/[`Pager::put_node`], which clone out of and write
//! whole copies back into the cache entry rather than handing out
//! long-lived borrows.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::buffer::Cache;
use crate::error::{Result, StorageError};
use crate::page::{Node, PageHeader, PAGE_HEADER_SIZE, PAYLOAD_CAPACITY};
use crate::storage::file_header::{DbHeader, HEADER_RESERVED_SIZE};
use crate::types::{PageId, PageType};
use std::collections::HashMap;

/// Paged storage manager over a single random-access file.
pub struct Pager {
    file: File,
    file_len: u64,
    page_size: u64,
    header: DbHeader,
    cache: Cache,
    cache_capacity: usize,
    /// Per-cached-page overflow chain, in link order. Populated on a cache
    /// miss (by walking `of_page_no` from disk) or on creation of a fresh
    /// Tree page, kept current by every flush, and dropped when the page is
    /// freed or evicted — a later re-fetch recomputes it from disk.
    overflow_chains: HashMap<PageId, Vec<PageId>>,
}

impl Pager {
    /// Open or create a database file.
    pub fn open(path: &Path, page_size: u64, cache_capacity: usize) -> Result<Self> {
        let exists = path.exists();
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();

        let header = if exists && file_len >= page_size {
            let mut buf = vec![0u8; HEADER_RESERVED_SIZE];
            file.seek(SeekFrom::Start(0))?;
            file.read_exact(&mut buf)?;
            let header = DbHeader::read(&buf)?;
            if header.page_size != page_size {
                return Err(StorageError::invalid_argument(format!(
                    "configured page size {} does not match on-disk page size {}",
                    page_size, header.page_size
                )));
            }
            header
        } else {
            let header = DbHeader::fresh(page_size);
            let mut buf = vec![0u8; page_size as usize];
            header.write(&mut buf);
            file.seek(SeekFrom::Start(0))?;
            file.write_all(&buf)?;
            file.set_len(page_size)?;
            header
        };

        let file_len = file_len.max(page_size);

        Ok(Self {
            file,
            file_len,
            page_size,
            header,
            cache: Cache::new(),
            cache_capacity,
            overflow_chains: HashMap::new(),
        })
    }

    /// Bytes of payload a page can carry beyond its header.
    fn payload_capacity(&self) -> usize {
        PAYLOAD_CAPACITY
    }

    fn offset_of(&self, page_no: PageId) -> u64 {
        page_no.file_offset(self.page_size as usize)
    }

    fn ensure_len(&mut self, page_no: PageId) -> Result<()> {
        let needed = (page_no.value() + 1) * self.page_size;
        if needed > self.file_len {
            self.file.set_len(needed)?;
            self.file_len = needed;
        }
        Ok(())
    }

    fn read_raw_page(&mut self, page_no: PageId) -> Result<Vec<u8>> {
        if page_no.value() >= self.header.total_pages {
            return Err(StorageError::corruption_at(page_no, "page past end of file"));
        }
        let offset = self.offset_of(page_no);
        let mut buf = vec![0u8; self.page_size as usize];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_page_header(&mut self, page_no: PageId) -> Result<PageHeader> {
        let buf = self.read_raw_page(page_no)?;
        PageHeader::read(&buf[..PAGE_HEADER_SIZE])
            .ok_or_else(|| StorageError::corruption_at(page_no, "malformed page header"))
    }

    fn write_page(&mut self, page_no: PageId, header: &PageHeader, payload: &[u8]) -> Result<()> {
        self.ensure_len(page_no)?;
        let mut buf = vec![0u8; self.page_size as usize];
        header.write(&mut buf);
        buf[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + payload.len()].copy_from_slice(payload);
        let offset = self.offset_of(page_no);
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Allocate a fresh page number: the free list's head if non-empty,
    /// otherwise the next high-water-mark page, extending the file.
    fn alloc_page_no(&mut self) -> Result<PageId> {
        if let Some(head) = self.header.free_list {
            let header = self.read_page_header(head)?;
            self.header.free_list = header.next_free;
            Ok(head)
        } else {
            let page_no = PageId::new(self.header.total_pages);
            self.header.total_pages += 1;
            self.ensure_len(page_no)?;
            Ok(page_no)
        }
    }

    fn free_single_page(&mut self, page_no: PageId) -> Result<()> {
        let header = PageHeader {
            page_no,
            page_type: PageType::Free,
            next_free: self.header.free_list,
            of_page_no: None,
            data_size: 0,
            page_cnt: 1,
            is_leaf: false,
        };
        self.write_page(page_no, &header, &[])?;
        self.header.free_list = Some(page_no);
        Ok(())
    }

    /// Return a Tree page's primary page and its entire overflow chain to
    /// the free list, and drop it from the cache.
    pub fn free_page(&mut self, page_no: PageId) -> Result<()> {
        if let Some(chain) = self.overflow_chains.remove(&page_no) {
            for of_page in chain {
                self.free_single_page(of_page)?;
            }
        }
        self.cache.remove(page_no);
        self.free_single_page(page_no)
    }

    /// Allocate a new, empty Tree page and seat it in the cache, dirty and
    /// unpinned.
    pub fn new_tree_page(&mut self, is_leaf: bool) -> Result<PageId> {
        let page_no = self.alloc_page_no()?;
        self.cache.insert(page_no, Node::empty(page_no, is_leaf), true, false);
        self.overflow_chains.insert(page_no, Vec::new());
        self.maybe_prune()?;
        Ok(page_no)
    }

    /// The tree root, allocating a fresh leaf root and pinning it if the
    /// database has never had a key inserted.
    pub fn get_root(&mut self) -> Result<PageId> {
        match self.header.root_page {
            Some(root) => {
                self.get_node(root, true)?;
                Ok(root)
            }
            None => {
                let page_no = self.new_tree_page(true)?;
                self.cache.pin(page_no);
                self.header.root_page = Some(page_no);
                Ok(page_no)
            }
        }
    }

    /// Current root page, if the database has ever had a key inserted.
    pub fn root_page(&self) -> Option<PageId> {
        self.header.root_page
    }

    /// Record `page_no` as the tree root and pin it sticky for the open
    /// lifetime, per this crate's read of the source's `stick` flag.
    pub fn set_root(&mut self, page_no: PageId) {
        self.header.root_page = Some(page_no);
        self.cache.pin(page_no);
    }

    /// Fetch a node, either from the cache or by reading its primary page
    /// and following its overflow chain from disk. `pin` is OR'd into the
    /// entry's existing pin state.
    pub fn get_node(&mut self, page_no: PageId, pin: bool) -> Result<Node> {
        if let Some(entry) = self.cache.get(page_no) {
            let node = entry.node.clone();
            if pin {
                self.cache.pin(page_no);
            }
            return Ok(node);
        }

        let header = self.read_page_header(page_no)?;
        if header.page_type != PageType::Tree {
            return Err(StorageError::corruption_at(page_no, "expected a Tree page"));
        }

        let total_len = header.data_size as usize;
        let capacity = self.payload_capacity();
        let raw = self.read_raw_page(page_no)?;
        let mut payload = Vec::with_capacity(total_len);
        let primary_take = total_len.min(capacity);
        payload.extend_from_slice(&raw[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + primary_take]);

        let mut chain = Vec::new();
        let mut remaining = total_len - primary_take;
        let mut next = header.of_page_no;
        while remaining > 0 {
            let of_page = next.ok_or_else(|| {
                StorageError::corruption_at(page_no, "overflow chain ended before payload did")
            })?;
            let of_header = self.read_page_header(of_page)?;
            if of_header.page_type != PageType::Overflow {
                return Err(StorageError::corruption_at(of_page, "expected an Overflow page"));
            }
            let of_raw = self.read_raw_page(of_page)?;
            let take = (of_header.data_size as usize).min(remaining);
            payload.extend_from_slice(&of_raw[PAGE_HEADER_SIZE..PAGE_HEADER_SIZE + take]);
            remaining -= take;
            chain.push(of_page);
            next = of_header.of_page_no;
        }

        let node = Node::deserialize(page_no, header.is_leaf, &payload)?;
        self.cache.insert(page_no, node.clone(), false, pin);
        self.overflow_chains.insert(page_no, chain);
        self.maybe_prune()?;
        Ok(node)
    }

    /// Write a (possibly newly constructed) node back into the cache as
    /// dirty. The primary/overflow pages on disk are not touched until
    /// eviction or close.
    pub fn put_node(&mut self, node: Node) -> Result<()> {
        let page_no = node.page_no;
        self.cache.insert(page_no, node, true, false);
        self.overflow_chains.entry(page_no).or_default();
        Ok(())
    }

    /// Serialize a dirty cached node and write its primary and overflow
    /// pages to disk, reconciling the overflow chain length: surplus pages
    /// are freed immediately, a shortfall is filled by allocating more.
    fn flush_node(&mut self, page_no: PageId) -> Result<()> {
        let (node, dirty) = match self.cache.peek(page_no) {
            Some(entry) => (entry.node.clone(), entry.dirty),
            None => return Ok(()),
        };
        if !dirty {
            return Ok(());
        }

        let payload = node.serialize();
        let total_len = payload.len();
        let capacity = self.payload_capacity();
        let page_cnt = total_len.div_ceil(capacity).max(1);
        let overflow_needed = page_cnt - 1;

        let existing_chain = self.overflow_chains.remove(&page_no).unwrap_or_default();
        let new_chain = if overflow_needed <= existing_chain.len() {
            let (keep, surplus) = existing_chain.split_at(overflow_needed);
            for &p in surplus {
                self.free_single_page(p)?;
            }
            keep.to_vec()
        } else {
            let mut keep = existing_chain;
            for _ in 0..(overflow_needed - keep.len()) {
                let new_of = self.alloc_page_no()?;
                keep.push(new_of);
            }
            keep
        };

        let primary_take = total_len.min(capacity);
        let primary_header = PageHeader {
            page_no,
            page_type: PageType::Tree,
            next_free: None,
            of_page_no: new_chain.first().copied(),
            data_size: total_len as u32,
            page_cnt: page_cnt as i16,
            is_leaf: node.is_leaf,
        };
        self.write_page(page_no, &primary_header, &payload[..primary_take])?;

        let mut offset = primary_take;
        for (i, &of_page) in new_chain.iter().enumerate() {
            let remaining = total_len - offset;
            let take = remaining.min(capacity);
            let header = PageHeader {
                page_no: of_page,
                page_type: PageType::Overflow,
                next_free: None,
                of_page_no: new_chain.get(i + 1).copied(),
                data_size: take as u32,
                page_cnt: 1,
                is_leaf: false,
            };
            self.write_page(of_page, &header, &payload[offset..offset + take])?;
            offset += take;
        }

        self.overflow_chains.insert(page_no, new_chain);
        self.cache.clear_dirty(page_no);
        Ok(())
    }

    /// Evict least-recently-used unpinned pages, flushing dirty ones, until
    /// the cache holds at most `limit` pages. When `force` is true, pinned
    /// pages are eligible too (used only by `close`).
    pub fn prune(&mut self, limit: usize, force: bool) -> Result<()> {
        loop {
            if self.cache.len() <= limit {
                return Ok(());
            }
            let victim = self
                .cache
                .lru_order()
                .into_iter()
                .find(|&page_no| force || !self.cache.peek(page_no).map(|e| e.pinned).unwrap_or(false));

            let victim = match victim {
                Some(v) => v,
                None => return Ok(()), // everything left is pinned and force is false
            };

            self.flush_node(victim)?;
            self.cache.remove(victim);
            self.overflow_chains.remove(&victim);
        }
    }

    fn maybe_prune(&mut self) -> Result<()> {
        if self.cache.len() > self.cache_capacity {
            self.prune(self.cache_capacity, false)?;
        }
        Ok(())
    }

    /// Number of pages the file logically holds (the high-water mark).
    pub fn total_pages(&self) -> u64 {
        self.header.total_pages
    }

    /// Whether the free list is non-empty.
    pub fn has_free_pages(&self) -> bool {
        self.header.free_list.is_some()
    }

    /// Number of Tree pages currently resident in the cache.
    pub fn cached_pages(&self) -> usize {
        self.cache.len()
    }

    fn flush_header(&mut self) -> Result<()> {
        let mut buf = vec![0u8; self.page_size as usize];
        self.header.write(&mut buf);
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Flush every dirty Tree page and the database header, then close the
    /// file. Per the single-threaded contract, this consumes the pager.
    pub fn close(mut self) -> Result<()> {
        self.prune(0, true)?;
        self.flush_header()?;
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PAGE_SIZE;
    use tempfile::tempdir;

    fn open(path: &Path) -> Pager {
        Pager::open(path, PAGE_SIZE as u64, 1000).unwrap()
    }

    #[test]
    fn test_fresh_database_has_no_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let pager = open(&path);
        assert_eq!(pager.root_page(), None);
        assert_eq!(pager.total_pages(), 1);
    }

    #[test]
    fn test_get_root_allocates_and_pins_a_leaf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut pager = open(&path);
        let root = pager.get_root().unwrap();
        let node = pager.get_node(root, false).unwrap();
        assert!(node.is_leaf);
        assert!(node.kvs.is_empty());
    }

    #[test]
    fn test_put_then_flush_then_reread_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let page_no;
        {
            let mut pager = open(&path);
            let root = pager.get_root().unwrap();
            page_no = root;
            let mut node = pager.get_node(root, false).unwrap();
            node.kvs.push((b"a".to_vec(), b"1".to_vec()));
            pager.put_node(node).unwrap();
            pager.close().unwrap();
        }
        {
            let mut pager = open(&path);
            assert_eq!(pager.root_page(), Some(page_no));
            let node = pager.get_node(page_no, false).unwrap();
            assert_eq!(node.kvs, vec![(b"a".to_vec(), b"1".to_vec())]);
        }
    }

    #[test]
    fn test_free_page_reuses_on_next_allocation() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut pager = open(&path);
        let p1 = pager.new_tree_page(true).unwrap();
        let p2 = pager.new_tree_page(true).unwrap();
        pager.free_page(p1).unwrap();
        let p3 = pager.new_tree_page(true).unwrap();
        assert_eq!(p3, p1);
        assert!(p2 != p1);
    }

    #[test]
    fn test_overflow_chain_round_trips_large_payload() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let big_value = vec![0xABu8; 6400];
        let page_no;
        {
            let mut pager = open(&path);
            let root = pager.get_root().unwrap();
            page_no = root;
            let mut node = pager.get_node(root, false).unwrap();
            node.kvs.push((b"big".to_vec(), big_value.clone()));
            pager.put_node(node).unwrap();
            pager.close().unwrap();
        }
        {
            let mut pager = open(&path);
            let node = pager.get_node(page_no, false).unwrap();
            assert_eq!(node.kvs[0].1, big_value);
        }
    }

    #[test]
    fn test_shrinking_overflow_chain_frees_surplus_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut pager = open(&path);
        let root = pager.get_root().unwrap();
        let mut node = pager.get_node(root, false).unwrap();
        node.kvs.push((b"big".to_vec(), vec![1u8; 6400]));
        pager.put_node(node).unwrap();
        pager.flush_node(root).unwrap();
        let pages_with_overflow = pager.total_pages();

        let mut node = pager.get_node(root, false).unwrap();
        node.kvs[0].1 = vec![2u8; 10];
        pager.put_node(node).unwrap();
        pager.flush_node(root).unwrap();

        // total_pages never shrinks, but the freed overflow pages must be
        // reusable on the next allocation.
        assert_eq!(pager.total_pages(), pages_with_overflow);
        assert!(pager.has_free_pages());
    }

    #[test]
    fn test_prune_evicts_unpinned_pages_but_never_the_pinned_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let mut pager = open(&path);
        let root = pager.get_root().unwrap();
        for i in 0..5u64 {
            pager.new_tree_page(true).unwrap();
            let _ = i;
        }
        assert!(pager.cached_pages() > 1);
        pager.prune(1, false).unwrap();
        assert_eq!(pager.cached_pages(), 1);
        // root survives because it is pinned
        assert!(pager.get_node(root, false).is_ok());
    }
}
