//! Database file header.
//!
//! Page 0 of the database file carries the persistent [`DbHeader`]: the
//! free-list head, the root page, the high-water mark of allocated pages,
//! and the configured page size. A magic string and a `crc32` checksum of
//! those fields live in page 0's reserved tail, so `open` can refuse a file
//! that isn't one of this store's databases (or whose header bytes were
//! torn by a partial write) before any tree operation runs.

use crate::error::{Result, StorageError};
use crate::types::PageId;

/// Identifies this file format. Bumped whenever the on-disk layout changes.
pub const MAGIC: &[u8; 16] = b"btreekv-dbfile-1";

/// Bytes of page 0 occupied by the header fields, magic, and checksum.
/// The remainder of page 0 is reserved and left zeroed.
pub const HEADER_RESERVED_SIZE: usize = 16 + 8 + 8 + 8 + 8 + 4;

/// The database's persistent header, stored at the start of page 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbHeader {
    /// Head of the on-disk free list, or `None` if no page is free.
    pub free_list: Option<PageId>,
    /// Root page of the tree, or `None` when the database has never had a
    /// key inserted.
    pub root_page: Option<PageId>,
    /// Next-to-allocate high-water mark: `total_pages` itself is always a
    /// valid next page number when the free list is empty.
    pub total_pages: u64,
    /// Page size this database was created with.
    pub page_size: u64,
}

impl DbHeader {
    /// A freshly initialized header for a brand-new database file.
    pub fn fresh(page_size: u64) -> Self {
        Self {
            free_list: None,
            root_page: None,
            total_pages: 1,
            page_size,
        }
    }

    /// Parse a header from the first [`HEADER_RESERVED_SIZE`] bytes of page 0,
    /// rejecting a file with the wrong magic or a checksum mismatch.
    pub fn read(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_RESERVED_SIZE {
            return Err(StorageError::invalid_header("page 0 shorter than header"));
        }
        if &bytes[0..16] != MAGIC {
            return Err(StorageError::invalid_header("bad magic bytes"));
        }

        let fields = &bytes[16..44];
        let free_list = i64::from_le_bytes(fields[0..8].try_into().unwrap());
        let root_page = i64::from_le_bytes(fields[8..16].try_into().unwrap());
        let total_pages = u64::from_le_bytes(fields[16..24].try_into().unwrap());

        let page_size_bytes = &bytes[40..48];
        let page_size = u64::from_le_bytes(page_size_bytes.try_into().unwrap());

        let stored_checksum = u32::from_le_bytes(bytes[48..52].try_into().unwrap());
        let computed_checksum = crc32fast::hash(&bytes[16..48]);
        if stored_checksum != computed_checksum {
            return Err(StorageError::invalid_header("header checksum mismatch"));
        }

        Ok(Self {
            free_list: PageId::from_link(free_list),
            root_page: PageId::from_link(root_page),
            total_pages,
            page_size,
        })
    }

    /// Write this header into the first [`HEADER_RESERVED_SIZE`] bytes of `buf`.
    /// The rest of `buf` (the remainder of page 0) is left untouched.
    pub fn write(&self, buf: &mut [u8]) {
        buf[0..16].copy_from_slice(MAGIC);
        buf[16..24].copy_from_slice(&PageId::to_link(self.free_list).to_le_bytes());
        buf[24..32].copy_from_slice(&PageId::to_link(self.root_page).to_le_bytes());
        buf[32..40].copy_from_slice(&self.total_pages.to_le_bytes());
        buf[40..48].copy_from_slice(&self.page_size.to_le_bytes());
        let checksum = crc32fast::hash(&buf[16..48]);
        buf[48..52].copy_from_slice(&checksum.to_le_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_header_round_trips() {
        let header = DbHeader::fresh(512);
        let mut buf = [0u8; HEADER_RESERVED_SIZE];
        header.write(&mut buf);
        assert_eq!(DbHeader::read(&buf).unwrap(), header);
    }

    #[test]
    fn test_populated_header_round_trips() {
        let header = DbHeader {
            free_list: Some(PageId::new(4)),
            root_page: Some(PageId::new(1)),
            total_pages: 9,
            page_size: 512,
        };
        let mut buf = [0u8; HEADER_RESERVED_SIZE];
        header.write(&mut buf);
        assert_eq!(DbHeader::read(&buf).unwrap(), header);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut buf = [0u8; HEADER_RESERVED_SIZE];
        DbHeader::fresh(512).write(&mut buf);
        buf[0] ^= 0xFF;
        assert!(DbHeader::read(&buf).is_err());
    }

    #[test]
    fn test_rejects_corrupted_checksum() {
        let mut buf = [0u8; HEADER_RESERVED_SIZE];
        DbHeader::fresh(512).write(&mut buf);
        buf[32] ^= 0xFF; // flip a byte inside total_pages
        assert!(DbHeader::read(&buf).is_err());
    }
}
