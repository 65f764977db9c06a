//! In-memory page cache: one owned [`Node`](crate::page::Node) per cached
//! page number, with LRU recency and sticky pinning.
//!
//! The cache is the arena of the arena-plus-index model: the B-tree and
//! iterator never hold a borrow into it, only a [`PageId`](crate::types::PageId).
//! Every access goes through [`crate::storage::Pager`], which clones the
//! node out, and writes back a whole new copy on mutation.

mod cache;
mod lru;

pub use cache::{Cache, CacheEntry};
pub use lru::LruList;
