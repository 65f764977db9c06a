//! Classical on-disk B-tree: point lookups, insert-with-split,
//! delete-with-rebalance, and an in-order cursor, over nodes addressed by
//! page number through the [`Pager`](crate::storage::Pager).

mod comparator;
mod cursor;
mod tree;

pub use comparator::{Comparator, LexicographicComparator};
pub use cursor::Iter;
pub use tree::BTree;
