//! Classical on-disk B-tree: point lookup, insert-with-split, and
//! delete-with-rebalance over nodes addressed by [`PageId`] through a
//! [`Pager`].
//!
//! Every operation takes the pager explicitly rather than owning one —
//! the tree is pure algorithm over the arena the pager maintains.

use crate::error::{Result, StorageError};
use crate::page::{Kv, Node};
use crate::storage::Pager;
use crate::types::{PageId, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE};

use super::comparator::{Comparator, LexicographicComparator};
use super::cursor::Iter;

/// Outcome of a recursive insert: either absorbed in place, or the node
/// split into two freshly allocated halves with a median to promote.
enum Insert {
    Done,
    Split { left: PageId, median: Kv, right: PageId },
}

/// A classical B-tree parameterized by minimum-key degree `t`.
pub struct BTree {
    min_keys: usize,
    max_key_size: usize,
    max_value_size: usize,
    comparator: Box<dyn Comparator>,
}

impl BTree {
    /// A tree with the default lexicographic comparator and default key/value
    /// size ceilings.
    pub fn new(min_keys: usize) -> Self {
        Self::with_comparator(min_keys, Box::new(LexicographicComparator))
    }

    /// A tree with a caller-supplied key ordering and default key/value size
    /// ceilings.
    pub fn with_comparator(min_keys: usize, comparator: Box<dyn Comparator>) -> Self {
        Self::with_limits(min_keys, DEFAULT_MAX_KEY_SIZE, DEFAULT_MAX_VALUE_SIZE, comparator)
    }

    /// A tree with a caller-supplied key ordering and explicit key/value size
    /// ceilings, as configured by [`crate::Config`].
    pub fn with_limits(
        min_keys: usize,
        max_key_size: usize,
        max_value_size: usize,
        comparator: Box<dyn Comparator>,
    ) -> Self {
        assert!(min_keys >= 2, "min_keys must be >= 2");
        Self {
            min_keys,
            max_key_size,
            max_value_size,
            comparator,
        }
    }

    /// The configured minimum-key degree `t`.
    pub fn min_keys(&self) -> usize {
        self.min_keys
    }

    pub(crate) fn lower_bound(&self, kvs: &[Kv], key: &[u8]) -> usize {
        let mut lo = 0;
        let mut hi = kvs.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.comparator.less(&kvs[mid].0, key) {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub(crate) fn upper_bound(&self, kvs: &[Kv], key: &[u8]) -> usize {
        let mut lo = 0;
        let mut hi = kvs.len();
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.comparator.less(key, &kvs[mid].0) {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    pub(crate) fn keys_eq(&self, a: &[u8], b: &[u8]) -> bool {
        self.comparator.eq(a, b)
    }

    /// Point lookup. Returns `None` for a missing key, including on a
    /// database that has never had a key inserted.
    pub fn get(&self, pager: &mut Pager, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut page_no = match pager.root_page() {
            Some(root) => root,
            None => return Ok(None),
        };
        loop {
            let node = pager.get_node(page_no, false)?;
            let i = self.lower_bound(&node.kvs, key);
            if i < node.kvs.len() && self.keys_eq(&node.kvs[i].0, key) {
                return Ok(Some(node.kvs[i].1.clone()));
            }
            if node.is_leaf {
                return Ok(None);
            }
            page_no = node.children[i];
        }
    }

    /// Insert or overwrite `key` with `value`.
    pub fn put(&self, pager: &mut Pager, key: &[u8], value: &[u8]) -> Result<()> {
        if key.len() > self.max_key_size {
            return Err(StorageError::KeyTooLarge {
                size: key.len(),
                max: self.max_key_size,
            });
        }
        if value.len() > self.max_value_size {
            return Err(StorageError::ValueTooLarge {
                size: value.len(),
                max: self.max_value_size,
            });
        }

        let root = pager.get_root()?;
        match self.insert(pager, root, key, value)? {
            Insert::Done => Ok(()),
            Insert::Split { left, median, right } => {
                let new_root_page = pager.new_tree_page(false)?;
                let new_root = Node {
                    page_no: new_root_page,
                    is_leaf: false,
                    children: vec![left, right],
                    kvs: vec![median],
                };
                pager.put_node(new_root)?;
                pager.set_root(new_root_page);
                Ok(())
            }
        }
    }

    fn insert(&self, pager: &mut Pager, page_no: PageId, key: &[u8], value: &[u8]) -> Result<Insert> {
        let mut node = pager.get_node(page_no, false)?;
        let i = self.lower_bound(&node.kvs, key);

        if i < node.kvs.len() && self.keys_eq(&node.kvs[i].0, key) {
            node.kvs[i].1 = value.to_vec();
            pager.put_node(node)?;
            return Ok(Insert::Done);
        }

        if node.is_leaf {
            node.kvs.insert(i, (key.to_vec(), value.to_vec()));
        } else {
            let child = node.children[i];
            match self.insert(pager, child, key, value)? {
                Insert::Done => {}
                Insert::Split { left, median, right } => {
                    node.children[i] = left;
                    node.children.insert(i + 1, right);
                    node.kvs.insert(i, median);
                }
            }
        }

        if node.kvs.len() > 2 * self.min_keys {
            let (left, median, right) = self.split(pager, node)?;
            Ok(Insert::Split { left, median, right })
        } else {
            pager.put_node(node)?;
            Ok(Insert::Done)
        }
    }

    /// Split an overfull node into two fresh pages, freeing the original.
    fn split(&self, pager: &mut Pager, node: Node) -> Result<(PageId, Kv, PageId)> {
        let m = node.kvs.len() / 2;
        let is_leaf = node.is_leaf;
        let old_page = node.page_no;
        let mut kvs = node.kvs;
        let mut children = node.children;

        let right_kvs = kvs.split_off(m + 1);
        let median = kvs.pop().expect("split point is within bounds");
        let left_kvs = kvs;

        let (left_children, right_children) = if is_leaf {
            (Vec::new(), Vec::new())
        } else {
            let right_children = children.split_off(m + 1);
            (children, right_children)
        };

        let left_page = pager.new_tree_page(is_leaf)?;
        let right_page = pager.new_tree_page(is_leaf)?;
        pager.put_node(Node {
            page_no: left_page,
            is_leaf,
            children: left_children,
            kvs: left_kvs,
        })?;
        pager.put_node(Node {
            page_no: right_page,
            is_leaf,
            children: right_children,
            kvs: right_kvs,
        })?;
        pager.free_page(old_page)?;

        Ok((left_page, median, right_page))
    }

    /// Delete `key`. Returns whether it was present.
    pub fn delete(&self, pager: &mut Pager, key: &[u8]) -> Result<bool> {
        let root = match pager.root_page() {
            Some(root) => root,
            None => return Ok(false),
        };
        let found = self.delete_in(pager, root, key)?;
        if found {
            self.fix_root(pager)?;
        }
        Ok(found)
    }

    fn delete_in(&self, pager: &mut Pager, page_no: PageId, key: &[u8]) -> Result<bool> {
        let mut node = pager.get_node(page_no, false)?;
        let i = self.lower_bound(&node.kvs, key);
        let matched = i < node.kvs.len() && self.keys_eq(&node.kvs[i].0, key);

        if matched {
            if node.is_leaf {
                node.kvs.remove(i);
                pager.put_node(node)?;
            } else {
                let child = node.children[i];
                let predecessor = self.max_kv(pager, child)?;
                node.kvs[i] = predecessor.clone();
                pager.put_node(node)?;
                self.delete_in(pager, child, &predecessor.0)?;
                self.fix_child(pager, page_no, i)?;
            }
            return Ok(true);
        }

        if node.is_leaf {
            return Ok(false);
        }

        let child_idx = i;
        let child = node.children[child_idx];
        let found = self.delete_in(pager, child, key)?;
        if found {
            self.fix_child(pager, page_no, child_idx)?;
        }
        Ok(found)
    }

    /// The rightmost key/value in the subtree rooted at `page_no`.
    fn max_kv(&self, pager: &mut Pager, page_no: PageId) -> Result<Kv> {
        let mut current = page_no;
        loop {
            let node = pager.get_node(current, false)?;
            if node.is_leaf {
                return node
                    .kvs
                    .last()
                    .cloned()
                    .ok_or_else(|| StorageError::corruption_at(current, "leaf has no predecessor key"));
            }
            current = *node
                .children
                .last()
                .ok_or_else(|| StorageError::corruption_at(current, "internal node has no children"))?;
        }
    }

    /// Re-read `parent_page`'s child at `child_idx` and rebalance it if it
    /// has dropped below the minimum key count.
    fn fix_child(&self, pager: &mut Pager, parent_page: PageId, child_idx: usize) -> Result<()> {
        let parent = pager.get_node(parent_page, false)?;
        let child_page = parent.children[child_idx];
        let child = pager.get_node(child_page, false)?;
        if child.kvs.len() >= self.min_keys {
            return Ok(());
        }
        self.rebalance(pager, parent, child_idx)
    }

    /// Restore the minimum-key invariant on `parent.children[child_idx]` by
    /// rotating from a sibling, or merging with one if no rotation applies.
    /// Rotation is preferred over merge, and the left sibling over the right.
    fn rebalance(&self, pager: &mut Pager, mut parent: Node, child_idx: usize) -> Result<()> {
        let child_page = parent.children[child_idx];
        let mut child = pager.get_node(child_page, false)?;

        let left_idx = child_idx.checked_sub(1);
        let right_idx = if child_idx + 1 < parent.children.len() {
            Some(child_idx + 1)
        } else {
            None
        };

        if let Some(li) = left_idx {
            let left_page = parent.children[li];
            let mut left = pager.get_node(left_page, false)?;
            if left.kvs.len() > self.min_keys {
                let separator = parent.kvs[li].clone();
                child.kvs.insert(0, separator);
                if !child.is_leaf {
                    let moved = left.children.pop().expect("internal sibling keeps a child per key");
                    child.children.insert(0, moved);
                }
                parent.kvs[li] = left.kvs.pop().expect("left sibling has a spare key");
                pager.put_node(left)?;
                pager.put_node(child)?;
                pager.put_node(parent)?;
                return Ok(());
            }
        }

        if let Some(ri) = right_idx {
            let right_page = parent.children[ri];
            let mut right = pager.get_node(right_page, false)?;
            if right.kvs.len() > self.min_keys {
                let sep_idx = child_idx;
                let separator = parent.kvs[sep_idx].clone();
                child.kvs.push(separator);
                if !child.is_leaf {
                    let moved = right.children.remove(0);
                    child.children.push(moved);
                }
                parent.kvs[sep_idx] = right.kvs.remove(0);
                pager.put_node(right)?;
                pager.put_node(child)?;
                pager.put_node(parent)?;
                return Ok(());
            }
        }

        if let Some(li) = left_idx {
            let left_page = parent.children[li];
            let mut left = pager.get_node(left_page, false)?;
            let separator = parent.kvs.remove(li);
            left.kvs.push(separator);
            left.kvs.extend(child.kvs.drain(..));
            left.children.extend(child.children.drain(..));
            parent.children.remove(li + 1);
            pager.free_page(child_page)?;
            pager.put_node(left)?;
            pager.put_node(parent)?;
            return Ok(());
        }

        if let Some(ri) = right_idx {
            let right_page = parent.children[ri];
            let mut right = pager.get_node(right_page, false)?;
            let separator = parent.kvs.remove(child_idx);
            child.kvs.push(separator);
            child.kvs.extend(right.kvs.drain(..));
            child.children.extend(right.children.drain(..));
            parent.children.remove(ri);
            pager.free_page(right_page)?;
            pager.put_node(child)?;
            pager.put_node(parent)?;
            return Ok(());
        }

        Err(StorageError::corruption_at(
            child_page,
            "underfull node has no sibling to rebalance against",
        ))
    }

    /// Collapse the root by one level when it becomes an empty internal node.
    fn fix_root(&self, pager: &mut Pager) -> Result<()> {
        let root_page = match pager.root_page() {
            Some(root) => root,
            None => return Ok(()),
        };
        let root = pager.get_node(root_page, false)?;
        if root.is_leaf || !root.kvs.is_empty() {
            return Ok(());
        }
        let sole_child = *root
            .children
            .first()
            .ok_or_else(|| StorageError::corruption_at(root_page, "empty internal root has no child"))?;
        pager.free_page(root_page)?;
        pager.set_root(sole_child);
        Ok(())
    }

    /// Height of the tree in levels (0 for an empty database, 1 for a
    /// single-leaf root).
    pub fn height(&self, pager: &mut Pager) -> Result<usize> {
        let mut page_no = match pager.root_page() {
            Some(root) => root,
            None => return Ok(0),
        };
        let mut height = 1;
        loop {
            let node = pager.get_node(page_no, false)?;
            if node.is_leaf {
                return Ok(height);
            }
            page_no = node.children[0];
            height += 1;
        }
    }

    /// An in-order cursor over this tree, positioned invalid until a seek.
    pub fn iter<'a>(&'a self, pager: &'a mut Pager) -> Iter<'a> {
        Iter::new(self, pager)
    }
}
