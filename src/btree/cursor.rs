//! Stack-based in-order iterator over a [`BTree`](super::tree::BTree).
//!
//! An `Iter` holds the path of pages from the root down to its current
//! position and an index into the last node's key sequence. It borrows the
//! tree and pager for its lifetime; any `put`/`del` invalidates the path it
//! holds, so an iterator must not be held across a mutation.

use crate::error::Result;
use crate::storage::Pager;
use crate::types::PageId;

use super::tree::BTree;

/// An in-order cursor over a [`BTree`]'s key/value pairs.
pub struct Iter<'a> {
    tree: &'a BTree,
    pager: &'a mut Pager,
    path: Vec<PageId>,
    kv_idx: usize,
    valid: bool,
}

impl<'a> Iter<'a> {
    pub(crate) fn new(tree: &'a BTree, pager: &'a mut Pager) -> Self {
        Self {
            tree,
            pager,
            path: Vec::new(),
            kv_idx: 0,
            valid: false,
        }
    }

    /// Whether the cursor is positioned at a live entry.
    pub fn valid(&self) -> bool {
        self.valid
    }

    /// Position at the first key in the tree, in comparator order.
    /// Leaves the cursor invalid on an empty tree.
    pub fn seek_first(&mut self) -> Result<()> {
        self.path.clear();
        self.valid = false;
        let mut page_no = match self.pager.root_page() {
            Some(root) => root,
            None => return Ok(()),
        };
        loop {
            let node = self.pager.get_node(page_no, false)?;
            self.path.push(page_no);
            if node.is_leaf {
                self.kv_idx = 0;
                self.valid = !node.kvs.is_empty();
                return Ok(());
            }
            page_no = node.children[0];
        }
    }

    /// Position at the last key in the tree, in comparator order.
    /// Leaves the cursor invalid on an empty tree.
    pub fn seek_last(&mut self) -> Result<()> {
        self.path.clear();
        self.valid = false;
        let mut page_no = match self.pager.root_page() {
            Some(root) => root,
            None => return Ok(()),
        };
        loop {
            let node = self.pager.get_node(page_no, false)?;
            self.path.push(page_no);
            if node.is_leaf {
                if node.kvs.is_empty() {
                    self.kv_idx = 0;
                    self.valid = false;
                } else {
                    self.kv_idx = node.kvs.len() - 1;
                    self.valid = true;
                }
                return Ok(());
            }
            page_no = *node.children.last().expect("internal node has a last child");
        }
    }

    /// Position at `key`, or at the first key greater than it if `key` is
    /// absent. Leaves the cursor invalid if no key `>= key` exists.
    pub fn seek(&mut self, key: &[u8]) -> Result<()> {
        self.path.clear();
        self.valid = false;
        let mut page_no = match self.pager.root_page() {
            Some(root) => root,
            None => return Ok(()),
        };
        loop {
            let node = self.pager.get_node(page_no, false)?;
            self.path.push(page_no);
            let i = self.tree.lower_bound(&node.kvs, key);
            if i < node.kvs.len() && self.tree.keys_eq(&node.kvs[i].0, key) {
                self.kv_idx = i;
                self.valid = true;
                return Ok(());
            }
            if node.is_leaf {
                if i < node.kvs.len() {
                    self.kv_idx = i;
                    self.valid = true;
                } else {
                    self.valid = false;
                }
                return Ok(());
            }
            page_no = node.children[i];
        }
    }

    /// Advance to the in-order successor. No-op, staying invalid, once the
    /// cursor has already walked past the last key.
    pub fn next(&mut self) -> Result<()> {
        if !self.valid {
            return Ok(());
        }
        let cur_page = *self.path.last().expect("valid cursor has a nonempty path");
        let node = self.pager.get_node(cur_page, false)?;

        if !node.is_leaf {
            let mut next_page = node.children[self.kv_idx + 1];
            loop {
                let child = self.pager.get_node(next_page, false)?;
                self.path.push(next_page);
                if child.is_leaf {
                    self.kv_idx = 0;
                    break;
                }
                next_page = child.children[0];
            }
            return Ok(());
        }

        if self.kv_idx + 1 < node.kvs.len() {
            self.kv_idx += 1;
            return Ok(());
        }

        let last_key = node.kvs[self.kv_idx].0.clone();
        self.path.pop();
        while let Some(&ancestor_page) = self.path.last() {
            let ancestor = self.pager.get_node(ancestor_page, false)?;
            let idx = self.tree.upper_bound(&ancestor.kvs, &last_key);
            if idx < ancestor.kvs.len() {
                self.kv_idx = idx;
                self.valid = true;
                return Ok(());
            }
            self.path.pop();
        }
        self.valid = false;
        Ok(())
    }

    /// The key at the current position, or `None` if the cursor is invalid.
    pub fn key(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.entry()?.map(|(k, _)| k))
    }

    /// The value at the current position, or `None` if the cursor is invalid.
    pub fn value(&mut self) -> Result<Option<Vec<u8>>> {
        Ok(self.entry()?.map(|(_, v)| v))
    }

    /// The key/value pair at the current position, or `None` if the cursor
    /// is invalid.
    pub fn entry(&mut self) -> Result<Option<(Vec<u8>, Vec<u8>)>> {
        if !self.valid {
            return Ok(None);
        }
        let page_no = *self.path.last().expect("valid cursor has a nonempty path");
        let node = self.pager.get_node(page_no, false)?;
        Ok(node.kvs.get(self.kv_idx).cloned())
    }

    /// Drain the remainder of the cursor into a vector, in comparator order.
    /// Mainly a convenience for tests and the CLI's `scan` command.
    pub fn collect_remaining(&mut self) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let mut out = Vec::new();
        while self.valid {
            if let Some(entry) = self.entry()? {
                out.push(entry);
            }
            self.next()?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Pager;
    use crate::types::PAGE_SIZE;
    use tempfile::tempdir;

    fn pager(capacity: usize) -> Pager {
        let dir = tempdir().unwrap();
        let path = dir.into_path().join("test.db");
        Pager::open(&path, PAGE_SIZE as u64, capacity).unwrap()
    }

    fn filled_tree(tree: &BTree, pager: &mut Pager, keys: &[&str]) {
        for k in keys {
            tree.put(pager, k.as_bytes(), k.as_bytes()).unwrap();
        }
    }

    #[test]
    fn test_seek_first_on_empty_tree_is_invalid() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        let mut it = tree.iter(&mut pager);
        it.seek_first().unwrap();
        assert!(!it.valid());
    }

    #[test]
    fn test_seek_first_then_next_visits_in_order() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        let keys: Vec<String> = (0..256).map(|i| format!("k{:04}", i)).collect();
        for k in &keys {
            tree.put(&mut pager, k.as_bytes(), k.as_bytes()).unwrap();
        }

        let mut it = tree.iter(&mut pager);
        it.seek_first().unwrap();
        let mut seen = Vec::new();
        while it.valid() {
            seen.push(String::from_utf8(it.key().unwrap().unwrap()).unwrap());
            it.next().unwrap();
        }

        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(seen, expected);
    }

    #[test]
    fn test_seek_last_then_walk_backwards_not_supported_but_last_is_correct() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        filled_tree(&tree, &mut pager, &["a", "b", "c", "d", "e"]);

        let mut it = tree.iter(&mut pager);
        it.seek_last().unwrap();
        assert!(it.valid());
        assert_eq!(it.key().unwrap().unwrap(), b"e");
    }

    #[test]
    fn test_seek_to_existing_key_lands_exactly() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        filled_tree(&tree, &mut pager, &["a", "c", "e", "g"]);

        let mut it = tree.iter(&mut pager);
        it.seek(b"e").unwrap();
        assert!(it.valid());
        assert_eq!(it.key().unwrap().unwrap(), b"e");
    }

    #[test]
    fn test_seek_to_missing_key_lands_on_successor() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        filled_tree(&tree, &mut pager, &["a", "c", "e", "g"]);

        let mut it = tree.iter(&mut pager);
        it.seek(b"d").unwrap();
        assert!(it.valid());
        assert_eq!(it.key().unwrap().unwrap(), b"e");
    }

    #[test]
    fn test_seek_past_last_key_is_invalid() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        filled_tree(&tree, &mut pager, &["a", "c", "e"]);

        let mut it = tree.iter(&mut pager);
        it.seek(b"z").unwrap();
        assert!(!it.valid());
    }

    #[test]
    fn test_iteration_survives_splits_across_internal_nodes() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        let keys: Vec<String> = (0..64).map(|i| format!("key-{:03}", i)).collect();
        for k in &keys {
            tree.put(&mut pager, k.as_bytes(), k.as_bytes()).unwrap();
        }
        assert!(tree.height(&mut pager).unwrap() > 2);

        let mut it = tree.iter(&mut pager);
        it.seek_first().unwrap();
        let all = it.collect_remaining().unwrap();
        let got: Vec<String> = all
            .into_iter()
            .map(|(k, _)| String::from_utf8(k).unwrap())
            .collect();
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(got, expected);
    }

    #[test]
    fn test_key_and_value_are_none_when_invalid() {
        let tree = BTree::new(2);
        let mut pager = pager(1000);
        let mut it = tree.iter(&mut pager);
        it.seek_first().unwrap();
        assert_eq!(it.key().unwrap(), None);
        assert_eq!(it.value().unwrap(), None);
    }
}
