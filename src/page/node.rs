//! A B-tree node and its payload serializer.
//!
//! A node's payload is a flat buffer, independent of whether it ends up
//! living in one page or is spread across an overflow chain:
//!
//! ```text
//! children_count : u32
//! children       : u64 * children_count
//! kvs_count      : u32
//! foreach kv:      length-prefixed key, length-prefixed value
//! ```
//!
//! `is_leaf` is not part of this payload; it lives in the page header.

use crate::error::{Result, StorageError};
use crate::types::{decode_bytes, decode_u32, decode_u64, encode_bytes, encode_u32, encode_u64, PageId};

/// A key/value pair stored at some level of the tree.
pub type Kv = (Vec<u8>, Vec<u8>);

/// A logical B-tree node: one per Tree primary page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    pub page_no: PageId,
    pub is_leaf: bool,
    pub children: Vec<PageId>,
    pub kvs: Vec<Kv>,
}

impl Node {
    /// A freshly allocated, empty node.
    pub fn empty(page_no: PageId, is_leaf: bool) -> Self {
        Self {
            page_no,
            is_leaf,
            children: Vec::new(),
            kvs: Vec::new(),
        }
    }

    /// Serialize this node's payload (without the page header).
    pub fn serialize(&self) -> Vec<u8> {
        let mut size = 4 + 8 * self.children.len() + 4;
        for (k, v) in &self.kvs {
            size += 4 + k.len() + 4 + v.len();
        }
        let mut buf = vec![0u8; size];
        let mut off = 0;
        off += encode_u32(&mut buf, off, self.children.len() as u32);
        for c in &self.children {
            off += encode_u64(&mut buf, off, c.value());
        }
        off += encode_u32(&mut buf, off, self.kvs.len() as u32);
        for (k, v) in &self.kvs {
            off += encode_bytes(&mut buf, off, k);
            off += encode_bytes(&mut buf, off, v);
        }
        debug_assert_eq!(off, size);
        buf
    }

    /// Reconstruct a node from its reassembled payload. `page_no` and
    /// `is_leaf` come from the page header, not the payload itself.
    pub fn deserialize(page_no: PageId, is_leaf: bool, payload: &[u8]) -> Result<Self> {
        let corrupt = || StorageError::corruption_at(page_no, "malformed node payload");

        let mut off = 0;
        let (children_count, n) = decode_u32(payload.get(off..).ok_or_else(corrupt)?)
            .ok_or_else(corrupt)?;
        off += n;
        let mut children = Vec::with_capacity(children_count as usize);
        for _ in 0..children_count {
            let (c, n) = decode_u64(payload.get(off..).ok_or_else(corrupt)?).ok_or_else(corrupt)?;
            off += n;
            children.push(PageId::new(c));
        }
        let (kvs_count, n) = decode_u32(payload.get(off..).ok_or_else(corrupt)?)
            .ok_or_else(corrupt)?;
        off += n;
        let mut kvs = Vec::with_capacity(kvs_count as usize);
        for _ in 0..kvs_count {
            let (key, n) = decode_bytes(payload.get(off..).ok_or_else(corrupt)?).ok_or_else(corrupt)?;
            off += n;
            let (value, n) = decode_bytes(payload.get(off..).ok_or_else(corrupt)?).ok_or_else(corrupt)?;
            off += n;
            kvs.push((key, value));
        }

        Ok(Self {
            page_no,
            is_leaf,
            children,
            kvs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_leaf_node_round_trips() {
        let node = Node {
            page_no: PageId::new(4),
            is_leaf: true,
            children: vec![],
            kvs: vec![(b"a".to_vec(), b"1".to_vec()), (b"b".to_vec(), b"2".to_vec())],
        };
        let payload = node.serialize();
        let back = Node::deserialize(node.page_no, node.is_leaf, &payload).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_internal_node_round_trips() {
        let node = Node {
            page_no: PageId::new(1),
            is_leaf: false,
            children: vec![PageId::new(2), PageId::new(3), PageId::new(4)],
            kvs: vec![(b"m".to_vec(), b"mid".to_vec()), (b"z".to_vec(), b"end".to_vec())],
        };
        let payload = node.serialize();
        let back = Node::deserialize(node.page_no, node.is_leaf, &payload).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_empty_node_round_trips() {
        let node = Node::empty(PageId::new(1), true);
        let payload = node.serialize();
        let back = Node::deserialize(node.page_no, node.is_leaf, &payload).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_empty_key_and_value_round_trip() {
        let node = Node {
            page_no: PageId::new(1),
            is_leaf: true,
            children: vec![],
            kvs: vec![(Vec::new(), Vec::new())],
        };
        let payload = node.serialize();
        let back = Node::deserialize(node.page_no, node.is_leaf, &payload).unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_truncated_payload_is_corruption() {
        let node = Node {
            page_no: PageId::new(1),
            is_leaf: true,
            children: vec![],
            kvs: vec![(b"a".to_vec(), b"1".to_vec())],
        };
        let mut payload = node.serialize();
        payload.truncate(payload.len() - 1);
        assert!(Node::deserialize(node.page_no, node.is_leaf, &payload).is_err());
    }
}
