//! Node serialization.
//!
//! Page body layout (little-endian):
//! ```text
//! Offset  Size  Field
//! 0       8     page_id
//! 8       8     parent_id (0 = root)
//! 16      8     prev_id   (0 = none)
//! 24      8     next_id   (0 = none)
//! 32      4     is_leaf   (0 or 1)
//! 36      8     record_count
//! 44      4*n   keys, i32 each
//! ...           values
//! ```
//!
//! Each leaf value is a varint byte length followed by the raw bytes,
//! so payloads may contain any byte including zero. Each internal value
//! is the child page id as a bare varint. Unused tail bytes are zero.

use crate::error::{Result, StoreError};
use crate::page::{Node, Value};
use crate::types::{decode_varint, encode_varint, PageId};

/// Fixed header size at the start of every page body
pub const NODE_HEADER_SIZE: usize = 44;

/// Serialize `node` into a page-sized, zero-padded buffer.
pub fn encode_node(node: &Node, page_size: usize) -> Result<Vec<u8>> {
    let size = node.encoded_size();
    if size > page_size {
        return Err(StoreError::invariant(format!(
            "page {}: encoded size {} exceeds page size {}",
            node.page_id, size, page_size
        )));
    }
    if node.keys.len() != node.values.len() {
        return Err(StoreError::invariant(format!(
            "page {}: {} keys but {} values",
            node.page_id,
            node.keys.len(),
            node.values.len()
        )));
    }

    let mut buf = Vec::with_capacity(page_size);
    buf.extend_from_slice(&node.page_id.value().to_le_bytes());
    buf.extend_from_slice(&node.parent_id.value().to_le_bytes());
    buf.extend_from_slice(&node.prev_id.value().to_le_bytes());
    buf.extend_from_slice(&node.next_id.value().to_le_bytes());
    buf.extend_from_slice(&(node.is_leaf as u32).to_le_bytes());
    buf.extend_from_slice(&(node.keys.len() as u64).to_le_bytes());

    for key in &node.keys {
        buf.extend_from_slice(&key.to_le_bytes());
    }
    for value in &node.values {
        match value {
            Value::Bytes(b) => {
                encode_varint(&mut buf, b.len() as u64);
                buf.extend_from_slice(b);
            }
            Value::Child(id) => encode_varint(&mut buf, id.value()),
        }
    }

    debug_assert_eq!(buf.len(), size);
    buf.resize(page_size, 0);
    Ok(buf)
}

/// Decode one page body read from the slot of `page_id`.
pub fn decode_node(bytes: &[u8], page_id: PageId) -> Result<Node> {
    let pid = page_id.value();
    if bytes.len() < NODE_HEADER_SIZE {
        return Err(StoreError::corrupt_page(pid, "page body shorter than header"));
    }

    let stored_id = read_u64(bytes, 0);
    if stored_id != pid {
        return Err(StoreError::corrupt_page(
            pid,
            format!("header names page {}", stored_id),
        ));
    }
    let parent_id = PageId::new(read_u64(bytes, 8));
    let prev_id = PageId::new(read_u64(bytes, 16));
    let next_id = PageId::new(read_u64(bytes, 24));
    let is_leaf = match u32::from_le_bytes([bytes[32], bytes[33], bytes[34], bytes[35]]) {
        0 => false,
        1 => true,
        other => {
            return Err(StoreError::corrupt_page(
                pid,
                format!("is_leaf flag is {}", other),
            ))
        }
    };
    let record_count = read_u64(bytes, 36) as usize;

    // Every record costs at least a 4-byte key and a 1-byte value.
    if record_count > (bytes.len() - NODE_HEADER_SIZE) / 5 {
        return Err(StoreError::corrupt_page(
            pid,
            format!("record count {} cannot fit the page", record_count),
        ));
    }

    let mut keys = Vec::with_capacity(record_count);
    let mut offset = NODE_HEADER_SIZE;
    for _ in 0..record_count {
        keys.push(i32::from_le_bytes([
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ]));
        offset += 4;
    }

    let mut values = Vec::with_capacity(record_count);
    for i in 0..record_count {
        if is_leaf {
            let (len, n) = decode_varint(&bytes[offset..]).ok_or_else(|| {
                StoreError::corrupt_page(pid, format!("bad length prefix for value {}", i))
            })?;
            offset += n;
            let len = len as usize;
            if offset + len > bytes.len() {
                return Err(StoreError::corrupt_page(
                    pid,
                    format!("value {} runs past the page end", i),
                ));
            }
            values.push(Value::Bytes(bytes[offset..offset + len].to_vec()));
            offset += len;
        } else {
            let (child, n) = decode_varint(&bytes[offset..]).ok_or_else(|| {
                StoreError::corrupt_page(pid, format!("bad child pointer for record {}", i))
            })?;
            offset += n;
            values.push(Value::Child(PageId::new(child)));
        }
    }

    Ok(Node {
        page_id,
        parent_id,
        prev_id,
        next_id,
        is_leaf,
        keys,
        values,
    })
}

fn read_u64(bytes: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
        bytes[offset + 4],
        bytes[offset + 5],
        bytes[offset + 6],
        bytes[offset + 7],
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PAGE_SIZE;

    fn sample_leaf() -> Node {
        let mut node = Node::new_leaf(PageId::new(3));
        node.parent_id = PageId::new(1);
        node.prev_id = PageId::new(2);
        node.next_id = PageId::new(4);
        node.insert_record(0, -7, Value::Bytes(b"alpha".to_vec()));
        node.insert_record(1, 0, Value::Bytes(Vec::new()));
        node.insert_record(2, 19, Value::Bytes(b"beta".to_vec()));
        node
    }

    #[test]
    fn test_leaf_roundtrip() {
        let node = sample_leaf();
        let buf = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        assert_eq!(buf.len(), DEFAULT_PAGE_SIZE);
        let decoded = decode_node(&buf, PageId::new(3)).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_internal_roundtrip() {
        let mut node = Node::new_internal(PageId::new(1));
        node.insert_record(0, 1, Value::Child(PageId::new(2)));
        node.insert_record(1, 100, Value::Child(PageId::new(900)));

        let buf = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        let decoded = decode_node(&buf, PageId::new(1)).unwrap();
        assert_eq!(decoded, node);
    }

    #[test]
    fn test_payload_may_contain_zero_bytes() {
        let mut node = Node::new_leaf(PageId::new(9));
        node.insert_record(0, 1, Value::Bytes(vec![0, 1, 0, 2, 0]));
        let buf = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        let decoded = decode_node(&buf, PageId::new(9)).unwrap();
        assert_eq!(decoded.payload(0).unwrap(), &[0, 1, 0, 2, 0]);
    }

    #[test]
    fn test_encoded_size_matches_encoder() {
        let node = sample_leaf();
        // Encoding into a page of exactly the predicted size leaves no
        // room for error in either direction.
        let buf = encode_node(&node, node.encoded_size()).unwrap();
        assert_eq!(buf.len(), node.encoded_size());
        let bigger = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        assert!(bigger[node.encoded_size()..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_decode_rejects_id_mismatch() {
        let node = sample_leaf();
        let buf = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        assert!(matches!(
            decode_node(&buf, PageId::new(4)),
            Err(StoreError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_bad_leaf_flag() {
        let node = sample_leaf();
        let mut buf = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        buf[32] = 7;
        assert!(matches!(
            decode_node(&buf, PageId::new(3)),
            Err(StoreError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_record_count() {
        let node = sample_leaf();
        let mut buf = encode_node(&node, DEFAULT_PAGE_SIZE).unwrap();
        buf[36..44].copy_from_slice(&(u64::MAX).to_le_bytes());
        assert!(matches!(
            decode_node(&buf, PageId::new(3)),
            Err(StoreError::CorruptPage { .. })
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_node() {
        let mut node = Node::new_leaf(PageId::new(1));
        node.insert_record(0, 1, Value::Bytes(vec![0xAB; DEFAULT_PAGE_SIZE]));
        assert!(matches!(
            encode_node(&node, DEFAULT_PAGE_SIZE),
            Err(StoreError::InvariantViolation(_))
        ));
    }
}
