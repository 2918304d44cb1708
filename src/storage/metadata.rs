//! The self-describing metadata record.
//!
//! The first 16 KiB of the database file hold one record describing the
//! tree: root location, page size, counters, the free list, and the
//! file name. The record is serialized as JSON framed by a magic
//! string, a payload length, and a CRC32 of the payload, then
//! zero-padded to the region size. The region bounds the free list; a
//! record that outgrows it is an error rather than a truncation.

use serde::{Deserialize, Serialize};

use crate::error::{Result, StoreError};
use crate::types::METADATA_REGION_SIZE;

/// Magic bytes identifying a valid database file
pub const MAGIC: &[u8; 8] = b"BPLUSKV1";

/// Frame header: magic + payload length + payload checksum
const FRAME_SIZE: usize = MAGIC.len() + 4 + 4;

/// Persistent description of the tree, stored in the metadata region
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    /// Page id of the root node
    pub root_page_id: u64,
    /// Page size chosen at creation; fixed for the file's lifetime
    pub page_size: u32,
    /// Last computed fill rate (unused leaf bytes / leaf bytes on disk)
    pub fill_rate: f64,
    /// Levels from root to leaf inclusive
    pub height: u32,
    /// Live nodes in the tree
    pub node_count: u64,
    /// Total splits performed
    pub split_count: u64,
    /// Total coalesces performed
    pub merge_count: u64,
    /// Highest page id ever allocated
    pub max_page_id: u64,
    /// Freed page ids available for reuse
    pub empty_page_ids: Vec<u64>,
    /// Name of the database file
    pub filename: String,
}

impl Metadata {
    /// Serialize into a buffer of exactly `METADATA_REGION_SIZE` bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload = serde_json::to_vec(self)
            .map_err(|e| StoreError::corrupt_metadata(format!("encode failed: {}", e)))?;
        if FRAME_SIZE + payload.len() > METADATA_REGION_SIZE {
            return Err(StoreError::corrupt_metadata(format!(
                "record is {} bytes but the reserved region holds {}",
                FRAME_SIZE + payload.len(),
                METADATA_REGION_SIZE
            )));
        }

        let mut buf = Vec::with_capacity(METADATA_REGION_SIZE);
        buf.extend_from_slice(MAGIC);
        buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        buf.extend_from_slice(&crc32fast::hash(&payload).to_be_bytes());
        buf.extend_from_slice(&payload);
        buf.resize(METADATA_REGION_SIZE, 0);
        Ok(buf)
    }

    /// Parse the metadata region.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < FRAME_SIZE {
            return Err(StoreError::corrupt_metadata("region too short"));
        }
        if &bytes[..MAGIC.len()] != MAGIC {
            return Err(StoreError::corrupt_metadata("bad magic bytes"));
        }

        let len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let stored_crc = u32::from_be_bytes([bytes[12], bytes[13], bytes[14], bytes[15]]);
        if FRAME_SIZE + len > bytes.len() {
            return Err(StoreError::corrupt_metadata("payload length out of range"));
        }

        let payload = &bytes[FRAME_SIZE..FRAME_SIZE + len];
        if crc32fast::hash(payload) != stored_crc {
            return Err(StoreError::corrupt_metadata("checksum mismatch"));
        }

        serde_json::from_slice(payload)
            .map_err(|e| StoreError::corrupt_metadata(format!("decode failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Metadata {
        Metadata {
            root_page_id: 1,
            page_size: 4096,
            fill_rate: 0.4213,
            height: 3,
            node_count: 17,
            split_count: 9,
            merge_count: 2,
            max_page_id: 21,
            empty_page_ids: vec![4, 11],
            filename: "test.db".to_string(),
        }
    }

    #[test]
    fn test_metadata_roundtrip() {
        let meta = sample();
        let buf = meta.encode().unwrap();
        assert_eq!(buf.len(), METADATA_REGION_SIZE);
        assert_eq!(Metadata::decode(&buf).unwrap(), meta);
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = sample().encode().unwrap();
        buf[0] ^= 0xFF;
        assert!(matches!(
            Metadata::decode(&buf),
            Err(StoreError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn test_checksum_validation() {
        let mut buf = sample().encode().unwrap();
        // Flip one payload byte.
        buf[FRAME_SIZE + 2] ^= 0xFF;
        assert!(matches!(
            Metadata::decode(&buf),
            Err(StoreError::CorruptMetadata(_))
        ));
    }

    #[test]
    fn test_free_list_bounded_by_region() {
        let mut meta = sample();
        meta.empty_page_ids = (0..100_000).collect();
        assert!(meta.encode().is_err());
    }
}
