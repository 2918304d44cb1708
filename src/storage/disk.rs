//! Disk manager.
//!
//! Owns the database file handle and performs all raw I/O: page bodies
//! at their computed offsets and the metadata record at offset zero.
//! Decoding and caching live above this layer. I/O errors are surfaced
//! as-is and never retried.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::info;

use crate::error::{Result, StoreError};
use crate::storage::Metadata;
use crate::types::{PageId, METADATA_REGION_SIZE};

/// File-level page I/O
pub struct DiskManager {
    file: File,
    page_size: usize,
}

impl DiskManager {
    /// Open an existing database file or create a new one.
    ///
    /// Returns the manager and the metadata record when the file
    /// already holds one. A file that has grown past the metadata
    /// region but fails to decode is corrupt and is surfaced as such,
    /// never silently reinitialized.
    pub fn open(path: &Path, requested_page_size: usize) -> Result<(Self, Option<Metadata>)> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let file_len = file.metadata()?.len();
        let mut manager = Self {
            file,
            page_size: requested_page_size,
        };

        if file_len < METADATA_REGION_SIZE as u64 {
            info!(path = %path.display(), page_size = requested_page_size, "creating database");
            return Ok((manager, None));
        }

        let metadata = manager.read_metadata()?;
        manager.page_size = metadata.page_size as usize;
        info!(
            path = %path.display(),
            root = metadata.root_page_id,
            pages = metadata.max_page_id,
            "opened database"
        );
        Ok((manager, Some(metadata)))
    }

    /// Page size in effect for this file
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Read one raw page body.
    pub fn read_page(&mut self, page_id: PageId) -> Result<Vec<u8>> {
        if page_id.is_null() {
            return Err(StoreError::InvalidPageId(0));
        }

        let mut buf = vec![0u8; self.page_size];
        self.file
            .seek(SeekFrom::Start(page_id.file_offset(self.page_size)))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Write one raw page body.
    pub fn write_page(&mut self, page_id: PageId, data: &[u8]) -> Result<()> {
        if page_id.is_null() {
            return Err(StoreError::InvalidPageId(0));
        }
        if data.len() != self.page_size {
            return Err(StoreError::invariant(format!(
                "page body must be {} bytes, got {}",
                self.page_size,
                data.len()
            )));
        }

        self.file
            .seek(SeekFrom::Start(page_id.file_offset(self.page_size)))?;
        self.file.write_all(data)?;
        Ok(())
    }

    /// Read and decode the metadata region.
    pub fn read_metadata(&mut self) -> Result<Metadata> {
        let mut buf = vec![0u8; METADATA_REGION_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Metadata::decode(&buf)
    }

    /// Encode and persist the metadata region.
    pub fn write_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        let buf = metadata.encode()?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Flush file contents to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DEFAULT_PAGE_SIZE;
    use tempfile::tempdir;

    fn sample_metadata() -> Metadata {
        Metadata {
            root_page_id: 1,
            page_size: DEFAULT_PAGE_SIZE as u32,
            fill_rate: 0.0,
            height: 1,
            node_count: 1,
            split_count: 0,
            merge_count: 0,
            max_page_id: 1,
            empty_page_ids: Vec::new(),
            filename: "test.db".to_string(),
        }
    }

    #[test]
    fn test_create_new_database() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let (dm, meta) = DiskManager::open(&path, DEFAULT_PAGE_SIZE)?;
        assert!(meta.is_none());
        assert_eq!(dm.page_size(), DEFAULT_PAGE_SIZE);

        Ok(())
    }

    #[test]
    fn test_page_roundtrip() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        let (mut dm, _) = DiskManager::open(&path, DEFAULT_PAGE_SIZE)?;

        let mut data = vec![0u8; DEFAULT_PAGE_SIZE];
        data[0..5].copy_from_slice(b"hello");
        dm.write_page(PageId::new(2), &data)?;

        let read = dm.read_page(PageId::new(2))?;
        assert_eq!(&read[0..5], b"hello");

        Ok(())
    }

    #[test]
    fn test_rejects_null_page_id() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let (mut dm, _) = DiskManager::open(&path, DEFAULT_PAGE_SIZE).unwrap();
        assert!(matches!(
            dm.read_page(PageId::NULL),
            Err(StoreError::InvalidPageId(0))
        ));
    }

    #[test]
    fn test_reopen_reads_metadata() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let (mut dm, _) = DiskManager::open(&path, DEFAULT_PAGE_SIZE)?;
            dm.write_metadata(&sample_metadata())?;
            dm.sync()?;
        }

        // The requested page size is ignored in favor of the stored one.
        let (dm, meta) = DiskManager::open(&path, 8192)?;
        assert_eq!(meta, Some(sample_metadata()));
        assert_eq!(dm.page_size(), DEFAULT_PAGE_SIZE);

        Ok(())
    }

    #[test]
    fn test_corrupt_metadata_is_surfaced() -> Result<()> {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let (mut dm, _) = DiskManager::open(&path, DEFAULT_PAGE_SIZE)?;
            dm.write_metadata(&sample_metadata())?;
            let mut region = sample_metadata().encode()?;
            region[20] ^= 0xFF;
            dm.file.seek(SeekFrom::Start(0))?;
            dm.file.write_all(&region)?;
        }

        assert!(matches!(
            DiskManager::open(&path, DEFAULT_PAGE_SIZE),
            Err(StoreError::CorruptMetadata(_))
        ));
        Ok(())
    }
}
