use std::fmt;
use std::io::{Read, Seek};

use super::dirent::{DirEntryRecord, ATTR_DIRECTORY, DIR_ENTRY_SIZE};
use super::volume::Volume;
use crate::error::{Fat32Error, Result};
use crate::fs::entry::FileEntry;

/// Name reported for the root directory.
pub const ROOT_NAME: &str = "/";

/// Where a non-root node's short entry lives.
#[derive(Debug, Clone, PartialEq, Eq)]
struct EntryLocation {
    /// First cluster of the directory containing the entry.
    dir_cluster: u32,
    /// Offset of the short entry in the directory's logical byte stream.
    offset: u32,
    /// Long file name records physically preceding the short entry.
    lfn_entries: u32,
    name: String,
}

/// A file or directory on a mounted volume.
///
/// Either the root directory, which has no directory entry, or an entry
/// located by its containing directory and byte offset. Entry fields are
/// read from the image on demand.
pub struct Node<'v, R> {
    volume: &'v Volume<R>,
    location: Option<EntryLocation>,
}

impl<R> Clone for Node<'_, R> {
    fn clone(&self) -> Self {
        Self {
            volume: self.volume,
            location: self.location.clone(),
        }
    }
}

impl<R> fmt::Debug for Node<'_, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            None => f.write_str("Node(<root>)"),
            Some(loc) => f
                .debug_struct("Node")
                .field("name", &loc.name)
                .field("dir_cluster", &loc.dir_cluster)
                .field("offset", &loc.offset)
                .field("lfn_entries", &loc.lfn_entries)
                .finish(),
        }
    }
}

impl<'v, R: Read + Seek> Node<'v, R> {
    pub(super) fn root(volume: &'v Volume<R>) -> Self {
        Self {
            volume,
            location: None,
        }
    }

    pub(super) fn entry(
        volume: &'v Volume<R>,
        dir_cluster: u32,
        offset: u32,
        lfn_entries: u32,
        name: String,
    ) -> Self {
        Self {
            volume,
            location: Some(EntryLocation {
                dir_cluster,
                offset,
                lfn_entries,
                name,
            }),
        }
    }

    pub fn volume(&self) -> &'v Volume<R> {
        self.volume
    }

    pub fn is_root(&self) -> bool {
        self.location.is_none()
    }

    /// Reconstructed name: the long name when present, otherwise the 8.3 name.
    pub fn name(&self) -> &str {
        match &self.location {
            Some(loc) => &loc.name,
            None => ROOT_NAME,
        }
    }

    /// Number of long file name records attached to this entry.
    pub fn lfn_entry_count(&self) -> u32 {
        self.location.as_ref().map_or(0, |loc| loc.lfn_entries)
    }

    /// First cluster of the containing directory; `None` for the root.
    pub fn parent_cluster(&self) -> Option<u32> {
        self.location.as_ref().map(|loc| loc.dir_cluster)
    }

    /// Offset of the entry's first record in the containing directory
    /// stream; `None` for the root.
    pub fn entry_offset(&self) -> Option<u32> {
        self.location
            .as_ref()
            .map(|loc| loc.offset - loc.lfn_entries * DIR_ENTRY_SIZE)
    }

    fn location(&self) -> Result<&EntryLocation> {
        self.location
            .as_ref()
            .ok_or(Fat32Error::InvalidOperation("the root directory has no directory entry"))
    }

    /// Read bytes of this node's short entry, starting `relative_offset`
    /// bytes into it.
    pub fn read_entry_field(&self, relative_offset: u32, buf: &mut [u8]) -> Result<()> {
        let loc = self.location()?;
        let offset = loc.offset as u64 + relative_offset as u64;
        self.volume.read_logical(loc.dir_cluster, offset, buf)
    }

    /// Decode this node's short entry.
    pub fn record(&self) -> Result<DirEntryRecord> {
        let mut raw = [0u8; 32];
        self.read_entry_field(0, &mut raw)?;
        Ok(DirEntryRecord::parse(&raw))
    }

    /// Attribute byte. The root reports the directory attribute.
    pub fn attributes(&self) -> Result<u8> {
        if self.is_root() {
            return Ok(ATTR_DIRECTORY);
        }
        let mut attr = [0u8; 1];
        self.read_entry_field(11, &mut attr)?;
        Ok(attr[0])
    }

    pub fn is_directory(&self) -> Result<bool> {
        Ok(self.attributes()? & ATTR_DIRECTORY != 0)
    }

    /// First cluster of the node's content.
    pub fn content_start_cluster(&self) -> Result<u32> {
        if self.is_root() {
            return Ok(self.volume.root_cluster());
        }
        let mut hi = [0u8; 2];
        let mut lo = [0u8; 2];
        self.read_entry_field(20, &mut hi)?;
        self.read_entry_field(26, &mut lo)?;
        Ok(((u16::from_le_bytes(hi) as u32) << 16) | u16::from_le_bytes(lo) as u32)
    }

    /// Declared size in bytes. Zero for directories.
    pub fn content_size(&self) -> Result<u32> {
        if self.is_root() {
            return Ok(0);
        }
        let mut size = [0u8; 4];
        self.read_entry_field(28, &mut size)?;
        Ok(u32::from_le_bytes(size))
    }

    /// Snapshot of this node for display, with `path` as its full path.
    pub fn to_entry(&self, path: &str) -> Result<FileEntry> {
        if self.is_root() {
            let mut root = FileEntry::root();
            root.location = self.volume.root_cluster();
            return Ok(root);
        }
        let record = self.record()?;
        let mut entry = if record.is_directory() {
            FileEntry::new_directory(self.name().to_string(), path.to_string(), record.start_cluster)
        } else {
            FileEntry::new_file(
                self.name().to_string(),
                path.to_string(),
                record.size as u64,
                record.start_cluster,
            )
        };
        entry.modified = record.modified();
        entry.attributes = record.attributes;
        Ok(entry)
    }
}
