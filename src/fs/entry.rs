use serde::Serialize;

use super::fat32::dirent::{ATTR_ARCHIVE, ATTR_HIDDEN, ATTR_READ_ONLY, ATTR_SYSTEM};

/// A file or directory as shown by listings.
#[derive(Debug, Clone, Serialize)]
pub struct FileEntry {
    pub name: String,
    pub path: String,
    pub entry_type: EntryType,
    pub size: u64,
    /// Starting cluster of the content.
    pub location: u32,
    /// Human-readable modification date string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<String>,
    /// Raw FAT attribute byte.
    pub attributes: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    File,
    Directory,
}

impl FileEntry {
    pub fn root() -> Self {
        Self {
            name: "/".into(),
            path: "/".into(),
            entry_type: EntryType::Directory,
            size: 0,
            location: 0,
            modified: None,
            attributes: 0,
        }
    }

    pub fn new_directory(name: String, path: String, location: u32) -> Self {
        Self {
            name,
            path,
            entry_type: EntryType::Directory,
            size: 0,
            location,
            modified: None,
            attributes: 0,
        }
    }

    pub fn new_file(name: String, path: String, size: u64, location: u32) -> Self {
        Self {
            name,
            path,
            entry_type: EntryType::File,
            size,
            location,
            modified: None,
            attributes: 0,
        }
    }

    pub fn is_directory(&self) -> bool {
        self.entry_type == EntryType::Directory
    }

    pub fn is_file(&self) -> bool {
        self.entry_type == EntryType::File
    }

    pub fn size_string(&self) -> String {
        if self.is_directory() {
            return String::new();
        }
        crate::partition::format_size(self.size)
    }

    /// DOS-style attribute column, e.g. `-HS-A`.
    pub fn attribute_string(&self) -> String {
        let flag = |bit: u8, c: char| if self.attributes & bit != 0 { c } else { '-' };
        [
            flag(ATTR_READ_ONLY, 'R'),
            flag(ATTR_HIDDEN, 'H'),
            flag(ATTR_SYSTEM, 'S'),
            if self.is_directory() { 'D' } else { '-' },
            flag(ATTR_ARCHIVE, 'A'),
        ]
        .iter()
        .collect()
    }
}
