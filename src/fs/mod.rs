pub mod entry;
pub mod fat32;

use std::fs::File;
use std::io::{Read, Seek};
use std::path::Path;

use crate::error::Result;
use crate::partition;
use fat32::Volume;

/// Where to find the FAT32 volume inside an image.
#[derive(Debug, Clone, Default)]
pub struct OpenOptions {
    /// Byte offset of the volume. Ignored when `partition` is set.
    pub partition_offset: u64,
    /// 1-based MBR primary partition to mount.
    pub partition: Option<usize>,
}

impl OpenOptions {
    pub fn at_offset(partition_offset: u64) -> Self {
        Self {
            partition_offset,
            partition: None,
        }
    }

    pub fn partition(index: usize) -> Self {
        Self {
            partition_offset: 0,
            partition: Some(index),
        }
    }
}

/// Mount the FAT32 volume described by `options` from a seekable reader.
pub fn open_volume<R: Read + Seek>(mut reader: R, options: &OpenOptions) -> Result<Volume<R>> {
    let offset = match options.partition {
        Some(index) => partition::fat32_partition_offset(&mut reader, index)?,
        None => options.partition_offset,
    };
    Volume::open_at(reader, offset)
}

/// Open a disk image file and mount its FAT32 volume.
pub fn open_image(path: &Path, options: &OpenOptions) -> Result<Volume<File>> {
    let file = File::open(path)?;
    open_volume(file, options)
}
