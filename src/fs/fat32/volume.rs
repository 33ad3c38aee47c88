use std::cell::RefCell;
use std::io::{Read, Seek};

use log::debug;

use super::dirent::decode_oem_string;
use super::node::Node;
use super::source::ByteSource;
use crate::error::{Fat32Error, Result};

/// BIOS Parameter Block fields of a FAT32 boot sector.
///
/// Parsed once at mount time and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct BootSector {
    /// Bytes per sector (512, 1024, 2048 or 4096).
    pub bytes_per_sector: u16,
    /// Sectors per cluster (power of two).
    pub sectors_per_cluster: u8,
    /// Number of reserved sectors before the first FAT.
    pub reserved_sectors: u16,
    /// Number of FAT copies (typically 2).
    pub fat_count: u8,
    /// Root directory entry count. Always 0 on FAT32.
    pub root_dir_entries: u16,
    /// Total sectors on the volume.
    pub total_sectors: u32,
    /// Sectors occupied by one FAT copy.
    pub sectors_per_fat: u32,
    /// First cluster of the root directory.
    pub root_cluster: u32,
    /// Sector of the FSInfo structure.
    pub fs_info_sector: u16,
    /// Sector of the backup boot sector.
    pub backup_boot_sector: u16,
    pub volume_serial: u32,
    pub label: Option<String>,
}

impl BootSector {
    /// Read and validate the boot sector at the start of `source`.
    pub fn read<R: Read + Seek>(source: &mut ByteSource<R>) -> Result<Self> {
        // Validate jump instruction (EB xx 90 or E9 xx xx)
        let jump = source.read_u8_at(0)?;
        if jump != 0xEB && jump != 0xE9 {
            return Err(Fat32Error::InvalidVolume(format!(
                "bad jump instruction {jump:#04X}"
            )));
        }

        let bytes_per_sector = source.read_u16_le_at(11)?;
        let sectors_per_cluster = source.read_u8_at(13)?;
        let reserved_sectors = source.read_u16_le_at(14)?;
        let fat_count = source.read_u8_at(16)?;
        let root_dir_entries = source.read_u16_le_at(17)?;
        let total_sectors_16 = source.read_u16_le_at(19)?;
        let sectors_per_fat_16 = source.read_u16_le_at(22)?;
        let total_sectors_32 = source.read_u32_le_at(32)?;
        let sectors_per_fat = source.read_u32_le_at(36)?;
        let root_cluster = source.read_u32_le_at(44)?;
        let fs_info_sector = source.read_u16_le_at(48)?;
        let backup_boot_sector = source.read_u16_le_at(50)?;
        let volume_serial = source.read_u32_le_at(67)?;

        let mut label_bytes = [0u8; 11];
        source.read_exact_at(71, &mut label_bytes)?;
        let label_str = decode_oem_string(&label_bytes).trim().to_string();
        let label = if label_str.is_empty() || label_str == "NO NAME" {
            None
        } else {
            Some(label_str)
        };

        // FAT12/16 keep a fixed-size root directory; FAT32 reports zero here.
        if root_dir_entries != 0 {
            return Err(Fat32Error::InvalidVolume(format!(
                "root directory entry count is {root_dir_entries}, expected 0 for FAT32"
            )));
        }
        if sectors_per_fat_16 != 0 {
            return Err(Fat32Error::InvalidVolume(format!(
                "16-bit sectors per FAT is {sectors_per_fat_16}, expected 0 for FAT32"
            )));
        }
        if !matches!(bytes_per_sector, 512 | 1024 | 2048 | 4096) {
            return Err(Fat32Error::InvalidVolume(format!(
                "invalid bytes per sector: {bytes_per_sector}"
            )));
        }
        if !sectors_per_cluster.is_power_of_two() {
            return Err(Fat32Error::InvalidVolume(format!(
                "invalid sectors per cluster: {sectors_per_cluster}"
            )));
        }
        if fat_count == 0 {
            return Err(Fat32Error::InvalidVolume("FAT count is 0".into()));
        }
        if sectors_per_fat == 0 {
            return Err(Fat32Error::InvalidVolume("sectors per FAT is 0".into()));
        }

        let total_sectors = if total_sectors_32 != 0 {
            total_sectors_32
        } else {
            total_sectors_16 as u32
        };

        let boot = Self {
            bytes_per_sector,
            sectors_per_cluster,
            reserved_sectors,
            fat_count,
            root_dir_entries,
            total_sectors,
            sectors_per_fat,
            root_cluster,
            fs_info_sector,
            backup_boot_sector,
            volume_serial,
            label,
        };

        if boot.cluster_heap_start_sector() >= total_sectors as u64 {
            return Err(Fat32Error::InvalidVolume(format!(
                "cluster heap starts at sector {} but the volume has {} sectors",
                boot.cluster_heap_start_sector(),
                total_sectors
            )));
        }
        if boot.cluster_count() == 0 {
            return Err(Fat32Error::InvalidVolume("volume has no data clusters".into()));
        }
        if root_cluster < 2 || root_cluster > boot.max_cluster() {
            return Err(Fat32Error::InvalidVolume(format!(
                "root cluster {root_cluster} is outside the cluster heap"
            )));
        }

        Ok(boot)
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.bytes_per_sector as u32 * self.sectors_per_cluster as u32
    }

    pub fn fat_start_sector(&self) -> u64 {
        self.reserved_sectors as u64
    }

    pub fn cluster_heap_start_sector(&self) -> u64 {
        self.reserved_sectors as u64 + self.fat_count as u64 * self.sectors_per_fat as u64
    }

    /// Number of data clusters in the heap.
    pub fn cluster_count(&self) -> u32 {
        let data_sectors =
            (self.total_sectors as u64).saturating_sub(self.cluster_heap_start_sector());
        (data_sectors / self.sectors_per_cluster as u64) as u32
    }

    /// Highest valid cluster number (numbering starts at 2).
    pub fn max_cluster(&self) -> u32 {
        self.cluster_count().saturating_add(1)
    }
}

/// A mounted FAT32 volume.
///
/// Owns the image reader for the volume's lifetime. Every [`Node`] borrows
/// the volume, so the borrow checker keeps the volume alive for as long as
/// any node derived from it. Reads go through a `RefCell` because seeking is
/// stateful: a volume is usable from one thread at a time.
pub struct Volume<R> {
    pub(super) source: RefCell<ByteSource<R>>,
    pub(super) boot: BootSector,
}

impl<R: Read + Seek> Volume<R> {
    /// Mount a volume that starts at byte 0 of `reader`.
    pub fn open(reader: R) -> Result<Self> {
        Self::open_at(reader, 0)
    }

    /// Mount a volume located `partition_offset` bytes into `reader`.
    pub fn open_at(reader: R, partition_offset: u64) -> Result<Self> {
        let mut source = ByteSource::new(reader, partition_offset);
        let boot = BootSector::read(&mut source)?;

        debug!(
            "FAT32 volume at offset {partition_offset}: {} bytes/sector, {} sectors/cluster, \
             {} reserved sectors, {} FATs of {} sectors, {} sectors, root cluster {}",
            boot.bytes_per_sector,
            boot.sectors_per_cluster,
            boot.reserved_sectors,
            boot.fat_count,
            boot.sectors_per_fat,
            boot.total_sectors,
            boot.root_cluster
        );

        Ok(Self {
            source: RefCell::new(source),
            boot,
        })
    }

    pub fn boot_sector(&self) -> &BootSector {
        &self.boot
    }

    pub fn bytes_per_cluster(&self) -> u32 {
        self.boot.bytes_per_cluster()
    }

    pub fn root_cluster(&self) -> u32 {
        self.boot.root_cluster
    }

    pub fn label(&self) -> Option<&str> {
        self.boot.label.as_deref()
    }

    /// Total volume size in bytes.
    pub fn total_size(&self) -> u64 {
        self.boot.total_sectors as u64 * self.boot.bytes_per_sector as u64
    }

    /// Byte offset of the volume inside the image.
    pub fn partition_offset(&self) -> u64 {
        self.source.borrow().base()
    }

    /// The root directory node.
    pub fn root(&self) -> Node<'_, R> {
        Node::root(self)
    }

    /// Resolve a slash-separated path from the root directory.
    pub fn resolve(&self, path: &str) -> Result<Node<'_, R>> {
        self.root().resolve(path)
    }

    /// Read `buf.len()` bytes at a volume-relative byte offset.
    pub(super) fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.source.borrow_mut().read_exact_at(offset, buf)?;
        Ok(())
    }

    pub(super) fn read_u32_at(&self, offset: u64) -> Result<u32> {
        Ok(self.source.borrow_mut().read_u32_le_at(offset)?)
    }

    /// Unmount, returning the underlying reader.
    pub fn into_inner(self) -> R {
        self.source.into_inner().into_inner()
    }
}
