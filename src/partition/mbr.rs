use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::io::Cursor;

use crate::error::{Fat32Error, Result};

const MBR_SIGNATURE: u16 = 0xAA55;
const PARTITION_TABLE_OFFSET: usize = 446;
const PARTITION_ENTRY_SIZE: usize = 16;
pub const SECTOR_SIZE: u64 = 512;

/// A single MBR partition table entry.
#[derive(Debug, Clone, Serialize)]
pub struct MbrPartitionEntry {
    pub bootable: bool,
    pub partition_type: u8,
    pub start_lba: u32,
    pub total_sectors: u32,
}

impl MbrPartitionEntry {
    fn parse(data: &[u8; PARTITION_ENTRY_SIZE]) -> Self {
        let bootable = data[0] == 0x80;
        let partition_type = data[4];
        let start_lba = u32::from_le_bytes([data[8], data[9], data[10], data[11]]);
        let total_sectors = u32::from_le_bytes([data[12], data[13], data[14], data[15]]);

        Self {
            bootable,
            partition_type,
            start_lba,
            total_sectors,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.partition_type == 0x00 && self.start_lba == 0 && self.total_sectors == 0
    }

    /// FAT32 partition types, CHS/LBA and their hidden variants.
    pub fn is_fat32(&self) -> bool {
        matches!(self.partition_type, 0x0B | 0x0C | 0x1B | 0x1C)
    }

    pub fn offset_bytes(&self) -> u64 {
        self.start_lba as u64 * SECTOR_SIZE
    }

    pub fn size_bytes(&self) -> u64 {
        self.total_sectors as u64 * SECTOR_SIZE
    }

    pub fn partition_type_name(&self) -> &'static str {
        match self.partition_type {
            0x00 => "Empty",
            0x01 => "FAT12",
            0x04 => "FAT16 (<32MB)",
            0x05 => "Extended",
            0x06 => "FAT16 (>32MB)",
            0x07 => "NTFS/HPFS/exFAT",
            0x0B => "FAT32 (CHS)",
            0x0C => "FAT32 (LBA)",
            0x0E => "FAT16 (LBA)",
            0x0F => "Extended (LBA)",
            0x1B => "Hidden FAT32 (CHS)",
            0x1C => "Hidden FAT32 (LBA)",
            0x83 => "Linux",
            0xEE => "GPT Protective",
            0xEF => "EFI System",
            _ => "Unknown",
        }
    }
}

/// Parsed MBR (Master Boot Record).
#[derive(Debug, Clone, Serialize)]
pub struct Mbr {
    pub disk_signature: u32,
    pub entries: [MbrPartitionEntry; 4],
}

impl Mbr {
    /// Parse an MBR from exactly 512 bytes.
    pub fn parse(data: &[u8; 512]) -> Result<Self> {
        // Validate boot signature at bytes 510-511
        let signature = Cursor::new(&data[510..512]).read_u16::<LittleEndian>()?;
        if signature != MBR_SIGNATURE {
            return Err(Fat32Error::InvalidPartition(format!(
                "invalid boot signature: expected 0xAA55, got {:#06X}",
                signature
            )));
        }

        let disk_signature = Cursor::new(&data[440..444]).read_u32::<LittleEndian>()?;

        let entries: [MbrPartitionEntry; 4] = std::array::from_fn(|i| {
            let offset = PARTITION_TABLE_OFFSET + i * PARTITION_ENTRY_SIZE;
            let mut entry_data = [0u8; PARTITION_ENTRY_SIZE];
            entry_data.copy_from_slice(&data[offset..offset + PARTITION_ENTRY_SIZE]);
            MbrPartitionEntry::parse(&entry_data)
        });

        Ok(Self {
            disk_signature,
            entries,
        })
    }

    /// Check if this MBR is a GPT protective MBR.
    pub fn is_protective_gpt(&self) -> bool {
        let non_empty: Vec<_> = self.entries.iter().filter(|e| !e.is_empty()).collect();
        non_empty.len() == 1 && non_empty[0].partition_type == 0xEE
    }

    /// Return only non-empty partition entries.
    pub fn active_entries(&self) -> Vec<&MbrPartitionEntry> {
        self.entries.iter().filter(|e| !e.is_empty()).collect()
    }
}
