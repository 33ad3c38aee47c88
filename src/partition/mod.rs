pub mod mbr;

use std::io::{Read, Seek, SeekFrom};

use log::debug;

use crate::error::{Fat32Error, Result};
use mbr::Mbr;

/// Byte offset of the FAT32 partition at 1-based primary `index` of the
/// image's MBR.
pub fn fat32_partition_offset(reader: &mut (impl Read + Seek), index: usize) -> Result<u64> {
    if !(1..=4).contains(&index) {
        return Err(Fat32Error::InvalidPartition(format!(
            "partition {index} out of range 1-4"
        )));
    }

    reader.seek(SeekFrom::Start(0))?;
    let mut sector = [0u8; 512];
    reader.read_exact(&mut sector)?;
    let mbr = Mbr::parse(&sector)?;
    if mbr.is_protective_gpt() {
        return Err(Fat32Error::InvalidPartition(
            "GPT partition tables are not supported".into(),
        ));
    }

    let entry = &mbr.entries[index - 1];
    if entry.is_empty() {
        return Err(Fat32Error::InvalidPartition(format!(
            "partition {index} is empty"
        )));
    }
    if !entry.is_fat32() {
        return Err(Fat32Error::InvalidPartition(format!(
            "partition {index} has type {:#04X} ({}), not FAT32",
            entry.partition_type,
            entry.partition_type_name()
        )));
    }

    debug!(
        "partition {index}: {} at LBA {}, {} sectors",
        entry.partition_type_name(),
        entry.start_lba,
        entry.total_sectors
    );
    Ok(entry.offset_bytes())
}

/// Format a byte count as a human-readable size string using binary (base-1024) units.
pub fn format_size(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = 1024 * KIB;
    const GIB: u64 = 1024 * MIB;
    const TIB: u64 = 1024 * GIB;

    if bytes >= TIB {
        format!("{:.1} TiB", bytes as f64 / TIB as f64)
    } else if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
