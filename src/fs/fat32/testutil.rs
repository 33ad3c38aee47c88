//! In-memory FAT32 images with hand-placed directory records.

use super::dirent::{lfn_checksum, ATTR_ARCHIVE, ATTR_DIRECTORY, ATTR_LONG_NAME, ATTR_VOLUME_ID};

pub const BYTES_PER_SECTOR: usize = 512;
const RESERVED_SECTORS: usize = 32;
const FAT_COUNT: usize = 2;
const SECTORS_PER_FAT: usize = 1;
/// One FAT sector holds 128 entries; clusters 0 and 1 are reserved.
const CLUSTER_COUNT: usize = 126;
const HEAP_START: usize = RESERVED_SECTORS + FAT_COUNT * SECTORS_PER_FAT;
const TOTAL_SECTORS: usize = HEAP_START + CLUSTER_COUNT;
const END_OF_CHAIN: u32 = 0x0FFF_FFFF;

/// Builds a small FAT32 image: 512-byte sectors, one sector per cluster,
/// root directory at cluster 2.
pub struct ImageBuilder {
    image: Vec<u8>,
    next_free: u32,
}

impl ImageBuilder {
    pub fn new() -> Self {
        let mut image = vec![0u8; TOTAL_SECTORS * BYTES_PER_SECTOR];
        let bpb = &mut image[..BYTES_PER_SECTOR];
        bpb[0..3].copy_from_slice(&[0xEB, 0x58, 0x90]);
        bpb[3..11].copy_from_slice(b"MSWIN4.1");
        bpb[11..13].copy_from_slice(&(BYTES_PER_SECTOR as u16).to_le_bytes());
        bpb[13] = 1;
        bpb[14..16].copy_from_slice(&(RESERVED_SECTORS as u16).to_le_bytes());
        bpb[16] = FAT_COUNT as u8;
        bpb[21] = 0xF8;
        bpb[32..36].copy_from_slice(&(TOTAL_SECTORS as u32).to_le_bytes());
        bpb[36..40].copy_from_slice(&(SECTORS_PER_FAT as u32).to_le_bytes());
        bpb[44..48].copy_from_slice(&2u32.to_le_bytes());
        bpb[48..50].copy_from_slice(&1u16.to_le_bytes());
        bpb[50..52].copy_from_slice(&6u16.to_le_bytes());
        bpb[66] = 0x29;
        bpb[67..71].copy_from_slice(&0x1234_ABCDu32.to_le_bytes());
        bpb[71..82].copy_from_slice(b"TESTVOL    ");
        bpb[82..90].copy_from_slice(b"FAT32   ");
        bpb[510] = 0x55;
        bpb[511] = 0xAA;

        let mut builder = Self {
            image,
            next_free: 3,
        };
        builder.set_fat(0, 0x0FFF_FFF8);
        builder.set_fat(1, END_OF_CHAIN);
        builder.set_fat(2, END_OF_CHAIN);
        builder
    }

    /// Write a FAT entry into every FAT copy.
    pub fn set_fat(&mut self, cluster: u32, value: u32) {
        for fat in 0..FAT_COUNT {
            let at = (RESERVED_SECTORS + fat * SECTORS_PER_FAT) * BYTES_PER_SECTOR
                + cluster as usize * 4;
            self.image[at..at + 4].copy_from_slice(&value.to_le_bytes());
        }
    }

    fn cluster_range(cluster: u32) -> std::ops::Range<usize> {
        let start = (HEAP_START + cluster as usize - 2) * BYTES_PER_SECTOR;
        start..start + BYTES_PER_SECTOR
    }

    /// Allocate `count` consecutive clusters linked into one chain.
    pub fn alloc_chain(&mut self, count: usize) -> Vec<u32> {
        let chain: Vec<u32> = (0..count as u32).map(|i| self.next_free + i).collect();
        self.next_free += count as u32;
        self.link(&chain);
        chain
    }

    fn link(&mut self, chain: &[u32]) {
        for pair in chain.windows(2) {
            self.set_fat(pair[0], pair[1]);
        }
        if let Some(&last) = chain.last() {
            self.set_fat(last, END_OF_CHAIN);
        }
    }

    /// Copy `data` across the clusters of `chain`.
    pub fn write_chain(&mut self, chain: &[u32], data: &[u8]) {
        for (cluster, chunk) in chain.iter().zip(data.chunks(BYTES_PER_SECTOR)) {
            let range = Self::cluster_range(*cluster);
            self.image[range.start..range.start + chunk.len()].copy_from_slice(chunk);
        }
    }

    /// Store file data in a fresh contiguous chain; returns the first cluster.
    pub fn add_data(&mut self, data: &[u8]) -> u32 {
        let count = data.len().div_ceil(BYTES_PER_SECTOR).max(1);
        let chain = self.alloc_chain(count);
        self.write_chain(&chain, data);
        chain[0]
    }

    /// Like `add_data`, but leaves a gap after every cluster so the chain
    /// is not contiguous and runs backwards through the heap.
    pub fn add_data_fragmented(&mut self, data: &[u8]) -> u32 {
        let count = data.len().div_ceil(BYTES_PER_SECTOR).max(1) as u32;
        let base = self.next_free;
        self.next_free += count * 2;
        let chain: Vec<u32> = (0..count).rev().map(|i| base + i * 2).collect();
        self.link(&chain);
        self.write_chain(&chain, data);
        chain[0]
    }

    /// Allocate a single-cluster directory.
    pub fn alloc_dir(&mut self) -> u32 {
        self.alloc_chain(1)[0]
    }

    /// Write directory records starting at `first_cluster`, extending its
    /// chain when the records do not fit in one cluster.
    pub fn write_dir(&mut self, first_cluster: u32, dir: &DirBuilder) {
        let bytes: Vec<u8> = dir.records.iter().flatten().copied().collect();
        let needed = bytes.len().div_ceil(BYTES_PER_SECTOR).max(1);
        let mut chain = vec![first_cluster];
        if needed > 1 {
            chain.extend(self.alloc_chain(needed - 1));
        }
        self.link(&chain);
        self.write_chain(&chain, &bytes);
    }

    pub fn build(self) -> Vec<u8> {
        self.image
    }
}

/// Pack an 11-byte short entry.
pub fn short_record(name: &[u8; 11], attributes: u8, cluster: u32, size: u32) -> [u8; 32] {
    let mut raw = [0u8; 32];
    raw[0..11].copy_from_slice(name);
    raw[11] = attributes;
    raw[20..22].copy_from_slice(&((cluster >> 16) as u16).to_le_bytes());
    raw[26..28].copy_from_slice(&(cluster as u16).to_le_bytes());
    raw[28..32].copy_from_slice(&size.to_le_bytes());
    raw
}

/// Long name records for `name`, in on-disk order (last chunk first).
pub fn lfn_records(name: &str, short: &[u8; 11]) -> Vec<[u8; 32]> {
    let mut units: Vec<u16> = name.encode_utf16().collect();
    let count = units.len().div_ceil(13);
    if units.len() % 13 != 0 {
        units.push(0x0000);
        units.resize(count * 13, 0xFFFF);
    }
    let checksum = lfn_checksum(short);

    (0..count)
        .rev()
        .map(|index| {
            let mut raw = [0u8; 32];
            raw[0] = (index + 1) as u8;
            if index == count - 1 {
                raw[0] |= 0x40;
            }
            raw[11] = ATTR_LONG_NAME;
            raw[13] = checksum;
            let chunk = &units[index * 13..index * 13 + 13];
            let offsets = [1usize, 3, 5, 7, 9, 14, 16, 18, 20, 22, 24, 28, 30];
            for (unit, at) in chunk.iter().zip(offsets) {
                raw[at..at + 2].copy_from_slice(&unit.to_le_bytes());
            }
            raw
        })
        .collect()
}

/// Sequence of directory records; an implicit zeroed terminator follows.
pub struct DirBuilder {
    records: Vec<[u8; 32]>,
}

impl DirBuilder {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
        }
    }

    pub fn raw(&mut self, record: [u8; 32]) -> &mut Self {
        self.records.push(record);
        self
    }

    pub fn file(&mut self, short: &[u8; 11], cluster: u32, size: u32) -> &mut Self {
        self.raw(short_record(short, ATTR_ARCHIVE, cluster, size))
    }

    pub fn long_file(&mut self, long: &str, short: &[u8; 11], cluster: u32, size: u32) -> &mut Self {
        for record in lfn_records(long, short) {
            self.raw(record);
        }
        self.file(short, cluster, size)
    }

    pub fn dir(&mut self, short: &[u8; 11], cluster: u32) -> &mut Self {
        self.raw(short_record(short, ATTR_DIRECTORY, cluster, 0))
    }

    pub fn long_dir(&mut self, long: &str, short: &[u8; 11], cluster: u32) -> &mut Self {
        for record in lfn_records(long, short) {
            self.raw(record);
        }
        self.dir(short, cluster)
    }

    /// `.` and `..` entries of a subdirectory.
    pub fn dots(&mut self, own: u32, parent: u32) -> &mut Self {
        self.dir(b".          ", own);
        self.dir(b"..         ", parent)
    }

    pub fn volume_label(&mut self, label: &[u8; 11]) -> &mut Self {
        self.raw(short_record(label, ATTR_VOLUME_ID, 0, 0))
    }

    pub fn deleted(&mut self, short: &[u8; 11]) -> &mut Self {
        let mut raw = short_record(short, ATTR_ARCHIVE, 0, 0);
        raw[0] = 0xE5;
        self.raw(raw)
    }
}
