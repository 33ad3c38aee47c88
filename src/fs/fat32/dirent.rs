//! Directory entry codec: 32-byte short (8.3) entries and the VFAT long
//! file name records that precede them.

use std::io::{Read, Seek};

use log::warn;

use super::cluster::ChainReader;
use super::volume::Volume;
use crate::error::{Fat32Error, Result};

pub const DIR_ENTRY_SIZE: u32 = 32;

pub const ATTR_READ_ONLY: u8 = 0x01;
pub const ATTR_HIDDEN: u8 = 0x02;
pub const ATTR_SYSTEM: u8 = 0x04;
pub const ATTR_VOLUME_ID: u8 = 0x08;
pub const ATTR_DIRECTORY: u8 = 0x10;
pub const ATTR_ARCHIVE: u8 = 0x20;
pub const ATTR_LONG_NAME: u8 = ATTR_READ_ONLY | ATTR_HIDDEN | ATTR_SYSTEM | ATTR_VOLUME_ID;

/// First byte of the entry that ends a directory.
pub const ENTRY_END: u8 = 0x00;
/// First byte of a deleted entry.
pub const ENTRY_DELETED: u8 = 0xE5;
/// Stored in place of a leading 0xE5 name byte.
const ENTRY_KANJI: u8 = 0x05;

const LFN_LAST_ENTRY: u8 = 0x40;
const LFN_ORDINAL_MASK: u8 = 0x3F;
const LFN_CHARS_PER_ENTRY: usize = 13;
/// 255 characters need 20 records.
pub const MAX_LFN_ENTRIES: usize = 20;
const MAX_LFN_LENGTH: usize = 255;
/// Upper bound on records examined while looking for the end of a run.
const MAX_LFN_SCAN: u32 = 64;

/// True when the attribute byte marks a long file name record.
pub fn is_long_name(attributes: u8) -> bool {
    attributes & ATTR_LONG_NAME == ATTR_LONG_NAME
}

/// A decoded short (8.3) directory entry.
#[derive(Debug, Clone, PartialEq)]
pub struct DirEntryRecord {
    pub short_name: [u8; 11],
    pub attributes: u8,
    pub start_cluster: u32,
    pub size: u32,
    pub modified_time: u16,
    pub modified_date: u16,
}

impl DirEntryRecord {
    pub fn parse(raw: &[u8; 32]) -> Self {
        let mut short_name = [0u8; 11];
        short_name.copy_from_slice(&raw[0..11]);

        let cluster_hi = u16::from_le_bytes([raw[20], raw[21]]) as u32;
        let cluster_lo = u16::from_le_bytes([raw[26], raw[27]]) as u32;

        Self {
            short_name,
            attributes: raw[11],
            start_cluster: (cluster_hi << 16) | cluster_lo,
            size: u32::from_le_bytes([raw[28], raw[29], raw[30], raw[31]]),
            modified_time: u16::from_le_bytes([raw[22], raw[23]]),
            modified_date: u16::from_le_bytes([raw[24], raw[25]]),
        }
    }

    pub fn is_directory(&self) -> bool {
        self.attributes & ATTR_DIRECTORY != 0
    }

    pub fn is_volume_label(&self) -> bool {
        !is_long_name(self.attributes)
            && self.attributes & ATTR_VOLUME_ID != 0
            && !self.is_directory()
    }

    pub fn is_hidden(&self) -> bool {
        self.attributes & ATTR_HIDDEN != 0
    }

    pub fn is_system(&self) -> bool {
        self.attributes & ATTR_SYSTEM != 0
    }

    pub fn is_read_only(&self) -> bool {
        self.attributes & ATTR_READ_ONLY != 0
    }

    pub fn is_archive(&self) -> bool {
        self.attributes & ATTR_ARCHIVE != 0
    }

    /// Display form of the 8.3 name, e.g. `HELLO   TXT` -> `HELLO.TXT`.
    pub fn display_name(&self) -> String {
        let mut base = [0u8; 8];
        base.copy_from_slice(&self.short_name[0..8]);
        if base[0] == ENTRY_KANJI {
            base[0] = ENTRY_DELETED;
        }
        build_short_name(&base, &self.short_name[8..11])
    }

    /// Last modification time as `YYYY-MM-DD HH:MM:SS`, if set.
    pub fn modified(&self) -> Option<String> {
        let formatted = format_fat_datetime(self.modified_date, self.modified_time);
        if formatted.is_empty() {
            None
        } else {
            Some(formatted)
        }
    }
}

/// Checksum of a packed 11-byte short name, stored in each LFN record.
pub fn lfn_checksum(short_name: &[u8; 11]) -> u8 {
    short_name
        .iter()
        .fold(0u8, |sum, &b| sum.rotate_right(1).wrapping_add(b))
}

/// One 32-byte long file name record.
#[derive(Debug, Clone)]
struct LfnRecord {
    /// Sequence number, 1-based.
    ordinal: u8,
    is_last: bool,
    checksum: u8,
    units: [u16; LFN_CHARS_PER_ENTRY],
}

impl LfnRecord {
    fn parse(raw: &[u8; 32]) -> Self {
        // LFN entry layout (13 UTF-16LE characters per entry):
        //   Bytes 1-10:  characters 1-5
        //   Bytes 14-25: characters 6-11
        //   Bytes 26-27: first cluster low (always 0, NOT character data)
        //   Bytes 28-31: characters 12-13
        let mut units = [0u16; LFN_CHARS_PER_ENTRY];
        let ranges = [(1usize, 5usize), (14, 6), (28, 2)];
        let mut i = 0;
        for (start, count) in ranges {
            for k in 0..count {
                let at = start + k * 2;
                units[i] = u16::from_le_bytes([raw[at], raw[at + 1]]);
                i += 1;
            }
        }

        Self {
            ordinal: raw[0] & LFN_ORDINAL_MASK,
            is_last: raw[0] & LFN_LAST_ENTRY != 0,
            checksum: raw[13],
            units,
        }
    }
}

/// Reassembles one long name from its records, physically last-chunk-first.
///
/// Scratch state lives for a single name only.
struct LongNameAssembler {
    units: Vec<u16>,
    seen: [bool; MAX_LFN_ENTRIES],
    checksum: Option<u8>,
    highest: usize,
}

impl LongNameAssembler {
    fn new() -> Self {
        Self {
            units: vec![0u16; MAX_LFN_ENTRIES * LFN_CHARS_PER_ENTRY],
            seen: [false; MAX_LFN_ENTRIES],
            checksum: None,
            highest: 0,
        }
    }

    /// Add a record. Returns `true` once the record carrying the first
    /// chunk of the name (ordinal 1) has been added.
    fn push(&mut self, record: &LfnRecord) -> std::result::Result<bool, String> {
        if record.ordinal == 0 || record.ordinal as usize > MAX_LFN_ENTRIES {
            return Err(format!("long name ordinal {} out of range", record.ordinal));
        }
        let index = record.ordinal as usize - 1;
        if self.seen[index] {
            return Err(format!("long name ordinal {} repeated", record.ordinal));
        }
        match self.checksum {
            None => self.checksum = Some(record.checksum),
            Some(sum) if sum != record.checksum => {
                return Err(format!(
                    "long name checksum changes from {sum:#04X} to {:#04X}",
                    record.checksum
                ));
            }
            Some(_) => {}
        }

        self.seen[index] = true;
        self.highest = self.highest.max(index);
        let start = index * LFN_CHARS_PER_ENTRY;
        self.units[start..start + LFN_CHARS_PER_ENTRY].copy_from_slice(&record.units);
        Ok(index == 0)
    }

    /// Check the run is complete and decode it. `records` is the number of
    /// records pushed.
    fn finish(self, records: usize) -> std::result::Result<(String, u8), String> {
        if self.highest + 1 != records || self.seen[..records].iter().any(|&s| !s) {
            return Err(format!(
                "long name has {records} records but ordinals reach {}",
                self.highest + 1
            ));
        }

        let len = self
            .units
            .iter()
            .position(|&u| u == 0x0000 || u == 0xFFFF)
            .unwrap_or(self.units.len());
        if len == 0 {
            return Err("long name is empty".into());
        }
        if len > MAX_LFN_LENGTH {
            return Err(format!("long name is {len} characters long"));
        }

        let name = char::decode_utf16(self.units[..len].iter().copied())
            .collect::<std::result::Result<String, _>>()
            .map_err(|e| format!("long name is not valid UTF-16: {e}"))?;
        Ok((name, self.checksum.unwrap_or(0)))
    }
}

/// Outcome of decoding the entry at one position of a directory stream.
#[derive(Debug, Clone, PartialEq)]
pub(super) enum DecodedEntry {
    /// The directory ends here.
    End,
    /// A short entry, preceded by `lfn_entries` long name records.
    Entry {
        name: String,
        lfn_entries: u32,
        record: DirEntryRecord,
    },
    /// Long name records that belong to no live short entry.
    Orphaned { records: u32 },
}

impl<R: Read + Seek> Volume<R> {
    fn read_dir_record(&self, dir: &mut ChainReader, offset: u64) -> Result<[u8; 32]> {
        let mut raw = [0u8; 32];
        self.read_chained(dir, offset, &mut raw)?;
        Ok(raw)
    }

    /// Decode the entry at `offset` of the directory stream behind `dir`,
    /// consuming any long name records found there.
    ///
    /// The caller is expected to have skipped deleted entries already.
    pub(super) fn decode_entry(&self, dir: &mut ChainReader, offset: u64) -> Result<DecodedEntry> {
        let dir_cluster = dir.start_cluster();
        let corrupt = |at: u64, reason: String| Fat32Error::CorruptDirectoryEntry {
            dir_cluster,
            offset: at,
            reason,
        };

        let first = self.read_dir_record(dir, offset)?;
        if first[0] == ENTRY_END {
            return Ok(DecodedEntry::End);
        }
        if !is_long_name(first[11]) {
            let record = DirEntryRecord::parse(&first);
            return Ok(DecodedEntry::Entry {
                name: record.display_name(),
                lfn_entries: 0,
                record,
            });
        }

        let mut assembler = LongNameAssembler::new();
        for i in 0..MAX_LFN_SCAN {
            let at = offset + i as u64 * DIR_ENTRY_SIZE as u64;
            let raw = if i == 0 {
                first
            } else {
                self.read_dir_record(dir, at)?
            };
            if raw[0] == ENTRY_END || raw[0] == ENTRY_DELETED || !is_long_name(raw[11]) {
                return Err(corrupt(at, "long name sequence is interrupted".into()));
            }

            let lfn = LfnRecord::parse(&raw);
            if i == 0 && !lfn.is_last {
                warn!(
                    "directory cluster {dir_cluster} offset {offset}: long name run does not start with its last record"
                );
            }
            let complete = assembler.push(&lfn).map_err(|reason| corrupt(at, reason))?;
            if !complete {
                continue;
            }

            let records = i + 1;
            let (name, checksum) = assembler
                .finish(records as usize)
                .map_err(|reason| corrupt(offset, reason))?;

            let short_at = offset + records as u64 * DIR_ENTRY_SIZE as u64;
            let short = self.read_dir_record(dir, short_at)?;
            if short[0] == ENTRY_END || short[0] == ENTRY_DELETED || is_long_name(short[11]) {
                warn!(
                    "directory cluster {dir_cluster} offset {offset}: long name {name:?} has no short entry, skipping"
                );
                return Ok(DecodedEntry::Orphaned { records });
            }
            let record = DirEntryRecord::parse(&short);
            if lfn_checksum(&record.short_name) != checksum {
                warn!(
                    "directory cluster {dir_cluster} offset {offset}: long name {name:?} does not match short entry {:?}, skipping",
                    record.display_name()
                );
                return Ok(DecodedEntry::Orphaned { records });
            }

            return Ok(DecodedEntry::Entry {
                name,
                lfn_entries: records,
                record,
            });
        }

        Err(corrupt(
            offset,
            format!("no final long name record within {MAX_LFN_SCAN} records"),
        ))
    }
}

/// Build a DOS 8.3 short filename from the name and extension bytes.
///
/// FAT short names use OEM codepage encoding (typically CP437). Bytes 0x80-0xFF
/// are decoded using the CP437 table rather than assuming UTF-8.
fn build_short_name(name: &[u8], ext: &[u8]) -> String {
    let name_str = decode_oem_string(name);
    let name_trimmed = name_str.trim_end_matches(' ');
    let ext_str = decode_oem_string(ext);
    let ext_trimmed = ext_str.trim_end_matches(' ');

    if ext_trimmed.is_empty() {
        name_trimmed.to_string()
    } else {
        format!("{name_trimmed}.{ext_trimmed}")
    }
}

/// Decode a byte slice from OEM codepage (CP437) to a UTF-8 String.
pub(crate) fn decode_oem_string(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| cp437_to_char(b)).collect()
}

fn cp437_to_char(b: u8) -> char {
    if b < 0x80 {
        b as char
    } else {
        CP437_HIGH[b as usize - 0x80]
    }
}

/// CP437 to Unicode mapping for bytes 0x80-0xFF.
#[rustfmt::skip]
const CP437_HIGH: [char; 128] = [
    // 0x80-0x8F
    'Ç','ü','é','â','ä','à','å','ç', 'ê','ë','è','ï','î','ì','Ä','Å',
    // 0x90-0x9F
    'É','æ','Æ','ô','ö','ò','û','ù', 'ÿ','Ö','Ü','¢','£','¥','₧','ƒ',
    // 0xA0-0xAF
    'á','í','ó','ú','ñ','Ñ','ª','º', '¿','⌐','¬','½','¼','¡','«','»',
    // 0xB0-0xBF
    '░','▒','▓','│','┤','╡','╢','╖', '╕','╣','║','╗','╝','╜','╛','┐',
    // 0xC0-0xCF
    '└','┴','┬','├','─','┼','╞','╟', '╚','╔','╩','╦','╠','═','╬','╧',
    // 0xD0-0xDF
    '╨','╤','╥','╙','╘','╒','╓','╫', '╪','┘','┌','█','▄','▌','▐','▀',
    // 0xE0-0xEF
    'α','ß','Γ','π','Σ','σ','µ','τ', 'Φ','Θ','Ω','δ','∞','φ','ε','∩',
    // 0xF0-0xFF
    '≡','±','≥','≤','⌠','⌡','÷','≈', '°','∙','·','√','ⁿ','²','■','\u{00A0}',
];

/// Format a FAT date/time pair as "YYYY-MM-DD HH:MM:SS".
fn format_fat_datetime(date: u16, time: u16) -> String {
    if date == 0 {
        return String::new();
    }
    let day = date & 0x1F;
    let month = (date >> 5) & 0x0F;
    let year = ((date >> 9) & 0x7F) + 1980;
    let second = (time & 0x1F) * 2;
    let minute = (time >> 5) & 0x3F;
    let hour = (time >> 11) & 0x1F;
    format!("{year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::fat32::testutil::{lfn_records, short_record, DirBuilder, ImageBuilder};
    use std::io::Cursor;

    fn record_for(short: &[u8; 11]) -> DirEntryRecord {
        DirEntryRecord::parse(&short_record(short, 0x20, 0, 0))
    }

    #[test]
    fn test_build_short_name() {
        assert_eq!(build_short_name(b"KERNEL  ", b"SYS"), "KERNEL.SYS");
        assert_eq!(build_short_name(b"BOOTMGR ", b"   "), "BOOTMGR");
        assert_eq!(build_short_name(b"IO      ", b"SYS"), "IO.SYS");
    }

    #[test]
    fn test_short_display_names() {
        assert_eq!(record_for(b"HELLO   TXT").display_name(), "HELLO.TXT");
        assert_eq!(record_for(b"README     ").display_name(), "README");
        assert_eq!(record_for(b"A       B  ").display_name(), "A.B");
    }

    #[test]
    fn test_build_short_name_cp437() {
        // CP437 byte 0x81 = ü
        assert_eq!(build_short_name(b"GR\x81\x81E   ", b"TXT"), "GRüüE.TXT");
        // CP437 byte 0x82 = é
        assert_eq!(build_short_name(b"CAF\x82    ", b"   "), "CAFé");
    }

    #[test]
    fn test_kanji_lead_byte() {
        let record = record_for(b"\x05ABC    TXT");
        assert_eq!(record.display_name(), "σABC.TXT");
    }

    #[test]
    fn test_parse_short_record_fields() {
        let mut raw = short_record(b"DATA    BIN", ATTR_ARCHIVE | ATTR_HIDDEN, 0x0012_3456, 9000);
        // 2026-01-29 14:30:00
        let date: u16 = 29 | (1 << 5) | (46 << 9);
        let time: u16 = (30 << 5) | (14 << 11);
        raw[22..24].copy_from_slice(&time.to_le_bytes());
        raw[24..26].copy_from_slice(&date.to_le_bytes());

        let record = DirEntryRecord::parse(&raw);
        assert_eq!(record.start_cluster, 0x0012_3456);
        assert_eq!(record.size, 9000);
        assert!(record.is_hidden());
        assert!(record.is_archive());
        assert!(!record.is_directory());
        assert!(!record.is_volume_label());
        assert_eq!(record.modified().as_deref(), Some("2026-01-29 14:30:00"));
    }

    #[test]
    fn test_format_fat_datetime_zero() {
        assert_eq!(format_fat_datetime(0, 0), "");
        assert_eq!(record_for(b"X          ").modified(), None);
    }

    #[test]
    fn test_lfn_checksum_known_value() {
        // Reference value computed with the Microsoft algorithm.
        let mut expected = 0u8;
        for &b in b"FOO     BAR" {
            expected = ((expected & 1) << 7).wrapping_add(expected >> 1).wrapping_add(b);
        }
        assert_eq!(lfn_checksum(b"FOO     BAR"), expected);
    }

    #[test]
    fn test_lfn_record_count_matches_name_length() {
        let short = *b"LONGNA~1TXT";
        for len in [1usize, 12, 13, 14, 26, 27, 100, 255] {
            let name: String = std::iter::repeat('x').take(len).collect();
            let records = lfn_records(&name, &short);
            assert_eq!(records.len(), len.div_ceil(13), "length {len}");
        }
    }

    fn decode_first(dir: DirBuilder) -> Result<DecodedEntry> {
        let mut builder = ImageBuilder::new();
        builder.write_dir(2, &dir);
        let volume = Volume::open(Cursor::new(builder.build())).unwrap();
        volume.decode_entry(&mut ChainReader::new(2), 0)
    }

    #[test]
    fn test_decode_long_name_round_trip() {
        let names = [
            "a.txt",
            "exactly13char",
            "A rather long file name with spaces.tar.gz",
            "ünïcödé ファイル.txt",
        ];
        for long in names {
            let mut dir = DirBuilder::new();
            dir.long_file(long, b"LONGNA~1TXT", 5, 10);
            match decode_first(dir).unwrap() {
                DecodedEntry::Entry {
                    name,
                    lfn_entries,
                    record,
                } => {
                    assert_eq!(name, long);
                    let units = long.encode_utf16().count();
                    assert_eq!(lfn_entries as usize, units.div_ceil(13));
                    assert_eq!(record.start_cluster, 5);
                    assert_eq!(record.size, 10);
                }
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_decode_max_length_name() {
        let long: String = std::iter::repeat('n').take(255).collect();
        let mut dir = DirBuilder::new();
        dir.long_file(&long, b"NNNNNN~1   ", 5, 1);
        match decode_first(dir).unwrap() {
            DecodedEntry::Entry { name, lfn_entries, .. } => {
                assert_eq!(name, long);
                assert_eq!(lfn_entries, 20);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_short_only_entry() {
        let mut dir = DirBuilder::new();
        dir.file(b"HELLO   TXT", 7, 5);
        assert_eq!(
            decode_first(dir).unwrap(),
            DecodedEntry::Entry {
                name: "HELLO.TXT".into(),
                lfn_entries: 0,
                record: DirEntryRecord::parse(&short_record(b"HELLO   TXT", ATTR_ARCHIVE, 7, 5)),
            }
        );
    }

    #[test]
    fn test_decode_terminator() {
        assert_eq!(decode_first(DirBuilder::new()).unwrap(), DecodedEntry::End);
    }

    #[test]
    fn test_missing_lfn_record_is_corrupt() {
        let short = *b"LONGNA~1TXT";
        let mut records = lfn_records("a name spanning three records!", &short);
        assert_eq!(records.len(), 3);
        // Drop the middle chunk (ordinal 2)
        records.remove(1);
        let mut dir = DirBuilder::new();
        for r in records {
            dir.raw(r);
        }
        dir.raw(short_record(&short, ATTR_ARCHIVE, 5, 1));

        let err = decode_first(dir).unwrap_err();
        assert!(
            matches!(err, Fat32Error::CorruptDirectoryEntry { .. }),
            "got {err}"
        );
    }

    #[test]
    fn test_out_of_range_ordinal_is_corrupt() {
        let short = *b"LONGNA~1TXT";
        let mut records = lfn_records("abc", &short);
        records[0][0] = LFN_LAST_ENTRY | 0x15; // ordinal 21
        let mut dir = DirBuilder::new();
        dir.raw(records[0]);
        dir.raw(short_record(&short, ATTR_ARCHIVE, 5, 1));
        assert!(matches!(
            decode_first(dir),
            Err(Fat32Error::CorruptDirectoryEntry { .. })
        ));
    }

    #[test]
    fn test_interrupted_lfn_run_is_corrupt() {
        let short = *b"LONGNA~1TXT";
        let records = lfn_records("a name spanning three records!", &short);
        let mut dir = DirBuilder::new();
        dir.raw(records[0]);
        dir.file(b"OTHER   TXT", 5, 1);
        assert!(matches!(
            decode_first(dir),
            Err(Fat32Error::CorruptDirectoryEntry { .. })
        ));
    }

    #[test]
    fn test_checksum_mismatch_is_orphaned() {
        let records = lfn_records("orphan name.txt", b"ORPHAN~1TXT");
        let mut dir = DirBuilder::new();
        for r in &records {
            dir.raw(*r);
        }
        dir.file(b"OTHER   TXT", 5, 1);
        assert_eq!(
            decode_first(dir).unwrap(),
            DecodedEntry::Orphaned {
                records: records.len() as u32
            }
        );
    }

    #[test]
    fn test_lfn_before_deleted_short_is_orphaned() {
        let short = *b"GONE~1  TXT";
        let records = lfn_records("gone file.txt", &short);
        let mut dir = DirBuilder::new();
        for r in &records {
            dir.raw(*r);
        }
        let mut deleted = short_record(&short, ATTR_ARCHIVE, 5, 1);
        deleted[0] = ENTRY_DELETED;
        dir.raw(deleted);
        assert_eq!(
            decode_first(dir).unwrap(),
            DecodedEntry::Orphaned {
                records: records.len() as u32
            }
        );
    }
}
