use std::io::{self, Read, Seek, SeekFrom};

use byteorder::{LittleEndian, ReadBytesExt};

/// Positioned little-endian reads over a seekable image.
///
/// All offsets are relative to the start of the volume; `base` is the byte
/// offset of the volume inside the underlying reader (non-zero for a
/// partition inside a whole-disk image).
pub struct ByteSource<R> {
    inner: R,
    base: u64,
}

impl<R: Read + Seek> ByteSource<R> {
    pub fn new(inner: R, base: u64) -> Self {
        Self { inner, base }
    }

    /// Byte offset of the volume inside the underlying reader.
    pub fn base(&self) -> u64 {
        self.base
    }

    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        let absolute = self.base.checked_add(offset).ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "offset overflows image")
        })?;
        self.inner.seek(SeekFrom::Start(absolute))?;
        Ok(())
    }

    pub fn read_u8_at(&mut self, offset: u64) -> io::Result<u8> {
        self.seek_to(offset)?;
        self.inner.read_u8()
    }

    pub fn read_u16_le_at(&mut self, offset: u64) -> io::Result<u16> {
        self.seek_to(offset)?;
        self.inner.read_u16::<LittleEndian>()
    }

    pub fn read_u32_le_at(&mut self, offset: u64) -> io::Result<u32> {
        self.seek_to(offset)?;
        self.inner.read_u32::<LittleEndian>()
    }

    /// Fill `buf` from `offset`. A short read past the end of the image is
    /// reported as `UnexpectedEof`.
    pub fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.seek_to(offset)?;
        self.inner.read_exact(buf)
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
