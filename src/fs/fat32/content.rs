use std::io::{Read, Seek, Write};

use log::debug;

use super::node::Node;
use crate::error::{Fat32Error, Result};

impl<R: Read + Seek> Node<'_, R> {
    /// Stream this file's content to `writer`, one cluster at a time.
    /// Returns the number of bytes written, which is always the declared size.
    pub fn write_content_to(&self, writer: &mut dyn Write) -> Result<u64> {
        if self.is_directory()? {
            return Err(Fat32Error::IsADirectory(self.name().to_string()));
        }

        let size = self.content_size()?;
        if size == 0 {
            return Ok(0);
        }

        let volume = self.volume();
        let start_cluster = self.content_start_cluster()?;
        let mut buffer = vec![0u8; volume.bytes_per_cluster() as usize];
        let mut remaining = size;
        let mut cluster = start_cluster;

        debug!(
            "streaming {:?}: {size} bytes from cluster {start_cluster}",
            self.name()
        );

        loop {
            let chunk = remaining.min(buffer.len() as u32) as usize;
            volume.read_at(volume.cluster_offset(cluster)?, &mut buffer[..chunk])?;
            writer.write_all(&buffer[..chunk])?;
            remaining -= chunk as u32;
            if remaining == 0 {
                break;
            }

            cluster = volume.follow(cluster)?.ok_or(Fat32Error::TruncatedChain {
                start_cluster,
                size,
                remaining,
            })?;
        }

        Ok(size as u64)
    }

    /// Read this file's whole content into memory.
    pub fn read_content(&self) -> Result<Vec<u8>> {
        let mut data = Vec::with_capacity(self.content_size()? as usize);
        self.write_content_to(&mut data)?;
        Ok(data)
    }
}
