use std::collections::HashSet;
use std::io::{Read, Seek};

use log::trace;

use super::volume::Volume;
use crate::error::{Fat32Error, Result};

const FAT_ENTRY_MASK: u32 = 0x0FFF_FFFF;
const FAT_BAD_CLUSTER: u32 = 0x0FFF_FFF7;
const FAT_END_OF_CHAIN_MIN: u32 = 0x0FFF_FFF8;
const FAT_RESERVED_MIN: u32 = 0x0FFF_FFF0;

/// Classified value of one FAT entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterLink {
    /// The chain continues at this cluster.
    Next(u32),
    /// Last cluster of the chain.
    End,
    /// Unallocated cluster.
    Free,
    /// Cluster marked bad.
    Bad,
    /// Value 1 or 0x0FFFFFF0-0x0FFFFFF6.
    Reserved(u32),
}

impl ClusterLink {
    /// Classify a raw 32-bit FAT entry. The top 4 bits are reserved and ignored.
    pub fn from_raw(raw: u32) -> Self {
        let value = raw & FAT_ENTRY_MASK;
        match value {
            0 => ClusterLink::Free,
            1 => ClusterLink::Reserved(value),
            FAT_BAD_CLUSTER => ClusterLink::Bad,
            v if v >= FAT_END_OF_CHAIN_MIN => ClusterLink::End,
            v if v >= FAT_RESERVED_MIN => ClusterLink::Reserved(v),
            v => ClusterLink::Next(v),
        }
    }
}

impl<R: Read + Seek> Volume<R> {
    fn check_cluster(&self, cluster: u32) -> Result<()> {
        if cluster < 2 || cluster > self.boot.max_cluster() {
            return Err(Fat32Error::InvalidCluster(cluster));
        }
        Ok(())
    }

    /// First sector of a data cluster. Clusters are numbered from 2.
    pub fn cluster_to_sector(&self, cluster: u32) -> Result<u64> {
        self.check_cluster(cluster)?;
        Ok(self.boot.cluster_heap_start_sector()
            + (cluster as u64 - 2) * self.boot.sectors_per_cluster as u64)
    }

    /// Volume-relative byte offset of a data cluster.
    pub fn cluster_offset(&self, cluster: u32) -> Result<u64> {
        Ok(self.cluster_to_sector(cluster)? * self.boot.bytes_per_sector as u64)
    }

    /// Look up the FAT entry of `cluster` in the first FAT copy.
    pub fn next_cluster(&self, cluster: u32) -> Result<ClusterLink> {
        self.check_cluster(cluster)?;
        let fat_offset = self.boot.fat_start_sector() * self.boot.bytes_per_sector as u64;
        let raw = self.read_u32_at(fat_offset + cluster as u64 * 4)?;
        Ok(ClusterLink::from_raw(raw))
    }

    /// Follow one link of a chain: `Some(next)` or `None` at the end.
    ///
    /// Bad, free and reserved links, as well as links pointing outside the
    /// cluster heap, are errors.
    pub(super) fn follow(&self, cluster: u32) -> Result<Option<u32>> {
        match self.next_cluster(cluster)? {
            ClusterLink::Next(next) if next <= self.boot.max_cluster() => {
                trace!("cluster {cluster} -> {next}");
                Ok(Some(next))
            }
            ClusterLink::Next(next) => Err(Fat32Error::BrokenChain {
                cluster,
                value: next,
            }),
            ClusterLink::End => Ok(None),
            ClusterLink::Bad => Err(Fat32Error::BadCluster { cluster }),
            ClusterLink::Free => Err(Fat32Error::BrokenChain { cluster, value: 0 }),
            ClusterLink::Reserved(value) => Err(Fat32Error::BrokenChain { cluster, value }),
        }
    }

    /// Read `buf.len()` bytes at `offset` of the logical byte stream formed by
    /// concatenating every cluster of the chain that starts at `start_cluster`.
    pub fn read_logical(&self, start_cluster: u32, offset: u64, buf: &mut [u8]) -> Result<()> {
        let cluster_size = self.bytes_per_cluster() as u64;
        let wanted_end = offset + buf.len() as u64;
        let end_of_chain = move || Fat32Error::UnexpectedEndOfChain {
            start_cluster,
            offset: wanted_end,
        };

        let mut cluster = start_cluster;
        for _ in 0..offset / cluster_size {
            cluster = self.follow(cluster)?.ok_or_else(end_of_chain)?;
        }

        let mut within = offset % cluster_size;
        let mut done = 0usize;
        while done < buf.len() {
            let chunk = ((cluster_size - within) as usize).min(buf.len() - done);
            let at = self.cluster_offset(cluster)? + within;
            self.read_at(at, &mut buf[done..done + chunk])?;
            done += chunk;
            within = 0;
            if done < buf.len() {
                cluster = self.follow(cluster)?.ok_or_else(end_of_chain)?;
            }
        }
        Ok(())
    }

    /// Make sure the chain behind `chain` reaches cluster `index` (0-based),
    /// following links as needed. Returns `false` when the chain ends first.
    fn extend_chain(&self, chain: &mut ChainReader, index: usize) -> Result<bool> {
        while chain.clusters.len() <= index {
            if chain.ended {
                return Ok(false);
            }
            let last = chain.clusters[chain.clusters.len() - 1];
            match self.follow(last)? {
                Some(next) => {
                    if !chain.seen.insert(next) {
                        return Err(Fat32Error::CyclicChain {
                            start_cluster: chain.start_cluster,
                        });
                    }
                    chain.clusters.push(next);
                }
                None => chain.ended = true,
            }
        }
        Ok(true)
    }

    /// Whether the logical stream of `chain` holds the byte at `offset`.
    pub(super) fn chain_covers(&self, chain: &mut ChainReader, offset: u64) -> Result<bool> {
        let index = offset / self.bytes_per_cluster() as u64;
        self.extend_chain(chain, index as usize)
    }

    /// Like [`Volume::read_logical`], but clusters already visited through
    /// `chain` are not looked up in the FAT again.
    pub(super) fn read_chained(
        &self,
        chain: &mut ChainReader,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<()> {
        let cluster_size = self.bytes_per_cluster() as u64;
        let mut done = 0usize;
        while done < buf.len() {
            let at = offset + done as u64;
            let index = (at / cluster_size) as usize;
            if !self.extend_chain(chain, index)? {
                return Err(Fat32Error::UnexpectedEndOfChain {
                    start_cluster: chain.start_cluster,
                    offset: offset + buf.len() as u64,
                });
            }
            let within = at % cluster_size;
            let chunk = ((cluster_size - within) as usize).min(buf.len() - done);
            let disk = self.cluster_offset(chain.clusters[index])? + within;
            self.read_at(disk, &mut buf[done..done + chunk])?;
            done += chunk;
        }
        Ok(())
    }
}

/// Cursor state for repeated reads of one cluster chain.
///
/// Clusters are resolved on demand and remembered, so scanning a stream
/// costs one FAT lookup per cluster. A chain that comes back to a cluster
/// it already passed through is reported as [`Fat32Error::CyclicChain`].
#[derive(Debug)]
pub(super) struct ChainReader {
    start_cluster: u32,
    clusters: Vec<u32>,
    seen: HashSet<u32>,
    ended: bool,
}

impl ChainReader {
    pub(super) fn new(start_cluster: u32) -> Self {
        Self {
            start_cluster,
            clusters: vec![start_cluster],
            seen: HashSet::from([start_cluster]),
            ended: false,
        }
    }

    pub(super) fn start_cluster(&self) -> u32 {
        self.start_cluster
    }
}
