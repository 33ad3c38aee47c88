use std::collections::HashSet;
use std::io::{Read, Seek};

use log::debug;

use super::cluster::ChainReader;
use super::dirent::{DecodedEntry, DIR_ENTRY_SIZE, ENTRY_DELETED};
use super::node::Node;
use super::volume::Volume;
use crate::error::{Fat32Error, Result};

impl<R: Read + Seek> Volume<R> {
    /// List the directory whose content starts at `dir_cluster`, in on-disk
    /// order.
    ///
    /// Deleted entries, orphaned long name records, the volume label and
    /// the `.`/`..` entries are skipped. Listing stops at the terminating
    /// entry, or at the end of the cluster chain when the directory is full.
    /// Names that could not be used as a single path component are
    /// reported as corrupt entries.
    pub fn list_children(&self, dir_cluster: u32) -> Result<Vec<Node<'_, R>>> {
        let mut chain = ChainReader::new(dir_cluster);
        let mut children = Vec::new();
        let mut offset: u64 = 0;

        while self.chain_covers(&mut chain, offset)? {
            let mut first = [0u8; 1];
            self.read_chained(&mut chain, offset, &mut first)?;
            if first[0] == ENTRY_DELETED {
                offset += DIR_ENTRY_SIZE as u64;
                continue;
            }

            match self.decode_entry(&mut chain, offset)? {
                DecodedEntry::End => break,
                DecodedEntry::Orphaned { records } => {
                    offset += records as u64 * DIR_ENTRY_SIZE as u64;
                }
                DecodedEntry::Entry {
                    name,
                    lfn_entries,
                    record,
                } => {
                    let short_offset = offset + lfn_entries as u64 * DIR_ENTRY_SIZE as u64;
                    let dot_entry = lfn_entries == 0 && (name == "." || name == "..");
                    if !record.is_volume_label() && !dot_entry {
                        if let Some(reason) = unusable_name(&name) {
                            return Err(Fat32Error::CorruptDirectoryEntry {
                                dir_cluster,
                                offset,
                                reason: format!("name {name:?} {reason}"),
                            });
                        }
                        let short_offset = u32::try_from(short_offset).map_err(|_| {
                            Fat32Error::CorruptDirectoryEntry {
                                dir_cluster,
                                offset: short_offset,
                                reason: "directory exceeds 4 GiB".into(),
                            }
                        })?;
                        children.push(Node::entry(self, dir_cluster, short_offset, lfn_entries, name));
                    }
                    offset = short_offset + DIR_ENTRY_SIZE as u64;
                }
            }
        }

        debug!(
            "directory cluster {dir_cluster}: {} entries in {offset} bytes",
            children.len()
        );
        Ok(children)
    }
}

/// Why `name` cannot name a directory child, if it cannot.
fn unusable_name(name: &str) -> Option<&'static str> {
    if name.is_empty() {
        Some("is empty")
    } else if name == "." || name == ".." {
        Some("is a relative path component")
    } else if name.contains(['/', '\\', '\0']) {
        Some("contains a path separator or NUL")
    } else {
        None
    }
}

impl<'v, R: Read + Seek> Node<'v, R> {
    /// Children of this directory, in on-disk order.
    pub fn children(&self) -> Result<Vec<Node<'v, R>>> {
        if !self.is_directory()? {
            return Err(Fat32Error::NotADirectory(self.name().to_string()));
        }
        self.volume().list_children(self.content_start_cluster()?)
    }

    /// Depth-first walk below this directory. `visit` receives each node with
    /// its path relative to `prefix` and its depth (children of `self` are 1).
    ///
    /// Every directory is entered at most once: a subdirectory whose content
    /// starts at a cluster already walked is a [`Fat32Error::CyclicChain`].
    pub fn walk<F>(&self, prefix: &str, visit: &mut F) -> Result<()>
    where
        F: FnMut(&Node<'v, R>, &str, usize) -> Result<()>,
    {
        let mut entered = HashSet::from([self.content_start_cluster()?]);
        self.walk_inner(prefix, 1, &mut entered, visit)
    }

    fn walk_inner<F>(
        &self,
        prefix: &str,
        depth: usize,
        entered: &mut HashSet<u32>,
        visit: &mut F,
    ) -> Result<()>
    where
        F: FnMut(&Node<'v, R>, &str, usize) -> Result<()>,
    {
        for child in self.children()? {
            let path = join_path(prefix, child.name());
            visit(&child, &path, depth)?;
            if child.is_directory()? {
                let start_cluster = child.content_start_cluster()?;
                if !entered.insert(start_cluster) {
                    return Err(Fat32Error::CyclicChain { start_cluster });
                }
                child.walk_inner(&path, depth + 1, entered, visit)?;
            }
        }
        Ok(())
    }
}

/// Join a parent path and a child name with a single separator.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() || parent.ends_with('/') {
        format!("{parent}{name}")
    } else {
        format!("{parent}/{name}")
    }
}
