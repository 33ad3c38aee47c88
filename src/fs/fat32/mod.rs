//! Read-only FAT32 driver.
//!
//! A [`Volume`] owns the image reader and the parsed boot sector. [`Node`]s
//! borrow the volume and locate their directory entry inside the logical byte
//! stream of the containing directory's cluster chain.

mod cluster;
mod content;
mod dir;
pub mod dirent;
mod node;
mod path;
pub mod source;
mod volume;

#[cfg(test)]
pub(crate) mod testutil;

pub use cluster::ClusterLink;
pub use dir::join_path;
pub use dirent::DirEntryRecord;
pub use node::{Node, ROOT_NAME};
pub use path::PATH_SEPARATOR;
pub use volume::{BootSector, Volume};
