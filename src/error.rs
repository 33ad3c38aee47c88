use thiserror::Error;

#[derive(Error, Debug)]
pub enum Fat32Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid FAT32 volume: {0}")]
    InvalidVolume(String),

    #[error("Corrupt directory entry at offset {offset} of directory cluster {dir_cluster}: {reason}")]
    CorruptDirectoryEntry {
        dir_cluster: u32,
        offset: u64,
        reason: String,
    },

    #[error("Cluster chain starting at {start_cluster} ends before byte offset {offset}")]
    UnexpectedEndOfChain { start_cluster: u32, offset: u64 },

    #[error("File chain starting at {start_cluster} is truncated: {remaining} of {size} bytes unread")]
    TruncatedChain {
        start_cluster: u32,
        size: u32,
        remaining: u32,
    },

    #[error("Bad cluster marker reached after cluster {cluster}")]
    BadCluster { cluster: u32 },

    #[error("Broken cluster chain: cluster {cluster} links to {value:#010X}")]
    BrokenChain { cluster: u32, value: u32 },

    #[error("Cluster chain starting at {start_cluster} loops")]
    CyclicChain { start_cluster: u32 },

    #[error("Invalid cluster number: {0}")]
    InvalidCluster(u32),

    #[error("Invalid operation: {0}")]
    InvalidOperation(&'static str),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Is a directory: {0}")]
    IsADirectory(String),

    #[error("Unsupported path component: {0}")]
    UnsupportedComponent(String),

    #[error("Invalid partition: {0}")]
    InvalidPartition(String),
}

pub type Result<T> = std::result::Result<T, Fat32Error>;
