pub mod error;
pub mod fs;
pub mod logging;
pub mod partition;

pub use error::{Fat32Error, Result};
pub use fs::fat32::{Node, Volume};
pub use fs::{open_image, open_volume, OpenOptions};
