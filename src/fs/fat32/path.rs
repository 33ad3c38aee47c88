use std::io::{Read, Seek};

use super::node::Node;
use crate::error::{Fat32Error, Result};

pub const PATH_SEPARATOR: char = '/';

impl<'v, R: Read + Seek> Node<'v, R> {
    /// Resolve a `/`-separated path relative to this node.
    ///
    /// Empty components are ignored, so leading, trailing and repeated
    /// separators are harmless. Names are compared exactly, without case
    /// folding. `.` and `..` are rejected.
    pub fn resolve(&self, path: &str) -> Result<Node<'v, R>> {
        let mut current = self.clone();
        let mut walked = String::new();

        for component in path.split(PATH_SEPARATOR).filter(|c| !c.is_empty()) {
            if component == "." || component == ".." {
                return Err(Fat32Error::UnsupportedComponent(component.to_string()));
            }
            if !current.is_directory()? {
                return Err(Fat32Error::NotADirectory(display_path(&walked)));
            }

            walked.push(PATH_SEPARATOR);
            walked.push_str(component);

            current = current
                .children()?
                .into_iter()
                .find(|child| child.name() == component)
                .ok_or_else(|| Fat32Error::NotFound(walked.clone()))?;
        }

        Ok(current)
    }
}

fn display_path(walked: &str) -> String {
    if walked.is_empty() {
        PATH_SEPARATOR.to_string()
    } else {
        walked.to_string()
    }
}
