//! Path helpers
//!
//! Paths are slash separated and always relative to the partition root.
//! Leading and trailing slashes are ignored, so `"/a/b/"`, `"a/b"` and
//! `"/a/b"` all name the same object and `""` or `"/"` names the root.
use crate::config::MAX_PATH_LEN;
use crate::error::{DfsError, DfsResult};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Path<'a> {
    path: &'a str,
}

impl<'a> Path<'a> {
    /// Check and normalize `path`
    pub fn new(path: &'a str) -> DfsResult<Self> {
        if path.len() > MAX_PATH_LEN {
            return Err(DfsError::InvalidPath("path too long"));
        }
        let path = path.trim_matches('/');
        if !path.is_empty() && path.split('/').any(str::is_empty) {
            return Err(DfsError::InvalidPath("empty path segment"));
        }
        Ok(Self { path })
    }

    /// Does the path name the root directory
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    pub fn as_str(&self) -> &'a str {
        self.path
    }

    /// Segments from the root down, empty for the root itself
    pub fn segments(&self) -> impl Iterator<Item = &'a str> {
        self.path.split('/').filter(|seg| !seg.is_empty())
    }

    /// Path of the containing directory, the root for top-level names
    pub fn parent(&self) -> Path<'a> {
        match self.path.rfind('/') {
            Some(pos) => Path {
                path: &self.path[..pos],
            },
            None => Path { path: "" },
        }
    }

    /// Last segment, empty for the root
    pub fn name(&self) -> &'a str {
        match self.path.rfind('/') {
            Some(pos) => &self.path[pos + 1..],
            None => self.path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize() {
        assert_eq!(Path::new("/a/b/").unwrap().as_str(), "a/b");
        assert_eq!(Path::new("a/b").unwrap(), Path::new("/a/b").unwrap());
        assert!(Path::new("").unwrap().is_root());
        assert!(Path::new("///").unwrap().is_root());
        assert!(matches!(Path::new("a//b"), Err(DfsError::InvalidPath(_))));
        let long = "x".repeat(MAX_PATH_LEN + 1);
        assert!(matches!(Path::new(&long), Err(DfsError::InvalidPath(_))));
    }

    #[test]
    fn split() {
        let path = Path::new("/usr/share/doc").unwrap();
        assert_eq!(path.segments().collect::<Vec<_>>(), ["usr", "share", "doc"]);
        assert_eq!(path.name(), "doc");
        assert_eq!(path.parent().as_str(), "usr/share");
        assert_eq!(path.parent().parent().as_str(), "usr");
        assert!(path.parent().parent().parent().is_root());

        let root = Path::new("/").unwrap();
        assert_eq!(root.segments().count(), 0);
        assert_eq!(root.name(), "");
        assert!(root.parent().is_root());
    }
}
