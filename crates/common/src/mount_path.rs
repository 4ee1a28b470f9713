//! Normalized absolute mount paths.
//!
//! A [`MountPath`] is the key of every per-mount structure in the daemon, so
//! two spellings of the same directory (`/mnt/repo/` and `/mnt/./repo`) must
//! compare equal.

use std::fmt;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MountPathError {
    #[error("invalid mount point \"{0}\": must be an absolute path")]
    NotAbsolute(String),
    #[error("invalid mount point \"{0}\": parent directory components are not allowed")]
    ParentComponent(String),
    #[error("invalid mount point: path is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MountPath(PathBuf);

impl MountPath {
    pub fn new(path: impl AsRef<Path>) -> Result<Self, MountPathError> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(MountPathError::Empty);
        }
        if !path.is_absolute() {
            return Err(MountPathError::NotAbsolute(path.display().to_string()));
        }

        let mut normalized = PathBuf::new();
        for component in path.components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    return Err(MountPathError::ParentComponent(path.display().to_string()))
                }
                other => normalized.push(other.as_os_str()),
            }
        }

        Ok(Self(normalized))
    }

    pub fn as_path(&self) -> &Path {
        &self.0
    }

    pub fn into_path_buf(self) -> PathBuf {
        self.0
    }
}

impl AsRef<Path> for MountPath {
    fn as_ref(&self) -> &Path {
        &self.0
    }
}

impl fmt::Display for MountPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

impl std::str::FromStr for MountPath {
    type Err = MountPathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl Serialize for MountPath {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MountPath {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trailing_slash_and_dot_are_normalized() {
        let a = MountPath::new("/mnt/repo/").unwrap();
        let b = MountPath::new("/mnt/./repo").unwrap();
        let c = MountPath::new("/mnt//repo").unwrap();
        assert_eq!(a, b);
        assert_eq!(a, c);
        assert_eq!(a.to_string(), "/mnt/repo");
    }

    #[test]
    fn test_relative_path_rejected() {
        assert_eq!(
            MountPath::new("mnt/repo"),
            Err(MountPathError::NotAbsolute("mnt/repo".to_string()))
        );
        assert_eq!(MountPath::new(""), Err(MountPathError::Empty));
    }

    #[test]
    fn test_parent_component_rejected() {
        assert!(matches!(
            MountPath::new("/mnt/../etc"),
            Err(MountPathError::ParentComponent(_))
        ));
    }

    #[test]
    fn test_root_is_valid() {
        assert_eq!(MountPath::new("/").unwrap().to_string(), "/");
    }

    #[test]
    fn test_serde_as_string() {
        let path = MountPath::new("/m1").unwrap();
        let json = serde_json::to_string(&path).unwrap();
        assert_eq!(json, "\"/m1\"");
        let back: MountPath = serde_json::from_str(&json).unwrap();
        assert_eq!(back, path);
        assert!(serde_json::from_str::<MountPath>("\"relative\"").is_err());
    }
}
