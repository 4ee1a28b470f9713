use std::path::PathBuf;

use crate::backing::StoreKind;
use crate::types::ObjectId;

pub type Result<T> = std::result::Result<T, StoreError>;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("unsupported backing store type: {0}")]
    UnsupportedType(String),
    #[error("{path} is not a {kind} repository")]
    NotARepository { path: PathBuf, kind: StoreKind },
    #[error("object {0} not found")]
    NotFound(ObjectId),
    #[error("object {0} is not a {1}")]
    WrongKind(ObjectId, &'static str),
    #[error("malformed object id: {0}")]
    MalformedId(String),
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to decode cached tree {id}: {source}")]
    Decode {
        id: ObjectId,
        #[source]
        source: serde_json::Error,
    },
    #[error("object store has been shut down")]
    Closed,
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Unsupported store types are configuration mistakes, not runtime faults.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::UnsupportedType(_) | Self::NotARepository { .. })
    }
}
