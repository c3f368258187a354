use serde::{Deserialize, Serialize};
use std::fmt;

/// Authenticated caller identity, as handed over by the request layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryId(pub u64);

/// Globally unique file identifier.
///
/// Generated at upload time; stored bare in the placements table and used bare as the
/// download key on nodes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(pub String);

impl FileId {
    /// Generates a new random UUID v4-based FileId.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for FileId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for DirectoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One stored file.
///
/// Written before any byte is transferred, so an interrupted upload still leaves a
/// record behind. Only rename/move change it afterwards.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileDescriptor {
    pub id: FileId,
    pub name: String,
    pub size_bytes: u64,
    pub owner_id: UserId,
    pub directory_id: DirectoryId,
}

impl FileDescriptor {
    /// Key used on storage nodes for store and delete calls: `"{ownerId}-{uuid}"`.
    pub fn node_key(&self) -> String {
        format!("{}-{}", self.owner_id, self.id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DirectoryRecord {
    pub id: DirectoryId,
    pub name: String,
    pub owner_id: UserId,
    /// `None` for top-level directories.
    pub parent_id: Option<DirectoryId>,
}

/// Authoritative disk usage of one node, as known to the repository.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct NodeUsage {
    pub capacity_bytes: u64,
    pub space_used_bytes: u64,
    pub file_count: u64,
}

/// Splits a slash separated directory path into its non-empty components.
pub fn path_components(path: &str) -> Vec<&str> {
    path.split('/')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect()
}
