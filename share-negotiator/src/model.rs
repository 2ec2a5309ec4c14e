//! Core data types shared by every negotiation stage.

use crate::manifest::FileManifest;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One resource root offered by the peer. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResourceRecord {
    pub id: String,
    pub name: String,
    pub remote_manifest: FileManifest,
}

impl ResourceRecord {
    pub fn new(id: impl Into<String>, name: impl Into<String>, remote_manifest: FileManifest) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            remote_manifest,
        }
    }
}

/// How the user wants a root represented locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LocalRepresentation {
    /// Create a fresh container with this workspace-relative name.
    NewContainer { name: String },
    /// Reuse the content of an existing directory.
    ExistingContainer { name: String },
}

impl LocalRepresentation {
    pub fn name(&self) -> &str {
        match self {
            Self::NewContainer { name } | Self::ExistingContainer { name } => name,
        }
    }
}

/// Caller-supplied choice for one resource root.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RootSelection {
    pub resource_id: String,
    pub representation: LocalRepresentation,
}

impl RootSelection {
    pub fn new_container(resource_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            representation: LocalRepresentation::NewContainer { name: name.into() },
        }
    }

    pub fn existing(resource_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            representation: LocalRepresentation::ExistingContainer { name: name.into() },
        }
    }
}

/// A local directory that receives a resource root.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Container {
    /// Workspace-relative name, '/'-separated.
    pub name: String,
    /// Absolute location on disk.
    pub path: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerHandle {
    ToBeCreated(Container),
    Existing(Container),
}

impl ContainerHandle {
    pub fn container(&self) -> &Container {
        match self {
            Self::ToBeCreated(c) | Self::Existing(c) => c,
        }
    }

    pub fn name(&self) -> &str {
        &self.container().name
    }

    pub fn path(&self) -> &Path {
        &self.container().path
    }

    /// Only reused directories can lose local content.
    pub fn is_existing(&self) -> bool {
        matches!(self, Self::Existing(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappedRoot {
    pub resource_id: String,
    pub remote_name: String,
    pub container: ContainerHandle,
}

/// Resolved `resourceId -> container` assignment for one negotiation attempt,
/// in the order the peer offered the roots.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetMapping {
    roots: Vec<MappedRoot>,
}

impl TargetMapping {
    pub fn new(roots: Vec<MappedRoot>) -> Self {
        Self { roots }
    }

    pub fn roots(&self) -> &[MappedRoot] {
        &self.roots
    }

    pub fn get(&self, resource_id: &str) -> Option<&ContainerHandle> {
        self.roots
            .iter()
            .find(|r| r.resource_id == resource_id)
            .map(|r| &r.container)
    }

    pub fn container_names(&self) -> Vec<String> {
        self.roots.iter().map(|r| r.container.name().to_string()).collect()
    }

    /// True when `path` lies inside any target container.
    pub fn covers(&self, path: &Path) -> bool {
        self.roots.iter().any(|r| path.starts_with(r.container.path()))
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }
}

/// Terminal status of a negotiation attempt. Produced once, never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationOutcome {
    Ok,
    Cancelled,
    Error,
}

impl fmt::Display for NegotiationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "OK"),
            Self::Cancelled => write!(f, "CANCELLED"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelLocation {
    Local,
    Remote,
}

impl fmt::Display for CancelLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

/// A cancellation request and where it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSignal {
    pub location: CancelLocation,
    pub message: Option<String>,
}

impl CancelSignal {
    pub fn local(message: Option<String>) -> Self {
        Self {
            location: CancelLocation::Local,
            message,
        }
    }

    pub fn remote(message: Option<String>) -> Self {
        Self {
            location: CancelLocation::Remote,
            message,
        }
    }
}

/// Status returned by the transport's transfer primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferStatus {
    Ok,
    Cancelled,
    Error(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mapping() -> TargetMapping {
        TargetMapping::new(vec![
            MappedRoot {
                resource_id: "r1".to_string(),
                remote_name: "proj".to_string(),
                container: ContainerHandle::Existing(Container {
                    name: "proj_local".to_string(),
                    path: PathBuf::from("/ws/proj_local"),
                }),
            },
            MappedRoot {
                resource_id: "r2".to_string(),
                remote_name: "lib".to_string(),
                container: ContainerHandle::ToBeCreated(Container {
                    name: "lib".to_string(),
                    path: PathBuf::from("/ws/lib"),
                }),
            },
        ])
    }

    #[test]
    fn test_mapping_lookup_and_coverage() {
        let mapping = mapping();
        assert_eq!(mapping.len(), 2);
        assert!(mapping.get("r1").unwrap().is_existing());
        assert!(!mapping.get("r2").unwrap().is_existing());
        assert!(mapping.get("r3").is_none());

        assert!(mapping.covers(Path::new("/ws/proj_local/src/main.rs")));
        assert!(!mapping.covers(Path::new("/ws/proj_local_other/a.txt")));
        assert_eq!(mapping.container_names(), vec!["proj_local", "lib"]);
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&NegotiationOutcome::Cancelled).unwrap();
        assert_eq!(json, "\"CANCELLED\"");
        assert_eq!(NegotiationOutcome::Ok.to_string(), "OK");
    }
}
