//! Maps each offered resource root onto a local container.

use crate::model::{
    Container, ContainerHandle, LocalRepresentation, MappedRoot, ResourceRecord, RootSelection,
    TargetMapping,
};
use crate::utils::errors::{NegotiationError, Result};
use crate::workspace::{ContainerState, Workspace};
use std::collections::{BTreeMap, HashMap, HashSet};
use tracing::debug;

pub struct TargetResolver<'a> {
    workspace: &'a dyn Workspace,
}

impl<'a> TargetResolver<'a> {
    pub fn new(workspace: &'a dyn Workspace) -> Self {
        Self { workspace }
    }

    /// Turn caller selections into a [`TargetMapping`].
    ///
    /// Every resource needs exactly one selection. A selection whose on-disk
    /// state contradicts its option is a validation failure, never silently
    /// reinterpreted.
    pub fn resolve(
        &self,
        resources: &[ResourceRecord],
        selections: &[RootSelection],
    ) -> Result<TargetMapping> {
        let known: HashSet<&str> = resources.iter().map(|r| r.id.as_str()).collect();
        let mut by_id: HashMap<&str, &LocalRepresentation> = HashMap::new();

        for selection in selections {
            if !known.contains(selection.resource_id.as_str()) {
                return Err(NegotiationError::Validation(format!(
                    "selection for unknown resource '{}'",
                    selection.resource_id
                )));
            }
            if by_id
                .insert(selection.resource_id.as_str(), &selection.representation)
                .is_some()
            {
                return Err(NegotiationError::Validation(format!(
                    "more than one selection for resource '{}'",
                    selection.resource_id
                )));
            }
        }

        let mut roots = Vec::with_capacity(resources.len());
        for resource in resources {
            let representation = by_id.get(resource.id.as_str()).ok_or_else(|| {
                NegotiationError::Validation(format!(
                    "no local target chosen for '{}'",
                    resource.name
                ))
            })?;

            let container = self.resolve_one(representation)?;
            debug!(
                "Resolved '{}' ({}) to {:?}",
                resource.name, resource.id, container
            );
            roots.push(MappedRoot {
                resource_id: resource.id.clone(),
                remote_name: resource.name.clone(),
                container,
            });
        }

        check_disjoint(&roots)?;
        Ok(TargetMapping::new(roots))
    }

    fn resolve_one(&self, representation: &LocalRepresentation) -> Result<ContainerHandle> {
        let name = representation.name();
        let path = self.workspace.locate(name)?;
        let state = self.workspace.container_state(&path)?;
        let container = Container {
            name: name.to_string(),
            path,
        };

        match (representation, state) {
            (LocalRepresentation::NewContainer { .. }, ContainerState::Missing) => {
                Ok(ContainerHandle::ToBeCreated(container))
            }
            (LocalRepresentation::NewContainer { .. }, _) => Err(NegotiationError::Validation(
                format!("'{}' already exists and cannot be created", name),
            )),
            (LocalRepresentation::ExistingContainer { .. }, ContainerState::Directory) => {
                Ok(ContainerHandle::Existing(container))
            }
            (LocalRepresentation::ExistingContainer { .. }, ContainerState::Missing) => Err(
                NegotiationError::Validation(format!("'{}' does not exist", name)),
            ),
            (LocalRepresentation::ExistingContainer { .. }, ContainerState::Other) => Err(
                NegotiationError::Validation(format!("'{}' is not a directory", name)),
            ),
        }
    }

    /// Pre-populated selections: reuse the last container chosen for a remote
    /// name if it is still a directory, otherwise a new container named after
    /// the remote root, suffixed until the name is free.
    pub fn default_selections(
        &self,
        resources: &[ResourceRecord],
        history: &BTreeMap<String, String>,
    ) -> Vec<RootSelection> {
        let mut used: HashSet<String> = HashSet::new();
        let mut selections = Vec::with_capacity(resources.len());

        for resource in resources {
            if let Some(previous) = history.get(&resource.name) {
                if !used.contains(previous)
                    && self.state_of(previous) == Some(ContainerState::Directory)
                {
                    used.insert(previous.clone());
                    selections.push(RootSelection::existing(&resource.id, previous));
                    continue;
                }
            }

            let mut candidate = resource.name.clone();
            let mut suffix = 1;
            while used.contains(&candidate)
                || matches!(self.state_of(&candidate), Some(s) if s != ContainerState::Missing)
            {
                candidate = format!("{}_{}", resource.name, suffix);
                suffix += 1;
            }

            used.insert(candidate.clone());
            selections.push(RootSelection::new_container(&resource.id, candidate));
        }

        selections
    }

    /// None when the name is unusable or its state cannot be read.
    fn state_of(&self, name: &str) -> Option<ContainerState> {
        let path = self.workspace.locate(name).ok()?;
        self.workspace.container_state(&path).ok()
    }
}

/// No two roots may target the same or nested containers.
fn check_disjoint(roots: &[MappedRoot]) -> Result<()> {
    for (i, a) in roots.iter().enumerate() {
        for b in &roots[i + 1..] {
            if a.container.path().starts_with(b.container.path())
                || b.container.path().starts_with(a.container.path())
            {
                return Err(NegotiationError::Validation(format!(
                    "'{}' and '{}' overlap",
                    a.container.name(),
                    b.container.name()
                )));
            }
        }
    }
    Ok(())
}
