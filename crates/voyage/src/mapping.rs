//! Assignment of source projects and resources to destination tenants.
//!
//! Projects are grouped by the owner segment of their source-control binding
//! (`github:acme` for `acme/webapp` on GitHub). Each group is assigned to the
//! first tenant whose key occurs in the group key; anything left over goes to
//! the first configured tenant. The result is always a partition of the input
//! projects.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;
use thiserror::Error;

use crate::model::{Binding, ExtractionSnapshot, ProjectInfo, TenantConfig};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("no destination organizations configured")]
    NoTenants,
}

/// Everything one tenant receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrgAssignment {
    pub org: TenantConfig,
    /// Source project keys, in input order.
    pub projects: Vec<String>,
    /// Binding group keys whose projects landed here.
    pub binding_groups: Vec<String>,
    pub quality_gates: Vec<String>,
    /// `(name, language)` pairs.
    pub quality_profiles: Vec<(String, String)>,
    /// Portfolio keys.
    pub portfolios: Vec<String>,
}

impl OrgAssignment {
    fn empty(org: TenantConfig) -> Self {
        Self {
            org,
            projects: Vec::new(),
            binding_groups: Vec::new(),
            quality_gates: Vec::new(),
            quality_profiles: Vec::new(),
            portfolios: Vec::new(),
        }
    }

    pub fn has_project(&self, key: &str) -> bool {
        self.projects.iter().any(|p| p == key)
    }
}

/// Group key of a binding: `platform:owner` for `owner/repo` identifiers,
/// `platform:identifier` otherwise. The platform tag is lowercased.
pub fn binding_group_key(binding: &Binding) -> String {
    let owner = binding
        .repository
        .split_once('/')
        .map_or(binding.repository.as_str(), |(owner, _)| owner);
    format!("{}:{}", binding.platform.to_lowercase(), owner)
}

fn matching_tenant(group_key: &str, tenants: &[TenantConfig]) -> Option<usize> {
    let haystack = group_key.to_lowercase();
    tenants
        .iter()
        .position(|t| !t.key.is_empty() && haystack.contains(&t.key.to_lowercase()))
}

/// Partition projects across tenants by binding group.
///
/// Only projects are assigned here; call [`assign_resources`] for gates,
/// profiles and portfolios.
pub fn map_projects_to_tenants(
    projects: &[ProjectInfo],
    bindings: &BTreeMap<String, Binding>,
    tenants: &[TenantConfig],
) -> Result<Vec<OrgAssignment>, MappingError> {
    if tenants.is_empty() {
        return Err(MappingError::NoTenants);
    }

    let mut assignments: Vec<OrgAssignment> =
        tenants.iter().cloned().map(OrgAssignment::empty).collect();

    if tenants.len() == 1 {
        let only = &mut assignments[0];
        only.projects = projects.iter().map(|p| p.key.clone()).collect();
        only.binding_groups = projects
            .iter()
            .filter_map(|p| bindings.get(&p.key).map(binding_group_key))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        return Ok(assignments);
    }

    // Tenant index per binding group, decided once per group.
    let mut group_tenant: BTreeMap<String, usize> = BTreeMap::new();
    for project in projects {
        if let Some(binding) = bindings.get(&project.key) {
            let group = binding_group_key(binding);
            group_tenant.entry(group).or_insert_with_key(|group| {
                matching_tenant(group, tenants).unwrap_or_else(|| {
                    tracing::debug!(
                        group = %group,
                        fallback = %tenants[0].key,
                        "No organization matches binding group, using first organization"
                    );
                    0
                })
            });
        }
    }
    for (group, &idx) in &group_tenant {
        assignments[idx].binding_groups.push(group.clone());
    }

    for project in projects {
        let idx = match bindings.get(&project.key) {
            Some(binding) => group_tenant
                .get(&binding_group_key(binding))
                .copied()
                .unwrap_or(0),
            None => {
                tracing::debug!(
                    project = %project.key,
                    fallback = %tenants[0].key,
                    "Unbound project assigned to first organization"
                );
                0
            }
        };
        assignments[idx].projects.push(project.key.clone());
    }

    Ok(assignments)
}

/// Second pass: organization-level resources.
///
/// Gates and profiles go to every tenant. A portfolio goes to each tenant
/// holding at least one of its member projects. Existing resource lists are
/// replaced.
pub fn assign_resources(assignments: &mut [OrgAssignment], snapshot: &ExtractionSnapshot) {
    let gates: Vec<String> = snapshot.quality_gates.iter().map(|g| g.name.clone()).collect();
    let profiles: Vec<(String, String)> = snapshot
        .quality_profiles
        .iter()
        .map(|p| p.identity())
        .collect();

    for assignment in assignments.iter_mut() {
        assignment.quality_gates = gates.clone();
        assignment.quality_profiles = profiles.clone();
        assignment.portfolios = snapshot
            .portfolios
            .iter()
            .filter(|portfolio| portfolio.projects.iter().any(|p| assignment.has_project(p)))
            .map(|portfolio| portfolio.key.clone())
            .collect();
    }
}

/// Full mapping: partition projects, then assign resources.
pub fn build_assignments(
    snapshot: &ExtractionSnapshot,
    tenants: &[TenantConfig],
) -> Result<Vec<OrgAssignment>, MappingError> {
    let mut assignments = map_projects_to_tenants(&snapshot.projects, &snapshot.bindings, tenants)?;
    assign_resources(&mut assignments, snapshot);
    Ok(assignments)
}
