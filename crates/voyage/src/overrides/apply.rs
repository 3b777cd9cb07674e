use std::collections::{BTreeMap, BTreeSet};

use crate::mapping::{OrgAssignment, assign_resources};
use crate::model::{ExtractionSnapshot, PermissionTemplate, Portfolio, TemplatePermission};
use crate::tabular::{OverrideFile, Table};

use super::columns::*;

/// Result of applying override tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OverrideOutcome {
    pub snapshot: ExtractionSnapshot,
    pub assignments: Vec<OrgAssignment>,
    /// Explicit branch include-sets, only for projects where some branches
    /// were excluded. Projects absent from the map are unconstrained.
    pub branch_includes: BTreeMap<String, BTreeSet<String>>,
}

impl OverrideOutcome {
    /// Whether `branch` of `project` should be transferred.
    pub fn includes_branch(&self, project: &str, branch: &str) -> bool {
        self.branch_includes
            .get(project)
            .is_none_or(|branches| branches.contains(branch))
    }
}

fn table<'a>(tables: &'a BTreeMap<String, Table>, file: OverrideFile) -> Option<&'a Table> {
    tables.get(file.file_name())
}

/// Apply operator-edited tables to a snapshot and its assignments.
///
/// Inputs are never mutated; the outcome owns fresh copies. Only tables that
/// are present have an effect, and entities a table does not mention are kept
/// as they are. An `Organization` cell in `projects.csv` moves the project to
/// that organization. Organization-level resources are re-assigned afterwards,
/// so removed or moved projects take their portfolios with them.
pub fn apply_csv_overrides(
    tables: &BTreeMap<String, Table>,
    snapshot: &ExtractionSnapshot,
    assignments: &[OrgAssignment],
) -> OverrideOutcome {
    let mut snapshot = snapshot.clone();
    let mut assignments = assignments.to_vec();
    let mut branch_includes = BTreeMap::new();

    if let Some(projects) = table(tables, OverrideFile::Projects) {
        let removed = project_decisions(projects, &mut branch_includes);
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "Projects excluded by mappings");
        }
        snapshot.projects.retain(|p| !removed.contains(&p.key));
        snapshot.bindings.retain(|key, _| !removed.contains(key));
        for assignment in &mut assignments {
            assignment.projects.retain(|p| !removed.contains(p));
        }
        branch_includes.retain(|key, _| !removed.contains(key));
        move_projects(&mut assignments, organization_edits(projects));
    }

    if let Some(gates) = table(tables, OverrideFile::QualityGates) {
        let excluded = excluded_values(gates, &[GATE_NAME]);
        snapshot
            .quality_gates
            .retain(|g| !excluded.contains(&vec![g.name.clone()]));
    }

    if let Some(profiles) = table(tables, OverrideFile::QualityProfiles) {
        let excluded = excluded_values(profiles, &[PROFILE_NAME, LANGUAGE]);
        snapshot
            .quality_profiles
            .retain(|p| !excluded.contains(&vec![p.name.clone(), p.language.clone()]));
    }

    if let Some(groups) = table(tables, OverrideFile::Groups) {
        let excluded = excluded_values(groups, &[GROUP_NAME]);
        snapshot
            .groups
            .retain(|g| !excluded.contains(&vec![g.name.clone()]));
    }

    if let Some(global) = table(tables, OverrideFile::GlobalPermissions) {
        let excluded = excluded_values(global, &[GROUP_NAME, PERMISSION]);
        snapshot.global_permissions.retain_mut(|grant| {
            let before = grant.permissions.len();
            grant
                .permissions
                .retain(|p| !excluded.contains(&vec![grant.group.clone(), p.clone()]));
            before == grant.permissions.len() || !grant.permissions.is_empty()
        });
    }

    if let Some(templates) = table(tables, OverrideFile::PermissionTemplates) {
        apply_templates(templates, &mut snapshot.permission_templates);
    }

    if let Some(portfolios) = table(tables, OverrideFile::Portfolios) {
        apply_portfolios(portfolios, &mut snapshot.portfolios);
    }

    assign_resources(&mut assignments, &snapshot);

    OverrideOutcome {
        snapshot,
        assignments,
        branch_includes,
    }
}

/// Decide project and branch inclusion. Returns the removed project keys and
/// records include-sets for partially excluded projects.
fn project_decisions(
    table: &Table,
    branch_includes: &mut BTreeMap<String, BTreeSet<String>>,
) -> BTreeSet<String> {
    let mut removed = BTreeSet::new();

    if !table.has_column(BRANCH) {
        for record in table.records() {
            if let Some(key) = record.value(PROJECT_KEY)
                && !record.is_included()
            {
                removed.insert(key.to_string());
            }
        }
        return removed;
    }

    // key -> (included branches, excluded branch count)
    let mut per_project: BTreeMap<&str, (BTreeSet<String>, usize)> = BTreeMap::new();
    for record in table.records() {
        let Some(key) = record.value(PROJECT_KEY) else {
            continue;
        };
        match record.value(BRANCH) {
            Some(branch) => {
                let entry = per_project.entry(key).or_default();
                if record.is_included() {
                    entry.0.insert(branch.to_string());
                } else {
                    entry.1 += 1;
                }
            }
            None => {
                if !record.is_included() {
                    removed.insert(key.to_string());
                }
            }
        }
    }

    for (key, (included, excluded)) in per_project {
        if included.is_empty() {
            removed.insert(key.to_string());
        } else if excluded > 0 {
            branch_includes.insert(key.to_string(), included);
        }
    }

    removed
}

/// Target organization per project, from the first included row naming one.
fn organization_edits(table: &Table) -> BTreeMap<String, String> {
    let mut edits = BTreeMap::new();
    if !table.has_column(ORGANIZATION) {
        return edits;
    }
    for record in table.records().filter(|r| r.is_included()) {
        if let (Some(key), Some(org)) = (record.value(PROJECT_KEY), record.value(ORGANIZATION)) {
            edits.entry(key.to_string()).or_insert_with(|| org.to_string());
        }
    }
    edits
}

/// Move projects to the organization their row names. Unknown organization
/// keys leave the project where the mapper put it.
fn move_projects(assignments: &mut [OrgAssignment], edits: BTreeMap<String, String>) {
    for (project, org) in edits {
        let Some(target) = assignments.iter().position(|a| a.org.key == org) else {
            tracing::warn!(
                project = %project,
                organization = %org,
                "Unknown organization in mappings, assignment kept"
            );
            continue;
        };
        let Some(current) = assignments.iter().position(|a| a.has_project(&project)) else {
            continue;
        };
        if current == target {
            continue;
        }
        assignments[current].projects.retain(|p| p != &project);
        tracing::info!(
            project = %project,
            from = %assignments[current].org.key,
            to = %org,
            "Project moved by mappings"
        );
        assignments[target].projects.push(project);
    }
}

/// Identity tuples of excluded rows. Rows missing any identity cell are ignored.
fn excluded_values(table: &Table, identity: &[&str]) -> BTreeSet<Vec<String>> {
    table
        .records()
        .filter(|record| !record.is_included())
        .filter_map(|record| {
            identity
                .iter()
                .map(|column| record.value(column).map(String::from))
                .collect::<Option<Vec<_>>>()
        })
        .collect()
}

fn apply_templates(table: &Table, templates: &mut Vec<PermissionTemplate>) {
    let mut excluded = BTreeSet::new();
    let mut with_details = BTreeSet::new();
    let mut details: BTreeMap<String, Vec<(String, Option<String>)>> = BTreeMap::new();

    for record in table.records() {
        let Some(name) = record.value(TEMPLATE_NAME) else {
            continue;
        };
        match record.value(PERMISSION) {
            None => {
                if !record.is_included() {
                    excluded.insert(name.to_string());
                }
            }
            Some(permission) => {
                with_details.insert(name.to_string());
                if record.is_included() {
                    details.entry(name.to_string()).or_default().push((
                        permission.to_string(),
                        record.value(GROUP).map(String::from),
                    ));
                }
            }
        }
    }

    // Entities whose detail rows are all excluded go away with them.
    templates.retain(|t| {
        !excluded.contains(&t.name)
            && (!with_details.contains(&t.name) || details.contains_key(&t.name))
    });
    for template in templates.iter_mut() {
        if !with_details.contains(&template.name) {
            continue;
        }
        let mut permissions: Vec<TemplatePermission> = Vec::new();
        for (key, group) in details.remove(&template.name).unwrap_or_default() {
            let idx = match permissions.iter().position(|p| p.permission_key == key) {
                Some(idx) => idx,
                None => {
                    permissions.push(TemplatePermission {
                        permission_key: key,
                        groups: Vec::new(),
                    });
                    permissions.len() - 1
                }
            };
            if let Some(group) = group
                && !permissions[idx].groups.contains(&group)
            {
                permissions[idx].groups.push(group);
            }
        }
        template.permissions = permissions;
    }
}

fn apply_portfolios(table: &Table, portfolios: &mut Vec<Portfolio>) {
    let mut excluded = BTreeSet::new();
    let mut with_details = BTreeSet::new();
    let mut members: BTreeMap<String, Vec<String>> = BTreeMap::new();

    for record in table.records() {
        let Some(key) = record.value(PORTFOLIO_KEY) else {
            continue;
        };
        match record.value(PROJECT_KEY) {
            None => {
                if !record.is_included() {
                    excluded.insert(key.to_string());
                }
            }
            Some(project) => {
                with_details.insert(key.to_string());
                if record.is_included() {
                    let list = members.entry(key.to_string()).or_default();
                    if !list.iter().any(|p| p == project) {
                        list.push(project.to_string());
                    }
                }
            }
        }
    }

    portfolios.retain(|p| {
        !excluded.contains(&p.key)
            && (!with_details.contains(&p.key) || members.contains_key(&p.key))
    });
    for portfolio in portfolios.iter_mut() {
        if with_details.contains(&portfolio.key) {
            portfolio.projects = members.remove(&portfolio.key).unwrap_or_default();
        }
    }
}
