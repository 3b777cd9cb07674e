use std::fs;
use std::path::{Path, PathBuf};

use crate::mapping::OrgAssignment;
use crate::model::ExtractionSnapshot;
use crate::tabular::{INCLUDE_COLUMN, OverrideFile, Table, TableError};

use super::columns::*;

const YES: &str = "yes";

fn yes_row<I, S>(cells: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    std::iter::once(YES.to_string())
        .chain(cells.into_iter().map(Into::into))
        .collect()
}

fn organization_of<'a>(assignments: &'a [OrgAssignment], project_key: &str) -> &'a str {
    assignments
        .iter()
        .find(|a| a.has_project(project_key))
        .map_or("", |a| a.org.key.as_str())
}

/// Build every override table for a snapshot, all rows included.
///
/// Applying the unedited result back with
/// [`apply_csv_overrides`](super::apply_csv_overrides) changes nothing.
pub fn build_tables(
    snapshot: &ExtractionSnapshot,
    assignments: &[OrgAssignment],
) -> Vec<(OverrideFile, Table)> {
    let mut projects = Table::new([
        INCLUDE_COLUMN,
        PROJECT_KEY,
        PROJECT_NAME,
        BRANCH,
        MAIN_BRANCH,
        ORGANIZATION,
    ]);
    for project in &snapshot.projects {
        let org = organization_of(assignments, &project.key);
        for branch in &project.branches {
            projects.push_row(yes_row([
                project.key.as_str(),
                project.name.as_str(),
                branch.name.as_str(),
                if branch.is_main { "yes" } else { "no" },
                org,
            ]));
        }
    }

    let mut gates = Table::new([INCLUDE_COLUMN, GATE_NAME]);
    for gate in &snapshot.quality_gates {
        gates.push_row(yes_row([gate.name.as_str()]));
    }

    let mut profiles = Table::new([INCLUDE_COLUMN, PROFILE_NAME, LANGUAGE]);
    for profile in &snapshot.quality_profiles {
        profiles.push_row(yes_row([profile.name.as_str(), profile.language.as_str()]));
    }

    let mut groups = Table::new([INCLUDE_COLUMN, GROUP_NAME, DESCRIPTION]);
    for group in &snapshot.groups {
        groups.push_row(yes_row([
            group.name.as_str(),
            group.description.as_deref().unwrap_or_default(),
        ]));
    }

    let mut global = Table::new([INCLUDE_COLUMN, GROUP_NAME, PERMISSION]);
    for grant in &snapshot.global_permissions {
        for permission in &grant.permissions {
            global.push_row(yes_row([grant.group.as_str(), permission.as_str()]));
        }
    }

    let mut templates = Table::new([
        INCLUDE_COLUMN,
        TEMPLATE_NAME,
        DESCRIPTION,
        PROJECT_KEY_PATTERN,
        PERMISSION,
        GROUP,
    ]);
    for template in &snapshot.permission_templates {
        templates.push_row(yes_row([
            template.name.as_str(),
            template.description.as_deref().unwrap_or_default(),
            template.project_key_pattern.as_deref().unwrap_or_default(),
            "",
            "",
        ]));
        for permission in &template.permissions {
            if permission.groups.is_empty() {
                templates.push_row(yes_row([
                    template.name.as_str(),
                    "",
                    "",
                    permission.permission_key.as_str(),
                    "",
                ]));
            }
            for group in &permission.groups {
                templates.push_row(yes_row([
                    template.name.as_str(),
                    "",
                    "",
                    permission.permission_key.as_str(),
                    group.as_str(),
                ]));
            }
        }
    }

    let mut portfolios = Table::new([INCLUDE_COLUMN, PORTFOLIO_KEY, PORTFOLIO_NAME, PROJECT_KEY]);
    for portfolio in &snapshot.portfolios {
        portfolios.push_row(yes_row([portfolio.key.as_str(), portfolio.name.as_str(), ""]));
        for member in &portfolio.projects {
            portfolios.push_row(yes_row([portfolio.key.as_str(), "", member.as_str()]));
        }
    }

    vec![
        (OverrideFile::Projects, projects),
        (OverrideFile::QualityGates, gates),
        (OverrideFile::QualityProfiles, profiles),
        (OverrideFile::Groups, groups),
        (OverrideFile::GlobalPermissions, global),
        (OverrideFile::PermissionTemplates, templates),
        (OverrideFile::Portfolios, portfolios),
    ]
}

/// Write the override tables into `dir`, creating it if needed.
///
/// Returns the written paths in [`OverrideFile::ALL`] order.
pub fn write_artifacts(
    dir: &Path,
    snapshot: &ExtractionSnapshot,
    assignments: &[OrgAssignment],
) -> Result<Vec<PathBuf>, TableError> {
    let io = |path: &Path, e: std::io::Error| TableError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    };

    fs::create_dir_all(dir).map_err(|e| io(dir, e))?;

    let mut written = Vec::new();
    for (file, table) in build_tables(snapshot, assignments) {
        let path = dir.join(file.file_name());
        fs::write(&path, table.to_csv()).map_err(|e| io(&path, e))?;
        tracing::debug!(file = %path.display(), rows = table.len(), "Wrote mappings file");
        written.push(path);
    }
    Ok(written)
}
