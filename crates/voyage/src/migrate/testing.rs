//! In-memory destination for unit tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::model::{Group, PermissionTemplate, Portfolio, QualityGate, QualityProfile};
use crate::remote::{DestinationClient, Page, RemoteError, RemoteFinding, Result};

#[derive(Default)]
struct State {
    issues: HashMap<String, Vec<RemoteFinding>>,
    hotspots: HashMap<String, Vec<RemoteFinding>>,
    projects: BTreeSet<String>,
    failing: BTreeSet<String>,
    calls: Vec<(String, String)>,
}

/// Records every call as `(operation, args)`; `args` joins the call's string
/// arguments with `:`. Operations listed with [`FakeDestination::fail_on`]
/// return an API error, matched either by name or by `name:first_arg`.
#[derive(Clone, Default)]
pub(crate) struct FakeDestination {
    state: Arc<Mutex<State>>,
}

impl FakeDestination {
    pub(crate) fn set_issues(&self, branch: &str, findings: Vec<RemoteFinding>) {
        self.state.lock().unwrap().issues.insert(branch.to_string(), findings);
    }

    pub(crate) fn set_hotspots(&self, branch: &str, findings: Vec<RemoteFinding>) {
        self.state.lock().unwrap().hotspots.insert(branch.to_string(), findings);
    }

    pub(crate) fn fail_on(&self, pattern: &str) {
        self.state.lock().unwrap().failing.insert(pattern.to_string());
    }

    /// Argument strings of every call to `operation`, in call order.
    pub(crate) fn calls_to(&self, operation: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|(op, _)| op == operation)
            .map(|(_, args)| args.clone())
            .collect()
    }

    fn record(&self, operation: &str, args: &[&str]) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push((operation.to_string(), args.join(":")));
        let keyed = args.first().map(|first| format!("{operation}:{first}"));
        if state.failing.contains(operation)
            || keyed.is_some_and(|k| state.failing.contains(&k))
        {
            return Err(RemoteError::Api {
                status: 500,
                message: format!("{operation} failed"),
            });
        }
        Ok(())
    }

    fn page(
        findings: Option<&Vec<RemoteFinding>>,
        page: u32,
        page_size: u32,
    ) -> Page<RemoteFinding> {
        let all = findings.cloned().unwrap_or_default();
        let start = ((page.saturating_sub(1)) * page_size) as usize;
        let items = all.iter().skip(start).take(page_size as usize).cloned().collect();
        Page::new(items, Some(all.len() as u64))
    }
}

#[async_trait]
impl DestinationClient for FakeDestination {
    async fn test_connection(&self) -> Result<()> {
        self.record("test_connection", &[])
    }

    async fn project_exists(&self, project_key: &str) -> Result<bool> {
        self.record("project_exists", &[project_key])?;
        Ok(self.state.lock().unwrap().projects.contains(project_key))
    }

    async fn create_project(
        &self,
        organization: &str,
        project_key: &str,
        _name: &str,
        main_branch: &str,
    ) -> Result<()> {
        self.record("create_project", &[project_key, organization, main_branch])?;
        self.state.lock().unwrap().projects.insert(project_key.to_string());
        Ok(())
    }

    async fn search_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>> {
        self.record("search_issues", &[project_key, branch])?;
        Ok(Self::page(self.state.lock().unwrap().issues.get(branch), page, page_size))
    }

    async fn transition_issue(&self, issue_key: &str, transition: &str) -> Result<()> {
        self.record("transition_issue", &[issue_key, transition])
    }

    async fn add_issue_comment(&self, issue_key: &str, text: &str) -> Result<()> {
        self.record("add_issue_comment", &[issue_key, text])
    }

    async fn search_hotspots(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>> {
        self.record("search_hotspots", &[project_key, branch])?;
        Ok(Self::page(self.state.lock().unwrap().hotspots.get(branch), page, page_size))
    }

    async fn change_hotspot_status(
        &self,
        hotspot_key: &str,
        status: &str,
        resolution: Option<&str>,
    ) -> Result<()> {
        self.record(
            "change_hotspot_status",
            &[hotspot_key, status, resolution.unwrap_or_default()],
        )
    }

    async fn add_hotspot_comment(&self, hotspot_key: &str, text: &str) -> Result<()> {
        self.record("add_hotspot_comment", &[hotspot_key, text])
    }

    async fn restore_profile(&self, organization: &str, profile: &QualityProfile) -> Result<()> {
        self.record("restore_profile", &[profile.name.as_str(), organization])
    }

    async fn create_quality_gate(&self, organization: &str, gate: &QualityGate) -> Result<()> {
        self.record("create_quality_gate", &[gate.name.as_str(), organization])
    }

    async fn create_group(&self, organization: &str, group: &Group) -> Result<()> {
        self.record("create_group", &[group.name.as_str(), organization])
    }

    async fn add_group_permission(
        &self,
        organization: &str,
        group: &str,
        permission: &str,
    ) -> Result<()> {
        self.record("add_group_permission", &[group, permission, organization])
    }

    async fn create_permission_template(
        &self,
        organization: &str,
        template: &PermissionTemplate,
    ) -> Result<String> {
        self.record("create_permission_template", &[template.name.as_str(), organization])?;
        Ok(format!("tpl-{}", template.name))
    }

    async fn add_template_group_permission(
        &self,
        template_id: &str,
        group: &str,
        permission: &str,
    ) -> Result<()> {
        self.record("add_template_group_permission", &[template_id, group, permission])
    }

    async fn create_portfolio(&self, organization: &str, portfolio: &Portfolio) -> Result<()> {
        self.record("create_portfolio", &[portfolio.key.as_str(), organization])
    }

    async fn add_portfolio_project(&self, portfolio_key: &str, project_key: &str) -> Result<()> {
        self.record("add_portfolio_project", &[portfolio_key, project_key])
    }
}
