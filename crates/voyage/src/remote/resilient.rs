use std::sync::Arc;

use async_trait::async_trait;

use crate::model::{Group, PermissionTemplate, Portfolio, QualityGate, QualityProfile};

use super::errors::Result;
use super::pagination::Page;
use super::policy::RemoteCallPolicy;
use super::types::{DestinationClient, RemoteFinding};

/// A throttled, retrying wrapper around any [`DestinationClient`].
///
/// Writes go through the policy's write throttle; reads are paced by its read
/// limiter when one is configured. Both are retried on rate-limit responses.
/// Clones share the inner client and the policy state.
///
/// # Example
///
/// ```ignore
/// use voyage::remote::{CloudClient, RemoteCallPolicy, ResilientClient};
///
/// let client = CloudClient::new(transport, "https://cloud.example", token);
/// let client = ResilientClient::new(client, RemoteCallPolicy::default());
///
/// // Every call is now throttled and retried
/// client.create_group("acme", &group).await?;
/// ```
pub struct ResilientClient<C> {
    inner: Arc<C>,
    policy: RemoteCallPolicy,
}

impl<C> ResilientClient<C> {
    pub fn new(inner: C, policy: RemoteCallPolicy) -> Self {
        Self {
            inner: Arc::new(inner),
            policy,
        }
    }

    /// Get a reference to the inner client.
    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn policy(&self) -> &RemoteCallPolicy {
        &self.policy
    }
}

impl<C> Clone for ResilientClient<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            policy: self.policy.clone(),
        }
    }
}

#[async_trait]
impl<C: DestinationClient> DestinationClient for ResilientClient<C> {
    async fn test_connection(&self) -> Result<()> {
        self.policy
            .read("test_connection", || self.inner.test_connection())
            .await
    }

    async fn project_exists(&self, project_key: &str) -> Result<bool> {
        self.policy
            .read("project_exists", || self.inner.project_exists(project_key))
            .await
    }

    async fn create_project(
        &self,
        organization: &str,
        project_key: &str,
        name: &str,
        main_branch: &str,
    ) -> Result<()> {
        self.policy
            .write("create_project", || {
                self.inner
                    .create_project(organization, project_key, name, main_branch)
            })
            .await
    }

    async fn search_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>> {
        self.policy
            .read("search_issues", || {
                self.inner.search_issues(project_key, branch, page, page_size)
            })
            .await
    }

    async fn transition_issue(&self, issue_key: &str, transition: &str) -> Result<()> {
        self.policy
            .write("transition_issue", || {
                self.inner.transition_issue(issue_key, transition)
            })
            .await
    }

    async fn add_issue_comment(&self, issue_key: &str, text: &str) -> Result<()> {
        self.policy
            .write("add_issue_comment", || self.inner.add_issue_comment(issue_key, text))
            .await
    }

    async fn search_hotspots(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>> {
        self.policy
            .read("search_hotspots", || {
                self.inner.search_hotspots(project_key, branch, page, page_size)
            })
            .await
    }

    async fn change_hotspot_status(
        &self,
        hotspot_key: &str,
        status: &str,
        resolution: Option<&str>,
    ) -> Result<()> {
        self.policy
            .write("change_hotspot_status", || {
                self.inner.change_hotspot_status(hotspot_key, status, resolution)
            })
            .await
    }

    async fn add_hotspot_comment(&self, hotspot_key: &str, text: &str) -> Result<()> {
        self.policy
            .write("add_hotspot_comment", || {
                self.inner.add_hotspot_comment(hotspot_key, text)
            })
            .await
    }

    async fn restore_profile(&self, organization: &str, profile: &QualityProfile) -> Result<()> {
        self.policy
            .write("restore_profile", || self.inner.restore_profile(organization, profile))
            .await
    }

    async fn create_quality_gate(&self, organization: &str, gate: &QualityGate) -> Result<()> {
        self.policy
            .write("create_quality_gate", || {
                self.inner.create_quality_gate(organization, gate)
            })
            .await
    }

    async fn create_group(&self, organization: &str, group: &Group) -> Result<()> {
        self.policy
            .write("create_group", || self.inner.create_group(organization, group))
            .await
    }

    async fn add_group_permission(
        &self,
        organization: &str,
        group: &str,
        permission: &str,
    ) -> Result<()> {
        self.policy
            .write("add_group_permission", || {
                self.inner.add_group_permission(organization, group, permission)
            })
            .await
    }

    async fn create_permission_template(
        &self,
        organization: &str,
        template: &PermissionTemplate,
    ) -> Result<String> {
        self.policy
            .write("create_permission_template", || {
                self.inner.create_permission_template(organization, template)
            })
            .await
    }

    async fn add_template_group_permission(
        &self,
        template_id: &str,
        group: &str,
        permission: &str,
    ) -> Result<()> {
        self.policy
            .write("add_template_group_permission", || {
                self.inner
                    .add_template_group_permission(template_id, group, permission)
            })
            .await
    }

    async fn create_portfolio(&self, organization: &str, portfolio: &Portfolio) -> Result<()> {
        self.policy
            .write("create_portfolio", || {
                self.inner.create_portfolio(organization, portfolio)
            })
            .await
    }

    async fn add_portfolio_project(&self, portfolio_key: &str, project_key: &str) -> Result<()> {
        self.policy
            .write("add_portfolio_project", || {
                self.inner.add_portfolio_project(portfolio_key, project_key)
            })
            .await
    }
}
