//! REST client for the destination cloud service.
//!
//! All I/O goes through an [`HttpTransport`], so the client is exercised in
//! tests against an in-memory transport. Reads are `GET` with query
//! parameters, writes are form-encoded `POST`s.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use url::Url;

use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::model::{Group, PermissionTemplate, Portfolio, QualityGate, QualityProfile};

use super::errors::{RemoteError, Result};
use super::pagination::Page;
use super::types::{DestinationClient, RemoteFinding};

/// Destination client speaking the cloud service's web API.
#[derive(Clone)]
pub struct CloudClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    token: String,
}

impl CloudClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        base_url: impl Into<String>,
        token: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<String> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| RemoteError::validation(format!("invalid URL for {path}: {e}")))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url.into())
    }

    pub(crate) async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        let request = request.bearer(&self.token);
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RemoteError::network(e.to_string()))?;

        if response.is_success() {
            return Ok(response);
        }
        Err(RemoteError::from_status(
            response.status,
            &response.text(),
            response.retry_after(),
        ))
    }

    pub(crate) async fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let response = self.send(HttpRequest::get(self.url(path, query)?)).await?;
        decode(path, &response)
    }

    /// Form-encoded write.
    pub(crate) async fn post(&self, path: &str, form: &[(&str, &str)]) -> Result<HttpResponse> {
        self.send(HttpRequest::post(self.url(path, &[])?).form(form)).await
    }

    /// POST a raw payload with query parameters.
    pub(crate) async fn post_body(
        &self,
        path: &str,
        query: &[(&str, &str)],
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<HttpResponse> {
        self.send(HttpRequest::post(self.url(path, query)?).payload(content_type, body))
            .await
    }
}

pub(crate) fn decode<T: DeserializeOwned>(path: &str, response: &HttpResponse) -> Result<T> {
    serde_json::from_slice(&response.body)
        .map_err(|e| RemoteError::decode(format!("{path}: {e}")))
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    valid: bool,
}

#[derive(Debug, Deserialize)]
struct ProjectSearchResponse {
    #[serde(default)]
    components: Vec<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
struct Paging {
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct WireComment {
    #[serde(default)]
    markdown: String,
}

#[derive(Debug, Deserialize)]
struct WireIssue {
    key: String,
    rule: String,
    component: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    message: String,
    status: String,
    #[serde(default)]
    resolution: Option<String>,
    #[serde(default)]
    comments: Vec<WireComment>,
}

#[derive(Debug, Deserialize)]
struct IssueSearchResponse {
    #[serde(default)]
    total: Option<u64>,
    #[serde(default)]
    issues: Vec<WireIssue>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireHotspot {
    key: String,
    rule_key: String,
    component: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    message: String,
    status: String,
    #[serde(default)]
    resolution: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HotspotSearchResponse {
    #[serde(default)]
    paging: Paging,
    #[serde(default)]
    hotspots: Vec<WireHotspot>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTemplateResponse {
    permission_template: CreatedTemplate,
}

#[derive(Debug, Deserialize)]
struct CreatedTemplate {
    id: String,
}

impl From<WireIssue> for RemoteFinding {
    fn from(issue: WireIssue) -> Self {
        Self {
            key: issue.key,
            rule: issue.rule,
            component: issue.component,
            line: issue.line,
            message: issue.message,
            status: issue.status,
            resolution: issue.resolution,
            comments: issue.comments.into_iter().map(|c| c.markdown).collect(),
        }
    }
}

impl From<WireHotspot> for RemoteFinding {
    fn from(hotspot: WireHotspot) -> Self {
        Self {
            key: hotspot.key,
            rule: hotspot.rule_key,
            component: hotspot.component,
            line: hotspot.line,
            message: hotspot.message,
            status: hotspot.status,
            resolution: hotspot.resolution,
            comments: Vec::new(),
        }
    }
}

#[async_trait]
impl DestinationClient for CloudClient {
    async fn test_connection(&self) -> Result<()> {
        let response: ValidateResponse = self.get("/api/authentication/validate", &[]).await?;
        if response.valid {
            Ok(())
        } else {
            Err(RemoteError::Auth {
                status: 401,
                message: "token rejected by destination".to_string(),
            })
        }
    }

    async fn project_exists(&self, project_key: &str) -> Result<bool> {
        let response: ProjectSearchResponse = self
            .get("/api/projects/search", &[("projects", project_key)])
            .await?;
        Ok(!response.components.is_empty())
    }

    async fn create_project(
        &self,
        organization: &str,
        project_key: &str,
        name: &str,
        main_branch: &str,
    ) -> Result<()> {
        self.post(
            "/api/projects/create",
            &[
                ("organization", organization),
                ("project", project_key),
                ("name", name),
            ],
        )
        .await?;
        self.post(
            "/api/project_branches/rename",
            &[("project", project_key), ("name", main_branch)],
        )
        .await?;
        Ok(())
    }

    async fn search_issues(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>> {
        let page = page.to_string();
        let page_size = page_size.to_string();
        let response: IssueSearchResponse = self
            .get(
                "/api/issues/search",
                &[
                    ("componentKeys", project_key),
                    ("branch", branch),
                    ("additionalFields", "comments"),
                    ("p", page.as_str()),
                    ("ps", page_size.as_str()),
                ],
            )
            .await?;
        Ok(Page::new(
            response.issues.into_iter().map(Into::into).collect(),
            response.total,
        ))
    }

    async fn transition_issue(&self, issue_key: &str, transition: &str) -> Result<()> {
        self.post(
            "/api/issues/do_transition",
            &[("issue", issue_key), ("transition", transition)],
        )
        .await
        .map(drop)
    }

    async fn add_issue_comment(&self, issue_key: &str, text: &str) -> Result<()> {
        self.post("/api/issues/add_comment", &[("issue", issue_key), ("text", text)])
            .await
            .map(drop)
    }

    async fn search_hotspots(
        &self,
        project_key: &str,
        branch: &str,
        page: u32,
        page_size: u32,
    ) -> Result<Page<RemoteFinding>> {
        let page = page.to_string();
        let page_size = page_size.to_string();
        let response: HotspotSearchResponse = self
            .get(
                "/api/hotspots/search",
                &[
                    ("projectKey", project_key),
                    ("branch", branch),
                    ("p", page.as_str()),
                    ("ps", page_size.as_str()),
                ],
            )
            .await?;
        Ok(Page::new(
            response.hotspots.into_iter().map(Into::into).collect(),
            response.paging.total,
        ))
    }

    async fn change_hotspot_status(
        &self,
        hotspot_key: &str,
        status: &str,
        resolution: Option<&str>,
    ) -> Result<()> {
        let mut form = vec![("hotspot", hotspot_key), ("status", status)];
        if let Some(resolution) = resolution {
            form.push(("resolution", resolution));
        }
        self.post("/api/hotspots/change_status", &form).await.map(drop)
    }

    async fn add_hotspot_comment(&self, hotspot_key: &str, text: &str) -> Result<()> {
        self.post(
            "/api/hotspots/add_comment",
            &[("hotspot", hotspot_key), ("comment", text)],
        )
        .await
        .map(drop)
    }

    async fn restore_profile(&self, organization: &str, profile: &QualityProfile) -> Result<()> {
        let backup = profile.backup.as_deref().ok_or_else(|| {
            RemoteError::validation(format!(
                "profile {} ({}) has no backup to restore",
                profile.name, profile.language
            ))
        })?;
        self.post(
            "/api/qualityprofiles/restore",
            &[("organization", organization), ("backup", backup)],
        )
        .await
        .map(drop)
    }

    async fn create_quality_gate(&self, organization: &str, gate: &QualityGate) -> Result<()> {
        self.post(
            "/api/qualitygates/create",
            &[("organization", organization), ("name", gate.name.as_str())],
        )
        .await?;
        for condition in &gate.conditions {
            self.post(
                "/api/qualitygates/create_condition",
                &[
                    ("organization", organization),
                    ("gateName", gate.name.as_str()),
                    ("metric", condition.metric.as_str()),
                    ("op", condition.op.as_str()),
                    ("error", condition.error.as_str()),
                ],
            )
            .await?;
        }
        Ok(())
    }

    async fn create_group(&self, organization: &str, group: &Group) -> Result<()> {
        let mut form = vec![("organization", organization), ("name", group.name.as_str())];
        if let Some(description) = group.description.as_deref() {
            form.push(("description", description));
        }
        self.post("/api/user_groups/create", &form).await.map(drop)
    }

    async fn add_group_permission(
        &self,
        organization: &str,
        group: &str,
        permission: &str,
    ) -> Result<()> {
        self.post(
            "/api/permissions/add_group",
            &[
                ("organization", organization),
                ("groupName", group),
                ("permission", permission),
            ],
        )
        .await
        .map(drop)
    }

    async fn create_permission_template(
        &self,
        organization: &str,
        template: &PermissionTemplate,
    ) -> Result<String> {
        let mut form = vec![("organization", organization), ("name", template.name.as_str())];
        if let Some(description) = template.description.as_deref() {
            form.push(("description", description));
        }
        if let Some(pattern) = template.project_key_pattern.as_deref() {
            form.push(("projectKeyPattern", pattern));
        }
        let path = "/api/permissions/create_template";
        let response = self.post(path, &form).await?;
        let created: CreateTemplateResponse = decode(path, &response)?;
        Ok(created.permission_template.id)
    }

    async fn add_template_group_permission(
        &self,
        template_id: &str,
        group: &str,
        permission: &str,
    ) -> Result<()> {
        self.post(
            "/api/permissions/add_group_to_template",
            &[
                ("templateId", template_id),
                ("groupName", group),
                ("permission", permission),
            ],
        )
        .await
        .map(drop)
    }

    async fn create_portfolio(&self, organization: &str, portfolio: &Portfolio) -> Result<()> {
        let mut form = vec![
            ("organization", organization),
            ("key", portfolio.key.as_str()),
            ("name", portfolio.name.as_str()),
        ];
        if let Some(description) = portfolio.description.as_deref() {
            form.push(("description", description));
        }
        self.post("/api/views/create", &form).await.map(drop)
    }

    async fn add_portfolio_project(&self, portfolio_key: &str, project_key: &str) -> Result<()> {
        self.post(
            "/api/views/add_project",
            &[("key", portfolio_key), ("project", project_key)],
        )
        .await
        .map(drop)
    }
}
