//! In-memory collaborators shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use voyage::extract::ExtractError;
use voyage::migrate::{Collaborators, RunContext, TransferOptions};
use voyage::model::{
    Branch, Comment, ExtractionSnapshot, Group, Hotspot, Issue, PermissionTemplate, Portfolio,
    ProjectInfo, ProjectMetrics, ProjectSnapshot, QualityGate, QualityProfile, TenantConfig,
};
use voyage::remote::{
    AnalysisResult, DestinationClient, ExtractOptions, Extractor, Page, RemoteError,
    RemoteFinding, ReportMessages, ReportPipeline, Result, TaskHandle, TaskStatus,
    UploadMetadata,
};

/// Pattern set shared by the fakes: a call fails when its `op:args` string
/// starts with a registered pattern.
#[derive(Clone, Default)]
pub struct Failures(Arc<Mutex<BTreeSet<String>>>);

impl Failures {
    pub fn add(&self, pattern: &str) {
        self.0.lock().unwrap().insert(pattern.to_string());
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }

    fn hit(&self, call: &str) -> bool {
        self.0.lock().unwrap().iter().any(|p| call.starts_with(p.as_str()))
    }
}

pub struct FakeExtractor {
    pub inventory: ExtractionSnapshot,
    pub branches: HashMap<(String, String), ProjectSnapshot>,
    /// Number of `extract_all` calls, shared with clones of the counter.
    pub extract_all_calls: Arc<AtomicUsize>,
}

impl FakeExtractor {
    pub fn new(snapshots: Vec<ProjectSnapshot>) -> Self {
        let mut inventory = ExtractionSnapshot::default();
        let mut branches = HashMap::new();
        for snapshot in snapshots {
            if !inventory.projects.iter().any(|p| p.key == snapshot.project.key) {
                inventory.projects.push(snapshot.project.clone());
            }
            branches.insert(
                (snapshot.project.key.clone(), snapshot.branch.clone()),
                snapshot,
            );
        }
        Self {
            inventory,
            branches,
            extract_all_calls: Arc::default(),
        }
    }

    fn lookup(&self, project: &str, branch: &str) -> std::result::Result<ProjectSnapshot, ExtractError> {
        self.branches
            .get(&(project.to_string(), branch.to_string()))
            .cloned()
            .ok_or_else(|| ExtractError::BranchNotFound {
                project: project.to_string(),
                branch: branch.to_string(),
            })
    }
}

#[async_trait]
impl Extractor for FakeExtractor {
    async fn test_connection(&self) -> std::result::Result<(), ExtractError> {
        Ok(())
    }

    async fn extract_all(
        &self,
        _options: &ExtractOptions,
    ) -> std::result::Result<ExtractionSnapshot, ExtractError> {
        self.extract_all_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inventory.clone())
    }

    async fn extract_project(
        &self,
        project_key: &str,
        _options: &ExtractOptions,
    ) -> std::result::Result<ProjectSnapshot, ExtractError> {
        let project = self
            .inventory
            .project(project_key)
            .ok_or_else(|| ExtractError::ProjectNotFound {
                project: project_key.to_string(),
            })?;
        let main = project
            .main_branch()
            .ok_or_else(|| ExtractError::MissingMainBranch {
                project: project_key.to_string(),
            })?;
        self.lookup(project_key, &main.name)
    }

    async fn extract_branch(
        &self,
        branch: &str,
        base: &ProjectSnapshot,
        _options: &ExtractOptions,
    ) -> std::result::Result<ProjectSnapshot, ExtractError> {
        self.lookup(&base.project.key, branch)
    }
}

/// Records `(destination project key, branch)` for every upload.
#[derive(Clone, Default)]
pub struct FakePipeline {
    uploads: Arc<Mutex<Vec<(String, String)>>>,
    pub failures: Failures,
}

impl FakePipeline {
    pub fn uploads(&self) -> Vec<(String, String)> {
        self.uploads.lock().unwrap().clone()
    }

    pub fn uploaded_branches(&self) -> Vec<String> {
        self.uploads().into_iter().map(|(_, branch)| branch).collect()
    }

    fn submit(&self, metadata: &UploadMetadata) -> Result<TaskHandle> {
        let call = format!("upload:{}:{}", metadata.project_key, metadata.branch);
        if self.failures.hit(&call) {
            return Err(RemoteError::Api {
                status: 500,
                message: "analysis report rejected".to_string(),
            });
        }
        let mut uploads = self.uploads.lock().unwrap();
        uploads.push((metadata.project_key.clone(), metadata.branch.clone()));
        Ok(TaskHandle {
            task_id: format!("task-{}", uploads.len()),
        })
    }
}

#[async_trait]
impl ReportPipeline for FakePipeline {
    fn build_all(&self, snapshot: &ProjectSnapshot, tenant: &TenantConfig) -> Result<ReportMessages> {
        Ok(ReportMessages {
            metadata: UploadMetadata {
                organization: tenant.key.clone(),
                project_key: tenant.destination_key(&snapshot.project.key),
                project_name: snapshot.project.name.clone(),
                branch: snapshot.branch.clone(),
                is_main: snapshot.is_main(),
            },
            issues: snapshot.issues.clone(),
            hotspots: snapshot.hotspots.clone(),
            metrics: snapshot.metrics,
        })
    }

    fn encode_all(&self, messages: &ReportMessages) -> Result<Vec<u8>> {
        serde_json::to_vec(messages).map_err(|e| RemoteError::decode(e.to_string()))
    }

    async fn upload(&self, _payload: Vec<u8>, metadata: &UploadMetadata) -> Result<TaskHandle> {
        self.submit(metadata)
    }

    async fn upload_and_wait(
        &self,
        _payload: Vec<u8>,
        metadata: &UploadMetadata,
    ) -> Result<AnalysisResult> {
        let handle = self.submit(metadata)?;
        Ok(AnalysisResult {
            task_id: handle.task_id,
            status: TaskStatus::Success,
            error_message: None,
        })
    }
}

#[derive(Default)]
struct DestinationState {
    issues: HashMap<String, Vec<RemoteFinding>>,
    hotspots: HashMap<String, Vec<RemoteFinding>>,
    projects: BTreeSet<String>,
    calls: Vec<String>,
}

/// Destination that records every call as `op:arg1:arg2...`.
#[derive(Clone, Default)]
pub struct FakeDestination {
    state: Arc<Mutex<DestinationState>>,
    pub failures: Failures,
    /// Calls matching these patterns panic instead of failing.
    pub panics: Failures,
}

impl FakeDestination {
    /// Findings returned by searches on `branch` of any project.
    pub fn set_issues(&self, branch: &str, findings: Vec<RemoteFinding>) {
        self.state.lock().unwrap().issues.insert(branch.to_string(), findings);
    }

    pub fn set_hotspots(&self, branch: &str, findings: Vec<RemoteFinding>) {
        self.state.lock().unwrap().hotspots.insert(branch.to_string(), findings);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn calls_to(&self, op: &str) -> Vec<String> {
        let prefix = format!("{op}:");
        self.calls()
            .into_iter()
            .filter(|c| c == op || c.starts_with(&prefix))
            .collect()
    }

    pub fn writes(&self) -> Vec<String> {
        const READS: [&str; 4] = ["test_connection", "project_exists", "search_issues", "search_hotspots"];
        self.calls()
            .into_iter()
            .filter(|c| !READS.iter().any(|r| c.starts_with(r)))
            .collect()
    }

    fn record(&self, op: &str, args: &[&str]) -> Result<()> {
        let call = std::iter::once(op)
            .chain(args.iter().copied())
            .collect::<Vec<_>>()
            .join(":");
        self.state.lock().unwrap().calls.push(call.clone());
        if self.panics.hit(&call) {
            panic!("{call} panicked");
        }
        if self.failures.hit(&call) {
            return Err(RemoteError::Api {
                status: 500,
                message: format!("{op} failed"),
            });
        }
        Ok(())
    }

    fn page(findings: Option<&Vec<RemoteFinding>>, page: u32, size: u32) -> Page<RemoteFinding> {
        let all = findings.cloned().unwrap_or_default();
        let items = all
            .iter()
            .skip(((page - 1) * size) as usize)
            .take(size as usize)
            .cloned()
            .collect();
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

    async fn create_project(&self, organization: &str, project_key: &str, _name: &str, main_branch: &str) -> Result<()> {
        self.record("create_project", &[project_key, organization, main_branch])?;
        self.state.lock().unwrap().projects.insert(project_key.to_string());
        Ok(())
    }

    async fn search_issues(&self, project_key: &str, branch: &str, page: u32, page_size: u32) -> Result<Page<RemoteFinding>> {
        self.record("search_issues", &[project_key, branch])?;
        Ok(Self::page(self.state.lock().unwrap().issues.get(branch), page, page_size))
    }

    async fn transition_issue(&self, issue_key: &str, transition: &str) -> Result<()> {
        self.record("transition_issue", &[issue_key, transition])
    }

    async fn add_issue_comment(&self, issue_key: &str, text: &str) -> Result<()> {
        self.record("add_issue_comment", &[issue_key, text])
    }

    async fn search_hotspots(&self, project_key: &str, branch: &str, page: u32, page_size: u32) -> Result<Page<RemoteFinding>> {
        self.record("search_hotspots", &[project_key, branch])?;
        Ok(Self::page(self.state.lock().unwrap().hotspots.get(branch), page, page_size))
    }

    async fn change_hotspot_status(&self, hotspot_key: &str, status: &str, resolution: Option<&str>) -> Result<()> {
        self.record("change_hotspot_status", &[hotspot_key, status, resolution.unwrap_or_default()])
    }

    async fn add_hotspot_comment(&self, hotspot_key: &str, text: &str) -> Result<()> {
        self.record("add_hotspot_comment", &[hotspot_key, text])
    }

    async fn restore_profile(&self, organization: &str, profile: &QualityProfile) -> Result<()> {
        self.record("restore_profile", &[organization, profile.name.as_str()])
    }

    async fn create_quality_gate(&self, organization: &str, gate: &QualityGate) -> Result<()> {
        self.record("create_quality_gate", &[organization, gate.name.as_str()])
    }

    async fn create_group(&self, organization: &str, group: &Group) -> Result<()> {
        self.record("create_group", &[organization, group.name.as_str()])
    }

    async fn add_group_permission(&self, organization: &str, group: &str, permission: &str) -> Result<()> {
        self.record("add_group_permission", &[organization, group, permission])
    }

    async fn create_permission_template(&self, organization: &str, template: &PermissionTemplate) -> Result<String> {
        self.record("create_permission_template", &[organization, template.name.as_str()])?;
        Ok(format!("tpl-{}", template.name))
    }

    async fn add_template_group_permission(&self, template_id: &str, group: &str, permission: &str) -> Result<()> {
        self.record("add_template_group_permission", &[template_id, group, permission])
    }

    async fn create_portfolio(&self, organization: &str, portfolio: &Portfolio) -> Result<()> {
        self.record("create_portfolio", &[organization, portfolio.key.as_str()])
    }

    async fn add_portfolio_project(&self, portfolio_key: &str, project_key: &str) -> Result<()> {
        self.record("add_portfolio_project", &[portfolio_key, project_key])
    }
}

pub fn issue(key: &str, line: u32, status: &str, resolution: Option<&str>) -> Issue {
    Issue {
        key: key.to_string(),
        rule: "java:S1481".to_string(),
        component: "webapp:src/App.java".to_string(),
        line: Some(line),
        message: format!("Remove unused variable {key}"),
        status: status.to_string(),
        resolution: resolution.map(str::to_string),
        severity: Some("MINOR".to_string()),
        issue_type: Some("CODE_SMELL".to_string()),
        comments: vec![Comment {
            author: Some("alice".to_string()),
            markdown: format!("reviewed {key}"),
            created_at: None,
        }],
    }
}

pub fn hotspot(key: &str, line: u32) -> Hotspot {
    Hotspot {
        key: key.to_string(),
        rule: "java:S2068".to_string(),
        component: "webapp:src/Db.java".to_string(),
        line: Some(line),
        message: "Hard-coded credential".to_string(),
        status: "REVIEWED".to_string(),
        resolution: Some("SAFE".to_string()),
        comments: Vec::new(),
    }
}

/// Destination counterpart of a source finding, in its freshly uploaded state.
pub fn remote_of(key: &str, rule: &str, component: &str, line: u32, message: &str, status: &str) -> RemoteFinding {
    RemoteFinding {
        key: key.to_string(),
        rule: rule.to_string(),
        component: component.to_string(),
        line: Some(line),
        message: message.to_string(),
        status: status.to_string(),
        resolution: None,
        comments: Vec::new(),
    }
}

pub fn project(key: &str, branches: &[&str]) -> ProjectInfo {
    ProjectInfo {
        key: key.to_string(),
        name: key.to_uppercase(),
        branches: branches
            .iter()
            .enumerate()
            .map(|(i, b)| if i == 0 { Branch::main(*b) } else { Branch::other(*b) })
            .collect(),
    }
}

pub fn snapshot(info: &ProjectInfo, branch: &str, issues: Vec<Issue>, hotspots: Vec<Hotspot>) -> ProjectSnapshot {
    ProjectSnapshot {
        project: info.clone(),
        branch: branch.to_string(),
        issues,
        hotspots,
        metrics: ProjectMetrics {
            components: 4,
            sources: 3,
            lines_of_code: 120,
        },
    }
}

/// `webapp` with a `main` branch holding two reviewed issues and a `legacy`
/// branch holding one reviewed hotspot. The destination already holds the
/// uploaded counterparts.
pub fn webapp_fixture() -> (FakeExtractor, FakeDestination) {
    let info = project("webapp", &["main", "legacy"]);
    let main_issues = vec![
        issue("AX-1", 10, "RESOLVED", Some("FALSE-POSITIVE")),
        issue("AX-2", 20, "CONFIRMED", None),
    ];
    let legacy_hotspots = vec![hotspot("HS-1", 7)];

    let destination = FakeDestination::default();
    destination.set_issues(
        "main",
        main_issues
            .iter()
            .enumerate()
            .map(|(i, src)| {
                remote_of(&format!("D-{i}"), &src.rule, &src.component, src.line.unwrap_or(0), &src.message, "OPEN")
            })
            .collect(),
    );
    destination.set_hotspots(
        "legacy",
        vec![remote_of("DH-1", "java:S2068", "webapp:src/Db.java", 7, "Hard-coded credential", "TO_REVIEW")],
    );

    let extractor = FakeExtractor::new(vec![
        snapshot(&info, "main", main_issues, Vec::new()),
        snapshot(&info, "legacy", Vec::new(), legacy_hotspots),
    ]);
    (extractor, destination)
}

pub fn context(state_dir: &std::path::Path, options: TransferOptions) -> RunContext {
    RunContext::builder()
        .state_dir(state_dir)
        .options(options)
        .build()
        .unwrap()
}

pub fn clients(
    extractor: FakeExtractor,
    pipeline: &FakePipeline,
    destination: &FakeDestination,
) -> Collaborators<FakeDestination> {
    Collaborators::new(extractor, pipeline.clone(), destination.clone())
}
