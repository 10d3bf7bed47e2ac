// ABOUTME: End-to-end run: discover, join, describe, render, persist, open
// ABOUTME: Nothing is written unless discovery and rendering both succeed
use crate::artifact::{file_url, write_artifact, ArtifactTarget};
use crate::invocation::{DanglingGrant, InvocationGraph};
use crate::render::{OutputFormat, Renderer};
use crate::viewer::Viewer;
use iamviz_core::{CloudRunApi, Discovery, Inventory, Result};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub project: String,
    pub format: OutputFormat,
    pub target: ArtifactTarget,
    /// Launch the viewer on the written artifact
    pub open: bool,
    pub permission_concurrency: usize,
}

impl PipelineOptions {
    pub fn new(project: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            format: OutputFormat::default(),
            target: ArtifactTarget::default(),
            open: true,
            permission_concurrency: 8,
        }
    }
}

/// What one run found and produced.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub project: String,
    pub regions: usize,
    pub services: usize,
    pub edges: usize,
    pub dangling_grants: Vec<DanglingGrant>,
    /// Absent when only the description was requested
    pub artifact: Option<PathBuf>,
    #[serde(skip)]
    pub dot: String,
}

/// Discovery plus graph generation, wired to its collaborators.
pub struct Pipeline {
    api: Arc<dyn CloudRunApi>,
    renderer: Arc<dyn Renderer>,
    viewer: Arc<dyn Viewer>,
}

impl Pipeline {
    pub fn new(
        api: Arc<dyn CloudRunApi>,
        renderer: Arc<dyn Renderer>,
        viewer: Arc<dyn Viewer>,
    ) -> Self {
        Self {
            api,
            renderer,
            viewer,
        }
    }

    /// Run discovery only.
    pub async fn discover(&self, project: &str, concurrency: usize) -> Result<Inventory> {
        info!("project: {}", project);
        Discovery::new(self.api.clone())
            .with_permission_concurrency(concurrency)
            .discover(project)
            .await
    }

    /// Discover and build the graph without rendering anything.
    pub async fn describe(&self, options: &PipelineOptions) -> Result<RunSummary> {
        let inventory = self
            .discover(&options.project, options.permission_concurrency)
            .await?;
        Ok(summarize(&inventory))
    }

    /// Full run: render the graph, write the artifact and optionally open it.
    pub async fn run(&self, options: &PipelineOptions) -> Result<RunSummary> {
        let inventory = self
            .discover(&options.project, options.permission_concurrency)
            .await?;
        let mut summary = summarize(&inventory);

        let bytes = self.renderer.render(&summary.dot, options.format).await?;
        let path = write_artifact(&bytes, options.format, &options.target)?;

        if options.open {
            let url = file_url(&path)?;
            info!("opening {}", url);
            self.viewer.open(url.as_str())?;
        }

        summary.artifact = Some(path);
        Ok(summary)
    }
}

fn summarize(inventory: &Inventory) -> RunSummary {
    let graph = InvocationGraph::build(inventory);
    RunSummary {
        project: inventory.project.clone(),
        regions: inventory.regions.len(),
        services: graph.service_count(),
        edges: graph.edges().len(),
        dangling_grants: graph.dangling_grants().to_vec(),
        artifact: None,
        dot: graph.to_dot().to_dot(),
    }
}
