use async_trait::async_trait;
use iamviz_core::{CloudRunApi, IamVizError, Region, Result, Service};
use iamviz_graph::{
    ArtifactTarget, OutputFormat, Pipeline, PipelineOptions, Renderer, Viewer,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const A: &str = "a@my-project.iam.gserviceaccount.com";
const C: &str = "c@my-project.iam.gserviceaccount.com";

struct FakeCloudRun {
    services: HashMap<String, Vec<(&'static str, &'static str)>>,
    invokers: HashMap<&'static str, Vec<String>>,
    failing_region: Option<&'static str>,
}

impl FakeCloudRun {
    fn example() -> Self {
        let mut services = HashMap::new();
        services.insert("us-central1".to_string(), vec![("svc-a", A), ("svc-c", C)]);
        services.insert("europe-west1".to_string(), vec![]);
        let mut invokers = HashMap::new();
        invokers.insert("svc-c", vec![A.to_string(), "me@example.com".to_string()]);
        Self {
            services,
            invokers,
            failing_region: None,
        }
    }
}

#[async_trait]
impl CloudRunApi for FakeCloudRun {
    async fn list_regions(&self, _project: &str) -> Result<Vec<Region>> {
        Ok(vec![
            Region::new("us-central1", "Iowa"),
            Region::new("europe-west1", "Belgium"),
        ])
    }

    async fn list_services(&self, project: &str, region: &Region) -> Result<Vec<Service>> {
        if self.failing_region == Some(region.id.as_str()) {
            return Err(IamVizError::Api("HTTP 403 Forbidden".to_string()));
        }
        Ok(self
            .services
            .get(&region.id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(name, identity)| Service {
                name: name.to_string(),
                namespace: project.to_string(),
                region: region.clone(),
                identity: identity.to_string(),
            })
            .collect())
    }

    async fn get_invokers(&self, service: &Service) -> Result<Vec<String>> {
        Ok(self
            .invokers
            .get(service.name.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

/// Returns the description it was given, prefixed with the format.
#[derive(Default)]
struct EchoRenderer {
    calls: AtomicUsize,
}

#[async_trait]
impl Renderer for EchoRenderer {
    async fn render(&self, dot: &str, format: OutputFormat) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}\n{}", format, dot).into_bytes())
    }
}

struct FailingRenderer;

#[async_trait]
impl Renderer for FailingRenderer {
    async fn render(&self, _dot: &str, _format: OutputFormat) -> Result<Vec<u8>> {
        Err(IamVizError::Render {
            program: "dot".to_string(),
            stderr: "Error: <stdin>: syntax error in line 1".to_string(),
        })
    }
}

#[derive(Default)]
struct RecordingViewer {
    opened: Mutex<Vec<String>>,
}

impl Viewer for RecordingViewer {
    fn open(&self, target: &str) -> Result<()> {
        self.opened.lock().unwrap().push(target.to_string());
        Ok(())
    }
}

fn options(dir: &Path) -> PipelineOptions {
    PipelineOptions {
        target: ArtifactTarget::TempFile {
            dir: Some(dir.to_path_buf()),
        },
        ..PipelineOptions::new("my-project")
    }
}

fn files_in(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

#[tokio::test]
async fn test_run_writes_and_opens_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(EchoRenderer::default());
    let viewer = Arc::new(RecordingViewer::default());
    let pipeline = Pipeline::new(
        Arc::new(FakeCloudRun::example()),
        renderer.clone(),
        viewer.clone(),
    );

    let summary = pipeline.run(&options(dir.path())).await.unwrap();

    assert_eq!(summary.project, "my-project");
    assert_eq!(summary.regions, 2);
    assert_eq!(summary.services, 2);
    assert_eq!(summary.edges, 1);
    assert_eq!(summary.dangling_grants.len(), 1);
    assert_eq!(summary.dangling_grants[0].identity, "me@example.com");

    let artifact = summary.artifact.expect("artifact path");
    assert!(artifact.starts_with(dir.path()));
    assert_eq!(artifact.extension().unwrap(), "svg");
    let content = std::fs::read_to_string(&artifact).unwrap();
    assert!(content.starts_with("svg\ndigraph G {"));
    assert!(content.contains("\"us-central1_svc-a\" -> \"us-central1_svc-c\""));
    assert_eq!(content, format!("svg\n{}", summary.dot));

    let opened = viewer.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert!(opened[0].starts_with("file://"));
    assert!(opened[0].ends_with(".svg"));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_no_open_skips_viewer() {
    let dir = tempfile::tempdir().unwrap();
    let viewer = Arc::new(RecordingViewer::default());
    let pipeline = Pipeline::new(
        Arc::new(FakeCloudRun::example()),
        Arc::new(EchoRenderer::default()),
        viewer.clone(),
    );
    let options = PipelineOptions {
        open: false,
        format: OutputFormat::Png,
        ..options(dir.path())
    };

    let summary = pipeline.run(&options).await.unwrap();

    assert_eq!(summary.artifact.unwrap().extension().unwrap(), "png");
    assert!(viewer.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_failing_region_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let renderer = Arc::new(EchoRenderer::default());
    let viewer = Arc::new(RecordingViewer::default());
    let api = FakeCloudRun {
        failing_region: Some("europe-west1"),
        ..FakeCloudRun::example()
    };
    let pipeline = Pipeline::new(Arc::new(api), renderer.clone(), viewer.clone());

    let err = pipeline.run(&options(dir.path())).await.unwrap_err();

    match err {
        IamVizError::ServiceListing { region, .. } => assert_eq!(region, "europe-west1"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    assert_eq!(files_in(dir.path()), 0);
    assert!(viewer.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_render_failure_leaves_no_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let viewer = Arc::new(RecordingViewer::default());
    let pipeline = Pipeline::new(
        Arc::new(FakeCloudRun::example()),
        Arc::new(FailingRenderer),
        viewer.clone(),
    );

    let err = pipeline.run(&options(dir.path())).await.unwrap_err();

    assert!(err.to_string().contains("syntax error in line 1"));
    assert_eq!(files_in(dir.path()), 0);
    assert!(viewer.opened.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_describe_renders_nothing() {
    let renderer = Arc::new(EchoRenderer::default());
    let pipeline = Pipeline::new(
        Arc::new(FakeCloudRun::example()),
        renderer.clone(),
        Arc::new(RecordingViewer::default()),
    );

    let summary = pipeline
        .describe(&PipelineOptions::new("my-project"))
        .await
        .unwrap();

    assert!(summary.artifact.is_none());
    assert!(summary.dot.contains("subgraph cluster_us_central1"));
    // europe-west1 has no services, so no cluster
    assert!(!summary.dot.contains("cluster_europe_west1"));
    assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
}
