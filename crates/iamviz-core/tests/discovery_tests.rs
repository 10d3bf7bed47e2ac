use async_trait::async_trait;
use iamviz_core::{
    discover_permissions, discover_services, CloudRunApi, Discovery, IamVizError, Region, Result,
    Service,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// In-memory Cloud Run: services per region, invokers per service name.
#[derive(Default)]
struct FakeCloudRun {
    regions: Vec<Region>,
    services: HashMap<String, Vec<(String, String)>>,
    invokers: HashMap<String, Vec<String>>,
    failing_regions: HashSet<String>,
    hanging_regions: HashSet<String>,
    failing_policies: HashSet<String>,
    policy_calls: AtomicUsize,
}

impl FakeCloudRun {
    fn with_region(mut self, id: &str, services: &[(&str, &str)]) -> Self {
        self.regions.push(Region::new(id, id.to_uppercase()));
        self.services.insert(
            id.to_string(),
            services
                .iter()
                .map(|(name, identity)| (name.to_string(), identity.to_string()))
                .collect(),
        );
        self
    }

    fn with_invokers(mut self, service: &str, identities: &[&str]) -> Self {
        self.invokers.insert(
            service.to_string(),
            identities.iter().map(|s| s.to_string()).collect(),
        );
        self
    }
}

#[async_trait]
impl CloudRunApi for FakeCloudRun {
    async fn list_regions(&self, _project: &str) -> Result<Vec<Region>> {
        Ok(self.regions.clone())
    }

    async fn list_services(&self, project: &str, region: &Region) -> Result<Vec<Service>> {
        if self.failing_regions.contains(&region.id) {
            return Err(IamVizError::Api(format!("HTTP 403 in {}", region.id)));
        }
        if self.hanging_regions.contains(&region.id) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        Ok(self
            .services
            .get(&region.id)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .map(|(name, identity)| Service {
                name,
                namespace: project.to_string(),
                region: region.clone(),
                identity,
            })
            .collect())
    }

    async fn get_invokers(&self, service: &Service) -> Result<Vec<String>> {
        self.policy_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_policies.contains(&service.name) {
            return Err(IamVizError::Api("permission denied".to_string()));
        }
        Ok(self.invokers.get(&service.name).cloned().unwrap_or_default())
    }
}

#[tokio::test]
async fn test_discovers_services_in_every_region() {
    let api = FakeCloudRun::default()
        .with_region("us-central1", &[("svc-a", "a@p"), ("svc-c", "c@p")])
        .with_region("europe-west1", &[("svc-a", "a@p")])
        .with_region("asia-east1", &[]);
    let regions = api.regions.clone();

    let services = discover_services(Arc::new(api), "p", &regions).await.unwrap();

    assert_eq!(services.len(), 3);
    let mut keys: Vec<String> = services.iter().map(|s| s.key().node_id()).collect();
    keys.sort();
    assert_eq!(
        keys,
        vec!["europe-west1_svc-a", "us-central1_svc-a", "us-central1_svc-c"]
    );
    assert!(services.iter().all(|s| s.namespace == "p"));
}

#[tokio::test]
async fn test_no_regions_yields_no_services() {
    let services = discover_services(Arc::new(FakeCloudRun::default()), "p", &[])
        .await
        .unwrap();
    assert!(services.is_empty());
}

#[tokio::test]
async fn test_single_region_failure_fails_whole_listing() {
    let mut api = FakeCloudRun::default()
        .with_region("us-central1", &[("svc-a", "a@p")])
        .with_region("europe-west1", &[("svc-b", "b@p")]);
    api.failing_regions.insert("europe-west1".to_string());
    let regions = api.regions.clone();

    let err = discover_services(Arc::new(api), "p", &regions)
        .await
        .unwrap_err();

    match err {
        IamVizError::ServiceListing { region, .. } => assert_eq!(region, "europe-west1"),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_failure_cancels_hanging_siblings() {
    let mut api = FakeCloudRun::default()
        .with_region("us-central1", &[("svc-a", "a@p")])
        .with_region("europe-west1", &[])
        .with_region("asia-east1", &[]);
    api.failing_regions.insert("us-central1".to_string());
    api.hanging_regions.insert("europe-west1".to_string());
    api.hanging_regions.insert("asia-east1".to_string());
    let regions = api.regions.clone();

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        discover_services(Arc::new(api), "p", &regions),
    )
    .await
    .expect("cancellation should unwind hanging regions");

    assert!(matches!(
        result,
        Err(IamVizError::ServiceListing { ref region, .. }) if region == "us-central1"
    ));
}

#[tokio::test]
async fn test_permissions_keep_service_order() {
    let api = Arc::new(
        FakeCloudRun::default()
            .with_region("us-central1", &[("svc-a", "a@p"), ("svc-c", "c@p")])
            .with_invokers("svc-c", &["a@p", "me@example.com"]),
    );
    let region = api.regions[0].clone();
    let services = api.list_services("p", &region).await.unwrap();

    let perms = discover_permissions(api.clone(), services, 1).await.unwrap();

    assert_eq!(perms.len(), 2);
    assert_eq!(perms[0].service.name, "svc-a");
    assert!(perms[0].invokers.is_empty());
    assert_eq!(perms[1].invokers, vec!["a@p", "me@example.com"]);
    assert_eq!(api.policy_calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_permission_failure_names_service() {
    let mut api = FakeCloudRun::default().with_region("us-central1", &[("svc-a", "a@p")]);
    api.failing_policies.insert("svc-a".to_string());
    let api = Arc::new(api);
    let region = api.regions[0].clone();
    let services = api.list_services("p", &region).await.unwrap();

    let err = discover_permissions(api, services, 4).await.unwrap_err();
    let message = err.to_string();
    assert!(message.contains("svc-a"), "{message}");
    assert!(message.contains("us-central1"), "{message}");
}

#[tokio::test]
async fn test_full_discovery_builds_inventory() {
    let api = FakeCloudRun::default()
        .with_region("us-central1", &[("svc-a", "a@p"), ("svc-c", "c@p")])
        .with_invokers("svc-c", &["a@p"]);

    let inventory = Discovery::new(Arc::new(api))
        .with_permission_concurrency(2)
        .discover("p")
        .await
        .unwrap();

    assert_eq!(inventory.project, "p");
    assert_eq!(inventory.regions.len(), 1);
    assert_eq!(inventory.service_count(), 2);
    let bindings = inventory.bindings();
    assert_eq!(bindings.len(), 1);
    assert_eq!(bindings[0].identity, "a@p");
    assert_eq!(bindings[0].target.node_id(), "us-central1_svc-c");
}
