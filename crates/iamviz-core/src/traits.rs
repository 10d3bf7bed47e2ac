use crate::{Region, Result, Service};
use async_trait::async_trait;

/// Read-only view of the Cloud Run admin API.
///
/// Implemented over HTTP by `iamviz-cloudrun`; tests substitute in-memory
/// fakes.
#[async_trait]
pub trait CloudRunApi: Send + Sync {
    /// List the locations Cloud Run is available in for `project`.
    async fn list_regions(&self, project: &str) -> Result<Vec<Region>>;

    /// List the services deployed in `region`, each tagged with that region.
    async fn list_services(&self, project: &str, region: &Region) -> Result<Vec<Service>>;

    /// Identities bound to the invoker role on `service`.
    async fn get_invokers(&self, service: &Service) -> Result<Vec<String>>;
}
