// ABOUTME: Region, service and permission discovery over a CloudRunApi
// ABOUTME: Region listing fans out one task per region with first-error cancellation
use crate::{CloudRunApi, IamVizError, Inventory, Region, Result, Service, ServicePermissions};
use futures::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Outcome reported by one region task. `None` means the task saw the
/// cancellation signal before its call finished.
type RegionOutcome = (Region, Option<Result<Vec<Service>>>);

/// Drives the three discovery stages against a `CloudRunApi`.
pub struct Discovery {
    api: Arc<dyn CloudRunApi>,
    permission_concurrency: usize,
}

impl Discovery {
    pub fn new(api: Arc<dyn CloudRunApi>) -> Self {
        Self {
            api,
            permission_concurrency: 8,
        }
    }

    pub fn with_permission_concurrency(mut self, concurrency: usize) -> Self {
        self.permission_concurrency = concurrency.max(1);
        self
    }

    /// Run region, service and permission discovery for `project`.
    pub async fn discover(&self, project: &str) -> Result<Inventory> {
        let regions = discover_regions(self.api.as_ref(), project).await?;
        for region in &regions {
            info!("--> {}", region.id);
        }

        let services = discover_services(self.api.clone(), project, &regions).await?;
        let services = discover_permissions(
            self.api.clone(),
            services,
            self.permission_concurrency,
        )
        .await?;

        Ok(Inventory {
            project: project.to_string(),
            regions,
            services,
        })
    }
}

/// List the regions available to `project`.
pub async fn discover_regions(api: &dyn CloudRunApi, project: &str) -> Result<Vec<Region>> {
    let regions = api
        .list_regions(project)
        .await
        .map_err(|e| IamVizError::RegionListing {
            project: project.to_string(),
            source: Box::new(e),
        })?;
    debug!("found {} regions for {}", regions.len(), project);
    Ok(regions)
}

/// List services in every region concurrently.
///
/// Each region runs as its own task and reports over a channel to this
/// collector. The first failure cancels the siblings; once every task has
/// reported, that failure is returned and nothing collected so far is kept.
/// The order of the returned services follows task completion.
pub async fn discover_services(
    api: Arc<dyn CloudRunApi>,
    project: &str,
    regions: &[Region],
) -> Result<Vec<Service>> {
    if regions.is_empty() {
        return Ok(Vec::new());
    }

    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel::<RegionOutcome>(regions.len());

    for region in regions {
        let api = api.clone();
        let cancel = cancel.clone();
        let tx = tx.clone();
        let project = project.to_string();
        let region = region.clone();

        tokio::spawn(async move {
            let outcome = tokio::select! {
                _ = cancel.cancelled() => None,
                result = api.list_services(&project, &region) => {
                    if result.is_err() {
                        cancel.cancel();
                    }
                    Some(result)
                }
            };
            // The collector only goes away once every sender is dropped
            let _ = tx.send((region, outcome)).await;
        });
    }
    drop(tx);

    let mut services = Vec::new();
    let mut first_error: Option<IamVizError> = None;
    let mut reported = 0usize;

    while let Some((region, outcome)) = rx.recv().await {
        reported += 1;
        match outcome {
            Some(Ok(found)) => {
                info!("found {} svcs in {}", found.len(), region.id);
                if first_error.is_none() {
                    services.extend(found);
                }
            }
            Some(Err(e)) => {
                if first_error.is_none() {
                    warn!("service listing failed in {}: {}", region.id, e);
                    first_error = Some(IamVizError::ServiceListing {
                        region: region.id.clone(),
                        source: Box::new(e),
                    });
                } else {
                    debug!("ignoring later failure in {}: {}", region.id, e);
                }
            }
            None => debug!("service listing in {} cancelled", region.id),
        }
    }

    if reported != regions.len() {
        return Err(IamVizError::Task(format!(
            "{} of {} region tasks exited without reporting",
            regions.len() - reported,
            regions.len()
        )));
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(services),
    }
}

/// Fetch the invoker identities of every service.
///
/// At most `concurrency` policy requests are in flight; the output keeps the
/// input order and the first failure aborts the stage.
pub async fn discover_permissions(
    api: Arc<dyn CloudRunApi>,
    services: Vec<Service>,
    concurrency: usize,
) -> Result<Vec<ServicePermissions>> {
    stream::iter(services)
        .map(|service| {
            let api = api.clone();
            async move {
                info!(
                    "\t name={} region={} acct={}",
                    service.name, service.region.id, service.identity
                );
                let invokers = api.get_invokers(&service).await.map_err(|e| {
                    IamVizError::PermissionQuery {
                        service: service.name.clone(),
                        region: service.region.id.clone(),
                        source: Box::new(e),
                    }
                })?;
                for caller in &invokers {
                    debug!("\t\tauthorized caller of {}: {}", service.name, caller);
                }
                Ok::<_, IamVizError>(ServicePermissions { service, invokers })
            }
        })
        .buffered(concurrency.max(1))
        .try_collect()
        .await
}
