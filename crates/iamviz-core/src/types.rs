use serde::{Deserialize, Serialize};
use std::fmt;

/// IAM role that allows a principal to invoke a Cloud Run service.
pub const RUN_INVOKER_ROLE: &str = "roles/run.invoker";

const CONSOLE_BASE: &str = "https://console.cloud.google.com/run/detail";

/// A Cloud Run location the project can deploy to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    /// Location id, e.g. `us-central1`
    pub id: String,
    /// Human readable name, e.g. `Iowa`
    pub display_name: String,
}

impl Region {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id, self.display_name)
    }
}

/// Identifies a service uniquely across regions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServiceKey {
    pub region: String,
    pub name: String,
}

impl ServiceKey {
    /// Graph node identifier, `<region>_<name>`.
    pub fn node_id(&self) -> String {
        format!("{}_{}", self.region, self.name)
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.region, self.name)
    }
}

/// A deployed Cloud Run service tagged with the region it was found in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    /// Owning project (the Knative namespace)
    pub namespace: String,
    pub region: Region,
    /// Service account the revisions run as
    pub identity: String,
}

impl Service {
    pub fn key(&self) -> ServiceKey {
        ServiceKey {
            region: self.region.id.clone(),
            name: self.name.clone(),
        }
    }

    /// Full IAM resource name used by `getIamPolicy`.
    pub fn resource_name(&self) -> String {
        format!(
            "projects/{}/locations/{}/services/{}",
            self.namespace, self.region.id, self.name
        )
    }

    pub fn console_url(&self) -> String {
        format!(
            "{}/{}/{}/revisions?project={}",
            CONSOLE_BASE, self.region.id, self.name, self.namespace
        )
    }

    pub fn permissions_url(&self) -> String {
        format!(
            "{}/{}/{}/permissions?project={}",
            CONSOLE_BASE, self.region.id, self.name, self.namespace
        )
    }
}

/// "identity may invoke target"
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionBinding {
    pub target: ServiceKey,
    pub identity: String,
}

/// A service together with the identities holding the invoker role on it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePermissions {
    pub service: Service,
    pub invokers: Vec<String>,
}

impl ServicePermissions {
    pub fn bindings(&self) -> impl Iterator<Item = PermissionBinding> + '_ {
        let target = self.service.key();
        self.invokers.iter().map(move |identity| PermissionBinding {
            target: target.clone(),
            identity: identity.clone(),
        })
    }
}

/// Complete snapshot of one discovery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inventory {
    pub project: String,
    pub regions: Vec<Region>,
    pub services: Vec<ServicePermissions>,
}

impl Inventory {
    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    pub fn bindings(&self) -> Vec<PermissionBinding> {
        self.services.iter().flat_map(|s| s.bindings()).collect()
    }
}

/// Extract invoker identities from IAM policy members.
///
/// Members look like `serviceAccount:foo@p.iam.gserviceaccount.com`; the type
/// prefix is dropped. Members without a type (`allUsers`,
/// `allAuthenticatedUsers`) are skipped.
pub fn member_identity(member: &str) -> Option<&str> {
    member
        .split_once(':')
        .map(|(_, identity)| identity)
        .filter(|identity| !identity.is_empty())
}
