use thiserror::Error;

use crate::ConfigError;

#[derive(Error, Debug)]
pub enum IamVizError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to find project: {0}")]
    Project(String),

    #[error("Failed to obtain credentials: {0}")]
    Auth(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("Failed to query regions for project {project:?}")]
    RegionListing {
        project: String,
        #[source]
        source: Box<IamVizError>,
    },

    #[error("Failed to query services in region {region:?}")]
    ServiceListing {
        region: String,
        #[source]
        source: Box<IamVizError>,
    },

    #[error("Failed to query permissions for service {service:?} in {region:?}")]
    PermissionQuery {
        service: String,
        region: String,
        #[source]
        source: Box<IamVizError>,
    },

    #[error("`{0}` not installed on this machine")]
    RendererNotFound(String),

    #[error("Failed to render graph, {program} error output:\n{stderr}")]
    Render { program: String, stderr: String },

    #[error("Unsupported platform {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to open viewer: {0}")]
    Viewer(String),

    #[error("Discovery task failed: {0}")]
    Task(String),
}

pub type Result<T> = std::result::Result<T, IamVizError>;
