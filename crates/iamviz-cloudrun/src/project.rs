use crate::GcloudCli;
use iamviz_core::{IamVizError, Result};
use tracing::debug;

/// Resolve the target project.
///
/// An explicit id (flag, config file or `GOOGLE_CLOUD_PROJECT`) wins;
/// otherwise the active gcloud configuration is asked for `core/project`.
pub async fn infer_project(configured: Option<&str>, gcloud: &GcloudCli) -> Result<String> {
    if let Some(project) = configured.map(str::trim).filter(|p| !p.is_empty()) {
        return Ok(project.to_string());
    }

    debug!("no project configured, asking {}", gcloud.program());
    let project = gcloud
        .config_value("core/project")
        .await
        .map_err(|e| IamVizError::Project(e.to_string()))?;

    if project.is_empty() {
        return Err(IamVizError::Project(
            "no project set; pass --project, set GOOGLE_CLOUD_PROJECT or run `gcloud config set project`"
                .to_string(),
        ));
    }

    Ok(project)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_configured_project_skips_gcloud() {
        let gcloud = GcloudCli::with_program("/nonexistent/gcloud-for-tests");
        let project = infer_project(Some(" my-project "), &gcloud).await.unwrap();
        assert_eq!(project, "my-project");
    }

    #[tokio::test]
    async fn test_missing_gcloud_is_project_error() {
        let gcloud = GcloudCli::with_program("/nonexistent/gcloud-for-tests");
        let err = infer_project(None, &gcloud).await.unwrap_err();
        assert!(matches!(err, IamVizError::Project(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_project_from_gcloud_config() {
        let dir = tempfile::tempdir().unwrap();
        let script = crate::gcloud::test_support::fake_gcloud(&dir, "echo from-gcloud");
        let gcloud = GcloudCli::with_program(script.to_string_lossy());

        let project = infer_project(Some(""), &gcloud).await.unwrap();
        assert_eq!(project, "from-gcloud");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unset_gcloud_project_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let script = crate::gcloud::test_support::fake_gcloud(&dir, "echo ''");
        let gcloud = GcloudCli::with_program(script.to_string_lossy());

        assert!(infer_project(None, &gcloud).await.is_err());
    }
}
