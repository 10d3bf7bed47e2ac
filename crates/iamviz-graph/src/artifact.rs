use crate::render::OutputFormat;
use iamviz_core::{IamVizError, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;
use url::Url;

/// Where the rendered image goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactTarget {
    /// A fresh `iamviz-*.<ext>` file in this directory, or the system temp dir
    TempFile { dir: Option<PathBuf> },
    /// Exactly this path, overwritten if present
    Path(PathBuf),
}

impl Default for ArtifactTarget {
    fn default() -> Self {
        Self::TempFile { dir: None }
    }
}

/// Persist `bytes` and return the absolute path written.
pub fn write_artifact(
    bytes: &[u8],
    format: OutputFormat,
    target: &ArtifactTarget,
) -> Result<PathBuf> {
    let path = match target {
        ArtifactTarget::Path(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, bytes)?;
            absolute(path)?
        }
        ArtifactTarget::TempFile { dir } => {
            let dir = match dir {
                Some(dir) => {
                    std::fs::create_dir_all(dir)?;
                    dir.clone()
                }
                None => std::env::temp_dir(),
            };
            let suffix = format!(".{}", format.extension());
            let mut file = tempfile::Builder::new()
                .prefix("iamviz-")
                .suffix(&suffix)
                .tempfile_in(&dir)?;
            file.write_all(bytes)?;
            file.flush()?;
            let (_, path) = file.keep().map_err(|e| IamVizError::Io(e.error))?;
            absolute(&path)?
        }
    };

    info!("wrote {}", path.display());
    Ok(path)
}

/// `file://` URL for a written artifact.
pub fn file_url(path: &Path) -> Result<Url> {
    let path = absolute(path)?;
    Url::from_file_path(&path).map_err(|_| {
        IamVizError::Viewer(format!("cannot build a file URL for {}", path.display()))
    })
}

fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
