// ABOUTME: Graphviz renderer collaborator: DOT text in on stdin, rendered image out on stdout
// ABOUTME: The executable is located on PATH up front so a missing install fails fast
use async_trait::async_trait;
use iamviz_core::{IamVizError, Result};
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::str::FromStr;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Rendered image format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Svg,
    Png,
    Pdf,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Svg => "svg",
            Self::Png => "png",
            Self::Pdf => "pdf",
        }
    }

    /// File extension of the artifact.
    pub fn extension(&self) -> &'static str {
        self.as_str()
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = IamVizError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "svg" => Ok(Self::Svg),
            "png" => Ok(Self::Png),
            "pdf" => Ok(Self::Pdf),
            other => Err(IamVizError::Config(iamviz_core::ConfigError::ValidationError(
                format!("Invalid output format: {}. Must be one of: svg, png, pdf", other),
            ))),
        }
    }
}

/// Turns a DOT description into image bytes.
#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, dot: &str, format: OutputFormat) -> Result<Vec<u8>>;
}

/// Runs a Graphviz layout program (`dot` by default).
#[derive(Debug, Clone)]
pub struct GraphvizRenderer {
    name: String,
    path: PathBuf,
}

impl GraphvizRenderer {
    /// Resolve `program` on `PATH`.
    pub fn locate(program: &str) -> Result<Self> {
        let path = which::which(program)
            .map_err(|_| IamVizError::RendererNotFound(program.to_string()))?;
        debug!("using renderer {}", path.display());
        Ok(Self {
            name: program.to_string(),
            path,
        })
    }

    /// Use an executable at a known location.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { name, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl Renderer for GraphvizRenderer {
    async fn render(&self, dot: &str, format: OutputFormat) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.path)
            .arg(format!("-T{}", format.as_str()))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => IamVizError::RendererNotFound(self.name.clone()),
                _ => IamVizError::Io(e),
            })?;

        // Feed stdin from its own task so a large image on stdout cannot stall the write
        let writer = child.stdin.take().map(|mut stdin| {
            let input = dot.as_bytes().to_vec();
            tokio::spawn(async move {
                let result = stdin.write_all(&input).await;
                drop(stdin);
                result
            })
        });

        let output = child.wait_with_output().await?;

        if let Some(writer) = writer {
            match writer.await {
                Ok(Ok(())) => {}
                // A renderer that exits early closes the pipe; its stderr says why
                Ok(Err(e)) => debug!("writing to {} failed: {}", self.name, e),
                Err(e) => return Err(IamVizError::Task(e.to_string())),
            }
        }

        if !output.status.success() {
            return Err(IamVizError::Render {
                program: self.name.clone(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        debug!("{} produced {} bytes of {}", self.name, output.stdout.len(), format);
        Ok(output.stdout)
    }
}
