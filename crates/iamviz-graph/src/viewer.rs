// ABOUTME: Opens a rendered artifact with the platform's default handler
// ABOUTME: Launches are fire-and-forget; the viewer process is never waited on
use iamviz_core::{IamVizError, Result};
use tokio::process::Command;
use tracing::debug;

/// Hands a file URL to whatever displays it.
pub trait Viewer: Send + Sync {
    fn open(&self, target: &str) -> Result<()>;
}

/// Program and arguments that open `target` on `os` (as in `std::env::consts::OS`).
pub fn launch_command(os: &str, target: &str) -> Result<(String, Vec<String>)> {
    match os {
        "linux" => Ok(("xdg-open".to_string(), vec![target.to_string()])),
        "windows" => Ok((
            "rundll32".to_string(),
            vec!["url.dll,FileProtocolHandler".to_string(), target.to_string()],
        )),
        "macos" => Ok(("open".to_string(), vec![target.to_string()])),
        other => Err(IamVizError::UnsupportedPlatform(other.to_string())),
    }
}

/// Launches the desktop handler for the current OS.
#[derive(Debug, Clone)]
pub struct SystemViewer {
    os: String,
}

impl SystemViewer {
    pub fn new() -> Self {
        Self::for_os(std::env::consts::OS)
    }

    pub fn for_os(os: impl Into<String>) -> Self {
        Self { os: os.into() }
    }
}

impl Default for SystemViewer {
    fn default() -> Self {
        Self::new()
    }
}

impl Viewer for SystemViewer {
    fn open(&self, target: &str) -> Result<()> {
        let (program, args) = launch_command(&self.os, target)?;
        debug!("launching {} {:?}", program, args);
        Command::new(&program)
            .args(&args)
            .spawn()
            .map_err(|e| IamVizError::Viewer(format!("{}: {}", program, e)))?;
        Ok(())
    }
}
