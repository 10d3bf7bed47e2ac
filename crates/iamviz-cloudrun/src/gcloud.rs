use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

#[derive(Error, Debug)]
pub enum GcloudError {
    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {stderr}")]
    Failed {
        command: String,
        status: String,
        stderr: String,
    },
}

/// Thin wrapper over the `gcloud` command line tool.
#[derive(Debug, Clone)]
pub struct GcloudCli {
    program: String,
}

impl Default for GcloudCli {
    fn default() -> Self {
        Self::new()
    }
}

impl GcloudCli {
    pub fn new() -> Self {
        Self::with_program("gcloud")
    }

    pub fn with_program(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run `gcloud <args>` and return its trimmed stdout.
    pub async fn run(&self, args: &[&str]) -> Result<String, GcloudError> {
        debug!("running {} {}", self.program, args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .output()
            .await
            .map_err(|source| GcloudError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(GcloudError::Failed {
                command: format!("{} {}", self.program, args.join(" ")),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// `gcloud config get-value <key> -q`
    pub async fn config_value(&self, key: &str) -> Result<String, GcloudError> {
        self.run(&["config", "get-value", key, "-q"]).await
    }

    /// `gcloud auth print-access-token`
    pub async fn access_token(&self) -> Result<String, GcloudError> {
        self.run(&["auth", "print-access-token", "-q"]).await
    }
}

#[cfg(all(test, unix))]
pub(crate) mod test_support {
    use std::os::unix::fs::PermissionsExt;
    use std::path::PathBuf;

    /// Write an executable shell script standing in for gcloud.
    pub fn fake_gcloud(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("gcloud");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::test_support::fake_gcloud;
    use super::*;

    #[tokio::test]
    async fn test_run_trims_stdout() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_gcloud(&dir, r#"echo "  $1 $2  ""#);
        let gcloud = GcloudCli::with_program(script.to_string_lossy());

        let out = gcloud.run(&["config", "get-value"]).await.unwrap();
        assert_eq!(out, "config get-value");
    }

    #[tokio::test]
    async fn test_nonzero_exit_reports_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let script = fake_gcloud(&dir, "echo 'not logged in' >&2\nexit 1");
        let gcloud = GcloudCli::with_program(script.to_string_lossy());

        let err = gcloud.access_token().await.unwrap_err();
        match err {
            GcloudError::Failed { stderr, .. } => assert_eq!(stderr, "not logged in"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_missing_program() {
        let gcloud = GcloudCli::with_program("/nonexistent/gcloud-for-tests");
        assert!(matches!(
            gcloud.config_value("core/project").await,
            Err(GcloudError::Spawn { .. })
        ));
    }
}
