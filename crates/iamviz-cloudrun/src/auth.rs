use crate::{AdcTokenProvider, GcloudCli};
use async_trait::async_trait;
use iamviz_core::{IamVizError, Result};
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Environment variable holding a pre-minted OAuth access token.
pub const ACCESS_TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Source of bearer tokens for the Cloud Run API.
#[async_trait]
pub trait TokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// A fixed token.
pub struct StaticToken(String);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

/// Token minted once per run by `gcloud auth print-access-token`.
pub struct GcloudTokenProvider {
    gcloud: GcloudCli,
    token: OnceCell<String>,
}

impl GcloudTokenProvider {
    pub fn new(gcloud: GcloudCli) -> Self {
        Self {
            gcloud,
            token: OnceCell::new(),
        }
    }
}

#[async_trait]
impl TokenProvider for GcloudTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .token
            .get_or_try_init(|| async {
                debug!("requesting access token from {}", self.gcloud.program());
                let token = self
                    .gcloud
                    .access_token()
                    .await
                    .map_err(|e| IamVizError::Auth(e.to_string()))?;
                if token.is_empty() {
                    return Err(IamVizError::Auth(
                        "gcloud returned an empty access token".to_string(),
                    ));
                }
                Ok(token)
            })
            .await?;
        Ok(token.clone())
    }
}

/// Tries each provider in order and keeps the first token minted.
pub struct ChainedTokenProvider {
    providers: Vec<(&'static str, Arc<dyn TokenProvider>)>,
    token: OnceCell<String>,
}

impl ChainedTokenProvider {
    pub fn new(providers: Vec<(&'static str, Arc<dyn TokenProvider>)>) -> Self {
        Self {
            providers,
            token: OnceCell::new(),
        }
    }

    async fn first_token(&self) -> Result<String> {
        let mut failures = Vec::new();
        for (name, provider) in &self.providers {
            match provider.access_token().await {
                Ok(token) => {
                    debug!("access token from {}", name);
                    return Ok(token);
                }
                Err(e) => {
                    debug!("{} credentials unavailable: {}", name, e);
                    failures.push(format!("{}: {}", name, e));
                }
            }
        }
        Err(IamVizError::Auth(format!(
            "no usable credentials ({})",
            failures.join("; ")
        )))
    }
}

#[async_trait]
impl TokenProvider for ChainedTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let token = self.token.get_or_try_init(|| self.first_token()).await?;
        Ok(token.clone())
    }
}

/// `GOOGLE_OAUTH_ACCESS_TOKEN` when set, otherwise Application Default
/// Credentials with the gcloud user login as fallback.
pub fn default_token_provider(gcloud: GcloudCli) -> Arc<dyn TokenProvider> {
    if let Ok(token) = std::env::var(ACCESS_TOKEN_ENV) {
        if !token.trim().is_empty() {
            debug!("using access token from {}", ACCESS_TOKEN_ENV);
            return Arc::new(StaticToken::new(token.trim()));
        }
    }

    let mut providers: Vec<(&'static str, Arc<dyn TokenProvider>)> = Vec::new();
    match AdcTokenProvider::discover() {
        Ok(adc) => providers.push(("application default credentials", Arc::new(adc))),
        Err(e) => warn!("ignoring application default credentials: {}", e),
    }
    providers.push(("gcloud", Arc::new(GcloudTokenProvider::new(gcloud))));
    Arc::new(ChainedTokenProvider::new(providers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    #[test]
    fn test_static_token() {
        let provider = StaticToken::new("ya29.test");
        assert_eq!(block_on(provider.access_token()).unwrap(), "ya29.test");
    }

    #[tokio::test]
    async fn test_missing_gcloud_is_auth_error() {
        let provider =
            GcloudTokenProvider::new(GcloudCli::with_program("/nonexistent/gcloud-for-tests"));
        assert!(matches!(
            provider.access_token().await,
            Err(IamVizError::Auth(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_gcloud_token_is_minted_once() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("calls");
        let script = crate::gcloud::test_support::fake_gcloud(
            &dir,
            &format!("echo x >> {}\necho ya29.minted", counter.display()),
        );
        let provider = GcloudTokenProvider::new(GcloudCli::with_program(script.to_string_lossy()));

        assert_eq!(provider.access_token().await.unwrap(), "ya29.minted");
        assert_eq!(provider.access_token().await.unwrap(), "ya29.minted");
        let calls = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(calls.lines().count(), 1);
    }

    fn missing_gcloud(path: &str) -> Arc<dyn TokenProvider> {
        Arc::new(GcloudTokenProvider::new(GcloudCli::with_program(path)))
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_provider() {
        let fixed: Arc<dyn TokenProvider> = Arc::new(StaticToken::new("ya29.second"));
        let chain = ChainedTokenProvider::new(vec![
            ("gcloud", missing_gcloud("/nonexistent/gcloud-for-tests")),
            ("static", fixed),
        ]);
        assert_eq!(chain.access_token().await.unwrap(), "ya29.second");
    }

    #[tokio::test]
    async fn test_chain_reports_every_failure() {
        let chain = ChainedTokenProvider::new(vec![
            ("first", missing_gcloud("/nonexistent/first")),
            ("second", missing_gcloud("/nonexistent/second")),
        ]);
        match chain.access_token().await {
            Err(IamVizError::Auth(message)) => {
                assert!(message.contains("first:"), "{}", message);
                assert!(message.contains("second:"), "{}", message);
            }
            other => panic!("expected auth error, got {:?}", other.map(|_| ())),
        }
    }
}
