// ABOUTME: Application Default Credentials: key file, gcloud ADC login file or metadata server
// ABOUTME: Each source is exchanged for an OAuth access token once per run
use crate::TokenProvider;
use async_trait::async_trait;
use iamviz_core::{IamVizError, Result};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::OnceCell;
use tracing::debug;

/// Explicit credentials file.
pub const CREDENTIALS_ENV: &str = "GOOGLE_APPLICATION_CREDENTIALS";
/// Overrides the metadata server address, e.g. `127.0.0.1:8080`.
pub const METADATA_HOST_ENV: &str = "GCE_METADATA_HOST";
pub const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
const DEFAULT_METADATA_HOST: &str = "metadata.google.internal";
const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ADC_FILE: &str = "application_default_credentials.json";
const METADATA_TIMEOUT: Duration = Duration::from_secs(3);

/// Contents of a credentials JSON file.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CredentialsFile {
    /// Service account key downloaded from IAM
    ServiceAccount(ServiceAccountKey),
    /// Written by `gcloud auth application-default login`
    AuthorizedUser(AuthorizedUser),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub private_key_id: Option<String>,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizedUser {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone)]
enum AdcSource {
    File(CredentialsFile),
    Metadata { url: String },
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

/// Token minted from Application Default Credentials.
pub struct AdcTokenProvider {
    http: Client,
    source: AdcSource,
    token: OnceCell<String>,
}

impl AdcTokenProvider {
    /// Resolve the credential source the way Google client libraries do:
    /// `GOOGLE_APPLICATION_CREDENTIALS`, then the gcloud ADC file, then the
    /// metadata server.
    pub fn discover() -> Result<Self> {
        if let Some(path) = std::env::var_os(CREDENTIALS_ENV).filter(|p| !p.is_empty()) {
            debug!("using credentials from {}", CREDENTIALS_ENV);
            return Self::from_credentials_file(Path::new(&path));
        }

        if let Some(path) = well_known_file().filter(|p| p.exists()) {
            debug!("using application default credentials {}", path.display());
            return Self::from_credentials_file(&path);
        }

        let host = std::env::var(METADATA_HOST_ENV)
            .ok()
            .filter(|h| !h.is_empty())
            .unwrap_or_else(|| DEFAULT_METADATA_HOST.to_string());
        debug!("no credentials file, falling back to metadata server {}", host);
        Ok(Self::metadata(&host))
    }

    pub fn from_credentials_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            IamVizError::Auth(format!("cannot read credentials {}: {}", path.display(), e))
        })?;
        let credentials: CredentialsFile = serde_json::from_str(&content).map_err(|e| {
            IamVizError::Auth(format!("invalid credentials {}: {}", path.display(), e))
        })?;
        Ok(Self::with_credentials(credentials))
    }

    pub fn with_credentials(credentials: CredentialsFile) -> Self {
        Self::new(AdcSource::File(credentials))
    }

    /// Metadata server at `host` (`metadata.google.internal` on GCP).
    pub fn metadata(host: &str) -> Self {
        Self::new(AdcSource::Metadata {
            url: format!(
                "http://{}/computeMetadata/v1/instance/service-accounts/default/token",
                host
            ),
        })
    }

    fn new(source: AdcSource) -> Self {
        Self {
            http: Client::new(),
            source,
            token: OnceCell::new(),
        }
    }

    async fn fetch(&self) -> Result<String> {
        let request = match &self.source {
            AdcSource::File(CredentialsFile::ServiceAccount(key)) => {
                let token_uri = key.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
                let assertion = signed_assertion(key, token_uri)?;
                self.http.post(token_uri).form(&[
                    ("grant_type", JWT_BEARER_GRANT),
                    ("assertion", assertion.as_str()),
                ])
            }
            AdcSource::File(CredentialsFile::AuthorizedUser(user)) => {
                let token_uri = user.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
                self.http.post(token_uri).form(&[
                    ("grant_type", "refresh_token"),
                    ("client_id", user.client_id.as_str()),
                    ("client_secret", user.client_secret.as_str()),
                    ("refresh_token", user.refresh_token.as_str()),
                ])
            }
            AdcSource::Metadata { url } => self
                .http
                .get(url)
                .header("Metadata-Flavor", "Google")
                .timeout(METADATA_TIMEOUT),
        };

        let response = request
            .send()
            .await
            .map_err(|e| IamVizError::Auth(format!("token request failed: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(IamVizError::Auth(format!(
                "token endpoint returned HTTP {}: {}",
                status,
                body.trim()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| IamVizError::Auth(format!("invalid token response: {}", e)))?;
        Ok(token.access_token)
    }
}

#[async_trait]
impl TokenProvider for AdcTokenProvider {
    async fn access_token(&self) -> Result<String> {
        let token = self.token.get_or_try_init(|| self.fetch()).await?;
        Ok(token.clone())
    }
}

/// RS256 JWT asserting the service account, valid for one hour.
fn signed_assertion(key: &ServiceAccountKey, audience: &str) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| IamVizError::Auth(e.to_string()))?
        .as_secs();
    let claims = JwtClaims {
        iss: &key.client_email,
        scope: CLOUD_PLATFORM_SCOPE,
        aud: audience,
        iat: now,
        exp: now + 3600,
    };

    let mut header = Header::new(Algorithm::RS256);
    header.kid = key.private_key_id.clone();

    let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
        .map_err(|e| IamVizError::Auth(format!("invalid service account key: {}", e)))?;
    jsonwebtoken::encode(&header, &claims, &signing_key)
        .map_err(|e| IamVizError::Auth(format!("cannot sign token request: {}", e)))
}

/// `$CLOUDSDK_CONFIG`, `%APPDATA%\gcloud` or `~/.config/gcloud`, plus the ADC file name.
fn well_known_file() -> Option<PathBuf> {
    let config_dir = match std::env::var_os("CLOUDSDK_CONFIG").filter(|v| !v.is_empty()) {
        Some(dir) => PathBuf::from(dir),
        None if cfg!(windows) => PathBuf::from(std::env::var_os("APPDATA")?).join("gcloud"),
        None => dirs::home_dir()?.join(".config").join("gcloud"),
    };
    Some(config_dir.join(ADC_FILE))
}
