//! GCP authentication
//!
//! Issues OAuth2 access tokens for Vertex AI from either a service account key
//! (signed JWT exchange) or, when no key is configured, the GCE/Cloud Run
//! metadata server. Credentials are resolved lazily so a missing key only
//! fails the calls that need it.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";
const CLOUD_PLATFORM_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// Refresh tokens this long before they expire
const EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Where access tokens come from
#[derive(Debug, Clone)]
enum TokenSource {
    ServiceAccount(PathBuf),
    MetadataServer,
}

#[derive(Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// GCP authentication manager
pub struct GcpAuth {
    source: TokenSource,
    project_id: String,
    http: reqwest::Client,
    token: RwLock<Option<CachedToken>>,
}

impl GcpAuth {
    /// Create an auth manager. Without a key path, tokens come from the metadata server.
    pub fn new(project_id: String, service_account_key_path: Option<PathBuf>) -> Self {
        let source = match service_account_key_path {
            Some(path) => {
                if !path.exists() {
                    tracing::warn!(
                        "Service account key {} not found; Vertex AI calls will fail until it exists",
                        path.display()
                    );
                }
                TokenSource::ServiceAccount(path)
            }
            None => TokenSource::MetadataServer,
        };

        Self {
            source,
            project_id,
            http: reqwest::Client::new(),
            token: RwLock::new(None),
        }
    }

    /// Get project ID
    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Get a valid access token, refreshing if needed
    pub async fn get_token(&self) -> Result<String> {
        {
            let token = self.token.read().await;
            if let Some(cached) = token.as_ref() {
                if cached.expires_at > Instant::now() + EXPIRY_MARGIN {
                    return Ok(cached.access_token.clone());
                }
            }
        }

        let (access_token, lifetime) = match &self.source {
            TokenSource::ServiceAccount(path) => self.exchange_service_account_jwt(path).await?,
            TokenSource::MetadataServer => self.fetch_metadata_token().await?,
        };

        let mut token = self.token.write().await;
        *token = Some(CachedToken {
            access_token: access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(access_token)
    }

    /// Build a request with the bearer token attached
    pub async fn post(&self, url: &str) -> Result<reqwest::RequestBuilder> {
        let token = self.get_token().await?;
        Ok(self.http.post(url).bearer_auth(token))
    }

    async fn fetch_metadata_token(&self) -> Result<(String, Duration)> {
        let response = self
            .http
            .get(METADATA_TOKEN_URL)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| Error::Config(format!("Metadata server unavailable: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::Config(format!(
                "Metadata token request failed ({})",
                response.status()
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Config(format!("Failed to parse metadata token: {}", e)))?;

        let lifetime = token.lifetime();
        Ok((token.access_token, lifetime))
    }

    async fn exchange_service_account_jwt(&self, key_path: &Path) -> Result<(String, Duration)> {
        let key_content = tokio::fs::read_to_string(key_path).await.map_err(|e| {
            Error::Config(format!(
                "Failed to read service account key {}: {}",
                key_path.display(),
                e
            ))
        })?;

        let key: ServiceAccountKey = serde_json::from_str(&key_content)
            .map_err(|e| Error::Config(format!("Invalid service account key format: {}", e)))?;

        let jwt = sign_jwt(&key)?;

        let response = self
            .http
            .post(&key.token_uri)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", jwt.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::Config(format!("Token exchange request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Config(format!(
                "Token exchange failed ({}): {}",
                status, body
            )));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| Error::Config(format!("Failed to parse token response: {}", e)))?;

        let lifetime = token.lifetime();
        Ok((token.access_token, lifetime))
    }
}

#[derive(serde::Deserialize)]
struct ServiceAccountKey {
    client_email: String,
    private_key: String,
    token_uri: String,
}

#[derive(serde::Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

impl TokenResponse {
    fn lifetime(&self) -> Duration {
        // Tokens are typically valid for an hour
        Duration::from_secs(self.expires_in.unwrap_or(55 * 60))
    }
}

/// Build an RS256-signed JWT assertion for the service account
fn sign_jwt(key: &ServiceAccountKey) -> Result<String> {
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;

    let now = chrono::Utc::now().timestamp();
    let claims = serde_json::json!({
        "iss": key.client_email,
        "scope": CLOUD_PLATFORM_SCOPE,
        "aud": key.token_uri,
        "iat": now,
        "exp": now + 3600,
    });

    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string().as_bytes());
    let signing_input = format!("{}.{}", header, payload);

    let private_key = key.private_key.replace("\\n", "\n");
    let pem = pem::parse(&private_key)
        .map_err(|e| Error::Config(format!("Failed to parse private key PEM: {}", e)))?;
    let key_pair = ring::signature::RsaKeyPair::from_pkcs8(pem.contents())
        .map_err(|e| Error::Config(format!("Failed to parse private key: {:?}", e)))?;

    let mut signature = vec![0u8; key_pair.public().modulus_len()];
    key_pair
        .sign(
            &ring::signature::RSA_PKCS1_SHA256,
            &ring::rand::SystemRandom::new(),
            signing_input.as_bytes(),
            &mut signature,
        )
        .map_err(|e| Error::Config(format!("Failed to sign JWT: {:?}", e)))?;

    Ok(format!("{}.{}", signing_input, URL_SAFE_NO_PAD.encode(&signature)))
}
