//! Service-account OAuth for the Sheets and Drive APIs.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use rank_core::StoreError;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const SCOPES: &str =
    "https://www.googleapis.com/auth/spreadsheets https://www.googleapis.com/auth/drive.readonly";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Supplies bearer tokens for store requests.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn token(&self) -> Result<String, StoreError>;
}

/// Fixed token, for tests and pre-authorised deployments.
pub struct StaticToken(pub String);

#[async_trait]
impl TokenSource for StaticToken {
    async fn token(&self) -> Result<String, StoreError> {
        Ok(self.0.clone())
    }
}

/// Fields of a Google service-account key file that the grant needs.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccountKey {
    pub client_email: String,
    pub private_key: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ServiceAccountKey {
    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        serde_json::from_str(json)
            .map_err(|e| StoreError::Malformed(format!("service account key: {}", e)))
    }
}

#[derive(Debug, Serialize)]
struct Claims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: i64,
}

fn default_expires_in() -> i64 {
    ASSERTION_LIFETIME_SECS
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

/// JWT bearer grant with an in-memory token cache.
pub struct ServiceAccountAuth {
    key: ServiceAccountKey,
    encoding_key: EncodingKey,
    client: Client,
    cached: Mutex<Option<CachedToken>>,
}

impl ServiceAccountAuth {
    pub fn new(key: ServiceAccountKey, client: Client) -> Result<Self, StoreError> {
        let encoding_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
            .map_err(|e| StoreError::Malformed(format!("service account private key: {}", e)))?;
        Ok(Self {
            key,
            encoding_key,
            client,
            cached: Mutex::new(None),
        })
    }

    fn assertion(&self, now: DateTime<Utc>) -> Result<String, StoreError> {
        let claims = Claims {
            iss: &self.key.client_email,
            scope: SCOPES,
            aud: &self.key.token_uri,
            iat: now.timestamp(),
            exp: now.timestamp() + ASSERTION_LIFETIME_SECS,
        };
        encode(&Header::new(Algorithm::RS256), &claims, &self.encoding_key)
            .map_err(|e| StoreError::Malformed(format!("cannot sign assertion: {}", e)))
    }

    async fn fetch(&self) -> Result<CachedToken, StoreError> {
        let now = Utc::now();
        let assertion = self.assertion(now)?;

        let response = self
            .client
            .post(&self.key.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
            .send()
            .await
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::from_status(status.as_u16(), format!("token exchange: {}", body)));
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Malformed(format!("token response: {}", e)))?;

        debug!("Obtained access token valid for {}s", token.expires_in);
        Ok(CachedToken {
            token: token.access_token,
            expires_at: now + ChronoDuration::seconds(token.expires_in - EXPIRY_MARGIN_SECS),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccountAuth {
    async fn token(&self) -> Result<String, StoreError> {
        let mut cached = self.cached.lock().await;
        if let Some(current) = cached.as_ref() {
            if current.expires_at > Utc::now() {
                return Ok(current.token.clone());
            }
        }

        let fresh = self.fetch().await?;
        if cached.is_none() {
            info!("Authenticated as {}", self.key.client_email);
        }
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_parsing_defaults_token_uri() {
        let key = ServiceAccountKey::from_json(
            r#"{"type":"service_account","client_email":"bot@example.iam.gserviceaccount.com","private_key":"pem"}"#,
        )
        .unwrap();
        assert_eq!(key.client_email, "bot@example.iam.gserviceaccount.com");
        assert_eq!(key.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn key_parsing_rejects_incomplete_json() {
        assert!(matches!(
            ServiceAccountKey::from_json(r#"{"client_email":"x"}"#),
            Err(StoreError::Malformed(_))
        ));
    }

    #[test]
    fn invalid_pem_is_rejected_up_front() {
        let key = ServiceAccountKey {
            client_email: "x".into(),
            private_key: "not a pem".into(),
            token_uri: default_token_uri(),
        };
        assert!(ServiceAccountAuth::new(key, Client::new()).is_err());
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        assert_eq!(StaticToken("abc".into()).token().await.unwrap(), "abc");
    }
}
