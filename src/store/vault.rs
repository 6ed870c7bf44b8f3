use crate::auth::method::AuthMethod;
use crate::config::VaultConfig;
use crate::error::StoreError;
use crate::secret::{Lease, SecretData, Snapshot};
use crate::store::SecretStore;

use async_trait::async_trait;
use reqwest::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::{error::Error, sync::Arc, time::Duration};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};

const TOKEN_HEADER: &str = "X-Vault-Token";

#[derive(Debug, Deserialize)]
struct SecretResponse {
    #[serde(default)]
    lease_id: String,
    #[serde(default)]
    renewable: bool,
    #[serde(default)]
    lease_duration: u64,
    #[serde(default)]
    data: Option<SecretData>,
}

impl SecretResponse {
    fn lease(&self) -> Option<Lease> {
        if self.lease_id.is_empty() {
            return None;
        }
        Some(Lease::new(
            self.lease_id.clone(),
            self.renewable,
            Duration::from_secs(self.lease_duration),
        ))
    }
}

#[derive(Debug, Default, Deserialize)]
struct ErrorResponse {
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Serialize)]
struct RenewRequest<'a> {
    lease_id: &'a str,
    increment: u64,
}

#[derive(Serialize)]
struct RevokeRequest<'a> {
    lease_id: &'a str,
}

/// [`SecretStore`] backed by the Vault HTTP API.
///
/// vaultrs strips lease metadata from its responses, so it is only used to
/// log in. Reads and lease calls go through a plain HTTP client.
pub struct VaultStore {
    http: reqwest::Client,
    address: String,
    token: String,
}

impl std::fmt::Debug for VaultStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultStore")
            .field("address", &self.address)
            .finish()
    }
}

impl VaultStore {
    pub async fn from_env() -> Result<Self, Box<dyn Error>> {
        let (config, auth_method) = VaultConfig::load_env()?;
        Ok(Self::connect(&config, auth_method).await?)
    }

    /// Authenticates once with `auth_method` and keeps the resulting token.
    pub async fn connect(
        config: &VaultConfig,
        auth_method: Arc<dyn AuthMethod>,
    ) -> Result<Self, StoreError> {
        let settings = VaultClientSettingsBuilder::default()
            .address(config.address.clone())
            .timeout(Some(config.client_timeout))
            .build()
            .map_err(|e| StoreError::Client(e.to_string()))?;
        let client = VaultClient::new(settings).map_err(|e| StoreError::Client(e.to_string()))?;

        let auth_result = auth_method.authenticate(&client).await?;
        log::info!("Authenticated to Vault at {}", config.address);

        Self::with_token(config, auth_result.client_token())
    }

    pub fn with_token(config: &VaultConfig, token: impl Into<String>) -> Result<Self, StoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.client_timeout)
            .build()?;

        Ok(Self {
            http,
            address: config.address.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.address, path.trim_start_matches('/'))
    }

    async fn check(response: Response) -> Result<Response, StoreError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let errors = response
            .json::<ErrorResponse>()
            .await
            .unwrap_or_default()
            .errors;
        Err(StoreError::Status {
            status: status.as_u16(),
            errors,
        })
    }
}

#[async_trait]
impl SecretStore for VaultStore {
    async fn fetch(&self, path: &str) -> Result<Option<Snapshot>, StoreError> {
        log::debug!("Reading secret at {}", path);
        let response = self
            .http
            .get(self.url(path))
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            log::debug!("No secret found at {}", path);
            return Ok(None);
        }

        let body: SecretResponse = Self::check(response).await?.json().await?;
        let lease = body.lease();
        Ok(Some(Snapshot::new(body.data.unwrap_or_default(), lease)))
    }

    async fn renew(&self, lease: &Lease, increment: Duration) -> Result<Lease, StoreError> {
        log::debug!("Renewing lease {}", lease.id);
        let request = RenewRequest {
            lease_id: &lease.id,
            increment: increment.as_secs(),
        };
        let response = self
            .http
            .put(self.url("sys/leases/renew"))
            .header(TOKEN_HEADER, &self.token)
            .json(&request)
            .send()
            .await?;

        let body: SecretResponse = Self::check(response).await?.json().await?;
        Ok(body.lease().unwrap_or_else(|| Lease {
            id: lease.id.clone(),
            renewable: body.renewable,
            duration: Duration::from_secs(body.lease_duration),
        }))
    }

    async fn revoke(&self, lease_id: &str) -> Result<(), StoreError> {
        log::debug!("Revoking lease {}", lease_id);
        let response = self
            .http
            .put(self.url("sys/leases/revoke"))
            .header(TOKEN_HEADER, &self.token)
            .json(&RevokeRequest { lease_id })
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn store(server: &MockServer) -> VaultStore {
        let config = VaultConfig {
            address: format!("{}/", server.uri()),
            client_timeout: Duration::from_secs(5),
        };
        VaultStore::with_token(&config, "vault_token").unwrap()
    }

    #[tokio::test]
    async fn fetch_reads_data_and_lease() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/database/creds/readonly"))
            .and(header("X-Vault-Token", "vault_token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "request_id": "5e4c1c5a",
                "lease_id": "database/creds/readonly/2f6a614c",
                "renewable": true,
                "lease_duration": 3600,
                "data": { "username": "v-token-readonly", "password": "A1a-2test" },
                "warnings": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let snapshot = store(&server).await.fetch("database/creds/readonly").await.unwrap().unwrap();
        assert_eq!(snapshot.lease_id(), Some("database/creds/readonly/2f6a614c"));
        assert!(snapshot.renewable());
        assert_eq!(snapshot.lease_duration(), Duration::from_secs(3600));
        assert_eq!(snapshot.data.get("username"), Some(&json!("v-token-readonly")));
    }

    #[tokio::test]
    async fn fetch_keeps_query_of_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/aws/sts/readonly"))
            .and(query_param("ttl", "900s"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": "aws/sts/readonly/x1",
                "renewable": false,
                "lease_duration": 899,
                "data": { "access_key": "ASIA" }
            })))
            .mount(&server)
            .await;

        let snapshot = store(&server).await.fetch("aws/sts/readonly?ttl=900s").await.unwrap().unwrap();
        assert!(!snapshot.renewable());
        assert_eq!(snapshot.lease_id(), Some("aws/sts/readonly/x1"));
    }

    #[tokio::test]
    async fn fetch_static_secret_has_no_lease() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/app"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": "",
                "renewable": false,
                "lease_duration": 2764800,
                "data": { "api_key": "abc" }
            })))
            .mount(&server)
            .await;

        let snapshot = store(&server).await.fetch("secret/app").await.unwrap().unwrap();
        assert!(snapshot.lease.is_none());
        assert_eq!(snapshot.data.len(), 1);
    }

    #[tokio::test]
    async fn fetch_not_found_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({ "errors": [] })))
            .mount(&server)
            .await;

        assert!(store(&server).await.fetch("secret/missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fetch_server_error_carries_vault_errors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(json!({ "errors": ["Vault is sealed"] })))
            .mount(&server)
            .await;

        let err = store(&server).await.fetch("database/creds/readonly").await.unwrap_err();
        match err {
            StoreError::Status { status, errors } => {
                assert_eq!(status, 503);
                assert_eq!(errors, vec!["Vault is sealed".to_string()]);
            }
            other => panic!("unexpected error {}", other),
        }
    }

    #[tokio::test]
    async fn renew_sends_lease_and_increment() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/renew"))
            .and(body_json(json!({ "lease_id": "database/creds/readonly/1", "increment": 3600 })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "lease_id": "database/creds/readonly/1",
                "renewable": true,
                "lease_duration": 3600,
                "data": null
            })))
            .expect(1)
            .mount(&server)
            .await;

        let lease = Lease::new("database/creds/readonly/1", true, Duration::from_secs(3600));
        let renewed = store(&server).await.renew(&lease, lease.duration).await.unwrap();
        assert_eq!(renewed, lease);
    }

    #[tokio::test]
    async fn renew_without_lease_id_keeps_requested_lease() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/renew"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "renewable": true,
                "lease_duration": 1800
            })))
            .expect(1)
            .mount(&server)
            .await;

        let lease = Lease::new("consul/creds/app/3", true, Duration::from_secs(3600));
        let renewed = store(&server).await.renew(&lease, lease.duration).await.unwrap();
        assert_eq!(renewed.id, "consul/creds/app/3");
        assert!(renewed.renewable);
        assert_eq!(renewed.duration, Duration::from_secs(1800));
    }

    #[tokio::test]
    async fn renew_of_unknown_lease_fails() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/renew"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({ "errors": ["lease not found"] })))
            .mount(&server)
            .await;

        let lease = Lease::new("gone", true, Duration::from_secs(60));
        let err = store(&server).await.renew(&lease, lease.duration).await.unwrap_err();
        assert!(matches!(err, StoreError::Status { status: 400, .. }));
    }

    #[tokio::test]
    async fn revoke_puts_lease_id() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/v1/sys/leases/revoke"))
            .and(body_json(json!({ "lease_id": "rabbitmq/creds/app/9" })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        store(&server).await.revoke("rabbitmq/creds/app/9").await.unwrap();
    }
}
