use crate::auth::method::{AuthError, AuthMethod, AuthResult};

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use std::fs;
use vaultrs::{auth::kubernetes, client::VaultClient};

const DEFAULT_TOKEN_PATH: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

#[derive(Deserialize)]
struct ServiceAccount {
    name: String,
}

#[derive(Deserialize)]
struct KubernetesIO {
    serviceaccount: ServiceAccount,
}

#[derive(Deserialize)]
struct K8sClaims {
    #[serde(rename = "kubernetes.io")]
    kubernetes_io: KubernetesIO,
}

/// Logs in with the pod's service account JWT. The Vault role is the
/// service account name.
pub struct KubernetesAuth {
    mount: String,
    role: String,
    token: String,
}

impl std::fmt::Debug for KubernetesAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubernetesAuth")
            .field("mount", &self.mount)
            .field("role", &self.role)
            .finish()
    }
}

impl KubernetesAuth {
    pub fn new(mount: Option<String>, sa_token_path: Option<String>) -> Result<Self, AuthError> {
        let path = sa_token_path.unwrap_or_else(|| DEFAULT_TOKEN_PATH.to_string());
        let token = fs::read_to_string(path)?;
        Self::from_token(mount, token.trim().to_string())
    }

    pub fn from_token(mount: Option<String>, token: String) -> Result<Self, AuthError> {
        let role = service_account_name(&token)?;

        Ok(Self {
            mount: mount.unwrap_or_else(|| "kubernetes".to_string()),
            role,
            token,
        })
    }

    pub fn role(&self) -> &str {
        &self.role
    }
}

fn service_account_name(jwt: &str) -> Result<String, AuthError> {
    let claims = jwt
        .split('.')
        .nth(1)
        .ok_or_else(|| AuthError::InvalidServiceAccountToken("missing claims segment".to_string()))?;

    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(claims.trim_end_matches('='))
        .map_err(|e| AuthError::InvalidServiceAccountToken(e.to_string()))?;

    serde_json::from_slice::<K8sClaims>(&decoded)
        .map(|c| c.kubernetes_io.serviceaccount.name)
        .map_err(|e| AuthError::InvalidServiceAccountToken(e.to_string()))
}

#[async_trait]
impl AuthMethod for KubernetesAuth {
    async fn authenticate(&self, client: &VaultClient) -> Result<AuthResult, AuthError> {
        log::debug!("Logging in to Vault with Kubernetes role {}", self.role);
        let auth_info = kubernetes::login(client, &self.mount, &self.role, &self.token).await?;
        Ok(AuthResult::auth_info(auth_info))
    }
}
