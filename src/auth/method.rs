use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;
use vaultrs::{api::AuthInfo, client::VaultClient, error::ClientError};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Vault login failed: {0}")]
    Login(#[from] ClientError),
    #[error("Unable to read service account token: {0}")]
    TokenFile(#[from] std::io::Error),
    #[error("Service account token is malformed: {0}")]
    InvalidServiceAccountToken(String),
}

#[derive(Debug)]
pub enum AuthResult {
    Token { token: String },
    AuthInfo { auth_info: AuthInfo },
}

impl AuthResult {
    pub fn token(token: String) -> AuthResult {
        AuthResult::Token { token }
    }

    pub fn auth_info(auth_info: AuthInfo) -> AuthResult {
        AuthResult::AuthInfo { auth_info }
    }

    /// Token to send with every store request.
    pub fn client_token(&self) -> &str {
        match self {
            AuthResult::Token { token } => token,
            AuthResult::AuthInfo { auth_info } => &auth_info.client_token,
        }
    }
}

#[async_trait]
pub trait AuthMethod: Debug + Send + Sync {
    async fn authenticate(&self, client: &VaultClient) -> Result<AuthResult, AuthError>;
}
