use crate::auth::method::{AuthError, AuthMethod, AuthResult};

use async_trait::async_trait;
use vaultrs::client::VaultClient;

pub struct TokenAuth {
    token: String,
}

impl TokenAuth {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

impl std::fmt::Debug for TokenAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuth").field("token", &"***").finish()
    }
}

#[async_trait]
impl AuthMethod for TokenAuth {
    async fn authenticate(&self, _client: &VaultClient) -> Result<AuthResult, AuthError> {
        Ok(AuthResult::token(self.token.clone()))
    }
}
