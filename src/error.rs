use crate::auth::method::AuthError;
use thiserror::Error;

/// Failure talking to the secret store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request to Vault failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("Vault responded with status {}: {}", .status, .errors.join(", "))]
    Status { status: u16, errors: Vec<String> },
    #[error("Unable to build Vault client: {0}")]
    Client(String),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

#[derive(Debug, Error)]
pub enum LeaseError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Secret {secret} has been destroyed")]
    Destroyed { secret: String },
}
