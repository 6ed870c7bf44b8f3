//! This library keeps dynamic Vault secrets (database users, broker accounts,
//! cloud STS tokens) valid for the lifetime of an application. Each secret is
//! fetched once, then renewed or rotated shortly before its lease expires.
//!
//! ## Installation
//! Add the following to your `Cargo.toml` file:
//! ```toml
//! [dependencies]
//! valensas-vault-lease = "0.1.0"
//! ```
//!
//! ## Usage
//! You should define following environment variables to configure Vault.
//!```yaml
//! VAULT_ADDR: "http://localhost:8200"
//! VAULT_CLIENT_TIMEOUT: 5s
//! VAULT_LEASE_EXPIRY_THRESHOLD: 60s
//! VAULT_LEASE_MIN_RENEWAL: 10s
//! VAULT_LEASE_FAILURE_POLICY: Stop
//! VAULT_LEASE_RETRY_DELAY: 10s
//! ```
//!
//! For Kubernetes Configuration:
//! ```yaml
//! VAULT_AUTH_METHOD: Kubernetes
//! VAULT_AUTH_MOUNT_PATH: kubernetes
//! VAULT_KUBERNETES_TOKEN_PATH: /var/run/secrets/kubernetes.io/serviceaccount/token
//! ```
//!
//! For Token Configuration:
//! ```yaml
//! VAULT_AUTH_METHOD: Token
//! VAULT_TOKEN: token
//! ```
//! Given values are default values of the variables.
//! VAULT_LEASE_FAILURE_POLICY can be either Stop or Retry. With Stop, a failed
//! background refresh leaves the last known data in place and nothing is
//! scheduled until `init` is called again.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use valensas_vault_lease::{
//!     backend::SecretBackend, config::LeasePolicy, container::LeaseContainer, store::VaultStore,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(VaultStore::from_env().await?);
//! let container = LeaseContainer::new(store, LeasePolicy::load_env()?);
//!
//! container
//!     .register(SecretBackend::database("readonly").handle("orders-db"))
//!     .await;
//! container.init().await?;
//!
//! let username = container.get("database.username").await;
//!
//! // On shutdown
//! container.destroy().await;
//! # Ok(())
//! # }
//! ```
pub mod auth;
pub mod backend;
pub mod config;
pub mod container;
pub mod error;
pub mod event;
pub mod lease;
pub mod secret;
pub mod store;
pub mod trigger;
