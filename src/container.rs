use crate::config::LeasePolicy;
use crate::error::LeaseError;
use crate::event::{self, LeaseEvent};
use crate::lease::SecretLease;
use crate::secret::{SecretData, SecretHandle};
use crate::store::SecretStore;

use futures::future::{join_all, try_join_all};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

/// Manages every leased secret of an application against one store.
///
/// Secrets refresh independently of each other; the container only fans
/// `init` and `destroy` out and merges their data.
pub struct LeaseContainer {
    store: Arc<dyn SecretStore>,
    policy: LeasePolicy,
    secrets: RwLock<Vec<SecretLease>>,
    events: broadcast::Sender<LeaseEvent>,
}

impl std::fmt::Debug for LeaseContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LeaseContainer")
            .field("policy", &self.policy)
            .finish()
    }
}

impl LeaseContainer {
    pub fn new(store: Arc<dyn SecretStore>, policy: LeasePolicy) -> Self {
        Self {
            store,
            policy,
            secrets: RwLock::new(Vec::new()),
            events: event::channel(),
        }
    }

    /// Adds a secret. It is not fetched until `init` is called, on the
    /// container or on the returned lease.
    pub async fn register(&self, handle: SecretHandle) -> SecretLease {
        let lease = SecretLease::with_events(
            handle,
            Arc::clone(&self.store),
            self.policy,
            self.events.clone(),
        );
        self.secrets.write().await.push(lease.clone());
        lease
    }

    pub async fn secrets(&self) -> Vec<SecretLease> {
        self.secrets.read().await.clone()
    }

    /// Initializes all registered secrets concurrently and fails with the
    /// first error.
    pub async fn init(&self) -> Result<(), LeaseError> {
        let secrets = self.secrets().await;
        log::debug!("Initializing {} leased secrets", secrets.len());
        try_join_all(secrets.iter().map(|secret| secret.init())).await?;
        Ok(())
    }

    pub async fn destroy(&self) {
        let secrets = self.secrets().await;
        join_all(secrets.iter().map(|secret| secret.destroy())).await;
        log::info!("Destroyed {} leased secrets", secrets.len());
    }

    /// Merged data of all secrets. Later registrations win on duplicate keys.
    pub async fn properties(&self) -> SecretData {
        let mut merged = SecretData::new();
        for secret in self.secrets().await {
            merged.extend(secret.properties().await);
        }
        merged
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        let secrets = self.secrets().await;
        for secret in secrets.iter().rev() {
            if let Some(value) = secret.get(key).await {
                return Some(value);
            }
        }
        None
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.events.subscribe()
    }
}
