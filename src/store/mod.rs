//! Access to the remote secret store.

pub mod vault;

use crate::error::StoreError;
use crate::secret::{Lease, Snapshot};

use async_trait::async_trait;
use std::time::Duration;

pub use vault::VaultStore;

/// Read, renew and revoke operations the lease scheduler relies on.
///
/// Implementations are shared between every managed secret and must be
/// callable concurrently.
#[async_trait]
pub trait SecretStore: Send + Sync {
    /// Reads the secret at `path`. `Ok(None)` means there is nothing there.
    async fn fetch(&self, path: &str) -> Result<Option<Snapshot>, StoreError>;

    /// Extends `lease` by `increment` and returns the updated lease.
    async fn renew(&self, lease: &Lease, increment: Duration) -> Result<Lease, StoreError>;

    async fn revoke(&self, lease_id: &str) -> Result<(), StoreError>;
}
