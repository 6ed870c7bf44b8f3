//! Keeps one leased secret valid: fetch, schedule, renew or rotate, re-arm.

use crate::config::{LeasePolicy, RefreshFailurePolicy};
use crate::error::{LeaseError, StoreError};
use crate::event::{self, LeaseEvent, LeaseEventKind};
use crate::secret::{Lease, LeaseMode, SecretData, SecretHandle, Snapshot};
use crate::store::SecretStore;
use crate::trigger::{RenewalTrigger, ScheduledRefresh};

use futures::FutureExt;
use serde_json::Value;
use std::sync::Arc;
use tokio::{
    sync::{broadcast, Mutex},
    time::Instant,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaseState {
    Uninitialized,
    Active,
    Destroyed,
}

struct Cycle {
    state: LeaseState,
    snapshot: Snapshot,
    /// Transformed view of `snapshot.data`.
    properties: SecretData,
    pending: Option<ScheduledRefresh>,
    /// Bumped by every `init` and `destroy`. Timers and refreshes of an older
    /// generation must not touch the cycle.
    generation: u64,
}

impl Cycle {
    fn is_current(&self, generation: u64) -> bool {
        self.state == LeaseState::Active && self.generation == generation
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.cancel();
        }
    }
}

struct Inner {
    handle: SecretHandle,
    store: Arc<dyn SecretStore>,
    policy: LeasePolicy,
    cycle: Mutex<Cycle>,
    events: broadcast::Sender<LeaseEvent>,
}

/// A managed secret whose lease is renewed or rotated in the background.
///
/// Cloning is cheap and every clone refers to the same cycle.
#[derive(Clone)]
pub struct SecretLease {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SecretLease {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretLease")
            .field("handle", &self.inner.handle)
            .field("policy", &self.inner.policy)
            .finish()
    }
}

impl SecretLease {
    pub fn new(handle: SecretHandle, store: Arc<dyn SecretStore>, policy: LeasePolicy) -> Self {
        Self::with_events(handle, store, policy, event::channel())
    }

    pub(crate) fn with_events(
        handle: SecretHandle,
        store: Arc<dyn SecretStore>,
        policy: LeasePolicy,
        events: broadcast::Sender<LeaseEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                handle,
                store,
                policy,
                cycle: Mutex::new(Cycle {
                    state: LeaseState::Uninitialized,
                    snapshot: Snapshot::empty(),
                    properties: SecretData::new(),
                    pending: None,
                    generation: 0,
                }),
                events,
            }),
        }
    }

    pub fn handle(&self) -> &SecretHandle {
        &self.inner.handle
    }

    /// Fetches the secret and arms its refresh cycle.
    ///
    /// Calling it again cancels the previous schedule before fetching, so at
    /// most one schedule exists afterwards. A fetch error is returned as is
    /// and leaves the secret without schedule. If the secret is destroyed
    /// while the fetch runs, a renewable lease it returned is revoked and
    /// `LeaseError::Destroyed` is returned.
    pub async fn init(&self) -> Result<(), LeaseError> {
        let inner = &self.inner;
        let generation = {
            let mut cycle = inner.cycle.lock().await;
            if cycle.state == LeaseState::Destroyed {
                return Err(destroyed(inner));
            }
            cycle.cancel_pending();
            cycle.generation += 1;
            cycle.generation
        };

        log::debug!(
            "Initializing secret {} from {}",
            inner.handle.name(),
            inner.handle.path()
        );
        let snapshot = fetch_or_empty(inner).await?;
        let lease = snapshot.lease.clone();

        {
            let mut cycle = inner.cycle.lock().await;
            if cycle.state == LeaseState::Destroyed {
                drop(cycle);
                revoke_dropped(inner, snapshot).await;
                return Err(destroyed(inner));
            }
            if cycle.generation != generation {
                log::debug!(
                    "Initialization of {} was superseded, dropping result",
                    inner.handle.name()
                );
                return Ok(());
            }
            cycle.state = LeaseState::Active;
            apply(inner, &mut cycle, snapshot, generation);
        }

        event::publish(
            &inner.events,
            LeaseEvent::new(inner.handle.name(), LeaseEventKind::Created { lease }),
        );
        Ok(())
    }

    /// Cancels the schedule and revokes a renewable lease.
    ///
    /// Safe to call at any time and more than once. Revocation is attempted
    /// once and its failure is only logged.
    pub async fn destroy(&self) {
        let inner = &self.inner;
        let lease = {
            let mut cycle = inner.cycle.lock().await;
            if cycle.state == LeaseState::Destroyed {
                return;
            }
            cycle.state = LeaseState::Destroyed;
            cycle.generation += 1;
            cycle.cancel_pending();
            cycle.snapshot.lease.clone().filter(|lease| lease.renewable)
        };

        match lease {
            Some(lease) => revoke(inner, lease).await,
            None => log::debug!("Destroyed secret {}", inner.handle.name()),
        }
    }

    pub async fn get(&self, key: &str) -> Option<Value> {
        self.inner.cycle.lock().await.properties.get(key).cloned()
    }

    /// Copy of the current key/value view.
    pub async fn properties(&self) -> SecretData {
        self.inner.cycle.lock().await.properties.clone()
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.cycle.lock().await.snapshot.clone()
    }

    pub async fn state(&self) -> LeaseState {
        self.inner.cycle.lock().await.state
    }

    pub async fn is_scheduled(&self) -> bool {
        self.inner.cycle.lock().await.pending.is_some()
    }

    /// Deadline of the armed refresh, if any.
    pub async fn next_refresh(&self) -> Option<Instant> {
        self.inner
            .cycle
            .lock()
            .await
            .pending
            .as_ref()
            .map(ScheduledRefresh::deadline)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<LeaseEvent> {
        self.inner.events.subscribe()
    }
}

fn destroyed(inner: &Inner) -> LeaseError {
    LeaseError::Destroyed {
        secret: inner.handle.name().to_string(),
    }
}

async fn revoke(inner: &Inner, lease: Lease) {
    match inner.store.revoke(&lease.id).await {
        Ok(()) => {
            log::info!("Revoked lease {} of {}", lease.id, inner.handle.name());
            event::publish(
                &inner.events,
                LeaseEvent::new(inner.handle.name(), LeaseEventKind::Revoked { lease }),
            );
        }
        Err(err) => {
            log::warn!(
                "Unable to revoke lease {} of {}: {}",
                lease.id,
                inner.handle.name(),
                err
            );
        }
    }
}

/// Revokes the renewable lease of a snapshot fetched after `destroy`.
async fn revoke_dropped(inner: &Inner, snapshot: Snapshot) {
    if let Some(lease) = snapshot.lease.filter(|lease| lease.renewable) {
        log::debug!(
            "Secret {} was destroyed while fetching, revoking lease {}",
            inner.handle.name(),
            lease.id
        );
        revoke(inner, lease).await;
    }
}

async fn fetch_or_empty(inner: &Inner) -> Result<Snapshot, StoreError> {
    match inner.store.fetch(inner.handle.path()).await? {
        Some(snapshot) => Ok(snapshot),
        None => {
            log::info!(
                "No secret found for {} at {}",
                inner.handle.name(),
                inner.handle.path()
            );
            Ok(Snapshot::empty())
        }
    }
}

/// Stores `snapshot` in the cycle and arms the next refresh when the lease
/// calls for one.
fn apply(inner: &Arc<Inner>, cycle: &mut Cycle, snapshot: Snapshot, generation: u64) {
    cycle.properties = inner.handle.transform().apply(&snapshot.data);
    cycle.snapshot = snapshot;

    if let Some(lease) = refreshable_lease(inner.handle.lease_mode(), &cycle.snapshot) {
        let trigger = RenewalTrigger::new(lease.duration, &inner.policy);
        cycle.pending = schedule(inner, trigger, generation);
    }
}

fn refreshable_lease(mode: LeaseMode, snapshot: &Snapshot) -> Option<&Lease> {
    let lease = snapshot.lease.as_ref()?;
    match mode {
        LeaseMode::None => None,
        LeaseMode::Renew if !lease.renewable => None,
        LeaseMode::Renew | LeaseMode::Rotate => Some(lease),
    }
}

fn schedule(inner: &Arc<Inner>, trigger: RenewalTrigger, generation: u64) -> Option<ScheduledRefresh> {
    log::debug!(
        "Scheduling {} of {} in {:?}",
        inner.handle.lease_mode(),
        inner.handle.name(),
        trigger.delay()
    );
    ScheduledRefresh::arm(trigger, refresh(Arc::clone(inner), generation).boxed())
}

enum Outcome {
    Renewed { snapshot: Snapshot, lease: Lease },
    Rotated(Snapshot),
    Expired(Lease),
}

async fn refresh(inner: Arc<Inner>, generation: u64) {
    let current = {
        let mut cycle = inner.cycle.lock().await;
        if !cycle.is_current(generation) {
            return;
        }
        // The timer that called us has fired.
        cycle.pending = None;
        cycle.snapshot.clone()
    };

    let outcome = match inner.handle.lease_mode() {
        LeaseMode::Rotate => {
            log::debug!("Rotating secret {}", inner.handle.name());
            fetch_or_empty(&inner).await.map(Outcome::Rotated)
        }
        LeaseMode::Renew => match current.lease.as_ref() {
            Some(lease) => renew(&inner, &current, lease).await,
            None => return,
        },
        LeaseMode::None => return,
    }
    .map_err(|err| err.to_string());

    let mut cycle = inner.cycle.lock().await;
    if !cycle.is_current(generation) {
        log::debug!(
            "Refresh of {} was superseded, dropping result",
            inner.handle.name()
        );
        if cycle.state == LeaseState::Destroyed {
            drop(cycle);
            if let Ok(Outcome::Rotated(snapshot)) = outcome {
                revoke_dropped(&inner, snapshot).await;
            }
        }
        return;
    }

    let name = inner.handle.name();
    let kind = match outcome {
        Ok(Outcome::Renewed { snapshot, lease }) => {
            apply(&inner, &mut cycle, snapshot, generation);
            log::info!("Renewed lease {} of {} for {:?}", lease.id, name, lease.duration);
            LeaseEventKind::Renewed { lease }
        }
        Ok(Outcome::Rotated(snapshot)) => {
            let lease = snapshot.lease.clone();
            apply(&inner, &mut cycle, snapshot, generation);
            log::info!("Rotated secret {}", name);
            LeaseEventKind::Rotated { lease }
        }
        Ok(Outcome::Expired(lease)) => {
            log::warn!(
                "Lease {} of {} cannot be extended any further, it expires in {:?}",
                lease.id,
                name,
                lease.duration
            );
            cycle.snapshot = current.renewed(lease.clone());
            LeaseEventKind::Expired { lease }
        }
        Err(error) => {
            log::error!("Unable to refresh secret {}: {}", name, error);
            if let RefreshFailurePolicy::Retry { delay } = inner.policy.failure_policy {
                log::info!("Retrying refresh of {} in {:?}", name, delay);
                cycle.pending = schedule(&inner, RenewalTrigger::after(delay), generation);
            }
            LeaseEventKind::Failed { error }
        }
    };
    drop(cycle);

    event::publish(&inner.events, LeaseEvent::new(name, kind));
}

async fn renew(inner: &Inner, current: &Snapshot, lease: &Lease) -> Result<Outcome, StoreError> {
    log::debug!("Renewing lease {} of {}", lease.id, inner.handle.name());
    let renewed = inner.store.renew(lease, lease.duration).await?;

    // A lease capped by its max TTL comes back shorter than asked for.
    if renewed.duration < inner.policy.min_renewal {
        return Ok(Outcome::Expired(renewed));
    }
    Ok(Outcome::Renewed {
        snapshot: current.renewed(renewed.clone()),
        lease: renewed,
    })
}
