use crate::secret::Lease;

use tokio::sync::broadcast;

/// Capacity of the lease event channel. Slow listeners lag past this.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum LeaseEventKind {
    /// First successful fetch after `init`.
    Created { lease: Option<Lease> },
    Renewed { lease: Lease },
    Rotated { lease: Option<Lease> },
    /// The lease can no longer be extended.
    Expired { lease: Lease },
    /// A scheduled refresh failed.
    Failed { error: String },
    Revoked { lease: Lease },
}

/// Lifecycle notification for one managed secret.
#[derive(Debug, Clone, PartialEq)]
pub struct LeaseEvent {
    pub secret: String,
    pub kind: LeaseEventKind,
}

impl LeaseEvent {
    pub fn new(secret: impl Into<String>, kind: LeaseEventKind) -> Self {
        Self {
            secret: secret.into(),
            kind,
        }
    }
}

pub(crate) fn channel() -> broadcast::Sender<LeaseEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publishes `event`. Having no listener is fine.
pub(crate) fn publish(sender: &broadcast::Sender<LeaseEvent>, event: LeaseEvent) {
    if sender.send(event).is_err() {
        log::trace!("No listener for lease events");
    }
}
