use serde_json::Value;
use std::{collections::HashMap, fmt::{Display, Formatter}, str::FromStr, time::Duration};

/// Key/value payload of a secret as returned by the store.
pub type SecretData = HashMap<String, Value>;

/// How a leased secret is kept valid once it has been fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LeaseMode {
    /// Static secret, never refreshed.
    #[default]
    None,
    /// Extend the lease in place, the credential stays the same.
    Renew,
    /// Drop the credential and read a new one from the same path.
    Rotate,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Lease mode {0} is not valid. Possible values: none, renew, rotate")]
pub struct UnknownLeaseMode(pub String);

impl FromStr for LeaseMode {
    type Err = UnknownLeaseMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(LeaseMode::None),
            "renew" => Ok(LeaseMode::Renew),
            "rotate" => Ok(LeaseMode::Rotate),
            _ => Err(UnknownLeaseMode(s.to_string())),
        }
    }
}

impl Display for LeaseMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Renew => write!(f, "renew"),
            Self::Rotate => write!(f, "rotate"),
        }
    }
}

/// Lease metadata attached to a dynamic secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Lease {
    pub id: String,
    pub renewable: bool,
    pub duration: Duration,
}

impl Lease {
    pub fn new(id: impl Into<String>, renewable: bool, duration: Duration) -> Self {
        Self {
            id: id.into(),
            renewable,
            duration,
        }
    }
}

/// Renames keys of fetched secret data before they are exposed.
///
/// Rules are applied in order; keys without a rule are kept as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropertyTransform {
    rules: Vec<(String, String)>,
}

impl PropertyTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rename(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.rules.push((from.into(), to.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn apply(&self, data: &SecretData) -> SecretData {
        data.iter()
            .map(|(key, value)| {
                let target = self
                    .rules
                    .iter()
                    .find(|(from, _)| from == key)
                    .map(|(_, to)| to.clone())
                    .unwrap_or_else(|| key.clone());
                (target, value.clone())
            })
            .collect()
    }
}

/// Describes what to fetch and how its lease is handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretHandle {
    name: String,
    path: String,
    lease_mode: LeaseMode,
    transform: PropertyTransform,
}

impl SecretHandle {
    pub fn new(name: impl Into<String>, path: impl Into<String>, lease_mode: LeaseMode) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            lease_mode,
            transform: PropertyTransform::default(),
        }
    }

    pub fn with_transform(mut self, transform: PropertyTransform) -> Self {
        self.transform = transform;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn lease_mode(&self) -> LeaseMode {
        self.lease_mode
    }

    pub fn transform(&self) -> &PropertyTransform {
        &self.transform
    }
}

/// A secret as read from the store at one point in time.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub data: SecretData,
    pub lease: Option<Lease>,
}

impl Snapshot {
    pub fn new(data: SecretData, lease: Option<Lease>) -> Self {
        Self { data, lease }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn lease_id(&self) -> Option<&str> {
        self.lease.as_ref().map(|l| l.id.as_str())
    }

    /// Always `false` when there is no lease.
    pub fn renewable(&self) -> bool {
        self.lease.as_ref().is_some_and(|l| l.renewable)
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease.as_ref().map(|l| l.duration).unwrap_or_default()
    }

    /// Keeps the data and replaces the lease, as after a renewal.
    pub fn renewed(&self, lease: Lease) -> Self {
        Self {
            data: self.data.clone(),
            lease: Some(lease),
        }
    }
}
