use crate::auth::kubernetes::KubernetesAuth;
use crate::auth::method::{AuthError, AuthMethod};
use crate::auth::token::TokenAuth;

use duration_string::DurationString;
use std::{env, sync::Arc, time::Duration};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("VAULT_TOKEN must be set for token authentication")]
    MissingToken,
    #[error("Auth method {0} is not valid. Possible values: Token, Kubernetes")]
    UnknownAuthMethod(String),
    #[error("Error parsing {0} `{1}': {2}")]
    InvalidDuration(&'static str, String, String),
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("Refresh failure policy {0} is not valid. Possible values: Stop, Retry")]
    UnknownFailurePolicy(String),
    #[error("Unable to initialize Kubernetes authentication: {0}")]
    KubernetesAuthError(#[source] AuthError),
}

#[derive(Clone, Debug)]
pub struct VaultConfig {
    pub address: String,
    pub client_timeout: Duration,
}

impl VaultConfig {
    pub fn load_env() -> Result<(Self, Arc<dyn AuthMethod>), ConfigError> {
        Self::load(|key| env::var(key).ok())
    }

    /// Same as [`VaultConfig::load_env`] with a custom key lookup.
    pub fn load<F>(lookup: F) -> Result<(Self, Arc<dyn AuthMethod>), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let method = lookup("VAULT_AUTH_METHOD").unwrap_or_else(|| String::from("Token"));

        let auth_method: Arc<dyn AuthMethod> = match method.as_str() {
            "Token" => match lookup("VAULT_TOKEN") {
                Some(token) => Arc::new(TokenAuth::new(token)),
                None => return Err(ConfigError::MissingToken),
            },
            "Kubernetes" => {
                let sa_token_path = lookup("VAULT_KUBERNETES_TOKEN_PATH");
                let auth_mount_path = lookup("VAULT_AUTH_MOUNT_PATH");
                KubernetesAuth::new(auth_mount_path, sa_token_path)
                    .map(|k_auth| Arc::new(k_auth) as Arc<dyn AuthMethod>)
                    .map_err(ConfigError::KubernetesAuthError)?
            }
            method => return Err(ConfigError::UnknownAuthMethod(method.to_string())),
        };

        let address = lookup("VAULT_ADDR").unwrap_or(String::from("http://localhost:8200"));
        let client_timeout = duration(&lookup, "VAULT_CLIENT_TIMEOUT", "5s")?;

        Ok((
            VaultConfig {
                address,
                client_timeout,
            },
            auth_method,
        ))
    }
}

/// What happens when a scheduled refresh fails.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum RefreshFailurePolicy {
    /// Keep the last data and stop refreshing until the next `init`.
    #[default]
    Stop,
    /// Try the same refresh again after `delay`.
    Retry { delay: Duration },
}

/// Timing parameters shared by every renewal trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LeasePolicy {
    /// How long before the lease expires a refresh is attempted.
    pub expiry_threshold: Duration,
    /// Lower bound of the delay between two refreshes.
    pub min_renewal: Duration,
    pub failure_policy: RefreshFailurePolicy,
}

impl Default for LeasePolicy {
    fn default() -> Self {
        Self {
            expiry_threshold: Duration::from_secs(60),
            min_renewal: Duration::from_secs(10),
            failure_policy: RefreshFailurePolicy::Stop,
        }
    }
}

impl LeasePolicy {
    pub fn load_env() -> Result<Self, ConfigError> {
        Self::load(|key| env::var(key).ok())
    }

    pub fn load<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let expiry_threshold = duration(&lookup, "VAULT_LEASE_EXPIRY_THRESHOLD", "60s")?;
        let min_renewal = positive_duration(&lookup, "VAULT_LEASE_MIN_RENEWAL", "10s")?;

        let policy = lookup("VAULT_LEASE_FAILURE_POLICY").unwrap_or_else(|| String::from("Stop"));
        let failure_policy = match policy.as_str() {
            "Stop" => RefreshFailurePolicy::Stop,
            "Retry" => RefreshFailurePolicy::Retry {
                delay: positive_duration(&lookup, "VAULT_LEASE_RETRY_DELAY", "10s")?,
            },
            other => return Err(ConfigError::UnknownFailurePolicy(other.to_string())),
        };

        Ok(Self {
            expiry_threshold,
            min_renewal,
            failure_policy,
        })
    }
}

fn duration<F>(lookup: &F, key: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_else(|| default.to_string());

    match DurationString::from_string(value.clone()) {
        Ok(parsed) => Ok(Duration::from(parsed)),
        Err(err) => Err(ConfigError::InvalidDuration(key, value, err.to_string())),
    }
}

/// A zero delay would let a refresh re-arm itself without pause.
fn positive_duration<F>(lookup: &F, key: &'static str, default: &str) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let value = duration(lookup, key, default)?;
    if value.is_zero() {
        return Err(ConfigError::ZeroDuration(key));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn token_config_uses_defaults() {
        let (config, auth) = VaultConfig::load(lookup(&[("VAULT_TOKEN", "vault_token")])).unwrap();
        assert_eq!(config.address, "http://localhost:8200");
        assert_eq!(config.client_timeout, Duration::from_secs(5));
        assert!(format!("{:?}", auth).contains("TokenAuth"));
    }

    #[test]
    fn token_config_requires_token() {
        let err = VaultConfig::load(lookup(&[("VAULT_AUTH_METHOD", "Token")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingToken));
    }

    #[test]
    fn unknown_auth_method_is_rejected() {
        let err = VaultConfig::load(lookup(&[("VAULT_AUTH_METHOD", "AppRole")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownAuthMethod(m) if m == "AppRole"));
    }

    #[test]
    fn invalid_timeout_is_reported_with_key() {
        let err = VaultConfig::load(lookup(&[
            ("VAULT_TOKEN", "t"),
            ("VAULT_CLIENT_TIMEOUT", "soon"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("VAULT_CLIENT_TIMEOUT"));
    }

    #[test]
    fn lease_policy_defaults() {
        let policy = LeasePolicy::load(lookup(&[])).unwrap();
        assert_eq!(policy, LeasePolicy::default());
    }

    #[test]
    fn lease_policy_retry() {
        let policy = LeasePolicy::load(lookup(&[
            ("VAULT_LEASE_EXPIRY_THRESHOLD", "30s"),
            ("VAULT_LEASE_MIN_RENEWAL", "5s"),
            ("VAULT_LEASE_FAILURE_POLICY", "Retry"),
            ("VAULT_LEASE_RETRY_DELAY", "1m"),
        ]))
        .unwrap();
        assert_eq!(policy.expiry_threshold, Duration::from_secs(30));
        assert_eq!(policy.min_renewal, Duration::from_secs(5));
        assert_eq!(
            policy.failure_policy,
            RefreshFailurePolicy::Retry {
                delay: Duration::from_secs(60)
            }
        );
    }

    #[test]
    fn unknown_failure_policy_is_rejected() {
        let err = LeasePolicy::load(lookup(&[("VAULT_LEASE_FAILURE_POLICY", "Backoff")])).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFailurePolicy(_)));
    }

    #[test]
    fn zero_min_renewal_is_rejected() {
        let err = LeasePolicy::load(lookup(&[("VAULT_LEASE_MIN_RENEWAL", "0s")])).unwrap_err();
        assert!(matches!(err, ConfigError::ZeroDuration("VAULT_LEASE_MIN_RENEWAL")));
    }

    #[test]
    fn zero_retry_delay_is_rejected() {
        let err = LeasePolicy::load(lookup(&[
            ("VAULT_LEASE_FAILURE_POLICY", "Retry"),
            ("VAULT_LEASE_RETRY_DELAY", "0s"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains("VAULT_LEASE_RETRY_DELAY"));
    }
}
