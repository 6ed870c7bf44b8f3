//! Paths and property names of the dynamic secret engines.

use crate::secret::{LeaseMode, PropertyTransform, SecretHandle};

use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwsCredentialType {
    /// IAM user, renewable.
    Iam,
    /// STS token, minted fresh on every read.
    Sts { ttl: Option<Duration> },
}

/// A secret engine family and the settings it needs to locate a credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretBackend {
    Database {
        mount: String,
        role: String,
        username_property: String,
        password_property: String,
    },
    Aws {
        mount: String,
        role: String,
        credential_type: AwsCredentialType,
        access_key_property: String,
        secret_key_property: String,
        session_token_property: String,
    },
    Consul {
        mount: String,
        role: String,
        token_property: String,
    },
    RabbitMq {
        mount: String,
        role: String,
        username_property: String,
        password_property: String,
    },
    Ldap {
        mount: String,
        role: String,
        /// Dynamic roles mint a new account, static roles rotate server side.
        dynamic: bool,
        username_property: String,
        password_property: String,
    },
    Generic {
        path: String,
        lease_mode: LeaseMode,
    },
}

/// Where a backend's secret lives and how it is refreshed and exposed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub path: String,
    pub lease_mode: LeaseMode,
    pub transform: PropertyTransform,
}

impl SecretBackend {
    pub fn database(role: impl Into<String>) -> Self {
        SecretBackend::Database {
            mount: "database".to_string(),
            role: role.into(),
            username_property: "database.username".to_string(),
            password_property: "database.password".to_string(),
        }
    }

    pub fn aws(role: impl Into<String>, credential_type: AwsCredentialType) -> Self {
        SecretBackend::Aws {
            mount: "aws".to_string(),
            role: role.into(),
            credential_type,
            access_key_property: "aws.access-key".to_string(),
            secret_key_property: "aws.secret-key".to_string(),
            session_token_property: "aws.session-token".to_string(),
        }
    }

    pub fn consul(role: impl Into<String>) -> Self {
        SecretBackend::Consul {
            mount: "consul".to_string(),
            role: role.into(),
            token_property: "consul.token".to_string(),
        }
    }

    pub fn rabbitmq(role: impl Into<String>) -> Self {
        SecretBackend::RabbitMq {
            mount: "rabbitmq".to_string(),
            role: role.into(),
            username_property: "rabbitmq.username".to_string(),
            password_property: "rabbitmq.password".to_string(),
        }
    }

    pub fn ldap(role: impl Into<String>, dynamic: bool) -> Self {
        SecretBackend::Ldap {
            mount: "ldap".to_string(),
            role: role.into(),
            dynamic,
            username_property: "ldap.username".to_string(),
            password_property: "ldap.password".to_string(),
        }
    }

    pub fn generic(path: impl Into<String>, lease_mode: LeaseMode) -> Self {
        SecretBackend::Generic {
            path: path.into(),
            lease_mode,
        }
    }

    pub fn describe(&self) -> BackendDescriptor {
        match self {
            SecretBackend::Database {
                mount,
                role,
                username_property,
                password_property,
            }
            | SecretBackend::RabbitMq {
                mount,
                role,
                username_property,
                password_property,
            } => BackendDescriptor {
                path: format!("{}/creds/{}", mount, role),
                lease_mode: LeaseMode::Renew,
                transform: credentials(username_property, password_property),
            },
            SecretBackend::Aws {
                mount,
                role,
                credential_type,
                access_key_property,
                secret_key_property,
                session_token_property,
            } => {
                let transform = PropertyTransform::new()
                    .rename("access_key", access_key_property.as_str())
                    .rename("secret_key", secret_key_property.as_str())
                    .rename("security_token", session_token_property.as_str());

                match credential_type {
                    AwsCredentialType::Iam => BackendDescriptor {
                        path: format!("{}/creds/{}", mount, role),
                        lease_mode: LeaseMode::Renew,
                        transform,
                    },
                    AwsCredentialType::Sts { ttl } => {
                        let mut path = format!("{}/sts/{}", mount, role);
                        if let Some(ttl) = ttl {
                            path.push_str(&format!("?ttl={}s", ttl.as_secs()));
                        }
                        BackendDescriptor {
                            path,
                            lease_mode: LeaseMode::Rotate,
                            transform,
                        }
                    }
                }
            }
            SecretBackend::Consul {
                mount,
                role,
                token_property,
            } => BackendDescriptor {
                path: format!("{}/creds/{}", mount, role),
                lease_mode: LeaseMode::Renew,
                transform: PropertyTransform::new().rename("token", token_property.as_str()),
            },
            SecretBackend::Ldap {
                mount,
                role,
                dynamic,
                username_property,
                password_property,
            } => {
                let (path, lease_mode) = if *dynamic {
                    (format!("{}/creds/{}", mount, role), LeaseMode::Rotate)
                } else {
                    (format!("{}/static-cred/{}", mount, role), LeaseMode::None)
                };
                BackendDescriptor {
                    path,
                    lease_mode,
                    transform: credentials(username_property, password_property),
                }
            }
            SecretBackend::Generic { path, lease_mode } => BackendDescriptor {
                path: path.clone(),
                lease_mode: *lease_mode,
                transform: PropertyTransform::new(),
            },
        }
    }

    pub fn handle(&self, name: impl Into<String>) -> SecretHandle {
        let BackendDescriptor {
            path,
            lease_mode,
            transform,
        } = self.describe();
        SecretHandle::new(name, path, lease_mode).with_transform(transform)
    }
}

fn credentials(username_property: &str, password_property: &str) -> PropertyTransform {
    PropertyTransform::new()
        .rename("username", username_property)
        .rename("password", password_property)
}
