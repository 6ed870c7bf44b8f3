use std::sync::Arc;

use tokio::{select, signal::unix::{signal, SignalKind}};
use valensas_vault_lease::{
    backend::{AwsCredentialType, SecretBackend},
    config::LeasePolicy,
    container::LeaseContainer,
    event::LeaseEventKind,
    store::VaultStore,
};

#[tokio::main]
async fn main() {
    std::env::set_var("VAULT_ADDR", "http://127.0.0.1:8200");
    std::env::set_var("VAULT_TOKEN", "vault_token");
    std::env::set_var("VAULT_AUTH_METHOD", "Token");

    let store = match VaultStore::from_env().await {
        Ok(store) => Arc::new(store),
        Err(err) => {
            println!("could not connect to vault: {}", err);
            return;
        }
    };
    let policy = LeasePolicy::load_env().unwrap_or_default();
    let container = LeaseContainer::new(store, policy);

    container
        .register(SecretBackend::database("readonly").handle("orders-db"))
        .await;
    container
        .register(SecretBackend::aws("readonly", AwsCredentialType::Sts { ttl: None }).handle("s3"))
        .await;

    // Rebind whatever depends on the credentials when they change
    let mut events = container.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event.kind {
                LeaseEventKind::Rotated { .. } => println!("{} rotated, reconnecting", event.secret),
                LeaseEventKind::Failed { error } => println!("{} refresh failed: {}", event.secret, error),
                _ => {}
            }
        }
    });

    if let Err(err) = container.init().await {
        println!("secrets could not be initialized: {}", err);
        return;
    }
    println!("database user: {:?}", container.get("database.username").await);

    let mut sigterm = signal(SignalKind::terminate()).unwrap();
    let mut sigint = signal(SignalKind::interrupt()).unwrap();
    select! {
        _ = sigterm.recv() => println!("Sigterm received"),
        _ = sigint.recv() => println!("Sigint received"),
    }

    // Revokes renewable leases so credentials do not outlive the process
    container.destroy().await;
    println!("leases released");
}
