use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::info;
use ulid::Ulid;

use crate::limits::MAX_NAME_LEN;
use crate::model::*;

use super::{ProviderState, Store, StoreError};

fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.len() > MAX_NAME_LEN {
        return Err(StoreError::LimitExceeded("name too long"));
    }
    Ok(())
}

impl Store {
    pub async fn create_provider(&self, name: String) -> Result<Provider, StoreError> {
        validate_name(&name)?;
        let _gate = self.compaction_gate.read().await;
        let provider = Provider {
            id: Ulid::new(),
            name,
        };
        let event = Event::ProviderRegistered {
            provider: provider.clone(),
        };
        self.wal_append(&event).await?;
        self.providers.insert(
            provider.id,
            Arc::new(RwLock::new(ProviderState::new(provider.clone()))),
        );
        info!(provider_id = %provider.id, "provider registered");
        Ok(provider)
    }

    pub async fn create_client(&self, name: String) -> Result<Client, StoreError> {
        validate_name(&name)?;
        let _gate = self.compaction_gate.read().await;
        let client = Client {
            id: Ulid::new(),
            name,
        };
        let event = Event::ClientRegistered {
            client: client.clone(),
        };
        self.wal_append(&event).await?;
        self.clients.insert(client.id, client.clone());
        info!(client_id = %client.id, "client registered");
        Ok(client)
    }

    pub fn provider_exists(&self, id: &Ulid) -> bool {
        self.providers.contains_key(id)
    }

    pub fn client_exists(&self, id: &Ulid) -> bool {
        self.clients.contains_key(id)
    }

    pub async fn get_provider(&self, id: &Ulid) -> Option<Provider> {
        let ps = self.partition(id)?;
        let guard = ps.read().await;
        Some(guard.provider.clone())
    }

    pub fn get_client(&self, id: &Ulid) -> Option<Client> {
        self.clients.get(id).map(|e| e.value().clone())
    }
}
