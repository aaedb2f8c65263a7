//! Persistence collaborator.
//!
//! The engine never touches a database directly; it talks to a [`Store`],
//! CRUD-shaped and keyed by numeric id. Writes are atomic and durable by
//! contract of the implementation. [`MemoryStore`] is the in-process
//! implementation used by tests and small deployments.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api;
use crate::config::ProviderConfig;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} with id {id} not found")]
    NotFound { kind: &'static str, id: i64 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Stored ACME account: the local key material plus the remote binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountRecord {
    pub id: i64,
    pub contact: Option<String>,
    /// Account key, PKCS#8 PEM.
    pub key_pem: String,
    /// Remote account URL once registered.
    pub kid: Option<String>,
}

/// Stored order: terminal status plus the issued chain once valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: i64,
    pub account_id: i64,
    pub domains: Vec<String>,
    pub status: api::OrderStatus,
    pub certificate_pem: Option<String>,
}

/// Storage operations the engine needs. `put_*` upserts by id.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put_account(&self, record: AccountRecord) -> Result<(), StoreError>;
    async fn get_account(&self, id: i64) -> Result<AccountRecord, StoreError>;
    async fn delete_account(&self, id: i64) -> Result<(), StoreError>;

    async fn put_order(&self, record: OrderRecord) -> Result<(), StoreError>;
    async fn get_order(&self, id: i64) -> Result<OrderRecord, StoreError>;
    /// All orders belonging to one account.
    async fn list_orders(&self, account_id: i64) -> Result<Vec<OrderRecord>, StoreError>;
    async fn delete_order(&self, id: i64) -> Result<(), StoreError>;

    /// Persist the accepted provider configuration document.
    async fn put_provider_config(&self, config: ProviderConfig) -> Result<(), StoreError>;
    async fn get_provider_config(&self) -> Result<Option<ProviderConfig>, StoreError>;
}

#[derive(Default)]
struct MemoryInner {
    accounts: HashMap<i64, AccountRecord>,
    orders: HashMap<i64, OrderRecord>,
    provider_config: Option<ProviderConfig>,
}

/// In-memory [`Store`].
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_account(&self, record: AccountRecord) -> Result<(), StoreError> {
        self.inner.lock().accounts.insert(record.id, record);
        Ok(())
    }

    async fn get_account(&self, id: i64) -> Result<AccountRecord, StoreError> {
        self.inner
            .lock()
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound {
                kind: "account",
                id,
            })
    }

    async fn delete_account(&self, id: i64) -> Result<(), StoreError> {
        self.inner
            .lock()
            .accounts
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound {
                kind: "account",
                id,
            })
    }

    async fn put_order(&self, record: OrderRecord) -> Result<(), StoreError> {
        self.inner.lock().orders.insert(record.id, record);
        Ok(())
    }

    async fn get_order(&self, id: i64) -> Result<OrderRecord, StoreError> {
        self.inner
            .lock()
            .orders
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound { kind: "order", id })
    }

    async fn list_orders(&self, account_id: i64) -> Result<Vec<OrderRecord>, StoreError> {
        let mut orders: Vec<_> = self
            .inner
            .lock()
            .orders
            .values()
            .filter(|order| order.account_id == account_id)
            .cloned()
            .collect();
        orders.sort_by_key(|order| order.id);
        Ok(orders)
    }

    async fn delete_order(&self, id: i64) -> Result<(), StoreError> {
        self.inner
            .lock()
            .orders
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound { kind: "order", id })
    }

    async fn put_provider_config(&self, config: ProviderConfig) -> Result<(), StoreError> {
        self.inner.lock().provider_config = Some(config);
        Ok(())
    }

    async fn get_provider_config(&self) -> Result<Option<ProviderConfig>, StoreError> {
        Ok(self.inner.lock().provider_config.clone())
    }
}
