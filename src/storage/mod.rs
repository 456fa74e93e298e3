pub mod cache;
pub mod dir;
pub mod memory;
pub mod sqlite;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::Result;

/// Document keys within a client container. Adapters map these onto their
/// own storage (a file name, a table row).
pub const DOC_CHARTS: &str = "charts";
pub const DOC_ISSUES: &str = "issues";
pub const DOC_CYCLES: &str = "cycles";
pub const DOC_ENTITIES: &str = "entities";
pub const DOC_RECORDS: &str = "records";
pub const DOC_CONFIG: &str = "config";

/// Reserved container holding app-level documents, not a client.
pub const APP_CONTAINER: &str = "_app";

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInfo {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// The one storage contract the rest of the system talks to. Containers
/// group a client's documents; documents are opaque JSON values saved
/// whole. Adapters own durability, paths, and schema.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn load(&self, container_id: &str, key: &str) -> Result<Option<Value>>;

    /// Create-or-replace the whole document.
    async fn save(&self, container_id: &str, key: &str, value: &Value) -> Result<()>;

    async fn find_container(&self, name: &str, parent_id: Option<&str>)
        -> Result<Option<String>>;

    /// Find the container, creating it when absent. Returns its id.
    async fn ensure_container(&self, name: &str, parent_id: Option<&str>) -> Result<String>;

    async fn list_containers(&self, parent_id: Option<&str>) -> Result<Vec<ContainerInfo>>;
}

pub type SharedStore = Arc<dyn DocumentStore>;

/// Load and deserialize a document. Missing documents are `None`;
/// storage and parse failures propagate.
pub async fn load_doc<T: DeserializeOwned>(
    store: &dyn DocumentStore,
    container_id: &str,
    key: &str,
) -> Result<Option<T>> {
    match store.load(container_id, key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Degraded read: a missing document, an unreachable backend, or an
/// unparsable body all come back as the default so read surfaces stay up.
/// Failures are logged; writes never get this treatment.
pub async fn load_doc_or_default<T: DeserializeOwned + Default>(
    store: &dyn DocumentStore,
    container_id: &str,
    key: &str,
) -> T {
    match load_doc(store, container_id, key).await {
        Ok(Some(doc)) => doc,
        Ok(None) => T::default(),
        Err(e) => {
            log::warn!("degraded read of {container_id}/{key}: {e}");
            T::default()
        }
    }
}

pub async fn save_doc<T: Serialize>(
    store: &dyn DocumentStore,
    container_id: &str,
    key: &str,
    doc: &T,
) -> Result<()> {
    let value = serde_json::to_value(doc)?;
    store.save(container_id, key, &value).await
}

/// One async mutex per container id. Mutating operations hold the guard
/// across their whole load-mutate-save so concurrent edits to the same
/// client cannot drop each other's writes.
#[derive(Clone, Default)]
pub struct WriteLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl WriteLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, container_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(container_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
