use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::model::new_id;
use crate::storage::{ContainerInfo, DocumentStore};

/// In-memory document store. Used by tests and by the demo mode, where a
/// throwaway workspace should not touch disk.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<State>>,
}

#[derive(Default)]
struct State {
    containers: Vec<ContainerInfo>,
    documents: HashMap<(String, String), Value>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn load(&self, container_id: &str, key: &str) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(state
            .documents
            .get(&(container_id.to_string(), key.to_string()))
            .cloned())
    }

    async fn save(&self, container_id: &str, key: &str, value: &Value) -> Result<()> {
        let mut state = self.state.write().await;
        state
            .documents
            .insert((container_id.to_string(), key.to_string()), value.clone());
        Ok(())
    }

    async fn find_container(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .containers
            .iter()
            .find(|c| c.name == name && c.parent_id.as_deref() == parent_id)
            .map(|c| c.id.clone()))
    }

    async fn ensure_container(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        let mut state = self.state.write().await;
        if let Some(existing) = state
            .containers
            .iter()
            .find(|c| c.name == name && c.parent_id.as_deref() == parent_id)
        {
            return Ok(existing.id.clone());
        }
        let container = ContainerInfo {
            id: new_id(),
            name: name.to_string(),
            parent_id: parent_id.map(|p| p.to_string()),
        };
        let id = container.id.clone();
        state.containers.push(container);
        Ok(id)
    }

    async fn list_containers(&self, parent_id: Option<&str>) -> Result<Vec<ContainerInfo>> {
        let state = self.state.read().await;
        let mut containers: Vec<ContainerInfo> = state
            .containers
            .iter()
            .filter(|c| c.parent_id.as_deref() == parent_id)
            .cloned()
            .collect();
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }
}
