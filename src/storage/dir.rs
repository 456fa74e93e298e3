use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::storage::{ContainerInfo, DocumentStore};

/// Document store over a plain directory tree: one folder per container,
/// one pretty-printed `<key>.json` per document. Container ids are the
/// folder paths relative to the root, so they stay stable across moves of
/// the root itself.
#[derive(Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Open under the default data directory (`~/.kaizendw/data`).
    pub async fn open_default() -> Result<Self> {
        let root = dirs::home_dir()
            .ok_or_else(|| Error::Config("cannot determine home directory".into()))?
            .join(".kaizendw")
            .join("data");
        Self::open(root).await
    }

    fn container_path(&self, container_id: &str) -> Result<PathBuf> {
        for part in container_id.split('/') {
            validate_segment(part)?;
        }
        Ok(self.root.join(container_id))
    }

    fn document_path(&self, container_id: &str, key: &str) -> Result<PathBuf> {
        validate_segment(key)?;
        Ok(self.container_path(container_id)?.join(format!("{key}.json")))
    }
}

/// Names become path segments, so anything that could escape the root
/// is refused rather than sanitized.
fn validate_segment(segment: &str) -> Result<()> {
    if segment.is_empty()
        || segment == "."
        || segment == ".."
        || segment.contains('/')
        || segment.contains('\\')
    {
        return Err(Error::Validation(format!("invalid name: {segment:?}")));
    }
    Ok(())
}

fn child_id(parent_id: Option<&str>, name: &str) -> String {
    match parent_id {
        Some(parent) => format!("{parent}/{name}"),
        None => name.to_string(),
    }
}

#[async_trait]
impl DocumentStore for DirStore {
    async fn load(&self, container_id: &str, key: &str) -> Result<Option<Value>> {
        let path = self.document_path(container_id, key)?;
        match tokio::fs::read_to_string(&path).await {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, container_id: &str, key: &str, value: &Value) -> Result<()> {
        let path = self.document_path(container_id, key)?;
        let dir = self.container_path(container_id)?;
        tokio::fs::create_dir_all(&dir).await?;
        let body = serde_json::to_string_pretty(value)?;
        // Write-then-rename so a crash mid-write leaves the old document.
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn find_container(
        &self,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<Option<String>> {
        validate_segment(name)?;
        let id = child_id(parent_id, name);
        let path = self.container_path(&id)?;
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(Some(id)),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_container(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
        validate_segment(name)?;
        let id = child_id(parent_id, name);
        let path = self.container_path(&id)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(id)
    }

    async fn list_containers(&self, parent_id: Option<&str>) -> Result<Vec<ContainerInfo>> {
        let dir = match parent_id {
            Some(parent) => self.container_path(parent)?,
            None => self.root.clone(),
        };
        let mut containers = Vec::new();
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(containers),
            Err(e) => return Err(e.into()),
        };
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(|s| s.to_string()) else {
                continue;
            };
            containers.push(ContainerInfo {
                id: child_id(parent_id, &name),
                name,
                parent_id: parent_id.map(|p| p.to_string()),
            });
        }
        containers.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(containers)
    }
}
