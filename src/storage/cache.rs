use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::metrics::types::LongRecord;

/// Record documents are the largest thing we load and every chart on a
/// dashboard needs them, so reads go through a short TTL cache keyed by
/// container id. Anything that rewrites a client's records must call
/// `invalidate` for that client.
#[derive(Clone)]
pub struct RecordCache {
    inner: Cache<String, Arc<Vec<LongRecord>>>,
}

impl RecordCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            inner: Cache::builder().time_to_live(ttl).build(),
        }
    }

    pub fn with_default_ttl() -> Self {
        Self::new(Duration::from_secs(300))
    }

    pub async fn get(&self, container_id: &str) -> Option<Arc<Vec<LongRecord>>> {
        self.inner.get(container_id).await
    }

    pub async fn put(&self, container_id: &str, records: Vec<LongRecord>) -> Arc<Vec<LongRecord>> {
        let records = Arc::new(records);
        self.inner
            .insert(container_id.to_string(), records.clone())
            .await;
        records
    }

    pub async fn invalidate(&self, container_id: &str) {
        self.inner.invalidate(container_id).await;
    }
}
