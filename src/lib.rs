pub mod date_util;
pub mod error;
pub mod metrics;
pub mod model;
pub mod query;
pub mod reconcile;
pub mod storage;

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;

pub use error::{Error, Result};
pub use metrics::types::{
    AggKey, ChartData, ColumnInfo, ColumnType, DuplicatePolicy, LongRecord, WideRow,
};
pub use model::{
    Chart, ChartFilters, ChartPatch, Client, CyclePatch, Entity, EntityKind, EntityPatch, Issue,
    IssuePatch, IssueStatus, NewChart, NewCycle, PdcaCycle, SeriesConfig, SeriesKind, YAxisSide,
};
pub use query::{IssueOrder, IssueQuery, ReportDigest, ReportIssue, ReportSection};
pub use reconcile::{extract_task_titles, reconcile_tasks, split_action_text, ActionSegment};
pub use storage::{ContainerInfo, DocumentStore, SharedStore, WriteLocks, APP_CONTAINER};

use model::new_id;
use storage::cache::RecordCache;
use storage::{
    load_doc, load_doc_or_default, save_doc, DOC_CHARTS, DOC_CONFIG, DOC_CYCLES, DOC_ENTITIES,
    DOC_ISSUES, DOC_RECORDS,
};

const SORT_STRIDE: i64 = 10;

/// Result of creating or updating a cycle: the cycle itself plus any
/// issues its action text spawned.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CycleOutcome {
    pub cycle: PdcaCycle,
    pub created_issues: Vec<Issue>,
}

/// Document counts for one client, for the status command.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientStatus {
    pub client: Client,
    pub charts: usize,
    pub issues: usize,
    pub cycles: usize,
    pub entities: usize,
    pub records: usize,
}

/// Main entry point for the PDCA warehouse. All operations go through the
/// storage port; nothing here knows which backend is behind it.
///
/// Read surfaces degrade (an unreachable backend reads as empty, logged).
/// Mutations load strictly, so a flaky backend can never cause an empty
/// collection to be written back over a populated document.
pub struct KaizenDW {
    store: SharedStore,
    locks: WriteLocks,
    cache: RecordCache,
}

impl KaizenDW {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            locks: WriteLocks::new(),
            cache: RecordCache::with_default_ttl(),
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    // ── Clients ────────────────────────────────────────────────────

    pub async fn ensure_client(&self, name: &str) -> Result<Client> {
        let name = name.trim();
        if name.is_empty() || name == APP_CONTAINER {
            return Err(Error::Validation(format!("invalid client name: {name:?}")));
        }
        let id = self.store.ensure_container(name, None).await?;
        Ok(Client {
            id,
            name: name.to_string(),
        })
    }

    pub async fn find_client(&self, name: &str) -> Result<Option<Client>> {
        let id = self.store.find_container(name, None).await?;
        Ok(id.map(|id| Client {
            id,
            name: name.to_string(),
        }))
    }

    /// Like `find_client`, but a missing client is an error that names
    /// the ones that do exist.
    pub async fn resolve_client(&self, name: &str) -> Result<Client> {
        if let Some(client) = self.find_client(name).await? {
            return Ok(client);
        }
        let known: Vec<String> = self
            .list_clients()
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        Err(Error::NotFound(format!(
            "client {name:?} (known clients: {})",
            if known.is_empty() {
                "none".to_string()
            } else {
                known.join(", ")
            }
        )))
    }

    pub async fn list_clients(&self) -> Result<Vec<Client>> {
        let containers = self.store.list_containers(None).await?;
        Ok(containers
            .into_iter()
            .filter(|c| c.name != APP_CONTAINER)
            .map(|c| Client {
                id: c.id,
                name: c.name,
            })
            .collect())
    }

    // ── Entities ───────────────────────────────────────────────────

    pub async fn create_entity(
        &self,
        client_id: &str,
        name: &str,
        kind: EntityKind,
    ) -> Result<Entity> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("entity name must not be empty".into()));
        }
        let _guard = self.locks.lock(client_id).await;
        let mut entities: Vec<Entity> = load_doc(self.store.as_ref(), client_id, DOC_ENTITIES)
            .await?
            .unwrap_or_default();
        let now = Utc::now();
        let entity = Entity {
            id: new_id(),
            client_id: client_id.to_string(),
            name: name.to_string(),
            kind,
            sort_order: next_sort_order(entities.iter().map(|e| e.sort_order)),
            created_at: now,
            updated_at: now,
        };
        entities.push(entity.clone());
        save_doc(self.store.as_ref(), client_id, DOC_ENTITIES, &entities).await?;
        Ok(entity)
    }

    pub async fn list_entities(&self, client_id: &str) -> Result<Vec<Entity>> {
        let mut entities: Vec<Entity> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_ENTITIES).await;
        entities.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));
        Ok(entities)
    }

    pub async fn update_entity(
        &self,
        client_id: &str,
        entity_id: &str,
        patch: EntityPatch,
    ) -> Result<Entity> {
        let _guard = self.locks.lock(client_id).await;
        let mut entities: Vec<Entity> = load_doc(self.store.as_ref(), client_id, DOC_ENTITIES)
            .await?
            .unwrap_or_default();
        let entity = entities
            .iter_mut()
            .find(|e| e.id == entity_id)
            .ok_or_else(|| Error::NotFound(format!("entity {entity_id}")))?;
        if let Some(name) = patch.name {
            let name = name.trim().to_string();
            if name.is_empty() {
                return Err(Error::Validation("entity name must not be empty".into()));
            }
            entity.name = name;
        }
        if let Some(kind) = patch.kind {
            entity.kind = kind;
        }
        if let Some(sort_order) = patch.sort_order {
            entity.sort_order = sort_order;
        }
        entity.updated_at = Utc::now();
        let updated = entity.clone();
        save_doc(self.store.as_ref(), client_id, DOC_ENTITIES, &entities).await?;
        Ok(updated)
    }

    pub async fn delete_entity(&self, client_id: &str, entity_id: &str) -> Result<()> {
        let _guard = self.locks.lock(client_id).await;
        let mut entities: Vec<Entity> = load_doc(self.store.as_ref(), client_id, DOC_ENTITIES)
            .await?
            .unwrap_or_default();
        let before = entities.len();
        entities.retain(|e| e.id != entity_id);
        if entities.len() == before {
            return Err(Error::NotFound(format!("entity {entity_id}")));
        }
        save_doc(self.store.as_ref(), client_id, DOC_ENTITIES, &entities).await
    }

    // ── Charts ─────────────────────────────────────────────────────

    pub async fn create_chart(&self, client_id: &str, new: NewChart) -> Result<Chart> {
        if new.title.trim().is_empty() {
            return Err(Error::Validation("chart title must not be empty".into()));
        }
        let _guard = self.locks.lock(client_id).await;
        let mut charts: Vec<Chart> = load_doc(self.store.as_ref(), client_id, DOC_CHARTS)
            .await?
            .unwrap_or_default();
        let chart = new.into_chart(next_sort_order(charts.iter().map(|c| c.sort_order)));
        charts.push(chart.clone());
        save_doc(self.store.as_ref(), client_id, DOC_CHARTS, &charts).await?;
        Ok(chart)
    }

    /// Charts in dashboard order.
    pub async fn list_charts(&self, client_id: &str) -> Result<Vec<Chart>> {
        let mut charts: Vec<Chart> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_CHARTS).await;
        charts.sort_by_key(|c| c.sort_order);
        Ok(charts)
    }

    pub async fn get_chart(&self, client_id: &str, chart_id: &str) -> Result<Chart> {
        let charts: Vec<Chart> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_CHARTS).await;
        charts
            .into_iter()
            .find(|c| c.id == chart_id)
            .ok_or_else(|| Error::NotFound(format!("chart {chart_id}")))
    }

    pub async fn update_chart(
        &self,
        client_id: &str,
        chart_id: &str,
        patch: ChartPatch,
    ) -> Result<Chart> {
        let _guard = self.locks.lock(client_id).await;
        let mut charts: Vec<Chart> = load_doc(self.store.as_ref(), client_id, DOC_CHARTS)
            .await?
            .unwrap_or_default();
        let chart = charts
            .iter_mut()
            .find(|c| c.id == chart_id)
            .ok_or_else(|| Error::NotFound(format!("chart {chart_id}")))?;
        if let Some(title) = patch.title {
            if title.trim().is_empty() {
                return Err(Error::Validation("chart title must not be empty".into()));
            }
            chart.title = title;
        }
        if let Some(chart_type) = patch.chart_type {
            chart.chart_type = chart_type;
        }
        if let Some(x_key) = patch.x_key {
            chart.x_key = x_key;
        }
        if let Some(series_keys) = patch.series_keys {
            chart.series_keys = series_keys;
        }
        if let Some(series_config) = patch.series_config {
            chart.series_config = series_config;
        }
        if let Some(agg_key) = patch.agg_key {
            chart.agg_key = agg_key;
        }
        if let Some(store_override) = patch.store_override {
            chart.store_override = (!store_override.is_empty()).then_some(store_override);
        }
        if let Some(filters) = patch.filters {
            chart.filters = filters;
        }
        if let Some(show) = patch.show_on_dashboard {
            chart.show_on_dashboard = show;
        }
        chart.updated_at = Utc::now();
        let updated = chart.clone();
        save_doc(self.store.as_ref(), client_id, DOC_CHARTS, &charts).await?;
        Ok(updated)
    }

    pub async fn delete_chart(&self, client_id: &str, chart_id: &str) -> Result<()> {
        let _guard = self.locks.lock(client_id).await;
        let mut charts: Vec<Chart> = load_doc(self.store.as_ref(), client_id, DOC_CHARTS)
            .await?
            .unwrap_or_default();
        let before = charts.len();
        charts.retain(|c| c.id != chart_id);
        if charts.len() == before {
            return Err(Error::NotFound(format!("chart {chart_id}")));
        }
        save_doc(self.store.as_ref(), client_id, DOC_CHARTS, &charts).await
    }

    /// Put charts in the given order and renormalize every sort order to
    /// a stride of 10, leaving room for future drag-and-drop inserts.
    /// Ids not named keep their relative order after the named ones;
    /// unknown ids are ignored.
    pub async fn reorder_charts(
        &self,
        client_id: &str,
        ordered_ids: &[String],
    ) -> Result<Vec<Chart>> {
        let _guard = self.locks.lock(client_id).await;
        let mut charts: Vec<Chart> = load_doc(self.store.as_ref(), client_id, DOC_CHARTS)
            .await?
            .unwrap_or_default();
        let mut reordered: Vec<Chart> = Vec::with_capacity(charts.len());
        for id in ordered_ids {
            if let Some(pos) = charts.iter().position(|c| &c.id == id) {
                reordered.push(charts.remove(pos));
            }
        }
        charts.sort_by_key(|c| c.sort_order);
        reordered.extend(charts);
        let now = Utc::now();
        for (index, chart) in reordered.iter_mut().enumerate() {
            chart.sort_order = (index as i64 + 1) * SORT_STRIDE;
            chart.updated_at = now;
        }
        save_doc(self.store.as_ref(), client_id, DOC_CHARTS, &reordered).await?;
        Ok(reordered)
    }

    /// Rows and columns for a saved chart. `dashboard_store` is the store
    /// selected on the dashboard showing the chart; the chart's own
    /// storeOverride wins over it, and either one replaces the chart's
    /// department filter.
    pub async fn chart_data(
        &self,
        client_id: &str,
        chart_id: &str,
        dashboard_store: Option<&str>,
    ) -> Result<ChartData> {
        let chart = self.get_chart(client_id, chart_id).await?;
        self.preview_data(client_id, &chart, dashboard_store).await
    }

    /// Same computation as `chart_data` for a chart that is not saved,
    /// e.g. while the user is still configuring it.
    pub async fn preview_data(
        &self,
        client_id: &str,
        chart: &Chart,
        dashboard_store: Option<&str>,
    ) -> Result<ChartData> {
        let store_name = chart
            .store_override
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| dashboard_store.map(String::from).filter(|s| !s.is_empty()));
        let mut effective = chart.clone();
        if let Some(name) = store_name {
            effective.filters.department = Some(name);
        }
        let records = self.records(client_id).await;
        Ok(metrics::chart_data(&records, &effective))
    }

    /// Column descriptions for the client's record set.
    pub async fn list_columns(&self, client_id: &str) -> Result<Vec<ColumnInfo>> {
        let records = self.records(client_id).await;
        Ok(metrics::columns_for_records(&records))
    }

    // ── Records ────────────────────────────────────────────────────

    /// The client's long-format records, through the TTL cache. Hits are
    /// lock-free. A miss loads and fills under the client's write lock, so
    /// a fill can never land after a concurrent `replace_records` has
    /// invalidated. A failed load serves the empty set for this read only
    /// and leaves the cache unfilled.
    pub async fn records(&self, client_id: &str) -> Arc<Vec<LongRecord>> {
        if let Some(cached) = self.cache.get(client_id).await {
            return cached;
        }
        let _guard = self.locks.lock(client_id).await;
        if let Some(cached) = self.cache.get(client_id).await {
            return cached;
        }
        match load_doc::<Vec<LongRecord>>(self.store.as_ref(), client_id, DOC_RECORDS).await {
            Ok(records) => self.cache.put(client_id, records.unwrap_or_default()).await,
            Err(e) => {
                log::warn!("degraded read of {client_id}/{DOC_RECORDS}: {e}");
                Arc::new(Vec::new())
            }
        }
    }

    /// Replace the client's whole record set. Every record must carry a
    /// parseable `YYYY-MM` period and a metric name.
    pub async fn replace_records(
        &self,
        client_id: &str,
        records: Vec<LongRecord>,
    ) -> Result<usize> {
        for rec in &records {
            date_util::parse_month_key(&rec.period)?;
            if rec.metric_name.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "record for {} is missing a metric name",
                    rec.period
                )));
            }
        }
        let count = records.len();
        let _guard = self.locks.lock(client_id).await;
        save_doc(self.store.as_ref(), client_id, DOC_RECORDS, &records).await?;
        self.cache.invalidate(client_id).await;
        Ok(count)
    }

    // ── Issues ─────────────────────────────────────────────────────

    pub async fn create_issue(
        &self,
        client_id: &str,
        title: &str,
        entity_id: Option<String>,
    ) -> Result<Issue> {
        let title = title.trim();
        if title.is_empty() {
            return Err(Error::Validation("issue title must not be empty".into()));
        }
        let _guard = self.locks.lock(client_id).await;
        let mut issues: Vec<Issue> = load_doc(self.store.as_ref(), client_id, DOC_ISSUES)
            .await?
            .unwrap_or_default();
        let issue = Issue::new(client_id, entity_id, title);
        issues.push(issue.clone());
        save_doc(self.store.as_ref(), client_id, DOC_ISSUES, &issues).await?;
        Ok(issue)
    }

    pub async fn list_issues(&self, client_id: &str, query: &IssueQuery) -> Result<Vec<Issue>> {
        let issues: Vec<Issue> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_ISSUES).await;
        Ok(query.apply(&issues))
    }

    pub async fn get_issue(&self, client_id: &str, issue_id: &str) -> Result<Issue> {
        let issues: Vec<Issue> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_ISSUES).await;
        issues
            .into_iter()
            .find(|i| i.id == issue_id)
            .ok_or_else(|| Error::NotFound(format!("issue {issue_id}")))
    }

    pub async fn update_issue(
        &self,
        client_id: &str,
        issue_id: &str,
        patch: IssuePatch,
    ) -> Result<Issue> {
        let _guard = self.locks.lock(client_id).await;
        let mut issues: Vec<Issue> = load_doc(self.store.as_ref(), client_id, DOC_ISSUES)
            .await?
            .unwrap_or_default();
        let issue = issues
            .iter_mut()
            .find(|i| i.id == issue_id)
            .ok_or_else(|| Error::NotFound(format!("issue {issue_id}")))?;
        if let Some(title) = patch.title {
            let title = title.trim().to_string();
            if title.is_empty() {
                return Err(Error::Validation("issue title must not be empty".into()));
            }
            issue.title = title;
        }
        if let Some(status) = patch.status {
            issue.status = status;
        }
        if let Some(entity_id) = patch.entity_id {
            issue.entity_id = (!entity_id.is_empty()).then_some(entity_id);
        }
        issue.updated_at = Utc::now();
        let updated = issue.clone();
        save_doc(self.store.as_ref(), client_id, DOC_ISSUES, &issues).await?;
        Ok(updated)
    }

    /// Delete an issue and every cycle recorded against it.
    pub async fn delete_issue(&self, client_id: &str, issue_id: &str) -> Result<()> {
        let _guard = self.locks.lock(client_id).await;
        let mut issues: Vec<Issue> = load_doc(self.store.as_ref(), client_id, DOC_ISSUES)
            .await?
            .unwrap_or_default();
        let before = issues.len();
        issues.retain(|i| i.id != issue_id);
        if issues.len() == before {
            return Err(Error::NotFound(format!("issue {issue_id}")));
        }
        let mut cycles: Vec<PdcaCycle> = load_doc(self.store.as_ref(), client_id, DOC_CYCLES)
            .await?
            .unwrap_or_default();
        cycles.retain(|c| c.issue_id != issue_id);
        save_doc(self.store.as_ref(), client_id, DOC_ISSUES, &issues).await?;
        save_doc(self.store.as_ref(), client_id, DOC_CYCLES, &cycles).await
    }

    // ── Cycles ─────────────────────────────────────────────────────

    /// Record a new cycle. Task markers in its action text become open
    /// issues; cycle and issues persist under the same lock so the two
    /// documents cannot diverge through concurrent edits.
    pub async fn create_cycle(&self, client_id: &str, new: NewCycle) -> Result<CycleOutcome> {
        date_util::parse_date(&new.cycle_date)?;
        let _guard = self.locks.lock(client_id).await;
        let mut issues: Vec<Issue> = load_doc(self.store.as_ref(), client_id, DOC_ISSUES)
            .await?
            .unwrap_or_default();
        let parent = issues
            .iter()
            .find(|i| i.id == new.issue_id)
            .ok_or_else(|| Error::NotFound(format!("issue {}", new.issue_id)))?;
        let status = new.status.unwrap_or(parent.status);
        let entity_id = new.entity_id.clone().or_else(|| parent.entity_id.clone());
        let now = Utc::now();
        let cycle = PdcaCycle {
            id: new_id(),
            client_id: client_id.to_string(),
            entity_id,
            issue_id: new.issue_id,
            cycle_date: new.cycle_date,
            situation: new.situation,
            issue: new.issue,
            action: new.action,
            target: new.target,
            status,
            created_at: now,
            updated_at: now,
        };
        let created_issues = reconcile_tasks(&mut issues, &cycle);
        let mut cycles: Vec<PdcaCycle> = load_doc(self.store.as_ref(), client_id, DOC_CYCLES)
            .await?
            .unwrap_or_default();
        cycles.push(cycle.clone());
        save_doc(self.store.as_ref(), client_id, DOC_CYCLES, &cycles).await?;
        if !created_issues.is_empty() {
            save_doc(self.store.as_ref(), client_id, DOC_ISSUES, &issues).await?;
        }
        Ok(CycleOutcome {
            cycle,
            created_issues,
        })
    }

    /// Patch a cycle. Reconciliation reruns only when the action text
    /// actually changed.
    pub async fn update_cycle(
        &self,
        client_id: &str,
        cycle_id: &str,
        patch: CyclePatch,
    ) -> Result<CycleOutcome> {
        if let Some(ref date) = patch.cycle_date {
            date_util::parse_date(date)?;
        }
        let _guard = self.locks.lock(client_id).await;
        let mut cycles: Vec<PdcaCycle> = load_doc(self.store.as_ref(), client_id, DOC_CYCLES)
            .await?
            .unwrap_or_default();
        let cycle = cycles
            .iter_mut()
            .find(|c| c.id == cycle_id)
            .ok_or_else(|| Error::NotFound(format!("cycle {cycle_id}")))?;
        let mut action_changed = false;
        if let Some(cycle_date) = patch.cycle_date {
            cycle.cycle_date = cycle_date;
        }
        if let Some(situation) = patch.situation {
            cycle.situation = situation;
        }
        if let Some(issue_text) = patch.issue {
            cycle.issue = issue_text;
        }
        if let Some(action) = patch.action {
            action_changed = action != cycle.action;
            cycle.action = action;
        }
        if let Some(target) = patch.target {
            cycle.target = target;
        }
        if let Some(status) = patch.status {
            cycle.status = status;
        }
        if let Some(entity_id) = patch.entity_id {
            cycle.entity_id = (!entity_id.is_empty()).then_some(entity_id);
        }
        cycle.updated_at = Utc::now();
        let updated = cycle.clone();

        let mut created_issues = Vec::new();
        if action_changed {
            let mut issues: Vec<Issue> = load_doc(self.store.as_ref(), client_id, DOC_ISSUES)
                .await?
                .unwrap_or_default();
            created_issues = reconcile_tasks(&mut issues, &updated);
            if !created_issues.is_empty() {
                save_doc(self.store.as_ref(), client_id, DOC_ISSUES, &issues).await?;
            }
        }
        save_doc(self.store.as_ref(), client_id, DOC_CYCLES, &cycles).await?;
        Ok(CycleOutcome {
            cycle: updated,
            created_issues,
        })
    }

    /// Cycles for one issue (or all), latest first.
    pub async fn list_cycles(
        &self,
        client_id: &str,
        issue_id: Option<&str>,
    ) -> Result<Vec<PdcaCycle>> {
        let mut cycles: Vec<PdcaCycle> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_CYCLES).await;
        if let Some(issue_id) = issue_id {
            cycles.retain(|c| c.issue_id == issue_id);
        }
        cycles.sort_by(|a, b| {
            b.cycle_date
                .cmp(&a.cycle_date)
                .then(b.created_at.cmp(&a.created_at))
        });
        Ok(cycles)
    }

    pub async fn latest_cycle(
        &self,
        client_id: &str,
        issue_id: &str,
    ) -> Result<Option<PdcaCycle>> {
        let cycles: Vec<PdcaCycle> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_CYCLES).await;
        Ok(query::latest_cycle(&cycles, issue_id).cloned())
    }

    pub async fn delete_cycle(&self, client_id: &str, cycle_id: &str) -> Result<()> {
        let _guard = self.locks.lock(client_id).await;
        let mut cycles: Vec<PdcaCycle> = load_doc(self.store.as_ref(), client_id, DOC_CYCLES)
            .await?
            .unwrap_or_default();
        let before = cycles.len();
        cycles.retain(|c| c.id != cycle_id);
        if cycles.len() == before {
            return Err(Error::NotFound(format!("cycle {cycle_id}")));
        }
        save_doc(self.store.as_ref(), client_id, DOC_CYCLES, &cycles).await
    }

    // ── Reports ────────────────────────────────────────────────────

    /// The data behind a meeting memo: in-flight issues grouped by
    /// entity, each with its latest cycle.
    pub async fn report(&self, client_id: &str) -> Result<ReportDigest> {
        let entities = self.list_entities(client_id).await?;
        let issues: Vec<Issue> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_ISSUES).await;
        let cycles: Vec<PdcaCycle> =
            load_doc_or_default(self.store.as_ref(), client_id, DOC_CYCLES).await;
        Ok(query::build_report(client_id, &entities, &issues, &cycles))
    }

    // ── Config ─────────────────────────────────────────────────────

    pub async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let config = self.config_map().await?;
        Ok(config.get(key).cloned())
    }

    pub async fn config_set(&self, key: &str, value: &str) -> Result<()> {
        let app = self.store.ensure_container(APP_CONTAINER, None).await?;
        let _guard = self.locks.lock(&app).await;
        let mut config: BTreeMap<String, String> =
            load_doc(self.store.as_ref(), &app, DOC_CONFIG)
                .await?
                .unwrap_or_default();
        config.insert(key.to_string(), value.to_string());
        save_doc(self.store.as_ref(), &app, DOC_CONFIG, &config).await
    }

    pub async fn config_list(&self) -> Result<Vec<(String, String)>> {
        Ok(self.config_map().await?.into_iter().collect())
    }

    async fn config_map(&self) -> Result<BTreeMap<String, String>> {
        let app = self.store.ensure_container(APP_CONTAINER, None).await?;
        Ok(load_doc(self.store.as_ref(), &app, DOC_CONFIG)
            .await?
            .unwrap_or_default())
    }

    // ── Status ─────────────────────────────────────────────────────

    pub async fn status(&self) -> Result<Vec<ClientStatus>> {
        let mut statuses = Vec::new();
        for client in self.list_clients().await? {
            let charts: Vec<Chart> =
                load_doc_or_default(self.store.as_ref(), &client.id, DOC_CHARTS).await;
            let issues: Vec<Issue> =
                load_doc_or_default(self.store.as_ref(), &client.id, DOC_ISSUES).await;
            let cycles: Vec<PdcaCycle> =
                load_doc_or_default(self.store.as_ref(), &client.id, DOC_CYCLES).await;
            let entities: Vec<Entity> =
                load_doc_or_default(self.store.as_ref(), &client.id, DOC_ENTITIES).await;
            let records = self.records(&client.id).await;
            statuses.push(ClientStatus {
                charts: charts.len(),
                issues: issues.len(),
                cycles: cycles.len(),
                entities: entities.len(),
                records: records.len(),
                client,
            });
        }
        Ok(statuses)
    }
}

fn next_sort_order(orders: impl Iterator<Item = i64>) -> i64 {
    orders.max().unwrap_or(0) + SORT_STRIDE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use serde_json::Value;
    use storage::memory::MemoryStore;
    use tokio::sync::Semaphore;

    async fn dw() -> (KaizenDW, String) {
        let dw = KaizenDW::new(Arc::new(MemoryStore::new()));
        let client = dw.ensure_client("acme").await.unwrap();
        (dw, client.id)
    }

    fn rec(period: &str, department: &str, metric: &str, value: f64) -> LongRecord {
        LongRecord {
            period: period.to_string(),
            department: department.to_string(),
            category: "売上".to_string(),
            metric_name: metric.to_string(),
            unit: "円".to_string(),
            classification: "actual".to_string(),
            value: Some(value),
        }
    }

    /// Completes the next records load but parks it before handing the
    /// result back, to pin down interleavings between a cache fill and a
    /// concurrent replace.
    struct GatedStore {
        inner: MemoryStore,
        park_next_load: AtomicBool,
        gate: Semaphore,
    }

    #[async_trait]
    impl DocumentStore for GatedStore {
        async fn load(&self, container_id: &str, key: &str) -> Result<Option<Value>> {
            let loaded = self.inner.load(container_id, key).await;
            if key == DOC_RECORDS && self.park_next_load.swap(false, Ordering::SeqCst) {
                self.gate.acquire().await.unwrap().forget();
            }
            loaded
        }
        async fn save(&self, container_id: &str, key: &str, value: &Value) -> Result<()> {
            self.inner.save(container_id, key, value).await
        }
        async fn find_container(
            &self,
            name: &str,
            parent_id: Option<&str>,
        ) -> Result<Option<String>> {
            self.inner.find_container(name, parent_id).await
        }
        async fn ensure_container(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
            self.inner.ensure_container(name, parent_id).await
        }
        async fn list_containers(&self, parent_id: Option<&str>) -> Result<Vec<ContainerInfo>> {
            self.inner.list_containers(parent_id).await
        }
    }

    /// Fails the next load, then heals.
    struct FlakyStore {
        inner: MemoryStore,
        fail_next_load: AtomicBool,
    }

    #[async_trait]
    impl DocumentStore for FlakyStore {
        async fn load(&self, container_id: &str, key: &str) -> Result<Option<Value>> {
            if self.fail_next_load.swap(false, Ordering::SeqCst) {
                return Err(Error::Storage("backend offline".into()));
            }
            self.inner.load(container_id, key).await
        }
        async fn save(&self, container_id: &str, key: &str, value: &Value) -> Result<()> {
            self.inner.save(container_id, key, value).await
        }
        async fn find_container(
            &self,
            name: &str,
            parent_id: Option<&str>,
        ) -> Result<Option<String>> {
            self.inner.find_container(name, parent_id).await
        }
        async fn ensure_container(&self, name: &str, parent_id: Option<&str>) -> Result<String> {
            self.inner.ensure_container(name, parent_id).await
        }
        async fn list_containers(&self, parent_id: Option<&str>) -> Result<Vec<ContainerInfo>> {
            self.inner.list_containers(parent_id).await
        }
    }

    #[tokio::test]
    async fn test_clients_hide_app_container() {
        let (dw, _) = dw().await;
        dw.config_set("theme", "dark").await.unwrap();
        let clients = dw.list_clients().await.unwrap();
        assert_eq!(clients.len(), 1);
        assert_eq!(clients[0].name, "acme");
        assert!(dw.ensure_client("_app").await.is_err());
        assert!(dw.ensure_client("  ").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_client_lists_known_names() {
        let (dw, _) = dw().await;
        let err = dw.resolve_client("ghost").await.unwrap_err();
        assert!(err.to_string().contains("acme"), "{err}");
    }

    #[tokio::test]
    async fn test_chart_create_assigns_stride_orders() {
        let (dw, client) = dw().await;
        let first = dw
            .create_chart(&client, NewChart::titled("売上"))
            .await
            .unwrap();
        let second = dw
            .create_chart(&client, NewChart::titled("客数"))
            .await
            .unwrap();
        assert_eq!(first.sort_order, 10);
        assert_eq!(second.sort_order, 20);
        let listed = dw.list_charts(&client).await.unwrap();
        assert_eq!(listed[0].id, first.id);
        assert_eq!(listed[1].id, second.id);
    }

    #[tokio::test]
    async fn test_chart_update_and_not_found() {
        let (dw, client) = dw().await;
        let chart = dw
            .create_chart(&client, NewChart::titled("売上"))
            .await
            .unwrap();
        let patch = ChartPatch {
            series_keys: Some(vec!["netSales".to_string()]),
            agg_key: Some(AggKey::Cumulative),
            ..Default::default()
        };
        let updated = dw.update_chart(&client, &chart.id, patch).await.unwrap();
        assert_eq!(updated.series_keys, vec!["netSales"]);
        assert_eq!(updated.agg_key, AggKey::Cumulative);
        assert!(updated.updated_at >= chart.updated_at);
        let missing = dw
            .update_chart(&client, "nope", ChartPatch::default())
            .await;
        assert!(matches!(missing, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_reorder_renormalizes_with_stride() {
        let (dw, client) = dw().await;
        let a = dw.create_chart(&client, NewChart::titled("A")).await.unwrap();
        let b = dw.create_chart(&client, NewChart::titled("B")).await.unwrap();
        let c = dw.create_chart(&client, NewChart::titled("C")).await.unwrap();
        // Move C to the front and leave B unnamed: C, A, then B.
        let reordered = dw
            .reorder_charts(&client, &[c.id.clone(), a.id.clone()])
            .await
            .unwrap();
        let ids: Vec<&str> = reordered.iter().map(|ch| ch.id.as_str()).collect();
        assert_eq!(ids, vec![c.id.as_str(), a.id.as_str(), b.id.as_str()]);
        let orders: Vec<i64> = reordered.iter().map(|ch| ch.sort_order).collect();
        assert_eq!(orders, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_chart_data_with_store_override() {
        let (dw, client) = dw().await;
        dw.replace_records(
            &client,
            vec![
                rec("2025-01", "本店", "netSales", 100.0),
                rec("2025-01", "支店", "netSales", 40.0),
            ],
        )
        .await
        .unwrap();
        let mut new = NewChart::titled("売上");
        new.series_keys = vec!["netSales".to_string()];
        new.store_override = Some("支店".to_string());
        let chart = dw.create_chart(&client, new).await.unwrap();
        // The chart's own override wins over the dashboard selection.
        let data = dw
            .chart_data(&client, &chart.id, Some("本店"))
            .await
            .unwrap();
        assert_eq!(data.rows.len(), 1);
        assert_eq!(data.rows[0].value("netSales"), Some(40.0));
    }

    #[tokio::test]
    async fn test_chart_data_dashboard_store_fallback() {
        let (dw, client) = dw().await;
        dw.replace_records(
            &client,
            vec![
                rec("2025-01", "本店", "netSales", 100.0),
                rec("2025-01", "支店", "netSales", 40.0),
            ],
        )
        .await
        .unwrap();
        let mut new = NewChart::titled("売上");
        new.series_keys = vec!["netSales".to_string()];
        let chart = dw.create_chart(&client, new).await.unwrap();
        let data = dw
            .chart_data(&client, &chart.id, Some("本店"))
            .await
            .unwrap();
        assert_eq!(data.rows[0].value("netSales"), Some(100.0));
    }

    #[tokio::test]
    async fn test_replace_records_validates_periods() {
        let (dw, client) = dw().await;
        let bad = vec![rec("2025-1", "本店", "netSales", 1.0)];
        assert!(matches!(
            dw.replace_records(&client, bad).await,
            Err(Error::PeriodParse(_))
        ));
        let unnamed = vec![rec("2025-01", "本店", " ", 1.0)];
        assert!(matches!(
            dw.replace_records(&client, unnamed).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_replace_records_invalidates_cache() {
        let (dw, client) = dw().await;
        dw.replace_records(&client, vec![rec("2025-01", "本店", "netSales", 100.0)])
            .await
            .unwrap();
        assert_eq!(dw.records(&client).await.len(), 1);
        dw.replace_records(
            &client,
            vec![
                rec("2025-01", "本店", "netSales", 200.0),
                rec("2025-02", "本店", "netSales", 210.0),
            ],
        )
        .await
        .unwrap();
        let records = dw.records(&client).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].value, Some(200.0));
    }

    #[tokio::test]
    async fn test_fill_racing_replace_does_not_stick() {
        let store = Arc::new(GatedStore {
            inner: MemoryStore::new(),
            park_next_load: AtomicBool::new(false),
            gate: Semaphore::new(0),
        });
        let dw = Arc::new(KaizenDW::new(store.clone()));
        let client = dw.ensure_client("acme").await.unwrap().id;
        dw.replace_records(&client, vec![rec("2025-01", "本店", "netSales", 100.0)])
            .await
            .unwrap();

        // A reader misses the cache and parks inside its load of the old
        // document.
        store.park_next_load.store(true, Ordering::SeqCst);
        let reader = tokio::spawn({
            let (dw, client) = (dw.clone(), client.clone());
            async move { dw.records(&client).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Replace while that fill is still in flight, then let it finish.
        let writer = tokio::spawn({
            let (dw, client) = (dw.clone(), client.clone());
            async move {
                dw.replace_records(&client, vec![rec("2025-01", "本店", "netSales", 200.0)])
                    .await
            }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        store.gate.add_permits(1);
        reader.await.unwrap();
        writer.await.unwrap().unwrap();

        // The overlapped fill must not shadow the replacement.
        assert_eq!(dw.records(&client).await[0].value, Some(200.0));
    }

    #[tokio::test]
    async fn test_failed_record_load_not_cached() {
        let store = Arc::new(FlakyStore {
            inner: MemoryStore::new(),
            fail_next_load: AtomicBool::new(false),
        });
        let dw = KaizenDW::new(store.clone());
        let client = dw.ensure_client("acme").await.unwrap().id;
        dw.replace_records(&client, vec![rec("2025-01", "本店", "netSales", 100.0)])
            .await
            .unwrap();

        // The blip degrades this one read. Once the backend heals, the
        // records come back instead of a cached empty set.
        store.fail_next_load.store(true, Ordering::SeqCst);
        assert!(dw.records(&client).await.is_empty());
        assert_eq!(dw.records(&client).await.len(), 1);
    }

    #[tokio::test]
    async fn test_issue_crud() {
        let (dw, client) = dw().await;
        assert!(dw.create_issue(&client, "  ", None).await.is_err());
        let issue = dw
            .create_issue(&client, "空室率の改善", None)
            .await
            .unwrap();
        let patch = IssuePatch {
            status: Some(IssueStatus::Doing),
            ..Default::default()
        };
        let updated = dw.update_issue(&client, &issue.id, patch).await.unwrap();
        assert_eq!(updated.status, IssueStatus::Doing);
        let listed = dw
            .list_issues(&client, &IssueQuery::new().status(IssueStatus::Doing))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        dw.delete_issue(&client, &issue.id).await.unwrap();
        assert!(matches!(
            dw.get_issue(&client, &issue.id).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_create_cycle_validates_and_reconciles() {
        let (dw, client) = dw().await;
        let issue = dw
            .create_issue(&client, "売上改善", Some("e1".to_string()))
            .await
            .unwrap();
        let bad_date = NewCycle {
            issue_id: issue.id.clone(),
            cycle_date: "2025/01/15".to_string(),
            ..Default::default()
        };
        assert!(dw.create_cycle(&client, bad_date).await.is_err());
        let missing_issue = NewCycle {
            issue_id: "nope".to_string(),
            cycle_date: "2025-01-15".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            dw.create_cycle(&client, missing_issue).await,
            Err(Error::NotFound(_))
        ));

        let outcome = dw
            .create_cycle(
                &client,
                NewCycle {
                    issue_id: issue.id.clone(),
                    cycle_date: "2025-01-15".to_string(),
                    action: "【クーポン配布】と【売上改善】を並行する".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        // 売上改善 already exists as an issue title, so only one is new.
        assert_eq!(outcome.created_issues.len(), 1);
        assert_eq!(outcome.created_issues[0].title, "クーポン配布");
        assert_eq!(outcome.cycle.entity_id.as_deref(), Some("e1"));
        let all = dw.list_issues(&client, &IssueQuery::new()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_cycle_reconciles_only_on_action_change() {
        let (dw, client) = dw().await;
        let issue = dw.create_issue(&client, "A", None).await.unwrap();
        let outcome = dw
            .create_cycle(
                &client,
                NewCycle {
                    issue_id: issue.id.clone(),
                    cycle_date: "2025-01-15".to_string(),
                    action: "継続".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let unchanged = dw
            .update_cycle(
                &client,
                &outcome.cycle.id,
                CyclePatch {
                    action: Some("継続".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(unchanged.created_issues.is_empty());
        let changed = dw
            .update_cycle(
                &client,
                &outcome.cycle.id,
                CyclePatch {
                    action: Some("【新タスク】に切替".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(changed.created_issues.len(), 1);
        assert_eq!(changed.created_issues[0].title, "新タスク");
    }

    #[tokio::test]
    async fn test_delete_issue_cascades_cycles() {
        let (dw, client) = dw().await;
        let issue = dw.create_issue(&client, "A", None).await.unwrap();
        dw.create_cycle(
            &client,
            NewCycle {
                issue_id: issue.id.clone(),
                cycle_date: "2025-01-15".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        dw.delete_issue(&client, &issue.id).await.unwrap();
        assert!(dw.list_cycles(&client, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_latest_cycle_and_listing_order() {
        let (dw, client) = dw().await;
        let issue = dw.create_issue(&client, "A", None).await.unwrap();
        let first = dw
            .create_cycle(
                &client,
                NewCycle {
                    issue_id: issue.id.clone(),
                    cycle_date: "2025-01-15".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let second = dw
            .create_cycle(
                &client,
                NewCycle {
                    issue_id: issue.id.clone(),
                    cycle_date: "2025-02-15".to_string(),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        let latest = dw.latest_cycle(&client, &issue.id).await.unwrap().unwrap();
        assert_eq!(latest.id, second.cycle.id);
        let listed = dw.list_cycles(&client, Some(&issue.id)).await.unwrap();
        assert_eq!(listed[0].id, second.cycle.id);
        assert_eq!(listed[1].id, first.cycle.id);
    }

    #[tokio::test]
    async fn test_report_includes_latest_cycle_per_entity() {
        let (dw, client) = dw().await;
        let entity = dw
            .create_entity(&client, "本店", EntityKind::Store)
            .await
            .unwrap();
        let issue = dw
            .create_issue(&client, "A", Some(entity.id.clone()))
            .await
            .unwrap();
        dw.create_cycle(
            &client,
            NewCycle {
                issue_id: issue.id.clone(),
                cycle_date: "2025-01-15".to_string(),
                target: "稼働率80%".to_string(),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let report = dw.report(&client).await.unwrap();
        assert_eq!(report.sections.len(), 1);
        let section = &report.sections[0];
        assert_eq!(section.entity.as_ref().unwrap().name, "本店");
        assert_eq!(
            section.issues[0].latest_cycle.as_ref().unwrap().target,
            "稼働率80%"
        );
    }

    #[tokio::test]
    async fn test_config_round_trip() {
        let (dw, _) = dw().await;
        assert!(dw.config_get("locale").await.unwrap().is_none());
        dw.config_set("locale", "ja-JP").await.unwrap();
        dw.config_set("fiscalNote", "Nov start").await.unwrap();
        assert_eq!(
            dw.config_get("locale").await.unwrap().as_deref(),
            Some("ja-JP")
        );
        let all = dw.config_list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].0, "fiscalNote");
    }

    #[tokio::test]
    async fn test_status_counts_documents() {
        let (dw, client) = dw().await;
        dw.create_chart(&client, NewChart::titled("A")).await.unwrap();
        dw.create_issue(&client, "B", None).await.unwrap();
        dw.replace_records(&client, vec![rec("2025-01", "本店", "netSales", 1.0)])
            .await
            .unwrap();
        let status = dw.status().await.unwrap();
        assert_eq!(status.len(), 1);
        assert_eq!(status[0].charts, 1);
        assert_eq!(status[0].issues, 1);
        assert_eq!(status[0].records, 1);
        assert_eq!(status[0].cycles, 0);
    }

    #[tokio::test]
    async fn test_entity_crud_and_ordering() {
        let (dw, client) = dw().await;
        let a = dw
            .create_entity(&client, "本店", EntityKind::Store)
            .await
            .unwrap();
        let b = dw
            .create_entity(&client, "二号店", EntityKind::Store)
            .await
            .unwrap();
        assert_eq!(a.sort_order, 10);
        assert_eq!(b.sort_order, 20);
        dw.update_entity(
            &client,
            &b.id,
            EntityPatch {
                sort_order: Some(5),
                ..Default::default()
            },
        )
        .await
        .unwrap();
        let listed = dw.list_entities(&client).await.unwrap();
        assert_eq!(listed[0].id, b.id);
        dw.delete_entity(&client, &a.id).await.unwrap();
        assert_eq!(dw.list_entities(&client).await.unwrap().len(), 1);
        assert!(matches!(
            dw.delete_entity(&client, &a.id).await,
            Err(Error::NotFound(_))
        ));
    }
}
