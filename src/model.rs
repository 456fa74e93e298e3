use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::metrics::types::AggKey;

/// Generate a fresh document id. Ids are stored as strings so documents
/// written by earlier front-ends (non-UUID ids) keep loading.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// A storage container holding one client's documents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Client {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueStatus {
    Open,
    Doing,
    Done,
    Paused,
}

impl IssueStatus {
    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "open" => Ok(Self::Open),
            "doing" => Ok(Self::Doing),
            "done" => Ok(Self::Done),
            "paused" => Ok(Self::Paused),
            other => Err(Error::Validation(format!("unknown issue status: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Doing => "doing",
            Self::Done => "done",
            Self::Paused => "paused",
        }
    }

    /// Everything except `done` counts as in-flight for reports.
    pub fn is_active(self) -> bool {
        !matches!(self, Self::Done)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub title: String,
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Issue {
    pub fn new(client_id: &str, entity_id: Option<String>, title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: new_id(),
            client_id: client_id.to_string(),
            entity_id,
            title: title.to_string(),
            status: IssueStatus::Open,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for an issue. `None` fields stay unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IssuePatch {
    pub title: Option<String>,
    pub status: Option<IssueStatus>,
    pub entity_id: Option<String>,
}

/// One Plan-Do-Check-Act pass over an issue. The four text fields mirror
/// the meeting-memo layout: current situation, the issue it raises, the
/// action to take, and the measurable target.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdcaCycle {
    pub id: String,
    pub client_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    pub issue_id: String,
    /// Meeting date, `YYYY-MM-DD`.
    pub cycle_date: String,
    #[serde(default)]
    pub situation: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: String,
    pub status: IssueStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCycle {
    pub issue_id: String,
    #[serde(default)]
    pub entity_id: Option<String>,
    pub cycle_date: String,
    #[serde(default)]
    pub situation: String,
    #[serde(default)]
    pub issue: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub target: String,
    #[serde(default)]
    pub status: Option<IssueStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CyclePatch {
    pub cycle_date: Option<String>,
    pub situation: Option<String>,
    pub issue: Option<String>,
    pub action: Option<String>,
    pub target: Option<String>,
    pub status: Option<IssueStatus>,
    pub entity_id: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Department,
    Store,
}

impl EntityKind {
    pub fn parse(input: &str) -> Result<Self> {
        match input {
            "department" => Ok(Self::Department),
            "store" => Ok(Self::Store),
            other => Err(Error::Validation(format!("unknown entity kind: {other}"))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Department => "department",
            Self::Store => "store",
        }
    }
}

/// An organizational unit under a client: a department or a store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entity {
    pub id: String,
    pub client_id: String,
    pub name: String,
    pub kind: EntityKind,
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityPatch {
    pub name: Option<String>,
    pub kind: Option<EntityKind>,
    pub sort_order: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeriesKind {
    Bar,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum YAxisSide {
    Left,
    Right,
}

/// Per-series rendering options. Everything beyond the key is optional so
/// configs saved by older dashboard builds still deserialize.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesConfig {
    pub key: String,
    #[serde(default = "SeriesConfig::default_kind")]
    pub chart_type: SeriesKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opacity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y_axis_id: Option<YAxisSide>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hidden: Option<bool>,
}

impl SeriesConfig {
    fn default_kind() -> SeriesKind {
        SeriesKind::Bar
    }

    pub fn bar(key: &str) -> Self {
        Self {
            key: key.to_string(),
            chart_type: SeriesKind::Bar,
            line_style: None,
            opacity: None,
            y_axis_id: None,
            color: None,
            stroke_width: None,
            hidden: None,
        }
    }
}

/// Record filters applied before pivoting.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartFilters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_n: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chart {
    pub id: String,
    pub title: String,
    /// Overall chart style for the renderer ("bar", "line", "composed", ...).
    /// The renderer owns this vocabulary, so it stays a free string.
    #[serde(default = "Chart::default_chart_type")]
    pub chart_type: String,
    #[serde(default = "Chart::default_x_key")]
    pub x_key: String,
    #[serde(default)]
    pub series_keys: Vec<String>,
    #[serde(default)]
    pub series_config: Vec<SeriesConfig>,
    #[serde(default)]
    pub agg_key: AggKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_override: Option<String>,
    #[serde(default)]
    pub filters: ChartFilters,
    #[serde(default = "Chart::default_show")]
    pub show_on_dashboard: bool,
    #[serde(default)]
    pub sort_order: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Chart {
    fn default_chart_type() -> String {
        "bar".to_string()
    }

    fn default_x_key() -> String {
        "period".to_string()
    }

    fn default_show() -> bool {
        true
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewChart {
    pub title: String,
    #[serde(default = "Chart::default_chart_type")]
    pub chart_type: String,
    #[serde(default = "Chart::default_x_key")]
    pub x_key: String,
    #[serde(default)]
    pub series_keys: Vec<String>,
    #[serde(default)]
    pub series_config: Vec<SeriesConfig>,
    #[serde(default)]
    pub agg_key: AggKey,
    #[serde(default)]
    pub store_override: Option<String>,
    #[serde(default)]
    pub filters: ChartFilters,
    #[serde(default = "Chart::default_show")]
    pub show_on_dashboard: bool,
}

impl NewChart {
    pub fn titled(title: &str) -> Self {
        Self {
            title: title.to_string(),
            chart_type: Chart::default_chart_type(),
            x_key: Chart::default_x_key(),
            series_keys: Vec::new(),
            series_config: Vec::new(),
            agg_key: AggKey::default(),
            store_override: None,
            filters: ChartFilters::default(),
            show_on_dashboard: true,
        }
    }

    pub fn into_chart(self, sort_order: i64) -> Chart {
        let now = Utc::now();
        Chart {
            id: new_id(),
            title: self.title,
            chart_type: self.chart_type,
            x_key: self.x_key,
            series_keys: self.series_keys,
            series_config: self.series_config,
            agg_key: self.agg_key,
            store_override: self.store_override,
            filters: self.filters,
            show_on_dashboard: self.show_on_dashboard,
            sort_order,
            created_at: now,
            updated_at: now,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartPatch {
    pub title: Option<String>,
    pub chart_type: Option<String>,
    pub x_key: Option<String>,
    pub series_keys: Option<Vec<String>>,
    pub series_config: Option<Vec<SeriesConfig>>,
    pub agg_key: Option<AggKey>,
    pub store_override: Option<String>,
    pub filters: Option<ChartFilters>,
    pub show_on_dashboard: Option<bool>,
}
