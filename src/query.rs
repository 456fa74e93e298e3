use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::model::{Entity, Issue, IssueStatus, PdcaCycle};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IssueOrder {
    #[default]
    CreatedAt,
    UpdatedAt,
    Title,
}

/// Builder for filtering a client's issue collection. Collections are
/// small (one board per client), so filters run over the loaded document
/// rather than pushing SQL into the storage port.
#[derive(Debug, Clone, Default)]
pub struct IssueQuery {
    status: Option<IssueStatus>,
    active_only: bool,
    entity_id: Option<String>,
    title_contains: Option<String>,
    order_by: IssueOrder,
    order_desc: bool,
    limit: Option<usize>,
}

impl IssueQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(mut self, status: IssueStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Keep only issues still in flight (everything except done).
    pub fn active_only(mut self) -> Self {
        self.active_only = true;
        self
    }

    pub fn entity(mut self, entity_id: &str) -> Self {
        self.entity_id = Some(entity_id.to_string());
        self
    }

    pub fn title_contains(mut self, needle: &str) -> Self {
        self.title_contains = Some(needle.to_string());
        self
    }

    pub fn order_by(mut self, order: IssueOrder) -> Self {
        self.order_by = order;
        self
    }

    pub fn descending(mut self) -> Self {
        self.order_desc = true;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }

    pub fn apply(&self, issues: &[Issue]) -> Vec<Issue> {
        let mut matched: Vec<Issue> = issues
            .iter()
            .filter(|i| self.status.is_none_or(|s| i.status == s))
            .filter(|i| !self.active_only || i.status.is_active())
            .filter(|i| {
                self.entity_id
                    .as_ref()
                    .is_none_or(|e| i.entity_id.as_ref() == Some(e))
            })
            .filter(|i| {
                self.title_contains
                    .as_ref()
                    .is_none_or(|needle| i.title.contains(needle.as_str()))
            })
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            let ordering = match self.order_by {
                IssueOrder::CreatedAt => a.created_at.cmp(&b.created_at),
                IssueOrder::UpdatedAt => a.updated_at.cmp(&b.updated_at),
                IssueOrder::Title => a.title.cmp(&b.title),
            };
            if self.order_desc {
                ordering.reverse()
            } else {
                ordering
            }
        });
        if let Some(n) = self.limit {
            matched.truncate(n);
        }
        matched
    }
}

/// The most recent cycle for an issue: latest cycle date, ties broken by
/// creation time.
pub fn latest_cycle<'a>(cycles: &'a [PdcaCycle], issue_id: &str) -> Option<&'a PdcaCycle> {
    cycles
        .iter()
        .filter(|c| c.issue_id == issue_id)
        .max_by(|a, b| {
            a.cycle_date
                .cmp(&b.cycle_date)
                .then(a.created_at.cmp(&b.created_at))
        })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportIssue {
    pub issue: Issue,
    pub latest_cycle: Option<PdcaCycle>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSection {
    /// None collects issues not assigned to any entity, listed last.
    pub entity: Option<Entity>,
    pub issues: Vec<ReportIssue>,
}

/// The data behind a meeting memo: every in-flight issue grouped by
/// entity, each with its latest cycle.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportDigest {
    pub client_id: String,
    pub generated_at: DateTime<Utc>,
    pub sections: Vec<ReportSection>,
}

pub fn build_report(
    client_id: &str,
    entities: &[Entity],
    issues: &[Issue],
    cycles: &[PdcaCycle],
) -> ReportDigest {
    let mut ordered: Vec<&Entity> = entities.iter().collect();
    ordered.sort_by(|a, b| a.sort_order.cmp(&b.sort_order).then(a.name.cmp(&b.name)));

    let active = IssueQuery::new().active_only().apply(issues);
    let mut sections: Vec<ReportSection> = ordered
        .into_iter()
        .map(|entity| ReportSection {
            entity: Some(entity.clone()),
            issues: Vec::new(),
        })
        .collect();
    let mut unassigned = ReportSection {
        entity: None,
        issues: Vec::new(),
    };

    for issue in active {
        let report_issue = ReportIssue {
            latest_cycle: latest_cycle(cycles, &issue.id).cloned(),
            issue,
        };
        let slot = report_issue.issue.entity_id.as_ref().and_then(|eid| {
            sections
                .iter_mut()
                .find(|s| s.entity.as_ref().is_some_and(|e| &e.id == eid))
        });
        match slot {
            Some(section) => section.issues.push(report_issue),
            None => unassigned.issues.push(report_issue),
        }
    }

    sections.retain(|s| !s.issues.is_empty());
    if !unassigned.issues.is_empty() {
        sections.push(unassigned);
    }

    ReportDigest {
        client_id: client_id.to_string(),
        generated_at: Utc::now(),
        sections,
    }
}

pub fn issues_to_csv(issues: &[Issue]) -> String {
    let mut out = String::new();
    out.push_str("id,title,status,entity_id,created_at,updated_at\n");
    for issue in issues {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            csv_escape(&issue.id),
            csv_escape(&issue.title),
            issue.status.as_str(),
            csv_escape(issue.entity_id.as_deref().unwrap_or("")),
            issue.created_at.to_rfc3339(),
            issue.updated_at.to_rfc3339(),
        ));
    }
    out
}

pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
