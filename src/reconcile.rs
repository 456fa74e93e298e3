//! Task mining over free-form action text. Consultants write next actions
//! inline and mark concrete tasks with corner brackets, e.g.
//! "朝礼で共有し【クーポン配布の効果測定】を開始する". Those markers
//! become issues on the client's board, without duplicating ones that
//! already exist.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::{Issue, PdcaCycle};

static RE_TASK_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"【([^】]*)】").unwrap());

/// Every bracketed task title in the text, trimmed, in order of
/// appearance. Repeated titles are kept; callers dedupe where it matters.
pub fn extract_task_titles(text: &str) -> Vec<String> {
    RE_TASK_MARKER
        .captures_iter(text)
        .map(|caps| caps[1].trim().to_string())
        .collect()
}

/// One run of action text: either plain prose or a bracketed task.
/// Concatenating the segments (tasks re-wrapped in brackets) rebuilds the
/// original text exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum ActionSegment {
    Text(String),
    Task(String),
}

/// Split action text into prose and task segments, preserving positions.
pub fn split_action_text(text: &str) -> Vec<ActionSegment> {
    let mut segments = Vec::new();
    let mut cursor = 0;
    for caps in RE_TASK_MARKER.captures_iter(text) {
        let whole = caps.get(0).map(|m| (m.start(), m.end())).unwrap_or((0, 0));
        if whole.0 > cursor {
            segments.push(ActionSegment::Text(text[cursor..whole.0].to_string()));
        }
        segments.push(ActionSegment::Task(caps[1].to_string()));
        cursor = whole.1;
    }
    if cursor < text.len() {
        segments.push(ActionSegment::Text(text[cursor..].to_string()));
    }
    segments
}

/// Create issues for task markers in a cycle's action text that do not
/// already exist on the board. Comparison is exact title equality after
/// trimming, both against existing issues and within this call. New
/// issues open under the cycle's client and entity and are appended to
/// `issues`; the newly created ones are returned.
pub fn reconcile_tasks(issues: &mut Vec<Issue>, cycle: &PdcaCycle) -> Vec<Issue> {
    let mut known: Vec<String> = issues.iter().map(|i| i.title.trim().to_string()).collect();
    let mut created = Vec::new();
    for title in extract_task_titles(&cycle.action) {
        if title.is_empty() || known.iter().any(|k| k == &title) {
            continue;
        }
        let issue = Issue::new(&cycle.client_id, cycle.entity_id.clone(), &title);
        known.push(title);
        created.push(issue.clone());
        issues.push(issue);
    }
    created
}
