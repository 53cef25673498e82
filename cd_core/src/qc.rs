//! # Quality-Control Findings
//!
//! Soft problems found during a run. They never stop generation; callers get
//! them next to the artifacts and decide whether the drawing set is usable.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Issue category names as they appear in reports
pub mod category {
    pub const AREA_DEVIATION: &str = "area-deviation";
    pub const ADJACENCY_UNMET: &str = "adjacency-unmet";
    pub const ADJACENCY_UNKNOWN: &str = "adjacency-unknown";
    pub const NO_EXTERIOR_WALL: &str = "no-exterior-wall";
    pub const WINDOW_NOT_PLACED: &str = "window-not-placed";
    pub const DISCONNECTED: &str = "disconnected";
    pub const CIRCULATION_UNREACHABLE: &str = "circulation-unreachable";
    pub const NO_ENTRY: &str = "no-entry";
    pub const SCALE_OVERFLOW: &str = "scale-overflow";
    pub const EXPORT_FAILED: &str = "export-failed";
    pub const CROSS_FORMAT_MISMATCH: &str = "cross-format-mismatch";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Info => "info",
        };
        f.write_str(s)
    }
}

/// A non-fatal finding attached to a generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcIssue {
    pub severity: Severity,
    pub category: String,
    pub message: String,
    /// Offending element id (room, wall, view, sheet or format name)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub element_id: Option<String>,
}

impl QcIssue {
    pub fn new(severity: Severity, category: &str, message: impl Into<String>) -> Self {
        QcIssue {
            severity,
            category: category.to_string(),
            message: message.into(),
            element_id: None,
        }
    }

    pub fn error(category: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, category, message)
    }

    pub fn warning(category: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, category, message)
    }

    pub fn info(category: &str, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, category, message)
    }

    pub fn on(mut self, element_id: impl Into<String>) -> Self {
        self.element_id = Some(element_id.into());
        self
    }
}

impl fmt::Display for QcIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.element_id {
            Some(id) => write!(f, "[{}] {} ({}): {}", self.severity, self.category, id, self.message),
            None => write!(f, "[{}] {}: {}", self.severity, self.category, self.message),
        }
    }
}

/// Count issues of a category
pub fn count_category(issues: &[QcIssue], category: &str) -> usize {
    issues.iter().filter(|i| i.category == category).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let issue = QcIssue::warning(category::ADJACENCY_UNMET, "Kitchen does not border Dining").on("RM-102");
        assert_eq!(
            issue.to_string(),
            "[warning] adjacency-unmet (RM-102): Kitchen does not border Dining"
        );
    }

    #[test]
    fn test_issue_json_shape() {
        let issue = QcIssue::error(category::DISCONNECTED, "unreachable");
        let json = serde_json::to_value(&issue).unwrap();
        assert_eq!(json["severity"], "error");
        assert!(json.get("element_id").is_none());
    }
}
