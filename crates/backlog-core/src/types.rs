use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// StatusCategory
// ---------------------------------------------------------------------------

const DONE_WORDS: &[&str] = &["done", "complete", "closed", "resolved", "완료", "종료", "해결됨"];
const CANCEL_WORDS: &[&str] = &["cancel", "취소"];
const IN_PROGRESS_WORDS: &[&str] = &["in progress", "code review", "testing", "진행 중"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusCategory {
    ToDo,
    InProgress,
    Done,
    Cancelled,
}

impl StatusCategory {
    /// Classify a tracker status name. Matching is case-insensitive and by
    /// substring; anything unrecognized is to-do.
    pub fn classify(status: &str) -> Self {
        let s = status.trim().to_lowercase();
        if CANCEL_WORDS.iter().any(|w| s.contains(w)) {
            StatusCategory::Cancelled
        } else if DONE_WORDS.iter().any(|w| s.contains(w)) {
            StatusCategory::Done
        } else if IN_PROGRESS_WORDS.iter().any(|w| s.contains(w)) {
            StatusCategory::InProgress
        } else {
            StatusCategory::ToDo
        }
    }

    /// Done or cancelled: nothing left to do on the issue.
    pub fn is_closed(self) -> bool {
        matches!(self, StatusCategory::Done | StatusCategory::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StatusCategory::ToDo => "to_do",
            StatusCategory::InProgress => "in_progress",
            StatusCategory::Done => "done",
            StatusCategory::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for StatusCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for StatusCategory {
    type Err = crate::error::BacklogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "to_do" | "todo" => Ok(StatusCategory::ToDo),
            "in_progress" => Ok(StatusCategory::InProgress),
            "done" => Ok(StatusCategory::Done),
            "cancelled" | "canceled" => Ok(StatusCategory::Cancelled),
            _ => Err(crate::error::BacklogError::Unknown {
                kind: "status category",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// TransitionTarget
// ---------------------------------------------------------------------------

/// Where a workflow transition should take an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionTarget {
    Done,
    ToDo,
    Cancel,
}

impl TransitionTarget {
    /// Lowercase fragments of transition names that lead to this target.
    pub fn keywords(self) -> &'static [&'static str] {
        match self {
            TransitionTarget::Done => &[
                "done", "완료", "complete", "closed", "종료", "resolved", "해결됨",
            ],
            TransitionTarget::ToDo => &[
                "to do", "해야 할 일", "reopen", "open", "backlog", "되돌리기",
            ],
            TransitionTarget::Cancel => &[
                "취소", "cancel", "done", "완료", "closed", "종료", "resolved", "해결됨",
            ],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TransitionTarget::Done => "done",
            TransitionTarget::ToDo => "todo",
            TransitionTarget::Cancel => "cancel",
        }
    }
}

impl fmt::Display for TransitionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TransitionTarget {
    type Err = crate::error::BacklogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "done" => Ok(TransitionTarget::Done),
            "todo" | "to_do" | "to-do" => Ok(TransitionTarget::ToDo),
            "cancel" | "cancelled" => Ok(TransitionTarget::Cancel),
            _ => Err(crate::error::BacklogError::Unknown {
                kind: "transition target",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// IssueKind
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    Epic,
    Story,
    Task,
    Subtask,
    Other,
}

impl IssueKind {
    /// Classify a tracker issue type name (English or Korean Jira locales).
    pub fn classify(type_name: &str) -> Self {
        let t = type_name.trim().to_lowercase();
        if t.contains("epic") || t.contains("에픽") {
            IssueKind::Epic
        } else if t.contains("sub-task") || t.contains("subtask") || t.contains("하위 작업") {
            IssueKind::Subtask
        } else if t.contains("story") || t.contains("스토리") {
            IssueKind::Story
        } else if t.contains("task") || t.contains("작업") {
            IssueKind::Task
        } else {
            IssueKind::Other
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            IssueKind::Epic => "epic",
            IssueKind::Story => "story",
            IssueKind::Task => "task",
            IssueKind::Subtask => "subtask",
            IssueKind::Other => "other",
        }
    }
}

impl fmt::Display for IssueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IssueKind {
    type Err = crate::error::BacklogError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "epic" => Ok(IssueKind::Epic),
            "story" => Ok(IssueKind::Story),
            "task" => Ok(IssueKind::Task),
            "subtask" => Ok(IssueKind::Subtask),
            "other" => Ok(IssueKind::Other),
            _ => Err(crate::error::BacklogError::Unknown {
                kind: "issue type",
                value: s.to_string(),
            }),
        }
    }
}

// ---------------------------------------------------------------------------
// Priority
// ---------------------------------------------------------------------------

/// Map a backlog priority to the tracker's priority name.
pub fn tracker_priority(backlog_priority: &str) -> &'static str {
    match backlog_priority.trim() {
        "Critical" => "Highest",
        "High" => "High",
        "Low" => "Low",
        _ => "Medium",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(StatusCategory::classify("Done"), StatusCategory::Done);
        assert_eq!(StatusCategory::classify("완료"), StatusCategory::Done);
        assert_eq!(StatusCategory::classify(" 진행 중 "), StatusCategory::InProgress);
        assert_eq!(StatusCategory::classify("Code Review"), StatusCategory::InProgress);
        assert_eq!(StatusCategory::classify("해야 할 일"), StatusCategory::ToDo);
        assert_eq!(StatusCategory::classify(""), StatusCategory::ToDo);
        assert_eq!(StatusCategory::classify("취소"), StatusCategory::Cancelled);
        assert!(StatusCategory::Cancelled.is_closed());
        assert!(!StatusCategory::InProgress.is_closed());
    }

    #[test]
    fn issue_kind_classification() {
        assert_eq!(IssueKind::classify("에픽"), IssueKind::Epic);
        assert_eq!(IssueKind::classify("Story"), IssueKind::Story);
        assert_eq!(IssueKind::classify("작업"), IssueKind::Task);
        assert_eq!(IssueKind::classify("하위 작업"), IssueKind::Subtask);
        assert_eq!(IssueKind::classify("Sub-task"), IssueKind::Subtask);
        assert_eq!(IssueKind::classify("Bug"), IssueKind::Other);
    }

    #[test]
    fn transition_target_parse() {
        assert_eq!("todo".parse::<TransitionTarget>().unwrap(), TransitionTarget::ToDo);
        assert_eq!("Done".parse::<TransitionTarget>().unwrap(), TransitionTarget::Done);
        assert!("later".parse::<TransitionTarget>().is_err());
    }

    #[test]
    fn priority_mapping() {
        assert_eq!(tracker_priority("Critical"), "Highest");
        assert_eq!(tracker_priority("Low"), "Low");
        assert_eq!(tracker_priority("P0"), "Medium");
    }
}
