use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{EntryId, ProjectId, TaskId, UserId};

/// A time entry as recorded by the service.
///
/// Entries are snapshots: the service owns `end_time` and `duration_minutes`,
/// the client never patches them locally.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeEntry {
    #[serde(rename = "_id", alias = "id")]
    pub id: EntryId,
    pub user_id: UserId,
    pub project_id: ProjectId,
    pub task_id: TaskId,
    #[serde(with = "time::serde::rfc3339")]
    pub start_time: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    #[serde(rename = "duration", default)]
    pub duration_minutes: Option<i64>,
    pub is_running: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl TimeEntry {
    /// Check the running/finished invariants of an entry.
    ///
    /// A running entry has neither end time nor duration. A finished entry ends
    /// strictly after it starts and its duration is the rounded minute count
    /// between the two.
    pub fn is_consistent(&self) -> bool {
        match (self.is_running, self.end_time, self.duration_minutes) {
            (true, None, None) => true,
            (false, Some(end), Some(minutes)) => {
                end > self.start_time && minutes == duration_minutes_between(self.start_time, end)
            }
            _ => false,
        }
    }

    /// Finalized duration, `None` while the entry is still running.
    pub fn finished_minutes(&self) -> Option<i64> {
        if self.is_running {
            None
        } else {
            self.duration_minutes
        }
    }
}

/// Minutes between two instants, rounded half up.
pub fn duration_minutes_between(start: OffsetDateTime, end: OffsetDateTime) -> i64 {
    let seconds = (end - start).whole_seconds();
    (seconds as f64 / 60.0).round() as i64
}

/// A project available for time tracking.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    #[serde(rename = "_id", alias = "id")]
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Reference to the project a task belongs to. The task listing embeds the
/// project document, older payloads carry only its id.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum TaskProject {
    Embedded {
        #[serde(rename = "_id")]
        id: ProjectId,
        name: String,
    },
    Id(ProjectId),
}

impl TaskProject {
    pub fn id(&self) -> &ProjectId {
        match self {
            TaskProject::Embedded { id, .. } => id,
            TaskProject::Id(id) => id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Done,
}

/// A task within a project.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    #[serde(rename = "_id", alias = "id")]
    pub id: TaskId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(rename = "projectId")]
    pub project: TaskProject,
}
