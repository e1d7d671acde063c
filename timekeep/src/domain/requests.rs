use serde::{Deserialize, Serialize};
use time::{Date, OffsetDateTime};

use super::{ProjectId, TaskId};
use crate::credentials::UserRef;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterRequest<'a> {
    pub username: &'a str,
    pub email: &'a str,
    pub password: &'a str,
}

/// Body returned by login and register.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub access_token: String,
    pub user: UserRef,
}

/// Body returned by the refresh endpoint.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RefreshResponse {
    pub access_token: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct StartTimerRequest<'a> {
    pub project_id: &'a ProjectId,
    pub task_id: &'a TaskId,
}

/// A manual entry that passed validation and can be sent as is.
///
/// Only [`crate::EntryReconciler::validate_manual_entry`] builds one, so an
/// invalid range never reaches the network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualEntryRequest {
    pub(crate) project_id: ProjectId,
    pub(crate) task_id: TaskId,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub(crate) end_time: OffsetDateTime,
}

impl ManualEntryRequest {
    pub fn project_id(&self) -> &ProjectId {
        &self.project_id
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    pub fn start_time(&self) -> OffsetDateTime {
        self.start_time
    }

    pub fn end_time(&self) -> OffsetDateTime {
        self.end_time
    }
}

/// Partial update of an existing entry. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_id: Option<ProjectId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub start_time: Option<OffsetDateTime>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub end_time: Option<OffsetDateTime>,
}

impl EntryPatch {
    pub fn is_empty(&self) -> bool {
        self.project_id.is_none()
            && self.task_id.is_none()
            && self.start_time.is_none()
            && self.end_time.is_none()
    }
}

/// Filters for listing entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryQuery {
    pub project_id: Option<ProjectId>,
    pub task_id: Option<TaskId>,
    pub date: Option<Date>,
}

impl EntryQuery {
    pub fn with_project(mut self, id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    pub fn with_task(mut self, id: impl Into<TaskId>) -> Self {
        self.task_id = Some(id.into());
        self
    }

    pub fn on(mut self, date: Date) -> Self {
        self.date = Some(date);
        self
    }

    pub(crate) fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(id) = &self.project_id {
            pairs.push(("projectId".to_string(), id.to_string()));
        }
        if let Some(id) = &self.task_id {
            pairs.push(("taskId".to_string(), id.to_string()));
        }
        if let Some(date) = self.date {
            pairs.push(("date".to_string(), crate::time_utils::format_date(date)));
        }
        pairs
    }
}
