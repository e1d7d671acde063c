use async_trait::async_trait;

use crate::credentials::{Credential, CredentialStore, UserRef};
use crate::domain::{
    AuthResponse, EntryId, EntryPatch, EntryQuery, LoginRequest, ManualEntryRequest, Project,
    ProjectId, RegisterRequest, StartTimerRequest, Task, TaskId, TimeEntry,
};
use crate::error::{ApiError, ValidationError};
use crate::timer::TimerApi;
use crate::transport::{ApiRequest, AuthenticatedTransport, RefreshPolicy};

/// Typed access to the time tracking service.
#[derive(Debug, Clone)]
pub struct TimeTrackerClient {
    transport: AuthenticatedTransport,
}

impl TimeTrackerClient {
    pub fn new(
        base_url: &str,
        store: CredentialStore,
        policy: RefreshPolicy,
    ) -> Result<Self, ApiError> {
        Ok(Self {
            transport: AuthenticatedTransport::new(base_url, store, policy)?,
        })
    }

    pub fn from_transport(transport: AuthenticatedTransport) -> Self {
        Self { transport }
    }

    pub fn store(&self) -> &CredentialStore {
        self.transport.store()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserRef, ApiError> {
        let request =
            ApiRequest::post("/auth/login").with_json(&LoginRequest { email, password })?;
        let auth: AuthResponse = self.transport.public_json(&request).await?;
        Ok(self.adopt(auth))
    }

    pub async fn register(
        &self,
        username: &str,
        email: &str,
        password: &str,
    ) -> Result<UserRef, ApiError> {
        let request = ApiRequest::post("/auth/register").with_json(&RegisterRequest {
            username,
            email,
            password,
        })?;
        let auth: AuthResponse = self.transport.public_json(&request).await?;
        Ok(self.adopt(auth))
    }

    fn adopt(&self, auth: AuthResponse) -> UserRef {
        tracing::debug!(user = %auth.user.username, "signed in");
        self.store()
            .set(Credential::new(auth.access_token, auth.user.clone()));
        auth.user
    }

    /// Invalidate the session on the server and locally.
    ///
    /// The local session is cleared even when the server call fails; the
    /// server error is still returned.
    pub async fn logout(&self) -> Result<(), ApiError> {
        if !self.store().is_authenticated() {
            self.store().clear();
            return Ok(());
        }

        let result = self
            .transport
            .empty(&ApiRequest::post("/auth/logout"))
            .await;
        if let Err(e) = &result {
            tracing::warn!("Logout request failed: {}", e);
        }
        self.store().clear();
        result
    }

    pub async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<TimeEntry>, ApiError> {
        let entries: Vec<TimeEntry> = self
            .transport
            .json(&ApiRequest::get("/timer").with_query(query.to_pairs()))
            .await?;

        for entry in entries.iter().filter(|e| !e.is_consistent()) {
            tracing::warn!(entry = %entry.id, "server returned an inconsistent time entry");
        }
        Ok(entries)
    }

    pub async fn start_timer(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
    ) -> Result<TimeEntry, ApiError> {
        if project_id.is_blank() {
            return Err(ValidationError::MissingProject.into());
        }
        if task_id.is_blank() {
            return Err(ValidationError::MissingTask.into());
        }

        let request = ApiRequest::post("/timer/start").with_json(&StartTimerRequest {
            project_id,
            task_id,
        })?;
        self.transport.json(&request).await
    }

    pub async fn stop_timer(&self) -> Result<TimeEntry, ApiError> {
        self.transport.json(&ApiRequest::post("/timer/stop")).await
    }

    /// The user's running entry, if any.
    pub async fn running_entry(&self) -> Result<Option<TimeEntry>, ApiError> {
        let entries = self.list_entries(&EntryQuery::default()).await?;
        Ok(entries.into_iter().find(|e| e.is_running))
    }

    pub async fn add_manual_entry(
        &self,
        entry: &ManualEntryRequest,
    ) -> Result<TimeEntry, ApiError> {
        let request = ApiRequest::post("/timer/manual").with_json(entry)?;
        self.transport.json(&request).await
    }

    pub async fn edit_entry(
        &self,
        id: &EntryId,
        patch: &EntryPatch,
    ) -> Result<TimeEntry, ApiError> {
        if patch.is_empty() {
            return Err(ValidationError::EmptyPatch.into());
        }
        if let (Some(start), Some(end)) = (patch.start_time, patch.end_time) {
            if end <= start {
                return Err(ValidationError::EndNotAfterStart.into());
            }
        }
        if patch.project_id.as_ref().is_some_and(|p| p.is_blank()) {
            return Err(ValidationError::MissingProject.into());
        }
        if patch.task_id.as_ref().is_some_and(|t| t.is_blank()) {
            return Err(ValidationError::MissingTask.into());
        }

        let request = ApiRequest::patch(format!("/timer/{}", id)).with_json(patch)?;
        self.transport.json(&request).await
    }

    pub async fn delete_entry(&self, id: &EntryId) -> Result<(), ApiError> {
        self.transport
            .empty(&ApiRequest::delete(format!("/timer/{}", id)))
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>, ApiError> {
        let mut projects: Vec<Project> = self
            .transport
            .json(&ApiRequest::get("/projects/getProject"))
            .await?;
        projects.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(projects)
    }

    pub async fn list_tasks(&self) -> Result<Vec<Task>, ApiError> {
        let mut tasks: Vec<Task> = self
            .transport
            .json(&ApiRequest::get("/tasks/getTasks"))
            .await?;
        tasks.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tasks)
    }
}

#[async_trait]
impl TimerApi for TimeTrackerClient {
    async fn start_timer(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
    ) -> Result<TimeEntry, ApiError> {
        TimeTrackerClient::start_timer(self, project_id, task_id).await
    }

    async fn stop_timer(&self) -> Result<TimeEntry, ApiError> {
        TimeTrackerClient::stop_timer(self).await
    }

    async fn running_entry(&self) -> Result<Option<TimeEntry>, ApiError> {
        TimeTrackerClient::running_entry(self).await
    }
}
