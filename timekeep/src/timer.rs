use async_trait::async_trait;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::Duration;
use time::OffsetDateTime;
use tokio::task::JoinHandle;

use crate::domain::{ProjectId, TaskId, TimeEntry};
use crate::error::{ApiError, ValidationError};

const TICK: Duration = Duration::from_secs(1);

/// Server-side timer operations the controller depends on.
#[async_trait]
pub trait TimerApi: Send + Sync {
    async fn start_timer(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
    ) -> Result<TimeEntry, ApiError>;

    async fn stop_timer(&self) -> Result<TimeEntry, ApiError>;

    async fn running_entry(&self) -> Result<Option<TimeEntry>, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Idle,
    Running,
}

/// Snapshot of the controller for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimerSession {
    pub state: TimerState,
    pub selected_project_id: Option<ProjectId>,
    pub selected_task_id: Option<TaskId>,
    pub elapsed_seconds: u64,
}

/// A once-per-second counter running on its own task. Dropping it stops the task.
#[derive(Debug)]
struct ElapsedClock {
    seconds: Arc<AtomicU64>,
    task: JoinHandle<()>,
}

impl ElapsedClock {
    fn start(initial: u64) -> Self {
        let seconds = Arc::new(AtomicU64::new(initial));
        let counter = seconds.clone();
        let task = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + TICK, TICK);
            loop {
                interval.tick().await;
                counter.fetch_add(1, Ordering::Relaxed);
            }
        });

        Self { seconds, task }
    }

    fn elapsed(&self) -> u64 {
        self.seconds.load(Ordering::Relaxed)
    }
}

impl Drop for ElapsedClock {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// Idle/Running state machine for the live work timer.
///
/// Transitions only happen after the server confirms them. The elapsed counter
/// is a display aid; recorded durations come from the server.
pub struct TimerController<A: TimerApi> {
    api: A,
    state: TimerState,
    selected_project: Option<ProjectId>,
    selected_task: Option<TaskId>,
    running: Option<TimeEntry>,
    clock: Option<ElapsedClock>,
}

impl<A: TimerApi> TimerController<A> {
    pub fn new(api: A) -> Self {
        Self {
            api,
            state: TimerState::Idle,
            selected_project: None,
            selected_task: None,
            running: None,
            clock: None,
        }
    }

    pub fn select(&mut self, project_id: impl Into<ProjectId>, task_id: impl Into<TaskId>) {
        self.selected_project = Some(project_id.into());
        self.selected_task = Some(task_id.into());
    }

    pub fn state(&self) -> TimerState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == TimerState::Running
    }

    pub fn elapsed_seconds(&self) -> u64 {
        self.clock.as_ref().map(ElapsedClock::elapsed).unwrap_or(0)
    }

    pub fn running_entry(&self) -> Option<&TimeEntry> {
        self.running.as_ref()
    }

    pub fn session(&self) -> TimerSession {
        TimerSession {
            state: self.state,
            selected_project_id: self.selected_project.clone(),
            selected_task_id: self.selected_task.clone(),
            elapsed_seconds: self.elapsed_seconds(),
        }
    }

    /// Start the timer for the current selection.
    ///
    /// Returns `Ok(None)` without calling the server when already running.
    pub async fn start(&mut self) -> Result<Option<TimeEntry>, ApiError> {
        if self.is_running() {
            tracing::debug!("start ignored, timer already running");
            return Ok(None);
        }

        let project_id = self
            .selected_project
            .clone()
            .filter(|p| !p.is_blank())
            .ok_or(ValidationError::MissingProject)?;
        let task_id = self
            .selected_task
            .clone()
            .filter(|t| !t.is_blank())
            .ok_or(ValidationError::MissingTask)?;

        match self.api.start_timer(&project_id, &task_id).await {
            Ok(entry) => {
                self.reconcile(entry.clone(), 0);
                Ok(Some(entry))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Stop the running timer. Returns `Ok(None)` without calling the server when idle.
    pub async fn stop(&mut self) -> Result<Option<TimeEntry>, ApiError> {
        if !self.is_running() {
            tracing::debug!("stop ignored, timer is idle");
            return Ok(None);
        }

        match self.api.stop_timer().await {
            Ok(entry) => {
                self.reconcile(entry.clone(), 0);
                Ok(Some(entry))
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Adopt the server's running entry, if any, e.g. after a restart.
    ///
    /// The counter resumes from the time elapsed since the entry started.
    pub async fn sync(&mut self) -> Result<TimerState, ApiError> {
        match self.api.running_entry().await {
            Ok(Some(entry)) => {
                let elapsed = (OffsetDateTime::now_utc() - entry.start_time)
                    .whole_seconds()
                    .max(0) as u64;
                self.selected_project = Some(entry.project_id.clone());
                self.selected_task = Some(entry.task_id.clone());
                self.reconcile(entry, elapsed);
            }
            Ok(None) => self.abandon(),
            Err(e) => return Err(self.fail(e)),
        }
        Ok(self.state)
    }

    /// Drop to Idle without contacting the server, e.g. when the session ended.
    pub fn abandon(&mut self) {
        self.clock = None;
        self.running = None;
        self.state = TimerState::Idle;
    }

    fn reconcile(&mut self, entry: TimeEntry, elapsed: u64) {
        if !entry.is_running {
            self.abandon();
            return;
        }

        let same_entry = self.running.as_ref().is_some_and(|r| r.id == entry.id);
        if self.clock.is_none() || !same_entry {
            self.clock = Some(ElapsedClock::start(elapsed));
        }
        self.running = Some(entry);
        self.state = TimerState::Running;
    }

    fn fail(&mut self, err: ApiError) -> ApiError {
        if err.is_unauthenticated() {
            tracing::debug!("session lost, timer reset to idle");
            self.abandon();
        }
        err
    }
}
