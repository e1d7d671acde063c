use anyhow::{Context, Result};
use std::collections::HashMap;
use std::io::{self, Write};
use std::time::Duration;
use time::{Date, OffsetDateTime, UtcOffset};
use timekeep::domain::{EntryId, EntryQuery, Project, ProjectId, Task, TaskId, TimeEntry};
use timekeep::time_utils::{format_date, format_hms, format_minutes};
use timekeep::{
    completed_tasks, week_start, EntryFilter, EntryReconciler, ManualEntryDraft,
    TimeTrackerClient, TimerController, TimerState,
};

use crate::cli::Commands;
use crate::config::TimekeepConfig;
use crate::login;

const WEEKDAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

pub fn print_config_path() -> Result<()> {
    let path = TimekeepConfig::config_path()?;
    if TimekeepConfig::ensure_exists(&path)? {
        println!("Created default config at {}", path.display());
    } else {
        println!("{}", path.display());
    }
    Ok(())
}

/// Everything a command needs: the API client and the local calendar.
pub struct Session {
    client: TimeTrackerClient,
    reconciler: EntryReconciler,
    offset: UtcOffset,
}

impl Session {
    pub fn new(client: TimeTrackerClient, offset: UtcOffset) -> Self {
        Self {
            client,
            reconciler: EntryReconciler::new(offset),
            offset,
        }
    }

    fn today(&self) -> Date {
        OffsetDateTime::now_utc().to_offset(self.offset).date()
    }

    pub async fn run(&self, command: Commands) -> Result<()> {
        match command {
            Commands::Login { email } => self.login(email).await,
            Commands::Register { username, email } => self.register(username, email).await,
            Commands::Logout => self.logout().await,
            Commands::Status => self.status().await,
            Commands::Start { project, task } => self.start(project, task).await,
            Commands::Stop => self.stop().await,
            Commands::Watch => self.watch().await,
            Commands::Add {
                project,
                task,
                start,
                end,
                date,
            } => self.add(project, task, &start, &end, date).await,
            Commands::List {
                project,
                task,
                date,
            } => self.list(project, task, date).await,
            Commands::Delete { id } => self.delete(id).await,
            Commands::Summary {
                project,
                date,
                recent,
            } => self.summary(project, date, recent).await,
            Commands::Projects => self.projects().await,
            Commands::ConfigPath => print_config_path(),
        }
    }

    async fn login(&self, email: Option<String>) -> Result<()> {
        let email = login::value_or_prompt(email, "Email")?;
        let password = login::prompt_password()?;
        let user = self
            .client
            .login(&email, &password)
            .await
            .context("Login failed")?;
        println!("Logged in as {} <{}>", user.username, user.email);
        Ok(())
    }

    async fn register(&self, username: Option<String>, email: Option<String>) -> Result<()> {
        let username = login::value_or_prompt(username, "Username")?;
        let email = login::value_or_prompt(email, "Email")?;
        let password = login::prompt_password()?;
        let user = self
            .client
            .register(&username, &email, &password)
            .await
            .context("Registration failed")?;
        println!("Registered and logged in as {} <{}>", user.username, user.email);
        Ok(())
    }

    async fn logout(&self) -> Result<()> {
        if let Err(e) = self.client.logout().await {
            eprintln!("Warning: server logout failed: {}", e);
        }
        println!("Logged out. Local session removed.");
        Ok(())
    }

    async fn status(&self) -> Result<()> {
        let Some(credential) = self.client.store().get() else {
            println!("Not logged in.");
            return Ok(());
        };
        println!(
            "Logged in as {} <{}>",
            credential.user.username, credential.user.email
        );

        let mut controller = TimerController::new(self.client.clone());
        match controller.sync().await? {
            TimerState::Running => {
                if let Some(entry) = controller.running_entry() {
                    println!(
                        "Timer running: {} / {} since {} ({})",
                        entry.project_id,
                        entry.task_id,
                        clock(entry.start_time, self.offset),
                        format_hms(controller.elapsed_seconds())
                    );
                }
            }
            TimerState::Idle => println!("No timer running."),
        }

        let entries = self.client.list_entries(&EntryQuery::default()).await?;
        let summary = self.reconciler.summary(&entries, self.today());
        println!(
            "Today: {}  This week: {}",
            format_minutes(summary.today),
            format_minutes(summary.week)
        );
        Ok(())
    }

    async fn start(&self, project: String, task: String) -> Result<()> {
        let mut controller = TimerController::new(self.client.clone());
        if controller.sync().await? == TimerState::Running {
            if let Some(entry) = controller.running_entry() {
                println!(
                    "Timer already running for {} / {} ({})",
                    entry.project_id,
                    entry.task_id,
                    format_hms(controller.elapsed_seconds())
                );
            }
            return Ok(());
        }

        controller.select(project, task);
        match controller.start().await? {
            Some(entry) => println!(
                "Started timer for {} / {} at {}",
                entry.project_id,
                entry.task_id,
                clock(entry.start_time, self.offset)
            ),
            None => println!("Timer already running."),
        }
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        let mut controller = TimerController::new(self.client.clone());
        controller.sync().await?;
        match controller.stop().await? {
            Some(entry) => println!("Stopped. {}", entry_line(&entry, self.offset)),
            None => println!("No timer running."),
        }
        Ok(())
    }

    async fn watch(&self) -> Result<()> {
        let mut controller = TimerController::new(self.client.clone());
        if controller.sync().await? == TimerState::Idle {
            println!("No timer running.");
            return Ok(());
        }
        if let Some(entry) = controller.running_entry() {
            println!(
                "{} / {} (Ctrl-C to detach, the timer keeps running)",
                entry.project_id, entry.task_id
            );
        }

        let mut ticker = tokio::time::interval(Duration::from_secs(1));
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    print!("\r{}", format_hms(controller.elapsed_seconds()));
                    io::stdout().flush()?;
                }
                res = &mut ctrl_c => {
                    res.context("Failed to listen for Ctrl-C")?;
                    break;
                }
            }
        }

        println!();
        Ok(())
    }

    async fn add(
        &self,
        project: String,
        task: String,
        start: &str,
        end: &str,
        date: Option<Date>,
    ) -> Result<()> {
        let date = date.unwrap_or_else(|| self.today());
        let draft = ManualEntryDraft::from_clock_times(project, task, date, start, end, self.offset)?;
        let request = self.reconciler.validate_manual_entry(&draft)?;
        let entry = self.client.add_manual_entry(&request).await?;
        println!("Added {}", entry_line(&entry, self.offset));
        Ok(())
    }

    async fn list(
        &self,
        project: Option<String>,
        task: Option<String>,
        date: Option<Date>,
    ) -> Result<()> {
        let query = EntryQuery {
            project_id: project.map(Into::into),
            task_id: task.map(Into::into),
            date,
        };
        let mut entries = self.client.list_entries(&query).await?;
        if entries.is_empty() {
            println!("No entries.");
            return Ok(());
        }

        entries.sort_by_key(|e| e.start_time);
        for entry in &entries {
            println!("{}", entry_line(entry, self.offset));
        }
        println!(
            "Total: {}",
            format_minutes(
                self.reconciler
                    .total_minutes(&entries, &EntryFilter::default())
            )
        );
        Ok(())
    }

    async fn delete(&self, id: String) -> Result<()> {
        let id = EntryId::new(id);
        self.client
            .delete_entry(&id)
            .await
            .with_context(|| format!("Failed to delete entry {}", id))?;
        println!("Deleted {}", id);
        Ok(())
    }

    async fn summary(
        &self,
        project: Option<String>,
        date: Option<Date>,
        recent: usize,
    ) -> Result<()> {
        let day = date.unwrap_or_else(|| self.today());
        let project_id: Option<ProjectId> = project.map(Into::into);
        let query = EntryQuery {
            project_id: project_id.clone(),
            ..EntryQuery::default()
        };
        let entries = self.client.list_entries(&query).await?;

        let summary = self.reconciler.summary(&entries, day);
        println!("{}: {}", format_date(day), format_minutes(summary.today));
        for line in week_lines(&self.reconciler.weekly_totals(&entries, day), day) {
            println!("  {}", line);
        }
        println!("Week: {}", format_minutes(summary.week));

        if project_id.is_none() {
            let names = self.project_names().await;
            println!("Projects:");
            for (id, minutes) in self.reconciler.project_totals(&entries) {
                let name = names.get(&id).map(String::as_str).unwrap_or(id.as_str());
                println!("  {:<24} {}", name, format_minutes(minutes));
            }
        }

        let tasks = match self.client.list_tasks().await {
            Ok(tasks) => tasks,
            Err(e) => {
                tracing::warn!("Could not load tasks: {}", e);
                Vec::new()
            }
        };
        let task_names: HashMap<TaskId, &str> =
            tasks.iter().map(|t| (t.id.clone(), t.name.as_str())).collect();
        println!("Tasks:");
        for (id, minutes) in self.reconciler.task_totals(&entries) {
            let name = task_names.get(&id).copied().unwrap_or(id.as_str());
            println!("  {:<24} {}", name, format_minutes(minutes));
        }
        println!("Tasks completed: {}", completed_tasks(&tasks));

        let filter = EntryFilter {
            project_id,
            date: None,
        };
        let latest = self.reconciler.recent_entries(&entries, &filter, recent);
        if !latest.is_empty() {
            println!("Recent entries:");
            for entry in latest {
                println!("  {}", entry_line(entry, self.offset));
            }
        }
        Ok(())
    }

    async fn projects(&self) -> Result<()> {
        let projects = self.client.list_projects().await?;
        let tasks = self.client.list_tasks().await?;
        for line in project_tree(&projects, &tasks) {
            println!("{}", line);
        }
        Ok(())
    }

    /// Project names for display. Falls back to bare ids when the lookup fails.
    async fn project_names(&self) -> HashMap<ProjectId, String> {
        match self.client.list_projects().await {
            Ok(projects) => projects.into_iter().map(|p| (p.id, p.name)).collect(),
            Err(e) => {
                tracing::warn!("Could not load project names: {}", e);
                HashMap::new()
            }
        }
    }
}

fn clock(dt: OffsetDateTime, offset: UtcOffset) -> String {
    let local = dt.to_offset(offset);
    format!("{:02}:{:02}", local.hour(), local.minute())
}

fn entry_line(entry: &TimeEntry, offset: UtcOffset) -> String {
    let start = entry.start_time.to_offset(offset);
    let end = entry
        .end_time
        .map(|end| clock(end, offset))
        .unwrap_or_else(|| "now".to_string());
    let duration = entry
        .finished_minutes()
        .map(format_minutes)
        .unwrap_or_else(|| "running".to_string());

    format!(
        "{}  {} {}-{}  {:>8}  {} / {}",
        entry.id,
        format_date(start.date()),
        clock(start, offset),
        end,
        duration,
        entry.project_id,
        entry.task_id
    )
}

fn week_lines(totals: &[i64; 7], any_day: Date) -> Vec<String> {
    let sunday = week_start(any_day);
    totals
        .iter()
        .enumerate()
        .map(|(i, minutes)| {
            let day = sunday + time::Duration::days(i as i64);
            format!("{} {}  {}", WEEKDAYS[i], format_date(day), format_minutes(*minutes))
        })
        .collect()
}

fn project_tree(projects: &[Project], tasks: &[Task]) -> Vec<String> {
    let mut lines = Vec::new();
    for project in projects {
        lines.push(format!("{}  {}", project.id, project.name));
        for task in tasks.iter().filter(|t| t.project.id() == &project.id) {
            lines.push(format!("  {}  {} ({:?})", task.id, task.name, task.status));
        }
    }
    lines
}
