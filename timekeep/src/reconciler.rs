use std::collections::BTreeMap;
use time::{macros::format_description, Date, Duration, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

use crate::domain::{ManualEntryRequest, ProjectId, Task, TaskId, TaskStatus, TimeEntry};
use crate::error::ValidationError;

/// User input for a manual entry, before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualEntryDraft {
    pub project_id: ProjectId,
    pub task_id: TaskId,
    pub start: OffsetDateTime,
    pub end: OffsetDateTime,
}

impl ManualEntryDraft {
    pub fn new(
        project_id: impl Into<ProjectId>,
        task_id: impl Into<TaskId>,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            task_id: task_id.into(),
            start,
            end,
        }
    }

    /// Build a draft from two `HH:MM` times of day on `date`.
    pub fn from_clock_times(
        project_id: impl Into<ProjectId>,
        task_id: impl Into<TaskId>,
        date: Date,
        start: &str,
        end: &str,
        offset: UtcOffset,
    ) -> Result<Self, ValidationError> {
        let at = |raw: &str| -> Result<OffsetDateTime, ValidationError> {
            let time = parse_clock_time(raw)?;
            Ok(PrimitiveDateTime::new(date, time).assume_offset(offset))
        };

        Ok(Self::new(project_id, task_id, at(start)?, at(end)?))
    }
}

fn parse_clock_time(raw: &str) -> Result<Time, ValidationError> {
    Time::parse(raw.trim(), format_description!("[hour]:[minute]"))
        .map_err(|_| ValidationError::InvalidClockTime(raw.to_string()))
}

/// Which entries an aggregate covers. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntryFilter {
    pub project_id: Option<ProjectId>,
    pub date: Option<Date>,
}

impl EntryFilter {
    pub fn for_project(mut self, id: impl Into<ProjectId>) -> Self {
        self.project_id = Some(id.into());
        self
    }

    pub fn on(mut self, date: Date) -> Self {
        self.date = Some(date);
        self
    }
}

/// Minutes logged today and in the current Sunday-start week.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Summary {
    pub today: i64,
    pub week: i64,
}

/// Validation of manual entries and aggregation of finished ones.
///
/// Entries are bucketed by the calendar date of their start time in `offset`.
/// Totals only ever add up server-recorded durations; running entries count
/// as zero.
#[derive(Debug, Clone, Copy)]
pub struct EntryReconciler {
    offset: UtcOffset,
}

impl Default for EntryReconciler {
    fn default() -> Self {
        Self::new(UtcOffset::UTC)
    }
}

impl EntryReconciler {
    pub fn new(offset: UtcOffset) -> Self {
        Self { offset }
    }

    pub fn validate_manual_entry(
        &self,
        draft: &ManualEntryDraft,
    ) -> Result<ManualEntryRequest, ValidationError> {
        if draft.project_id.is_blank() {
            return Err(ValidationError::MissingProject);
        }
        if draft.task_id.is_blank() {
            return Err(ValidationError::MissingTask);
        }
        if draft.end <= draft.start {
            return Err(ValidationError::EndNotAfterStart);
        }

        Ok(ManualEntryRequest {
            project_id: draft.project_id.clone(),
            task_id: draft.task_id.clone(),
            start_time: draft.start,
            end_time: draft.end,
        })
    }

    pub fn total_minutes(&self, entries: &[TimeEntry], filter: &EntryFilter) -> i64 {
        entries
            .iter()
            .filter(|e| self.matches(e, filter))
            .filter_map(TimeEntry::finished_minutes)
            .sum()
    }

    /// The newest `limit` entries matching `filter`, latest start first.
    pub fn recent_entries<'a>(
        &self,
        entries: &'a [TimeEntry],
        filter: &EntryFilter,
        limit: usize,
    ) -> Vec<&'a TimeEntry> {
        let mut recent: Vec<&TimeEntry> = entries
            .iter()
            .filter(|e| self.matches(e, filter))
            .collect();
        recent.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        recent.truncate(limit);
        recent
    }

    /// Minutes per day of the week containing `any_day_in_week`, Sunday first.
    pub fn weekly_totals(&self, entries: &[TimeEntry], any_day_in_week: Date) -> [i64; 7] {
        let week_start = week_start(any_day_in_week);
        let mut totals = [0; 7];

        for entry in entries {
            let Some(minutes) = entry.finished_minutes() else {
                continue;
            };
            let offset = (self.local_date(entry) - week_start).whole_days();
            if (0..7).contains(&offset) {
                totals[offset as usize] += minutes;
            }
        }

        totals
    }

    pub fn summary(&self, entries: &[TimeEntry], today: Date) -> Summary {
        Summary {
            today: self.total_minutes(entries, &EntryFilter::default().on(today)),
            week: self.weekly_totals(entries, today).iter().sum(),
        }
    }

    pub fn project_totals(&self, entries: &[TimeEntry]) -> BTreeMap<ProjectId, i64> {
        let mut totals = BTreeMap::new();
        for entry in entries {
            if let Some(minutes) = entry.finished_minutes() {
                *totals.entry(entry.project_id.clone()).or_insert(0) += minutes;
            }
        }
        totals
    }

    pub fn task_totals(&self, entries: &[TimeEntry]) -> BTreeMap<TaskId, i64> {
        let mut totals = BTreeMap::new();
        for entry in entries {
            if let Some(minutes) = entry.finished_minutes() {
                *totals.entry(entry.task_id.clone()).or_insert(0) += minutes;
            }
        }
        totals
    }

    fn matches(&self, entry: &TimeEntry, filter: &EntryFilter) -> bool {
        filter
            .project_id
            .as_ref()
            .map_or(true, |id| &entry.project_id == id)
            && filter
                .date
                .map_or(true, |date| self.local_date(entry) == date)
    }

    fn local_date(&self, entry: &TimeEntry) -> Date {
        entry.start_time.to_offset(self.offset).date()
    }
}

/// The entry still being timed, if the list contains one.
pub fn running_entry(entries: &[TimeEntry]) -> Option<&TimeEntry> {
    entries.iter().find(|e| e.is_running)
}

/// Number of tasks marked done.
pub fn completed_tasks(tasks: &[Task]) -> usize {
    tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Done)
        .count()
}

/// The Sunday that opens the week containing `day`.
pub fn week_start(day: Date) -> Date {
    day - Duration::days(day.weekday().number_days_from_sunday() as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{EntryId, TaskProject, UserId};
    use time::macros::{date, datetime, offset};

    fn entry(id: &str, project: &str, start: OffsetDateTime, minutes: i64) -> TimeEntry {
        let end = start + Duration::minutes(minutes);
        TimeEntry {
            id: EntryId::new(id),
            user_id: UserId::new("u1"),
            project_id: ProjectId::new(project),
            task_id: TaskId::new("t1"),
            start_time: start,
            end_time: Some(end),
            duration_minutes: Some(minutes),
            is_running: false,
            created_at: start,
            updated_at: end,
        }
    }

    fn running(start: OffsetDateTime) -> TimeEntry {
        TimeEntry {
            end_time: None,
            duration_minutes: None,
            is_running: true,
            ..entry("live", "p1", start, 0)
        }
    }

    #[test]
    fn rejects_end_not_after_start() {
        let reconciler = EntryReconciler::default();
        let at_nine = datetime!(2024-03-04 09:00 UTC);

        let same = ManualEntryDraft::new("p1", "t1", at_nine, at_nine);
        assert_eq!(
            reconciler.validate_manual_entry(&same),
            Err(ValidationError::EndNotAfterStart)
        );

        let backwards = ManualEntryDraft::new("p1", "t1", at_nine, at_nine - Duration::minutes(5));
        assert_eq!(
            reconciler.validate_manual_entry(&backwards),
            Err(ValidationError::EndNotAfterStart)
        );
    }

    #[test]
    fn rejects_missing_identifiers() {
        let reconciler = EntryReconciler::default();
        let start = datetime!(2024-03-04 09:00 UTC);
        let end = datetime!(2024-03-04 10:00 UTC);

        assert_eq!(
            reconciler.validate_manual_entry(&ManualEntryDraft::new("", "t1", start, end)),
            Err(ValidationError::MissingProject)
        );
        assert_eq!(
            reconciler.validate_manual_entry(&ManualEntryDraft::new("p1", "  ", start, end)),
            Err(ValidationError::MissingTask)
        );
    }

    #[test]
    fn accepts_valid_draft() {
        let draft = ManualEntryDraft::new(
            "p1",
            "t1",
            datetime!(2024-03-04 09:00 UTC),
            datetime!(2024-03-04 10:15 UTC),
        );
        let request = EntryReconciler::default()
            .validate_manual_entry(&draft)
            .unwrap();
        assert_eq!(request.project_id().as_str(), "p1");
        assert_eq!(request.end_time() - request.start_time(), Duration::minutes(75));
    }

    #[test]
    fn clock_times_are_placed_on_the_given_date() {
        let draft = ManualEntryDraft::from_clock_times(
            "p1",
            "t1",
            date!(2024 - 03 - 04),
            "09:00",
            "17:30",
            offset!(+2),
        )
        .unwrap();
        assert_eq!(draft.start, datetime!(2024-03-04 09:00 +2));
        assert_eq!(draft.end, datetime!(2024-03-04 17:30 +2));

        let err = ManualEntryDraft::from_clock_times(
            "p1",
            "t1",
            date!(2024 - 03 - 04),
            "9am",
            "17:30",
            offset!(+2),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::InvalidClockTime("9am".to_string()));
    }

    #[test]
    fn weekly_totals_start_on_sunday() {
        // 2024-03-03 is a Sunday.
        let entries = vec![entry("e1", "p1", datetime!(2024-03-03 09:00 UTC), 60)];
        let reconciler = EntryReconciler::default();

        assert_eq!(
            reconciler.weekly_totals(&entries, date!(2024 - 03 - 06)),
            [60, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            reconciler.weekly_totals(&entries, date!(2024 - 03 - 03)),
            [60, 0, 0, 0, 0, 0, 0]
        );
        assert_eq!(
            reconciler.weekly_totals(&entries, date!(2024 - 03 - 02)),
            [0; 7]
        );
    }

    #[test]
    fn weekly_totals_sum_per_day_and_skip_running() {
        let entries = vec![
            entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30),
            entry("e2", "p2", datetime!(2024-03-04 13:00 UTC), 45),
            entry("e3", "p1", datetime!(2024-03-09 08:00 UTC), 20),
            running(datetime!(2024-03-05 08:00 UTC)),
        ];
        assert_eq!(
            EntryReconciler::default().weekly_totals(&entries, date!(2024 - 03 - 05)),
            [0, 75, 0, 0, 0, 0, 20]
        );
    }

    #[test]
    fn dates_follow_the_reconciler_offset() {
        // 23:30 UTC on Saturday is already Sunday at +02:00.
        let entries = vec![entry("e1", "p1", datetime!(2024-03-02 23:30 UTC), 40)];

        let utc = EntryReconciler::default();
        assert_eq!(utc.weekly_totals(&entries, date!(2024 - 03 - 02))[6], 40);

        let local = EntryReconciler::new(offset!(+2));
        assert_eq!(local.weekly_totals(&entries, date!(2024 - 03 - 03))[0], 40);
    }

    #[test]
    fn total_minutes_applies_filters() {
        let entries = vec![
            entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30),
            entry("e2", "p2", datetime!(2024-03-04 13:00 UTC), 45),
            entry("e3", "p1", datetime!(2024-03-05 08:00 UTC), 20),
            running(datetime!(2024-03-04 15:00 UTC)),
        ];
        let reconciler = EntryReconciler::default();

        assert_eq!(reconciler.total_minutes(&entries, &EntryFilter::default()), 95);
        assert_eq!(
            reconciler.total_minutes(&entries, &EntryFilter::default().for_project("p1")),
            50
        );
        assert_eq!(
            reconciler.total_minutes(
                &entries,
                &EntryFilter::default()
                    .for_project("p1")
                    .on(date!(2024 - 03 - 04))
            ),
            30
        );
        assert_eq!(reconciler.total_minutes(&[], &EntryFilter::default()), 0);
    }

    #[test]
    fn totals_use_recorded_duration() {
        let mut odd = entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30);
        odd.duration_minutes = Some(31);
        assert_eq!(
            EntryReconciler::default().total_minutes(&[odd], &EntryFilter::default()),
            31
        );
    }

    #[test]
    fn summary_and_project_totals() {
        let entries = vec![
            entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30),
            entry("e2", "p2", datetime!(2024-03-05 13:00 UTC), 45),
            entry("e3", "p1", datetime!(2024-02-26 08:00 UTC), 20),
        ];
        let reconciler = EntryReconciler::default();

        assert_eq!(
            reconciler.summary(&entries, date!(2024 - 03 - 05)),
            Summary { today: 45, week: 75 }
        );

        let totals = reconciler.project_totals(&entries);
        assert_eq!(totals.get(&ProjectId::new("p1")), Some(&50));
        assert_eq!(totals.get(&ProjectId::new("p2")), Some(&45));
    }

    #[test]
    fn finds_running_entry() {
        let entries = vec![
            entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30),
            running(datetime!(2024-03-04 15:00 UTC)),
        ];
        assert_eq!(running_entry(&entries).map(|e| e.id.as_str()), Some("live"));
        assert!(running_entry(&entries[..1]).is_none());
    }

    #[test]
    fn task_totals_skip_running() {
        let mut other_task = entry("e2", "p1", datetime!(2024-03-04 13:00 UTC), 45);
        other_task.task_id = TaskId::new("t2");
        let entries = vec![
            entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30),
            other_task,
            entry("e3", "p2", datetime!(2024-03-05 08:00 UTC), 20),
            running(datetime!(2024-03-05 15:00 UTC)),
        ];

        let totals = EntryReconciler::default().task_totals(&entries);
        assert_eq!(totals.get(&TaskId::new("t1")), Some(&50));
        assert_eq!(totals.get(&TaskId::new("t2")), Some(&45));
        assert_eq!(totals.len(), 2);
    }

    #[test]
    fn recent_entries_are_newest_first_and_limited() {
        let entries = vec![
            entry("e1", "p1", datetime!(2024-03-04 09:00 UTC), 30),
            entry("e2", "p2", datetime!(2024-03-06 13:00 UTC), 45),
            entry("e3", "p1", datetime!(2024-03-05 08:00 UTC), 20),
            entry("e4", "p1", datetime!(2024-03-06 07:00 UTC), 10),
        ];
        let reconciler = EntryReconciler::default();
        let ids = |found: Vec<&TimeEntry>| {
            found
                .iter()
                .map(|e| e.id.as_str().to_string())
                .collect::<Vec<_>>()
        };

        assert_eq!(
            ids(reconciler.recent_entries(&entries, &EntryFilter::default(), 3)),
            vec!["e2", "e4", "e3"]
        );
        assert_eq!(
            ids(reconciler.recent_entries(
                &entries,
                &EntryFilter::default().for_project("p1").on(date!(2024 - 03 - 06)),
                5
            )),
            vec!["e4"]
        );
        assert!(reconciler
            .recent_entries(&entries, &EntryFilter::default(), 0)
            .is_empty());
    }

    #[test]
    fn counts_completed_tasks() {
        let task = |id: &str, status| Task {
            id: TaskId::new(id),
            name: id.to_string(),
            description: None,
            status,
            project: TaskProject::Id(ProjectId::new("p1")),
        };
        let tasks = vec![
            task("t1", TaskStatus::Done),
            task("t2", TaskStatus::Pending),
            task("t3", TaskStatus::Done),
        ];
        assert_eq!(completed_tasks(&tasks), 2);
        assert_eq!(completed_tasks(&[]), 0);
    }

    #[test]
    fn week_start_is_the_preceding_sunday() {
        assert_eq!(week_start(date!(2024 - 03 - 06)), date!(2024 - 03 - 03));
        assert_eq!(week_start(date!(2024 - 03 - 03)), date!(2024 - 03 - 03));
        assert_eq!(week_start(date!(2024 - 03 - 02)), date!(2024 - 02 - 25));
    }
}
