use std::sync::Arc;

use moodle_core::{Assignment, SubmissionStatus};
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

use super::is_selected;
use crate::AppError;
use crate::calendar::{CalendarSync, DueEvent, Published};
use crate::html::plain_text;
use crate::sync::engine::{SyncEngine, SyncOutcome};

/// How the listing is filtered and which clock it is rendered against.
#[derive(Debug, Clone, Copy)]
pub struct AssignmentView {
    pub due_only: bool,
    pub offset: UtcOffset,
    /// Unix seconds.
    pub now: i64,
}

impl AssignmentView {
    /// Due dates of zero mean the assignment has none.
    fn is_due(&self, assignment: &Assignment) -> bool {
        assignment.duedate > 0 && assignment.duedate > self.now
    }
}

/// Lists the assignments of the selected courses, syncing their attachments
/// and mirroring due ones into the calendar when one is connected.
pub async fn run(
    engine: &Arc<SyncEngine>,
    courses: &[String],
    view: &AssignmentView,
    mut calendar: Option<&mut CalendarSync>,
) -> anyhow::Result<Vec<SyncOutcome>> {
    let client = engine.client();
    let listing = client.assignments(&[]).await?;
    let mut outcomes = Vec::new();

    for course in listing
        .iter()
        .filter(|course| is_selected(courses, &course.shortname))
    {
        let mut header_printed = false;
        for assignment in &course.assignments {
            let due = view.is_due(assignment);
            if view.due_only && !due {
                continue;
            }
            if !header_printed {
                println!("{}", course.shortname);
                header_printed = true;
            }

            let detail = plain_text(&assignment.intro);
            println!("    {} - {detail}", assignment.name);
            for attachment in &assignment.introattachments {
                println!("        Attachment     : {}", attachment.filename);
                outcomes.push(engine.sync_file(attachment, &course.shortname, &[], 8).await);
            }
            for line in due_lines(assignment.duedate, view) {
                println!("{line}");
            }

            let status = match client.submission_status(assignment.id, None).await {
                Ok(status) => status,
                Err(err) if err.is_auth_failure() => return Err(err.into()),
                Err(err) => {
                    tracing::warn!(
                        assignment = assignment.id,
                        "submission status unavailable: {err}"
                    );
                    SubmissionStatus::default()
                }
            };
            for line in submission_lines(&status, view.offset) {
                println!("{line}");
            }

            if let Some(calendar) = calendar.as_deref_mut().filter(|_| due) {
                let event = DueEvent {
                    assignment_id: assignment.id,
                    course: &course.shortname,
                    name: &assignment.name,
                    detail: &detail,
                    due: assignment.duedate,
                };
                match calendar.publish(&event).await.map_err(AppError::Calendar)? {
                    Published::Added => println!("        Added event to calendar."),
                    Published::Updated => println!("        Updated event in calendar."),
                    Published::Unchanged => {}
                }
            }
            println!();
        }
    }
    Ok(outcomes)
}

fn due_lines(duedate: i64, view: &AssignmentView) -> Vec<String> {
    if duedate <= 0 {
        return vec!["        Due on         : NONE".to_string()];
    }
    let due_on = format_time(duedate, view.offset);
    let delta = format_delta(duedate - view.now);
    if duedate > view.now {
        vec![
            format!("        Due on         : {due_on}"),
            format!("        Time remaining : {delta}"),
        ]
    } else {
        vec![format!("        Due on         : {due_on} ({delta} ago)")]
    }
}

fn submission_lines(status: &SubmissionStatus, offset: UtcOffset) -> Vec<String> {
    let lines: Vec<String> = status
        .submitted_files()
        .map(|file| {
            let when = file
                .timemodified
                .map(|at| format_time(at, offset))
                .unwrap_or_else(|| "unknown".to_string());
            format!("        Submission     : {} ({when})", file.filename)
        })
        .collect();
    if lines.is_empty() {
        vec!["        Submission     : NONE".to_string()]
    } else {
        lines
    }
}

/// `Mon 01 Jan, 2024, 15:30:00` at the given offset.
pub fn format_time(unix: i64, offset: UtcOffset) -> String {
    let format = format_description!(
        "[weekday repr:short] [day] [month repr:short], [year], [hour]:[minute]:[second]"
    );
    OffsetDateTime::from_unix_timestamp(unix)
        .ok()
        .and_then(|at| at.to_offset(offset).format(&format).ok())
        .unwrap_or_else(|| unix.to_string())
}

/// Whole days and hours of a signed span of seconds, sign dropped.
pub fn format_delta(seconds: i64) -> String {
    let seconds = seconds.unsigned_abs();
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    format!("{days} days, {hours} hours")
}
