pub mod assignments;
pub mod files;
pub mod info;
pub mod submissions;
#[cfg(test)]
pub(crate) mod test_support;

use std::sync::Arc;

use anyhow::Context;
use moodle_core::{CourseSummary, MoodleClient, MoodleError};
use time::{OffsetDateTime, UtcOffset};

use crate::AppError;
use crate::calendar::CalendarSync;
use crate::cli::{Action, Cli};
use crate::config::{Config, split_rolls};
use crate::sync::cache::{COURSE_CACHE_FILE, JsonCache};
use crate::sync::engine::{SyncEngine, SyncOptions};
use crate::sync::status;
use crate::sync::transfer::{TransferClient, TransferConfig};

use self::assignments::AssignmentView;
use self::submissions::RollSelection;

/// Runs one invocation end to end. Everything fatal is reported through
/// [`AppError`] so the binary can pick the exit status.
pub async fn run(cli: Cli, offset: UtcOffset) -> anyhow::Result<()> {
    let action = cli.resolve_action().map_err(AppError::Usage)?;
    let config_path = Config::default_path().map_err(AppError::Config)?;
    let config = Config::load(&config_path).map_err(AppError::Config)?;
    let courses = cli.selected_courses(action, &config);
    let ignored = config.ignore_list(cli.ignore_types.as_deref());
    let prefix = config
        .resolve_prefix(cli.path_prefix.as_deref())
        .map_err(AppError::Config)?;
    let credentials = config.credentials().map_err(AppError::Config)?;
    tracing::debug!(action = action.name(), ?courses, prefix = %prefix.display(), "starting");

    let client = MoodleClient::login(
        config.base_url(),
        &credentials.username,
        &credentials.password,
    )
    .await
    .map_err(|err| -> anyhow::Error {
        if err.is_auth_failure() {
            AppError::Auth(err).into()
        } else {
            anyhow::Error::from(err).context("cannot reach the server")
        }
    })?;

    match action {
        Action::Whoami => {
            println!("{}", info::whoami(&client).await?);
            return Ok(());
        }
        Action::Courses => {
            print!("{}", info::courses(&client).await?);
            return Ok(());
        }
        Action::Urls => {
            print!("{}", info::urls(&client, &courses).await?);
            return Ok(());
        }
        Action::Files | Action::Assignments | Action::Submissions => {}
    }

    let options = SyncOptions {
        force_download: cli.force_download,
        missing_download: cli.missing_download,
        extract_archives: cli.extract || config.files.extract,
        ignored,
    };
    let transfer = config
        .workers(cli.jobs)
        .map(TransferConfig::with_concurrency)
        .unwrap_or_default();
    let engine = Arc::new(
        SyncEngine::open(client, prefix.clone(), options)
            .await
            .with_transfer(TransferClient::with_config(transfer)),
    );

    let outcomes = match action {
        Action::Files => files::run(&engine, &courses).await?,
        Action::Assignments => {
            let mut calendar = if cli.gcalendar {
                Some(
                    CalendarSync::connect(&config.gcal)
                        .await
                        .map_err(AppError::Calendar)?,
                )
            } else {
                None
            };
            let view = AssignmentView {
                due_only: cli.due_assignments,
                offset,
                now: OffsetDateTime::now_utc().unix_timestamp(),
            };
            let outcomes = assignments::run(&engine, &courses, &view, calendar.as_mut()).await?;
            if let Some(calendar) = &calendar {
                calendar.finish().await.context("cannot save calendar state")?;
            }
            outcomes
        }
        Action::Submissions => {
            let mut course_cache = JsonCache::load(prefix.join(COURSE_CACHE_FILE)).await;
            let rolls = match &cli.rolls {
                Some(rolls) => RollSelection::Given(split_rolls(rolls)),
                None => RollSelection::Configured(&config),
            };
            let outcomes = submissions::run(
                &engine,
                &courses,
                &rolls,
                &mut course_cache,
                cli.update_course_cache,
            )
            .await?;
            course_cache
                .flush()
                .await
                .context("cannot write course cache")?;
            outcomes
        }
        Action::Whoami | Action::Courses | Action::Urls => Vec::new(),
    };

    engine.flush().await.context("cannot write link cache")?;
    status::print(&outcomes, cli.verbose);
    Ok(())
}

/// Courses on the server whose short name was selected, in server order.
pub(crate) async fn find_courses(
    client: &MoodleClient,
    selected: &[String],
) -> Result<Vec<CourseSummary>, MoodleError> {
    let found: Vec<CourseSummary> = client
        .all_courses()
        .await?
        .into_iter()
        .filter(|course| is_selected(selected, &course.shortname))
        .collect();
    for name in selected {
        if !found.iter().any(|course| same_course(&course.shortname, name)) {
            tracing::warn!(course = %name, "no such course on the server");
        }
    }
    Ok(found)
}

pub(crate) fn is_selected(selected: &[String], shortname: &str) -> bool {
    selected.iter().any(|name| same_course(shortname, name))
}

fn same_course(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}
