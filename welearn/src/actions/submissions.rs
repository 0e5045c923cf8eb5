use std::collections::BTreeMap;
use std::sync::Arc;

use moodle_core::{MoodleClient, MoodleError};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::is_selected;
use crate::config::{Config, normalize_course};
use crate::sync::cache::JsonCache;
use crate::sync::engine::{SyncEngine, SyncOutcome};

/// A course as the submissions action needs it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct CourseRecord {
    pub id: i64,
    /// Roll number -> user id.
    pub participants: BTreeMap<String, i64>,
}

/// Course short name (uppercased) -> record, stored at `<prefix>/.course_cache`.
pub type CourseCache = JsonCache<CourseRecord>;

const ALL_ROLLS: &str = "ALL";

pub enum RollSelection<'a> {
    /// From `--rolls`, applied to every course.
    Given(Vec<String>),
    /// From the `[submissions]` section.
    Configured(&'a Config),
}

impl RollSelection<'_> {
    fn rolls_for(&self, course: &str) -> Option<Vec<String>> {
        match self {
            RollSelection::Given(rolls) => Some(rolls.clone()),
            RollSelection::Configured(config) => config.submission_rolls(course),
        }
    }
}

/// Downloads the first submitted file of each selected roll for every past-due
/// assignment, into `<course>/submissions/<assignment>/<roll>/`.
pub async fn run(
    engine: &Arc<SyncEngine>,
    courses: &[String],
    selection: &RollSelection<'_>,
    cache: &mut CourseCache,
    update: bool,
) -> Result<Vec<SyncOutcome>, MoodleError> {
    let client = engine.client();
    let courses: Vec<String> = courses.iter().filter_map(|c| normalize_course(c)).collect();
    refresh_course_cache(client, cache, &courses, update).await?;
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let mut outcomes = Vec::new();

    for course in &courses {
        let Some(record) = cache.get(course).cloned() else {
            println!("{course} is not a valid course id");
            continue;
        };
        let Some(mut rolls) = selection.rolls_for(course) else {
            println!(
                "Could not resolve roll numbers for {course}. Please add it in your config or use \"-r\" flag"
            );
            continue;
        };
        if rolls.iter().any(|roll| roll == ALL_ROLLS) {
            rolls = record.participants.keys().cloned().collect();
        }

        let listing = client.assignments(&[record.id]).await?;
        for assignment in listing.iter().flat_map(|course| course.assignments.iter()) {
            if assignment.duedate > now {
                continue;
            }
            for roll in &rolls {
                let Some(&userid) = record.participants.get(roll) else {
                    println!("{roll} is not a participant of {course}");
                    continue;
                };
                let status = match client.submission_status(assignment.id, Some(userid)).await {
                    Ok(status) => status,
                    Err(err) if err.is_auth_failure() => return Err(err),
                    Err(err) => {
                        tracing::warn!(
                            assignment = assignment.id,
                            %roll,
                            "submission status unavailable: {err}"
                        );
                        continue;
                    }
                };
                let Some(file) = status.submitted_files().next() else {
                    continue;
                };
                let subfolders = ["submissions".to_string(), assignment.name.clone(), roll.clone()];
                outcomes.push(engine.sync_file(file, course, &subfolders, 0).await);
            }
        }
    }
    Ok(outcomes)
}

/// Fills in records for courses the cache lacks; `update` rebuilds all of them.
pub async fn refresh_course_cache(
    client: &MoodleClient,
    cache: &mut CourseCache,
    courses: &[String],
    update: bool,
) -> Result<(), MoodleError> {
    let stale: Vec<String> = courses
        .iter()
        .filter(|course| update || !cache.contains_key(course))
        .cloned()
        .collect();
    if stale.is_empty() {
        return Ok(());
    }

    let info = client.site_info().await?;
    let enrolled = client.user_courses(info.userid).await?;
    for course in enrolled
        .iter()
        .filter(|course| is_selected(&stale, &course.shortname))
    {
        let users = client.enrolled_users(course.id).await?;
        let participants: BTreeMap<String, i64> = users
            .iter()
            .filter_map(|user| Some((user.roll()?, user.id)))
            .collect();
        tracing::info!(
            course = %course.shortname,
            participants = participants.len(),
            "course cached"
        );
        cache.insert(
            course.shortname.trim().to_uppercase(),
            CourseRecord {
                id: course.id,
                participants,
            },
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{engine, file, function, serve};
    use crate::sync::engine::SyncStatus;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::MockServer;

    async fn roster(server: &MockServer) {
        function(
            server,
            "core_webservice_get_site_info",
            &[],
            json!({"userid": 1, "username": "ta", "fullname": "Teaching Assistant"}),
        )
        .await;
        function(
            server,
            "core_enrol_get_users_courses",
            &[],
            json!([{"id": 7, "shortname": "MA1101", "fullname": "Calculus"}]),
        )
        .await;
        function(
            server,
            "core_enrol_get_enrolled_users",
            &["courseid=7"],
            json!([
                {"id": 21, "username": "ab21ms002", "fullname": "B"},
                {"id": 22, "username": "x", "idnumber": "ab21ms001", "fullname": "A"},
                {"id": 23, "fullname": "No roll"}
            ]),
        )
        .await;
    }

    #[tokio::test]
    async fn cache_records_rolls_by_idnumber_then_username() {
        let server = MockServer::start().await;
        roster(&server).await;
        let client = MoodleClient::with_token(&server.uri(), "tok").unwrap();
        let dir = tempdir().unwrap();
        let mut cache = CourseCache::empty(dir.path().join(".course_cache"));

        let courses = ["MA1101".to_string(), "ZZ9999".to_string()];
        refresh_course_cache(&client, &mut cache, &courses, false)
            .await
            .unwrap();

        let record = cache.get("MA1101").unwrap();
        assert_eq!(record.id, 7);
        assert_eq!(
            record.participants,
            BTreeMap::from([("AB21MS001".to_string(), 22), ("AB21MS002".to_string(), 21)])
        );
        assert!(!cache.contains_key("ZZ9999"));
    }

    #[tokio::test]
    async fn cached_courses_are_not_refetched() {
        let server = MockServer::start().await;
        let client = MoodleClient::with_token(&server.uri(), "tok").unwrap();
        let dir = tempdir().unwrap();
        let mut cache = CourseCache::empty(dir.path().join(".course_cache"));
        cache.insert(
            "MA1101",
            CourseRecord {
                id: 7,
                participants: BTreeMap::new(),
            },
        );

        refresh_course_cache(&client, &mut cache, &["MA1101".to_string()], false)
            .await
            .unwrap();
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn all_rolls_download_first_submitted_file_of_past_assignments() {
        let server = MockServer::start().await;
        roster(&server).await;
        function(
            &server,
            "mod_assign_get_assignments",
            &["courseids%5B0%5D=7"],
            json!({"courses": [{"id": 7, "shortname": "MA1101", "assignments": [
                {"id": 70, "name": "Set 1", "duedate": 1_704_103_200},
                {"id": 71, "name": "Future", "duedate": 4_102_444_800_i64}
            ]}]}),
        )
        .await;
        let submission = |files: serde_json::Value| {
            json!({"lastattempt": {"submission": {"plugins": [{
                "type": "file", "name": "File submissions",
                "fileareas": [{"area": "submission_files", "files": files}]
            }]}}})
        };
        function(
            &server,
            "mod_assign_get_submission_status",
            &["assignid=70", "userid=22"],
            submission(json!([file(&server, "a1.pdf", 5), file(&server, "a2.pdf", 6)])),
        )
        .await;
        function(
            &server,
            "mod_assign_get_submission_status",
            &["assignid=70", "userid=21"],
            submission(json!([])),
        )
        .await;
        serve(&server, "a1.pdf", "first").await;

        let dir = tempdir().unwrap();
        let engine = engine(&server, dir.path()).await;
        let mut cache = CourseCache::empty(dir.path().join(".course_cache"));
        let selection = RollSelection::Given(vec!["ALL".to_string()]);

        let outcomes = run(&engine, &["ma1101".to_string()], &selection, &mut cache, false)
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(
            outcomes[0].short_path,
            "MA1101/submissions/Set 1/AB21MS001/a1.pdf"
        );
        assert_eq!(outcomes[0].status, SyncStatus::Downloaded);
        assert!(!dir.path().join("MA1101/submissions/Set 1/AB21MS001/a2.pdf").exists());
    }

    #[tokio::test]
    async fn unknown_course_and_unconfigured_rolls_are_skipped() {
        let server = MockServer::start().await;
        roster(&server).await;
        let dir = tempdir().unwrap();
        let engine = engine(&server, dir.path()).await;
        let config = Config::default();
        let selection = RollSelection::Configured(&config);
        let mut cache = CourseCache::empty(dir.path().join(".course_cache"));

        let outcomes = run(
            &engine,
            &["MA1101".to_string(), "ZZ9999".to_string()],
            &selection,
            &mut cache,
            false,
        )
        .await
        .unwrap();
        assert!(outcomes.is_empty());
        assert!(cache.contains_key("MA1101"));
    }
}
