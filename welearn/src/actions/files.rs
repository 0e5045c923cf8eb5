use std::sync::Arc;

use moodle_core::{CourseSection, FileContent, MoodleError};

use super::find_courses;
use crate::sync::engine::{SyncEngine, SyncOutcome};
use crate::sync::resolve::resolve;

/// Downloads the resources and folders of every selected course on the pool.
pub async fn run(
    engine: &Arc<SyncEngine>,
    courses: &[String],
) -> Result<Vec<SyncOutcome>, MoodleError> {
    let client = engine.client();
    let mut descriptors = Vec::new();
    let mut unresolved = Vec::new();
    for course in find_courses(client, courses).await? {
        let sections = client.course_contents(course.id).await?;
        for (file, subfolders) in course_files(&sections) {
            match resolve(file, &course.shortname, &subfolders) {
                Ok(descriptor) => descriptors.push(descriptor),
                Err(err) => {
                    tracing::warn!(
                        course = %course.shortname,
                        file = %file.filename,
                        "cannot resolve resource: {err}"
                    );
                    unresolved.push(SyncOutcome::failed(
                        format!("{}/{}", course.shortname, file.filename),
                        err,
                    ));
                }
            }
        }
    }
    tracing::info!(resources = descriptors.len(), "course listing complete");

    let mut outcomes = engine.sync_all(descriptors).await;
    outcomes.extend(unresolved);
    Ok(outcomes)
}

/// Files of `resource` modules land in the course directory, files of
/// `folder` modules in a subfolder named after the module. Other module
/// kinds carry no downloadable content.
pub fn course_files(sections: &[CourseSection]) -> Vec<(&FileContent, Vec<String>)> {
    let mut files = Vec::new();
    for module in sections.iter().flat_map(|section| section.modules.iter()) {
        let subfolders = match module.modname.as_str() {
            "resource" => Vec::new(),
            "folder" => vec![module.name.clone()],
            _ => continue,
        };
        for file in &module.contents {
            files.push((file, subfolders.clone()));
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::{engine, file, function, serve};
    use crate::sync::engine::SyncStatus;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::MockServer;

    #[test]
    fn only_resources_and_folders_are_collected() {
        let sections: Vec<CourseSection> = serde_json::from_value(json!([
            {"id": 1, "name": "Week 1", "modules": [
                {"id": 10, "name": "Notes", "modname": "resource", "contents": [
                    {"filename": "notes.pdf", "fileurl": "https://x/notes.pdf"}
                ]},
                {"id": 11, "name": "Forum", "modname": "forum", "contents": [
                    {"filename": "post.html", "fileurl": "https://x/post.html"}
                ]}
            ]},
            {"id": 2, "name": "Week 2", "modules": [
                {"id": 12, "name": "Lab kit", "modname": "folder", "contents": [
                    {"filename": "a.c", "fileurl": "https://x/a.c"},
                    {"filename": "b.c", "fileurl": "https://x/b.c"}
                ]}
            ]}
        ]))
        .unwrap();

        let files: Vec<_> = course_files(&sections)
            .into_iter()
            .map(|(file, subfolders)| (file.filename.as_str(), subfolders))
            .collect();
        assert_eq!(
            files,
            vec![
                ("notes.pdf", vec![]),
                ("a.c", vec!["Lab kit".to_string()]),
                ("b.c", vec!["Lab kit".to_string()]),
            ]
        );
    }

    #[tokio::test]
    async fn selected_course_is_downloaded_into_its_directory() {
        let server = MockServer::start().await;
        function(
            &server,
            "core_course_get_courses_by_field",
            &[],
            json!({"courses": [
                {"id": 7, "shortname": "MA1101", "fullname": "Calculus"},
                {"id": 8, "shortname": "PH1201", "fullname": "Mechanics"}
            ]}),
        )
        .await;
        function(
            &server,
            "core_course_get_contents",
            &["courseid=7"],
            json!([{"id": 1, "name": "Week 1", "modules": [
                {"id": 10, "name": "Notes", "modname": "resource",
                 "contents": [file(&server, "notes.pdf", 100)]},
                {"id": 12, "name": "Lab kit", "modname": "folder",
                 "contents": [file(&server, "run.sh", 200), file(&server, "README", 300)]}
            ]}]),
        )
        .await;
        serve(&server, "notes.pdf", "pdf").await;
        serve(&server, "run.sh", "echo").await;

        let dir = tempdir().unwrap();
        let engine = engine(&server, dir.path()).await;
        let outcomes = run(&engine, &["ma1101".to_string()]).await.unwrap();

        let statuses: Vec<_> = outcomes
            .iter()
            .map(|outcome| (outcome.short_path.as_str(), &outcome.status))
            .collect();
        assert_eq!(statuses.len(), 3);
        assert_eq!(statuses[0], ("MA1101/notes.pdf", &SyncStatus::Downloaded));
        assert_eq!(statuses[1], ("MA1101/Lab kit/run.sh", &SyncStatus::Downloaded));
        assert_eq!(statuses[2].0, "MA1101/README");
        assert!(matches!(statuses[2].1, SyncStatus::Failed(_)));

        assert_eq!(
            std::fs::read_to_string(dir.path().join("MA1101/Lab kit/run.sh")).unwrap(),
            "echo"
        );
        assert!(!dir.path().join("PH1201").exists());
    }
}
