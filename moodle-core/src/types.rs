use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SiteInfo {
    pub userid: i64,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub sitename: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrolledCourse {
    pub id: i64,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub isfavourite: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourseSummary {
    pub id: i64,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub fullname: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourseSection {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modules: Vec<CourseModule>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CourseModule {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub modname: String,
    #[serde(default)]
    pub contents: Vec<FileContent>,
}

/// A downloadable file as the server describes it. The same shape is used by
/// course contents, assignment attachments and submission file areas.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FileContent {
    #[serde(rename = "type", default)]
    pub content_type: Option<String>,
    pub filename: String,
    #[serde(default)]
    pub filepath: Option<String>,
    #[serde(default)]
    pub filesize: Option<u64>,
    pub fileurl: String,
    #[serde(default)]
    pub timemodified: Option<i64>,
    #[serde(default)]
    pub mimetype: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AssignmentCourse {
    pub id: i64,
    #[serde(default)]
    pub shortname: String,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Assignment {
    pub id: i64,
    #[serde(default)]
    pub name: String,
    /// Unix seconds; zero when the assignment has no due date.
    #[serde(default)]
    pub duedate: i64,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub introattachments: Vec<FileContent>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SubmissionStatus {
    #[serde(default)]
    pub lastattempt: Option<LastAttempt>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LastAttempt {
    #[serde(default)]
    pub submission: Option<Submission>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Submission {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub plugins: Vec<SubmissionPlugin>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionPlugin {
    #[serde(rename = "type")]
    pub plugin_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fileareas: Vec<FileArea>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FileArea {
    pub area: String,
    #[serde(default)]
    pub files: Vec<FileContent>,
}

impl SubmissionStatus {
    /// Files in the `submission_files` area of the file-submission plugin.
    /// Empty when nothing has been submitted.
    pub fn submitted_files(&self) -> impl Iterator<Item = &FileContent> {
        self.lastattempt
            .iter()
            .filter_map(|attempt| attempt.submission.as_ref())
            .flat_map(|submission| submission.plugins.iter())
            .filter(|plugin| plugin.plugin_type == "file" || plugin.name == "File submissions")
            .flat_map(|plugin| plugin.fileareas.iter())
            .filter(|area| area.area == "submission_files")
            .flat_map(|area| area.files.iter())
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UrlModule {
    pub id: i64,
    pub course: i64,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub intro: String,
    #[serde(default)]
    pub externalurl: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EnrolledUser {
    pub id: i64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub fullname: String,
    #[serde(default)]
    pub idnumber: Option<String>,
}

impl EnrolledUser {
    /// Roll number used to address the participant: `idnumber` when set, else `username`.
    pub fn roll(&self) -> Option<String> {
        self.idnumber
            .as_deref()
            .filter(|value| !value.trim().is_empty())
            .or(self.username.as_deref())
            .map(|value| value.trim().to_uppercase())
            .filter(|value| !value.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn submission_status_without_attempt_has_no_files() {
        let status: SubmissionStatus = serde_json::from_value(json!({
            "gradingsummary": {"participantcount": 10}
        }))
        .unwrap();
        assert_eq!(status.submitted_files().count(), 0);
    }

    #[test]
    fn submitted_files_come_from_file_plugin_only() {
        let status: SubmissionStatus = serde_json::from_value(json!({
            "lastattempt": {
                "submission": {
                    "status": "submitted",
                    "plugins": [
                        {
                            "type": "onlinetext",
                            "name": "Online text",
                            "fileareas": [{"area": "submissions_onlinetext", "files": [
                                {"filename": "inline.png", "fileurl": "https://x/inline.png"}
                            ]}]
                        },
                        {
                            "type": "file",
                            "name": "File submissions",
                            "fileareas": [{"area": "submission_files", "files": [
                                {"filename": "report.pdf", "fileurl": "https://x/report.pdf",
                                 "timemodified": 5}
                            ]}]
                        }
                    ]
                }
            }
        }))
        .unwrap();
        let names: Vec<_> = status.submitted_files().map(|f| f.filename.as_str()).collect();
        assert_eq!(names, vec!["report.pdf"]);
    }

    #[test]
    fn roll_prefers_idnumber() {
        let user = EnrolledUser {
            id: 1,
            username: Some("jdoe".into()),
            fullname: "J Doe".into(),
            idnumber: Some(" 21ms001 ".into()),
        };
        assert_eq!(user.roll().as_deref(), Some("21MS001"));

        let user = EnrolledUser {
            idnumber: Some(String::new()),
            ..user
        };
        assert_eq!(user.roll().as_deref(), Some("JDOE"));
    }
}
