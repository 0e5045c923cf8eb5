use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use thiserror::Error;
use url::Url;

use crate::types::{
    AssignmentCourse, CourseSection, CourseSummary, EnrolledCourse, EnrolledUser, SiteInfo,
    SubmissionStatus, UrlModule,
};

pub const DEFAULT_SERVICE: &str = "moodle_mobile_app";

/// Names of the web-service functions the client knows how to call.
pub mod functions {
    pub const SITE_INFO: &str = "core_webservice_get_site_info";
    pub const USER_COURSES: &str = "core_enrol_get_users_courses";
    pub const ALL_COURSES: &str = "core_course_get_courses_by_field";
    pub const COURSE_CONTENTS: &str = "core_course_get_contents";
    pub const ASSIGNMENTS: &str = "mod_assign_get_assignments";
    pub const SUBMISSION_STATUS: &str = "mod_assign_get_submission_status";
    pub const URLS: &str = "mod_url_get_urls_by_courses";
    pub const ENROLLED_USERS: &str = "core_enrol_get_enrolled_users";
}

#[derive(Debug, Error)]
pub enum MoodleError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),
    #[error("unexpected response shape: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("server returned {status}: {body}")]
    Http { status: StatusCode, body: String },
    #[error("login rejected: {message}")]
    Login {
        errorcode: Option<String>,
        message: String,
    },
    #[error("{function} failed ({errorcode}): {message}")]
    Remote {
        function: String,
        errorcode: String,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorClass {
    Auth,
    Transient,
    Permanent,
}

#[derive(Clone)]
pub struct MoodleClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl MoodleClient {
    pub async fn login(
        base_url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, MoodleError> {
        Self::login_with_service(base_url, username, password, DEFAULT_SERVICE).await
    }

    pub async fn login_with_service(
        base_url: &str,
        username: &str,
        password: &str,
        service: &str,
    ) -> Result<Self, MoodleError> {
        let http = Client::new();
        let base_url = parse_base_url(base_url)?;
        let url = base_url.join("login/token.php")?;
        let response = http
            .post(url)
            .form(&[
                ("username", username),
                ("password", password),
                ("service", service),
            ])
            .send()
            .await?;
        let login: LoginResponse = Self::handle_response(response).await?;
        match login.token {
            Some(token) if !token.is_empty() => Ok(Self {
                http,
                base_url,
                token,
            }),
            _ => Err(MoodleError::Login {
                errorcode: login.errorcode,
                message: login
                    .error
                    .unwrap_or_else(|| "no token in login response".to_string()),
            }),
        }
    }

    pub fn with_token(base_url: &str, token: impl Into<String>) -> Result<Self, MoodleError> {
        Ok(Self {
            http: Client::new(),
            base_url: parse_base_url(base_url)?,
            token: token.into(),
        })
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub async fn call<T: DeserializeOwned>(
        &self,
        function: &str,
        params: &[(String, String)],
    ) -> Result<T, MoodleError> {
        let url = self.endpoint("webservice/rest/server.php")?;
        let mut form: Vec<(&str, &str)> = vec![
            ("wstoken", self.token.as_str()),
            ("wsfunction", function),
            ("moodlewsrestformat", "json"),
        ];
        form.extend(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));

        let response = self.http.post(url).form(&form).send().await?;
        let value: Value = Self::handle_response(response).await?;
        if let Some(exception) = RemoteException::from_value(&value) {
            return Err(MoodleError::Remote {
                function: function.to_string(),
                errorcode: exception.errorcode.unwrap_or(exception.exception),
                message: exception.message.unwrap_or_default(),
            });
        }
        Ok(serde_json::from_value(value)?)
    }

    pub async fn site_info(&self) -> Result<SiteInfo, MoodleError> {
        self.call(functions::SITE_INFO, &[]).await
    }

    pub async fn user_courses(&self, userid: i64) -> Result<Vec<EnrolledCourse>, MoodleError> {
        self.call(functions::USER_COURSES, &[param("userid", userid)])
            .await
    }

    pub async fn all_courses(&self) -> Result<Vec<CourseSummary>, MoodleError> {
        let list: CourseList = self.call(functions::ALL_COURSES, &[]).await?;
        Ok(list.courses)
    }

    pub async fn course_contents(&self, courseid: i64) -> Result<Vec<CourseSection>, MoodleError> {
        self.call(functions::COURSE_CONTENTS, &[param("courseid", courseid)])
            .await
    }

    pub async fn assignments(
        &self,
        courseids: &[i64],
    ) -> Result<Vec<AssignmentCourse>, MoodleError> {
        let params: Vec<_> = courseids
            .iter()
            .enumerate()
            .map(|(i, id)| param(&format!("courseids[{i}]"), id))
            .collect();
        let list: AssignmentList = self.call(functions::ASSIGNMENTS, &params).await?;
        Ok(list.courses)
    }

    pub async fn submission_status(
        &self,
        assignid: i64,
        userid: Option<i64>,
    ) -> Result<SubmissionStatus, MoodleError> {
        let mut params = vec![param("assignid", assignid)];
        if let Some(userid) = userid {
            params.push(param("userid", userid));
        }
        self.call(functions::SUBMISSION_STATUS, &params).await
    }

    pub async fn urls(&self) -> Result<Vec<UrlModule>, MoodleError> {
        let list: UrlList = self.call(functions::URLS, &[]).await?;
        Ok(list.urls)
    }

    pub async fn enrolled_users(&self, courseid: i64) -> Result<Vec<EnrolledUser>, MoodleError> {
        self.call(functions::ENROLLED_USERS, &[param("courseid", courseid)])
            .await
    }

    /// File URLs served by `pluginfile.php` only accept the token as a query parameter.
    pub fn file_url(&self, fileurl: &str) -> Result<Url, MoodleError> {
        let mut url = Url::parse(fileurl)?;
        if !url.query_pairs().any(|(key, _)| key == "token") {
            url.query_pairs_mut().append_pair("token", &self.token);
        }
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url, MoodleError> {
        Ok(self.base_url.join(path)?)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, MoodleError> {
        if response.status().is_success() {
            Ok(response.json::<T>().await?)
        } else {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(MoodleError::Http { status, body })
        }
    }
}

impl MoodleError {
    pub fn classification(&self) -> ApiErrorClass {
        match self {
            MoodleError::Login { .. } => ApiErrorClass::Auth,
            MoodleError::Remote { errorcode, .. } if is_auth_errorcode(errorcode) => {
                ApiErrorClass::Auth
            }
            MoodleError::Http { status, .. } => classify_http_status(*status),
            MoodleError::Request(_) => ApiErrorClass::Transient,
            _ => ApiErrorClass::Permanent,
        }
    }

    pub fn is_auth_failure(&self) -> bool {
        self.classification() == ApiErrorClass::Auth
    }
}

fn is_auth_errorcode(code: &str) -> bool {
    matches!(
        code,
        "invalidtoken" | "invalidlogin" | "accessexception" | "requireloginerror"
    )
}

fn classify_http_status(status: StatusCode) -> ApiErrorClass {
    if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
        ApiErrorClass::Auth
    } else if status.is_server_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
    {
        ApiErrorClass::Transient
    } else {
        ApiErrorClass::Permanent
    }
}

fn parse_base_url(base_url: &str) -> Result<Url, url::ParseError> {
    // Url::join drops the last path segment unless it ends with a slash.
    if base_url.ends_with('/') {
        Url::parse(base_url)
    } else {
        Url::parse(&format!("{base_url}/"))
    }
}

fn param(key: &str, value: impl ToString) -> (String, String) {
    (key.to_string(), value.to_string())
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    errorcode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoteException {
    exception: String,
    #[serde(default)]
    errorcode: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

impl RemoteException {
    fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        if !object.contains_key("exception") {
            return None;
        }
        serde_json::from_value(value.clone()).ok()
    }
}

#[derive(Debug, Deserialize)]
struct CourseList {
    #[serde(default)]
    courses: Vec<CourseSummary>,
}

#[derive(Debug, Deserialize)]
struct AssignmentList {
    #[serde(default)]
    courses: Vec<AssignmentCourse>,
}

#[derive(Debug, Deserialize)]
struct UrlList {
    #[serde(default)]
    urls: Vec<UrlModule>,
}
