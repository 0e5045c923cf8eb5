use moodle_core::{CourseSummary, EnrolledCourse, MoodleClient, MoodleError, UrlModule};

use super::find_courses;
use crate::html::plain_text;

pub async fn whoami(client: &MoodleClient) -> Result<String, MoodleError> {
    Ok(client.site_info().await?.fullname)
}

/// Enrolled courses, favourites starred.
pub async fn courses(client: &MoodleClient) -> Result<String, MoodleError> {
    let info = client.site_info().await?;
    let courses = client.user_courses(info.userid).await?;
    Ok(render_courses(&courses))
}

pub async fn urls(client: &MoodleClient, selected: &[String]) -> Result<String, MoodleError> {
    let courses = find_courses(client, selected).await?;
    let modules = client.urls().await?;
    Ok(render_urls(&courses, &modules))
}

fn render_courses(courses: &[EnrolledCourse]) -> String {
    let mut out = String::new();
    for course in courses {
        let star = if course.isfavourite { '*' } else { ' ' };
        out.push_str(&format!(" {star} {}\n", course.fullname));
    }
    out
}

fn render_urls(courses: &[CourseSummary], modules: &[UrlModule]) -> String {
    let mut out = String::new();
    for course in courses {
        let mut links = modules.iter().filter(|module| module.course == course.id).peekable();
        if links.peek().is_none() {
            continue;
        }
        out.push_str(&format!("{}\n", course.shortname));
        for link in links {
            out.push_str(&format!("    {} - {}\n", link.name, plain_text(&link.intro)));
            out.push_str(&format!("        Link : {}\n\n", link.externalurl));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::test_support::function;
    use serde_json::json;
    use wiremock::MockServer;

    #[test]
    fn favourites_are_starred() {
        let courses: Vec<EnrolledCourse> = serde_json::from_value(json!([
            {"id": 1, "shortname": "MA1101", "fullname": "Calculus", "isfavourite": true},
            {"id": 2, "shortname": "PH1201", "fullname": "Mechanics"}
        ]))
        .unwrap();
        assert_eq!(render_courses(&courses), " * Calculus\n   Mechanics\n");
    }

    #[tokio::test]
    async fn whoami_reports_full_name() {
        let server = MockServer::start().await;
        function(
            &server,
            "core_webservice_get_site_info",
            &[],
            json!({"userid": 5, "username": "ab21ms001", "fullname": "Asha Bose"}),
        )
        .await;
        let client = MoodleClient::with_token(&server.uri(), "tok").unwrap();
        assert_eq!(whoami(&client).await.unwrap(), "Asha Bose");
    }

    #[tokio::test]
    async fn urls_are_grouped_under_selected_courses() {
        let server = MockServer::start().await;
        function(
            &server,
            "core_course_get_courses_by_field",
            &[],
            json!({"courses": [
                {"id": 7, "shortname": "MA1101"},
                {"id": 8, "shortname": "PH1201"}
            ]}),
        )
        .await;
        function(
            &server,
            "mod_url_get_urls_by_courses",
            &[],
            json!({"urls": [
                {"id": 1, "course": 7, "name": "Lecture", "intro": "<p>Recorded <b>talk</b></p>",
                 "externalurl": "https://video.example/1"},
                {"id": 2, "course": 8, "name": "Lab", "intro": "",
                 "externalurl": "https://lab.example"}
            ]}),
        )
        .await;
        let client = MoodleClient::with_token(&server.uri(), "tok").unwrap();

        let out = urls(&client, &["MA1101".to_string()]).await.unwrap();
        assert_eq!(
            out,
            "MA1101\n    Lecture - Recorded talk\n        Link : https://video.example/1\n\n\n"
        );
    }
}
