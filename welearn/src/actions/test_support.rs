use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use moodle_core::MoodleClient;
use serde_json::{Value, json};
use wiremock::matchers::{body_string_contains, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::sync::engine::{SyncEngine, SyncOptions};
use crate::sync::transfer::{TransferClient, TransferConfig};

pub(crate) async fn engine(server: &MockServer, prefix: &Path) -> Arc<SyncEngine> {
    let client = MoodleClient::with_token(&server.uri(), "tok").unwrap();
    let transfer = TransferClient::with_config(TransferConfig {
        concurrency: 4,
        attempts: 1,
        retry_base: Duration::from_millis(1),
        retry_max: Duration::from_millis(1),
    });
    Arc::new(
        SyncEngine::open(client, prefix.to_path_buf(), SyncOptions::default())
            .await
            .with_transfer(transfer),
    )
}

/// Answers one web-service function. `matches` narrows on extra form fields.
pub(crate) async fn function(server: &MockServer, name: &str, matches: &[&str], body: Value) {
    let mut mock = Mock::given(method("POST"))
        .and(path("/webservice/rest/server.php"))
        .and(body_string_contains(format!("wsfunction={name}")));
    for field in matches {
        mock = mock.and(body_string_contains(*field));
    }
    mock.respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

pub(crate) fn file(server: &MockServer, name: &str, modified: i64) -> Value {
    json!({
        "type": "file",
        "filename": name,
        "filepath": "/",
        "fileurl": format!("{}/pluginfile.php/1/{name}", server.uri()),
        "timemodified": modified,
    })
}

pub(crate) async fn serve(server: &MockServer, name: &str, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/pluginfile.php/1/{name}")))
        .and(query_param("token", "tok"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}
