use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::CalendarError;

pub const DEFAULT_API_BASE: &str = "https://www.googleapis.com/calendar/v3/";

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct EventTime {
    #[serde(rename = "dateTime")]
    pub date_time: String,
    #[serde(rename = "timeZone", default, skip_serializing_if = "Option::is_none")]
    pub time_zone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ReminderOverride {
    pub method: String,
    pub minutes: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Reminders {
    #[serde(rename = "useDefault")]
    pub use_default: bool,
    #[serde(default)]
    pub overrides: Vec<ReminderOverride>,
}

/// The subset of a Calendar event this tool writes. Everything else the server
/// returns is carried in `extra` so updates do not drop it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Event {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub description: String,
    pub start: EventTime,
    pub end: EventTime,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reminders: Option<Reminders>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Clone)]
pub struct CalendarClient {
    http: Client,
    base_url: Url,
    calendar_id: String,
}

impl CalendarClient {
    pub fn new(calendar_id: impl Into<String>) -> Result<Self, CalendarError> {
        Self::with_base_url(DEFAULT_API_BASE, calendar_id)
    }

    pub fn with_base_url(
        base_url: &str,
        calendar_id: impl Into<String>,
    ) -> Result<Self, CalendarError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http: Client::new(),
            base_url,
            calendar_id: calendar_id.into(),
        })
    }

    pub async fn insert_event(&self, token: &str, event: &Event) -> Result<Event, CalendarError> {
        let url = self.events_url(None)?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    pub async fn get_event(&self, token: &str, event_id: &str) -> Result<Event, CalendarError> {
        let url = self.events_url(Some(event_id))?;
        let response = self.http.get(url).bearer_auth(token).send().await?;
        Self::handle_response(response).await
    }

    pub async fn update_event(
        &self,
        token: &str,
        event_id: &str,
        event: &Event,
    ) -> Result<Event, CalendarError> {
        let url = self.events_url(Some(event_id))?;
        let response = self
            .http
            .put(url)
            .bearer_auth(token)
            .json(event)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    fn events_url(&self, event_id: Option<&str>) -> Result<Url, CalendarError> {
        let mut url = self.base_url.join("calendars")?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| CalendarError::InvalidBaseUrl(self.base_url.to_string()))?;
            segments.push(&self.calendar_id).push("events");
            if let Some(event_id) = event_id {
                segments.push(event_id);
            }
        }
        Ok(url)
    }

    async fn handle_response(response: reqwest::Response) -> Result<Event, CalendarError> {
        if response.status().is_success() {
            Ok(response.json::<Event>().await?)
        } else {
            let status: StatusCode = response.status();
            let body = response.text().await.unwrap_or_default();
            Err(CalendarError::Api { status, body })
        }
    }
}
