pub mod client;
pub mod flow;
pub mod oauth;
pub mod token;

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::config::GcalConfig;
use crate::sync::cache::{CacheError, EVENT_CACHE_FILE, JsonCache};

use self::client::{CalendarClient, Event, EventTime, ReminderOverride, Reminders};
use self::flow::{OAuthFlow, OAuthFlowError};
use self::oauth::{OAuthClient, OAuthError};
use self::token::{StoredToken, TOKEN_FILE, TokenProvider, TokenProviderError, now_unix};

#[derive(Debug, Error)]
pub enum CalendarError {
    #[error("Invalid configuration! [gcal] needs client_id and client_secret")]
    MissingClientCredentials,
    #[error("home directory is unavailable")]
    NoHome,
    #[error("calendar request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid calendar url: {0}")]
    Url(#[from] url::ParseError),
    #[error("calendar base url cannot hold a path: {0}")]
    InvalidBaseUrl(String),
    #[error("calendar api returned {status}: {body}")]
    Api { status: StatusCode, body: String },
    #[error(transparent)]
    OAuth(#[from] OAuthError),
    #[error(transparent)]
    Flow(#[from] OAuthFlowError),
    #[error(transparent)]
    Token(#[from] TokenProviderError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("due date {0} is out of range")]
    DueDate(i64),
    #[error("cannot format event time: {0}")]
    Format(#[from] time::error::Format),
}

impl CalendarError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, CalendarError::MissingClientCredentials)
    }
}

/// What a publish did to the calendar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Published {
    Added,
    Updated,
    Unchanged,
}

/// An assignment deadline to mirror into the calendar.
#[derive(Debug, Clone)]
pub struct DueEvent<'a> {
    pub assignment_id: i64,
    pub course: &'a str,
    pub name: &'a str,
    pub detail: &'a str,
    /// Unix seconds.
    pub due: i64,
}

/// Keeps one calendar event per assignment. Events end at the deadline and
/// start an hour before it.
pub struct CalendarSync {
    client: CalendarClient,
    tokens: TokenProvider,
    token_path: PathBuf,
    events: JsonCache<String>,
    time_zone: String,
}

impl CalendarSync {
    pub fn new(
        client: CalendarClient,
        tokens: TokenProvider,
        token_path: PathBuf,
        events: JsonCache<String>,
        time_zone: impl Into<String>,
    ) -> Self {
        Self {
            client,
            tokens,
            token_path,
            events,
            time_zone: time_zone.into(),
        }
    }

    /// Loads `~/.gcal_token` and `~/.welearn_event_cache`, running the browser
    /// consent flow when no usable token is stored.
    pub async fn connect(config: &GcalConfig) -> Result<Self, CalendarError> {
        let (client_id, client_secret) = config
            .client_credentials()
            .ok_or(CalendarError::MissingClientCredentials)?;
        let home = dirs::home_dir().ok_or(CalendarError::NoHome)?;
        let oauth = OAuthClient::new(client_id, client_secret)?;
        let token_path = home.join(TOKEN_FILE);

        let stored = StoredToken::load(&token_path).await.filter(|token| {
            token.refresh_token.is_some() || token.expires_at.is_none_or(|at| at > now_unix())
        });
        let state = match stored {
            Some(state) => state,
            None => {
                let token = OAuthFlow::new(oauth.clone()).authenticate().await?;
                let state = StoredToken::from_oauth_token(&token);
                state.save(&token_path).await?;
                state
            }
        };

        let events = JsonCache::load(home.join(EVENT_CACHE_FILE)).await;
        Ok(Self::new(
            CalendarClient::new(config.calendar_id())?,
            TokenProvider::new(state, oauth),
            token_path,
            events,
            config.time_zone(),
        ))
    }

    pub async fn publish(&mut self, due: &DueEvent<'_>) -> Result<Published, CalendarError> {
        let start = timestamp(due.due - 3600)?;
        let end = timestamp(due.due)?;
        let token = self.tokens.valid_access_token().await?;
        let key = due.assignment_id.to_string();

        let Some(event_id) = self.events.get(&key).cloned() else {
            self.insert(&token, &key, due, start, end).await?;
            return Ok(Published::Added);
        };

        let mut event = match self.client.get_event(&token, &event_id).await {
            Ok(event) => event,
            Err(CalendarError::Api { status, .. })
                if matches!(status, StatusCode::NOT_FOUND | StatusCode::GONE) =>
            {
                tracing::info!(
                    assignment = due.assignment_id,
                    "calendar event vanished, recreating"
                );
                self.insert(&token, &key, due, start, end).await?;
                return Ok(Published::Added);
            }
            Err(err) => return Err(err),
        };

        let current_start = OffsetDateTime::parse(&event.start.date_time, &Rfc3339).ok();
        if current_start == Some(start) {
            return Ok(Published::Unchanged);
        }
        event.start = self.event_time(start)?;
        event.end = self.event_time(end)?;
        let updated = self.client.update_event(&token, &event_id, &event).await?;
        self.events.insert(key, updated.id.unwrap_or(event_id));
        Ok(Published::Updated)
    }

    async fn insert(
        &mut self,
        token: &str,
        key: &str,
        due: &DueEvent<'_>,
        start: OffsetDateTime,
        end: OffsetDateTime,
    ) -> Result<(), CalendarError> {
        let event = Event {
            id: None,
            summary: format!("{} - {}", due.course, due.name),
            location: String::new(),
            description: due.detail.to_string(),
            start: self.event_time(start)?,
            end: self.event_time(end)?,
            reminders: Some(Reminders {
                use_default: false,
                overrides: vec![ReminderOverride {
                    method: "popup".into(),
                    minutes: 10,
                }],
            }),
            extra: Default::default(),
        };
        let created = self.client.insert_event(token, &event).await?;
        match created.id {
            Some(id) => {
                self.events.insert(key, id);
            }
            None => tracing::warn!(assignment = key, "calendar returned an event without id"),
        }
        Ok(())
    }

    fn event_time(&self, at: OffsetDateTime) -> Result<EventTime, CalendarError> {
        Ok(EventTime {
            date_time: at.format(&Rfc3339)?,
            time_zone: Some(self.time_zone.clone()),
        })
    }

    /// Persists the event cache, plus the token when it was refreshed.
    pub async fn finish(&self) -> Result<(), CalendarError> {
        self.events.flush().await?;
        if self.tokens.is_dirty() {
            self.tokens.state().save(&self.token_path).await?;
        }
        Ok(())
    }
}

fn timestamp(unix: i64) -> Result<OffsetDateTime, CalendarError> {
    OffsetDateTime::from_unix_timestamp(unix).map_err(|_| CalendarError::DueDate(unix))
}
