use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::oauth::{OAuthClient, OAuthError, OAuthToken};

pub const TOKEN_FILE: &str = ".gcal_token";

#[derive(Debug, Error)]
pub enum TokenProviderError {
    #[error("refresh token is missing")]
    MissingRefreshToken,
    #[error("oauth refresh failed: {0}")]
    OAuth(#[from] OAuthError),
    #[error("cannot write token file {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("cannot encode token: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Authorized-user credentials kept between runs.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl StoredToken {
    pub fn from_oauth_token(token: &OAuthToken) -> Self {
        Self {
            access_token: token.access_token.clone(),
            refresh_token: token.refresh_token.clone(),
            expires_at: token
                .expires_in
                .map(|secs| now_unix().saturating_add(secs as i64)),
            scope: token.scope.clone(),
            token_type: token.token_type.clone(),
        }
    }

    /// Reads a previously saved token. Anything unreadable means "not logged in".
    pub async fn load(path: &Path) -> Option<Self> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return None,
            Err(err) => {
                tracing::warn!(path = %path.display(), "calendar token unreadable: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(token) => Some(token),
            Err(err) => {
                tracing::warn!(path = %path.display(), "calendar token malformed: {err}");
                None
            }
        }
    }

    pub async fn save(&self, path: &Path) -> Result<(), TokenProviderError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        tokio::fs::write(path, bytes)
            .await
            .map_err(|source| TokenProviderError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

pub struct TokenProvider {
    state: StoredToken,
    oauth_client: OAuthClient,
    refresh_skew_secs: i64,
    dirty: bool,
}

impl TokenProvider {
    pub fn new(state: StoredToken, oauth_client: OAuthClient) -> Self {
        Self {
            state,
            oauth_client,
            refresh_skew_secs: 60,
            dirty: false,
        }
    }

    pub async fn valid_access_token(&mut self) -> Result<String, TokenProviderError> {
        if self.should_refresh() {
            self.refresh().await?;
        }
        Ok(self.state.access_token.clone())
    }

    pub fn state(&self) -> &StoredToken {
        &self.state
    }

    /// True once the token changed since it was loaded.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    fn should_refresh(&self) -> bool {
        let Some(expires_at) = self.state.expires_at else {
            return false;
        };
        expires_at <= now_unix().saturating_add(self.refresh_skew_secs)
    }

    async fn refresh(&mut self) -> Result<(), TokenProviderError> {
        let refresh_token = self
            .state
            .refresh_token
            .clone()
            .ok_or(TokenProviderError::MissingRefreshToken)?;
        let token = self.oauth_client.refresh_token(&refresh_token).await?;
        let mut refreshed = StoredToken::from_oauth_token(&token);
        // Google omits the refresh token on refresh responses.
        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(refresh_token);
        }
        if refreshed.scope.is_none() {
            refreshed.scope = self.state.scope.clone();
        }
        tracing::debug!("calendar access token refreshed");
        self.state = refreshed;
        self.dirty = true;
        Ok(())
    }
}

pub fn now_unix() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn oauth_client(server: &MockServer) -> OAuthClient {
        OAuthClient::with_endpoints(
            &format!("{}/auth", server.uri()),
            &format!("{}/token", server.uri()),
            "client-id",
            "secret",
        )
        .unwrap()
    }

    fn state(expires_at: Option<i64>, refresh: Option<&str>) -> StoredToken {
        StoredToken {
            access_token: "old-token".into(),
            refresh_token: refresh.map(str::to_string),
            expires_at,
            scope: Some("calendar".into()),
            token_type: Some("Bearer".into()),
        }
    }

    #[tokio::test]
    async fn returns_current_token_when_not_expired() {
        let server = MockServer::start().await;
        let mut provider =
            TokenProvider::new(state(Some(i64::MAX), Some("r")), oauth_client(&server));

        assert_eq!(provider.valid_access_token().await.unwrap(), "old-token");
        assert!(!provider.is_dirty());
    }

    #[tokio::test]
    async fn refreshes_expired_token_and_keeps_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/token"))
            .and(body_string_contains("grant_type=refresh_token"))
            .and(body_string_contains("refresh_token=refresh-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "new-token",
                "token_type": "Bearer",
                "expires_in": 3600
            })))
            .mount(&server)
            .await;

        let mut provider =
            TokenProvider::new(state(Some(0), Some("refresh-1")), oauth_client(&server));

        assert_eq!(provider.valid_access_token().await.unwrap(), "new-token");
        assert!(provider.is_dirty());
        assert_eq!(provider.state().refresh_token.as_deref(), Some("refresh-1"));
        assert_eq!(provider.state().scope.as_deref(), Some("calendar"));
    }

    #[tokio::test]
    async fn expired_token_without_refresh_token_is_an_error() {
        let server = MockServer::start().await;
        let mut provider = TokenProvider::new(state(Some(0), None), oauth_client(&server));

        let err = provider.valid_access_token().await.unwrap_err();
        assert!(matches!(err, TokenProviderError::MissingRefreshToken));
    }

    #[tokio::test]
    async fn token_file_round_trips_and_tolerates_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join(TOKEN_FILE);
        assert_eq!(StoredToken::load(&path).await, None);

        let token = state(Some(42), Some("r"));
        token.save(&path).await.unwrap();
        assert_eq!(StoredToken::load(&path).await, Some(token));

        std::fs::write(&path, b"garbage").unwrap();
        assert_eq!(StoredToken::load(&path).await, None);
    }
}
