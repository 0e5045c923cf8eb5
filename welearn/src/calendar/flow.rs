use std::io::Write;
use std::time::Duration;

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use super::oauth::{CALENDAR_EVENTS_SCOPE, OAuthClient, OAuthError, OAuthToken};

#[derive(Debug, Error)]
pub enum OAuthFlowError {
    #[error("oauth error: {0}")]
    OAuth(#[from] OAuthError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("authorization code missing in redirect")]
    MissingCode,
    #[error("authorization was denied: {0}")]
    Denied(String),
    #[error("authorization timed out")]
    Timeout,
}

/// Installed-app authorization: the user consents in a browser and Google
/// redirects to a listener on the loopback interface. When that listener gets
/// nothing, the code (or the whole redirect URL) can be pasted instead.
pub struct OAuthFlow {
    client: OAuthClient,
    timeout: Duration,
}

impl OAuthFlow {
    pub fn new(client: OAuthClient) -> Self {
        Self {
            client,
            timeout: oauth_timeout(),
        }
    }

    pub async fn authenticate(&self) -> Result<OAuthToken, OAuthFlowError> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let redirect_uri = format!("http://127.0.0.1:{}/", listener.local_addr()?.port());
        let url = self.client.authorize_url(&redirect_uri, CALENDAR_EVENTS_SCOPE);
        println!("Please visit this URL to authorize this application: {url}");

        let code = match wait_for_redirect(listener, self.timeout).await {
            Ok(code) => code,
            Err(OAuthFlowError::Denied(reason)) => return Err(OAuthFlowError::Denied(reason)),
            Err(err) => {
                eprintln!("no redirect received ({err}), falling back to manual code entry");
                read_code_manually()?
            }
        };
        Ok(self.client.exchange_code(&code, &redirect_uri).await?)
    }
}

async fn wait_for_redirect(
    listener: TcpListener,
    timeout: Duration,
) -> Result<String, OAuthFlowError> {
    let (mut stream, _) = tokio::time::timeout(timeout, listener.accept())
        .await
        .map_err(|_| OAuthFlowError::Timeout)??;

    let mut request = vec![0u8; 8192];
    let read = tokio::time::timeout(Duration::from_secs(10), stream.read(&mut request))
        .await
        .map_err(|_| OAuthFlowError::Timeout)??;
    let request_text = String::from_utf8_lossy(&request[..read]);
    let result = code_from_http_request(&request_text);

    let _ = stream
        .write_all(
            b"HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nConnection: close\r\n\r\n\
            <html><body><p>The authentication flow has completed. You may close this window.</p></body></html>",
        )
        .await;
    let _ = stream.shutdown().await;
    result
}

fn read_code_manually() -> Result<String, OAuthFlowError> {
    print!("Enter the authorization code or the redirected URL: ");
    std::io::stdout().flush()?;
    let mut input = String::new();
    std::io::stdin().read_line(&mut input)?;
    code_from_input(input.trim())
}

fn code_from_http_request(request: &str) -> Result<String, OAuthFlowError> {
    let target = request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or(OAuthFlowError::MissingCode)?;
    code_from_input(target)
}

/// Accepts a bare code, a request target (`/?code=..`) or a full redirect URL.
fn code_from_input(input: &str) -> Result<String, OAuthFlowError> {
    if input.is_empty() {
        return Err(OAuthFlowError::MissingCode);
    }
    let parsed = if input.starts_with("http://") || input.starts_with("https://") {
        Url::parse(input).ok()
    } else if input.starts_with('/') {
        Url::parse(&format!("http://127.0.0.1{input}")).ok()
    } else {
        return Ok(input.to_string());
    };
    let url = parsed.ok_or(OAuthFlowError::MissingCode)?;

    let mut code = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" if !value.is_empty() => code = Some(value.into_owned()),
            "error" => return Err(OAuthFlowError::Denied(value.into_owned())),
            _ => {}
        }
    }
    code.ok_or(OAuthFlowError::MissingCode)
}

fn oauth_timeout() -> Duration {
    let secs = std::env::var("WELEARN_OAUTH_TIMEOUT_SECS")
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(180);
    Duration::from_secs(secs)
}
