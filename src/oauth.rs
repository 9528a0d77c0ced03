use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::PublishError;
use crate::state::write_atomically;

pub const SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/youtube.upload",
    "https://www.googleapis.com/auth/youtube",
];

const DEFAULT_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Seconds before expiry at which a token is already treated as stale
const EXPIRY_SKEW_SECS: i64 = 60;

fn default_auth_uri() -> String {
    DEFAULT_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

/// OAuth client credentials of an installed application
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

#[derive(Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, PublishError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PublishError::Auth(format!("missing client secrets at {}: {}", path.display(), e))
        })?;
        Self::parse(&text)
            .map_err(|e| PublishError::Auth(format!("invalid client secrets {}: {}", path.display(), e)))
    }

    fn parse(text: &str) -> Result<Self, String> {
        let file: ClientSecretsFile = serde_json::from_str(text).map_err(|e| e.to_string())?;
        file.installed
            .or(file.web)
            .ok_or_else(|| "expected an \"installed\" or \"web\" section".to_string())
    }
}

/// Token file contents, field-compatible with Google's authorized-user JSON
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default)]
    pub expiry: Option<String>,
}

impl StoredToken {
    /// Unparseable or missing expiry counts as expired
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        if self.token.is_empty() {
            return false;
        }
        self.expiry
            .as_deref()
            .and_then(|e| DateTime::parse_from_rfc3339(e).ok())
            .map(|expiry| expiry.with_timezone(&Utc) - Duration::seconds(EXPIRY_SKEW_SECS) > now)
            .unwrap_or(false)
    }

    fn apply(&mut self, response: TokenResponse) {
        self.token = response.access_token;
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
        self.expiry = response
            .expires_in
            .map(|secs| (Utc::now() + Duration::seconds(secs)).to_rfc3339());
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// Supplies bearer tokens, refreshing or authorizing interactively as needed
pub struct Authenticator {
    client_secrets: PathBuf,
    token_path: PathBuf,
    agent: ureq::Agent,
    token: Option<StoredToken>,
}

impl Authenticator {
    pub fn new(client_secrets: PathBuf, token_path: PathBuf, agent: ureq::Agent) -> Self {
        Authenticator {
            client_secrets,
            token_path,
            agent,
            token: None,
        }
    }

    /// A currently valid access token
    pub fn access_token(&mut self) -> Result<String, PublishError> {
        if self.token.is_none() {
            self.token = self.read_token_file();
        }

        if let Some(token) = &self.token {
            if token.is_valid_at(Utc::now()) {
                return Ok(token.token.clone());
            }
        }

        if let Some(mut token) = self.token.take() {
            if token.refresh_token.is_some() {
                match self.refresh(&mut token) {
                    Ok(()) => return self.store(token),
                    Err(e) => tracing::warn!("Token refresh failed, re-authorizing: {}", e),
                }
            }
        }

        let token = self.authorize()?;
        self.store(token)
    }

    fn read_token_file(&self) -> Option<StoredToken> {
        let text = fs::read_to_string(&self.token_path).ok()?;
        match serde_json::from_str(&text) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::warn!("Ignoring unreadable token file {}: {}", self.token_path.display(), e);
                None
            }
        }
    }

    fn store(&mut self, token: StoredToken) -> Result<String, PublishError> {
        let json = serde_json::to_string_pretty(&token)
            .map_err(|e| PublishError::Auth(format!("failed to serialize token: {}", e)))?;
        write_atomically(&self.token_path, json.as_bytes())?;

        let access = token.token.clone();
        self.token = Some(token);
        Ok(access)
    }

    fn refresh(&self, token: &mut StoredToken) -> Result<(), PublishError> {
        let refresh_token = token.refresh_token.clone().unwrap_or_default();
        let response = self
            .agent
            .post(&token.token_uri)
            .send_form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", token.client_id.as_str()),
                ("client_secret", token.client_secret.as_str()),
            ])
            .map_err(token_endpoint_error)?;
        let parsed: TokenResponse = response.into_json()?;
        token.apply(parsed);
        tracing::info!("Refreshed access token");
        Ok(())
    }

    /// One-time interactive consent through a loopback redirect
    fn authorize(&self) -> Result<StoredToken, PublishError> {
        let secrets = ClientSecrets::load(&self.client_secrets)?;

        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        let port = listener.local_addr()?.port();
        let redirect_uri = format!("http://127.0.0.1:{}/", port);
        let state: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(30)
            .map(char::from)
            .collect();

        let auth_url = authorization_url(&secrets, &redirect_uri, &state)?;
        println!("Please visit this URL to authorize this application: {}", auth_url);

        let code = loop {
            let (stream, _) = listener.accept()?;
            let mut reader = BufReader::new(&stream);
            let mut request_line = String::new();
            reader.read_line(&mut request_line)?;

            let outcome = parse_redirect(&request_line, &state);
            let (status, body) = match &outcome {
                Ok(Some(_)) => (
                    "200 OK",
                    "The authentication flow has completed. You may close this window.",
                ),
                Ok(None) => ("404 Not Found", "Not found"),
                Err(_) => ("400 Bad Request", "Authorization failed. Check the terminal."),
            };
            let mut writer = &stream;
            if let Err(e) = write_reply(&mut writer, status, body) {
                tracing::debug!("Failed to answer authorization redirect: {}", e);
            }

            match outcome {
                Ok(Some(code)) => break code,
                Ok(None) => continue,
                Err(e) => return Err(e),
            }
        };

        let response = self
            .agent
            .post(&secrets.token_uri)
            .send_form(&[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
            ])
            .map_err(token_endpoint_error)?;
        let parsed: TokenResponse = response.into_json()?;

        let mut token = StoredToken {
            token: String::new(),
            refresh_token: None,
            token_uri: secrets.token_uri.clone(),
            client_id: secrets.client_id.clone(),
            client_secret: secrets.client_secret.clone(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        };
        token.apply(parsed);
        tracing::info!("Authorization complete, token saved to {}", self.token_path.display());
        Ok(token)
    }
}

/// Minimal HTTP response for the loopback redirect
fn write_reply(writer: &mut impl Write, status: &str, body: &str) -> io::Result<()> {
    write!(
        writer,
        "HTTP/1.1 {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )?;
    writer.flush()
}

fn token_endpoint_error(err: ureq::Error) -> PublishError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            PublishError::Auth(format!("token endpoint returned {}: {}", status, body.trim()))
        }
        ureq::Error::Transport(t) => PublishError::Transport(t.to_string()),
    }
}

pub fn authorization_url(
    secrets: &ClientSecrets,
    redirect_uri: &str,
    state: &str,
) -> Result<Url, PublishError> {
    Url::parse_with_params(
        &secrets.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", secrets.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", SCOPES.join(" ").as_str()),
            ("state", state),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| PublishError::Auth(format!("invalid auth_uri {}: {}", secrets.auth_uri, e)))
}

/// Extract the authorization code from the redirect's request line.
///
/// Ok(None) means an unrelated request (e.g. a favicon fetch).
pub fn parse_redirect(request_line: &str, expected_state: &str) -> Result<Option<String>, PublishError> {
    let target = request_line
        .split_whitespace()
        .nth(1)
        .ok_or_else(|| PublishError::Auth("malformed redirect request".to_string()))?;
    let url = Url::parse(&format!("http://127.0.0.1{}", target))
        .map_err(|e| PublishError::Auth(format!("malformed redirect target: {}", e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match &*key {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(PublishError::Auth(format!("authorization denied: {}", error)));
    }
    let Some(code) = code else {
        return Ok(None);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(PublishError::Auth("state mismatch in authorization redirect".to_string()));
    }
    Ok(Some(code))
}
