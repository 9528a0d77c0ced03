use serde::Deserialize;
use serde_json::json;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::PrivacyStatus;
use crate::error::PublishError;
use crate::oauth::Authenticator;

const UPLOAD_URL: &str = "https://www.googleapis.com/upload/youtube/v3/videos";
const PLAYLIST_ITEMS_URL: &str = "https://www.googleapis.com/youtube/v3/playlistItems";

/// Error reasons the platform uses for exhausted quotas
const QUOTA_REASONS: &[&str] = &["quotaExceeded", "uploadLimitExceeded", "dailyLimitExceeded"];

/// Everything the platform needs besides the video bytes
#[derive(Debug, Clone, PartialEq)]
pub struct VideoMetadata {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
    pub playlist_id: Option<String>,
}

/// Publishes rendered videos
pub trait Publisher {
    /// Upload a video, returning the platform-assigned id
    fn upload(&mut self, video: &Path, metadata: &VideoMetadata) -> Result<String, PublishError>;

    fn add_to_playlist(&mut self, video_id: &str, playlist_id: &str) -> Result<(), PublishError>;
}

/// YouTube Data API v3 publisher; authenticates on first use
pub struct YouTubePublisher {
    auth: Authenticator,
    agent: ureq::Agent,
}

impl YouTubePublisher {
    pub fn new(client_secrets: PathBuf, token_path: PathBuf) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(30))
            .build();
        YouTubePublisher {
            auth: Authenticator::new(client_secrets, token_path, agent.clone()),
            agent,
        }
    }
}

#[derive(Deserialize)]
struct InsertedResource {
    id: String,
}

impl Publisher for YouTubePublisher {
    fn upload(&mut self, video: &Path, metadata: &VideoMetadata) -> Result<String, PublishError> {
        let bearer = format!("Bearer {}", self.auth.access_token()?);
        let size = fs::metadata(video)?.len();

        let session = self
            .agent
            .post(UPLOAD_URL)
            .query("uploadType", "resumable")
            .query("part", "snippet,status")
            .set("Authorization", &bearer)
            .set("X-Upload-Content-Type", "video/mp4")
            .set("X-Upload-Content-Length", &size.to_string())
            .send_json(insert_body(metadata))
            .map_err(api_error)?;
        let session_url = session
            .header("Location")
            .ok_or_else(|| PublishError::Api {
                status: session.status(),
                message: "no resumable session URL in response".to_string(),
            })?
            .to_string();

        let file = File::open(video)?;
        let response = self
            .agent
            .put(&session_url)
            .set("Authorization", &bearer)
            .set("Content-Type", "video/mp4")
            .set("Content-Length", &size.to_string())
            .send(ProgressReader::new(file, size))
            .map_err(api_error)?;

        let inserted: InsertedResource = response.into_json()?;
        Ok(inserted.id)
    }

    fn add_to_playlist(&mut self, video_id: &str, playlist_id: &str) -> Result<(), PublishError> {
        let bearer = format!("Bearer {}", self.auth.access_token()?);
        let body = json!({
            "snippet": {
                "playlistId": playlist_id,
                "resourceId": {
                    "kind": "youtube#video",
                    "videoId": video_id,
                },
            }
        });

        self.agent
            .post(PLAYLIST_ITEMS_URL)
            .query("part", "snippet")
            .set("Authorization", &bearer)
            .send_json(body)
            .map_err(api_error)?;
        Ok(())
    }
}

/// JSON body of a videos.insert request
pub fn insert_body(metadata: &VideoMetadata) -> serde_json::Value {
    json!({
        "snippet": {
            "title": metadata.title,
            "description": metadata.description,
            "tags": metadata.tags,
            "categoryId": metadata.category_id,
        },
        "status": {
            "privacyStatus": metadata.privacy_status.as_str(),
        },
    })
}

fn api_error(err: ureq::Error) -> PublishError {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            classify_api_error(status, &body)
        }
        ureq::Error::Transport(t) => PublishError::Transport(t.to_string()),
    }
}

#[derive(Deserialize, Default)]
struct ApiErrorEnvelope {
    #[serde(default)]
    error: ApiErrorBody,
}

#[derive(Deserialize, Default)]
struct ApiErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    errors: Vec<ApiErrorItem>,
}

#[derive(Deserialize)]
struct ApiErrorItem {
    #[serde(default)]
    reason: String,
}

/// Map an error response to the error kinds the driver branches on
pub fn classify_api_error(status: u16, body: &str) -> PublishError {
    let envelope: ApiErrorEnvelope = serde_json::from_str(body).unwrap_or_default();
    let message = if envelope.error.message.is_empty() {
        body.trim().to_string()
    } else {
        envelope.error.message
    };

    let quota = envelope
        .error
        .errors
        .iter()
        .any(|item| QUOTA_REASONS.contains(&item.reason.as_str()));

    match status {
        403 if quota => PublishError::QuotaExceeded(message),
        401 => PublishError::Auth(message),
        _ => PublishError::Api { status, message },
    }
}

/// Logs upload progress in 10% steps
struct ProgressReader<R> {
    inner: R,
    total: u64,
    sent: u64,
    next_step: u64,
}

impl<R: Read> ProgressReader<R> {
    fn new(inner: R, total: u64) -> Self {
        ProgressReader {
            inner,
            total,
            sent: 0,
            next_step: 10,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.sent += n as u64;
        if self.total > 0 {
            let percent = self.sent * 100 / self.total;
            if percent >= self.next_step {
                tracing::info!("Upload progress: {}%", percent);
                self.next_step = (percent / 10 + 1) * 10;
            }
        }
        Ok(n)
    }
}
