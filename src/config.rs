use anyhow::{bail, Context, Result};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Visibility of the published video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivacyStatus {
    Public,
    #[default]
    Unlisted,
    Private,
}

impl PrivacyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrivacyStatus::Public => "public",
            PrivacyStatus::Unlisted => "unlisted",
            PrivacyStatus::Private => "private",
        }
    }
}

/// What to do when a single file fails to render or upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    #[default]
    Abort,
    Skip,
}

/// Output resolution, written as WIDTHxHEIGHT
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoSize {
    pub width: u32,
    pub height: u32,
}

impl Default for VideoSize {
    fn default() -> Self {
        VideoSize {
            width: 1280,
            height: 720,
        }
    }
}

impl FromStr for VideoSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| format!("Invalid video size '{}', expected WIDTHxHEIGHT", s))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| format!("Invalid video width in '{}'", s))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| format!("Invalid video height in '{}'", s))?;
        if width == 0 || height == 0 {
            return Err(format!("Video size '{}' must be non-zero", s));
        }
        Ok(VideoSize { width, height })
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl<'de> Deserialize<'de> for VideoSize {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Accepts either a JSON string or a JSON integer
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrNumber {
    Str(String),
    Int(i64),
}

impl From<StringOrNumber> for String {
    fn from(value: StringOrNumber) -> Self {
        match value {
            StringOrNumber::Str(s) => s,
            StringOrNumber::Int(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    StringOrNumber::deserialize(deserializer).map(String::from)
}

/// Audio visualization overlay drawn over the still image
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    pub enabled: bool,
    pub mode: String,
    pub color: String,
    pub height: u32,
    pub fps: u32,
    pub spectrum_mode: String,
    #[serde(deserialize_with = "string_or_number")]
    pub spectrum_slide: String,
    pub spectrum_scale: String,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        WaveformConfig {
            enabled: false,
            mode: "line".to_string(),
            color: "white@0.8".to_string(),
            height: 200,
            fps: 30,
            spectrum_mode: "combined".to_string(),
            spectrum_slide: "1".to_string(),
            spectrum_scale: "lin".to_string(),
        }
    }
}

impl WaveformConfig {
    pub fn is_spectrum(&self) -> bool {
        matches!(self.mode.as_str(), "spectrum" | "showspectrum")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub audio_dir: PathBuf,
    pub images_dir: PathBuf,
    pub out_dir: PathBuf,
    pub state_path: PathBuf,
    pub client_secrets: PathBuf,
    pub token_path: PathBuf,
    pub title_prefix: String,
    pub title_template: Option<String>,
    pub description_prefix: String,
    pub description_template: Option<String>,
    pub description: String,
    pub tags: Vec<String>,
    #[serde(deserialize_with = "string_or_number")]
    pub category_id: String,
    pub privacy_status: PrivacyStatus,
    pub playlist_id: String,
    pub video_size: VideoSize,
    pub delete_rendered_files: bool,
    pub waveform: WaveformConfig,
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
    pub audio_extensions: Vec<String>,
    pub failure_policy: FailurePolicy,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            audio_dir: PathBuf::from("./audio"),
            images_dir: PathBuf::from("./images"),
            out_dir: PathBuf::from("./out"),
            state_path: PathBuf::from("./state.json"),
            client_secrets: PathBuf::from("./client_secrets.json"),
            token_path: PathBuf::from("./token.json"),
            title_prefix: String::new(),
            title_template: None,
            description_prefix: String::new(),
            description_template: None,
            description: String::new(),
            tags: Vec::new(),
            category_id: "10".to_string(),
            privacy_status: PrivacyStatus::default(),
            playlist_id: String::new(),
            video_size: VideoSize::default(),
            delete_rendered_files: true,
            waveform: WaveformConfig::default(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
            audio_extensions: vec!["mp3".to_string()],
            failure_policy: FailurePolicy::default(),
        }
    }
}

impl Config {
    /// Read a config file, resolving its relative paths against the file's directory
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config: Config = serde_json::from_str(&text)
            .with_context(|| format!("Invalid config file {}", path.display()))?;

        let base = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        config.resolve_paths(base);

        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        for p in [
            &mut self.audio_dir,
            &mut self.images_dir,
            &mut self.out_dir,
            &mut self.state_path,
            &mut self.client_secrets,
            &mut self.token_path,
        ] {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        }

        // Bare program names are looked up on PATH, anything with a separator is a file
        for p in [&mut self.ffmpeg_path, &mut self.ffprobe_path] {
            if p.is_relative() && p.components().count() > 1 {
                *p = base.join(&*p);
            }
        }
    }

    pub fn playlist(&self) -> Option<&str> {
        let id = self.playlist_id.trim();
        if id.is_empty() {
            None
        } else {
            Some(id)
        }
    }

    pub fn is_audio_file(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|ext| {
                self.audio_extensions
                    .iter()
                    .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
            })
            .unwrap_or(false)
    }

    /// Check input directories and create output locations
    pub fn validate(&self) -> Result<()> {
        for (name, dir) in [("Audio", &self.audio_dir), ("Images", &self.images_dir)] {
            if !dir.exists() {
                bail!("{} directory does not exist: {}", name, dir.display());
            }
            if !dir.is_dir() {
                bail!("{} path is not a directory: {}", name, dir.display());
            }
        }

        if self.audio_extensions.is_empty() {
            bail!("audio_extensions must list at least one extension");
        }

        fs::create_dir_all(&self.out_dir)
            .with_context(|| format!("Failed to create output directory: {}", self.out_dir.display()))?;
        if let Some(parent) = self.state_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create state directory: {}", parent.display()))?;
        }

        Ok(())
    }
}
