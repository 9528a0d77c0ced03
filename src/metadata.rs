use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{SystemTime, UNIX_EPOCH};

/// Placeholder values for one audio file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TemplateContext {
    pub filename: String,
    pub basename: String,
    pub creation_date: String,
    pub update_date: String,
    pub mp3_rate: String,
}

impl TemplateContext {
    /// Resolve a placeholder name; None for names that are not recognized
    pub fn lookup(&self, name: &str) -> Option<&str> {
        match name {
            "filename" => Some(&self.filename),
            "basename" => Some(&self.basename),
            "creation_date" => Some(&self.creation_date),
            "update_date" | "filedate" => Some(&self.update_date),
            "mp3_rate" => Some(&self.mp3_rate),
            _ => None,
        }
    }
}

/// Size and modification time of a file, the change detector for uploads
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileStamp {
    pub size: u64,
    /// Seconds since the Unix epoch, with sub-second precision
    pub mtime: f64,
}

impl FileStamp {
    pub fn of(path: &Path) -> Result<Self> {
        let metadata = fs::metadata(path)
            .with_context(|| format!("Failed to get metadata for {}", path.display()))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("No modification time for {}", path.display()))?;

        Ok(FileStamp {
            size: metadata.len(),
            mtime: system_time_to_secs(modified),
        })
    }
}

fn system_time_to_secs(time: SystemTime) -> f64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs_f64(),
        Err(e) => -e.duration().as_secs_f64(),
    }
}

/// Source of the audio bitrate placeholder
pub trait AudioProbe {
    /// Bitrate of the first audio stream in kbps, None when it cannot be determined
    fn bitrate_kbps(&self, path: &Path) -> Option<u64>;
}

/// Probes audio with an ffprobe binary
#[derive(Debug, Clone)]
pub struct FfprobeProbe {
    binary: PathBuf,
}

impl FfprobeProbe {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        FfprobeProbe {
            binary: binary.into(),
        }
    }

    fn probe_entry(&self, path: &Path, selector: Option<&str>, entry: &str) -> Option<String> {
        let mut command = Command::new(&self.binary);
        command.arg("-v").arg("error");
        if let Some(selector) = selector {
            command.arg("-select_streams").arg(selector);
        }
        let output = command
            .arg("-show_entries")
            .arg(entry)
            .arg("-of")
            .arg("default=noprint_wrappers=1:nokey=1")
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        let raw = String::from_utf8_lossy(&output.stdout);
        raw.lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(str::to_string)
    }
}

impl AudioProbe for FfprobeProbe {
    fn bitrate_kbps(&self, path: &Path) -> Option<u64> {
        // Some containers only report the rate at format level
        self.probe_entry(path, Some("a:0"), "stream=bit_rate")
            .and_then(|raw| parse_bitrate_kbps(&raw))
            .or_else(|| {
                self.probe_entry(path, None, "format=bit_rate")
                    .and_then(|raw| parse_bitrate_kbps(&raw))
            })
    }
}

/// Parse ffprobe's bits-per-second output into rounded kbps
pub fn parse_bitrate_kbps(raw: &str) -> Option<u64> {
    let bps: f64 = raw.trim().parse().ok()?;
    if !bps.is_finite() || bps <= 0.0 {
        return None;
    }
    Some((bps / 1000.0).round() as u64)
}

/// Build the template context for an audio file.
///
/// Only the file stat is fatal; missing creation time or a failed probe
/// leave the corresponding placeholder empty.
pub fn extract_context(path: &Path, probe: &dyn AudioProbe) -> Result<TemplateContext> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("Failed to read audio file {}", path.display()))?;

    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let basename = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let creation_date = metadata.created().map(format_date).unwrap_or_default();
    let update_date = metadata
        .modified()
        .map(format_date)
        .with_context(|| format!("No modification time for {}", path.display()))?;

    let mp3_rate = match probe.bitrate_kbps(path) {
        Some(kbps) => kbps.to_string(),
        None => {
            tracing::warn!("Could not determine bitrate of {}", path.display());
            String::new()
        }
    };

    Ok(TemplateContext {
        filename,
        basename,
        creation_date,
        update_date,
        mp3_rate,
    })
}

/// Format a timestamp as YYYY-MM-DD in local time
pub fn format_date(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y-%m-%d").to_string()
}
