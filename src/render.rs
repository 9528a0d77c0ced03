use anyhow::{bail, Context, Result};
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::config::{VideoSize, WaveformConfig};

/// Extension of every video this tool renders
pub const RENDERED_EXTENSION: &str = "mp4";

/// One image + audio pair to be turned into a video
#[derive(Debug, Clone, PartialEq)]
pub struct RenderJob {
    pub audio: PathBuf,
    pub image: PathBuf,
    pub output: PathBuf,
    pub size: VideoSize,
}

impl RenderJob {
    /// Job writing `<out_dir>/<audio stem>.mp4`
    pub fn new(audio: &Path, image: &Path, out_dir: &Path, size: VideoSize) -> Self {
        let mut name = audio
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("video"));
        name.push(".");
        name.push(RENDERED_EXTENSION);
        let output = out_dir.join(name);

        RenderJob {
            audio: audio.to_path_buf(),
            image: image.to_path_buf(),
            output,
            size,
        }
    }
}

/// Turns a render job into a video file on disk
pub trait Renderer {
    fn render(&self, job: &RenderJob) -> Result<PathBuf>;
}

/// Renders with an ffmpeg subprocess
#[derive(Debug, Clone)]
pub struct FfmpegRenderer {
    binary: PathBuf,
    waveform: WaveformConfig,
}

impl FfmpegRenderer {
    pub fn new(binary: impl Into<PathBuf>, waveform: WaveformConfig) -> Self {
        FfmpegRenderer {
            binary: binary.into(),
            waveform,
        }
    }
}

impl Renderer for FfmpegRenderer {
    fn render(&self, job: &RenderJob) -> Result<PathBuf> {
        if let Some(parent) = job.output.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create output directory: {}", parent.display()))?;
        }

        let args = build_ffmpeg_args(job, &self.waveform);
        tracing::debug!("Running {} {:?}", self.binary.display(), args);

        let output = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to start {}", self.binary.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "Render failed for {} ({}): {}",
                job.audio.display(),
                output.status,
                stderr_tail(&stderr, 4)
            );
        }

        Ok(job.output.clone())
    }
}

/// Last few non-empty lines of a tool's stderr, joined on one line
fn stderr_tail(stderr: &str, lines: usize) -> String {
    let mut tail: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .rev()
        .take(lines)
        .collect();
    if tail.is_empty() {
        return "ffmpeg exited with an error".to_string();
    }
    tail.reverse();
    tail.join(" | ")
}

/// Full ffmpeg argument list for a job
pub fn build_ffmpeg_args(job: &RenderJob, waveform: &WaveformConfig) -> Vec<OsString> {
    let framerate = if waveform.enabled {
        waveform.fps.max(1).to_string()
    } else {
        "1".to_string()
    };

    let mut args: Vec<OsString> = ["-y", "-loop", "1", "-framerate", framerate.as_str(), "-i"]
        .into_iter()
        .map(OsString::from)
        .collect();
    args.push(job.image.clone().into_os_string());
    args.push(OsString::from("-i"));
    args.push(job.audio.clone().into_os_string());

    let codec: Vec<String> = if waveform.enabled {
        vec![
            "-filter_complex".to_string(),
            waveform_filter(job.size, waveform),
            "-c:v".to_string(),
            "libx264".to_string(),
            "-tune".to_string(),
            "stillimage".to_string(),
            "-r".to_string(),
            framerate.clone(),
            "-c:a".to_string(),
            "aac".to_string(),
            "-b:a".to_string(),
            "192k".to_string(),
            "-shortest".to_string(),
        ]
    } else {
        let scale = format!("scale={}:{}", job.size.width, job.size.height);
        [
            "-vf", scale.as_str(), "-c:v", "libx264", "-tune", "stillimage", "-c:a", "aac", "-b:a",
            "192k", "-shortest", "-pix_fmt", "yuv420p",
        ]
        .into_iter()
        .map(str::to_string)
        .collect()
    };
    args.extend(codec.into_iter().map(OsString::from));

    args.push(job.output.clone().into_os_string());
    args
}

/// filter_complex graph overlaying a waveform or spectrum strip on the scaled image
pub fn waveform_filter(size: VideoSize, waveform: &WaveformConfig) -> String {
    let background = format!("[0:v]scale={}:{},format=yuv420p[bg]", size.width, size.height);
    let strip = if waveform.is_spectrum() {
        format!(
            "[1:a]showspectrum=s={}x{}:color={}:slide={}:mode={}:scale={}[sw]",
            size.width,
            waveform.height,
            waveform.color,
            waveform.spectrum_slide,
            waveform.spectrum_mode,
            waveform.spectrum_scale
        )
    } else {
        format!(
            "[1:a]showwaves=s={}x{}:mode={}:colors={}[sw]",
            size.width, waveform.height, waveform.mode, waveform.color
        )
    };
    format!("{};{};[bg][sw]overlay=(W-w)/2:(H-h)/2", background, strip)
}

/// Delete rendered videos left behind by an interrupted run
pub fn purge_stale_renders(out_dir: &Path) -> Result<usize> {
    if !out_dir.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in fs::read_dir(out_dir)
        .with_context(|| format!("Failed to list output directory: {}", out_dir.display()))?
    {
        let path = entry?.path();
        let is_render = path.is_file()
            && path
                .extension()
                .map(|e| e.eq_ignore_ascii_case(RENDERED_EXTENSION))
                .unwrap_or(false);
        if is_render {
            fs::remove_file(&path)
                .with_context(|| format!("Failed to delete stale render: {}", path.display()))?;
            tracing::info!("Deleted stale render: {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}
