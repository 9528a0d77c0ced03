use anyhow::{Context, Result};
use rand::seq::SliceRandom;
use rand::Rng;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::{Config, FailurePolicy};
use crate::error::{BatchError, PublishError, StoreError};
use crate::metadata::{extract_context, AudioProbe, FileStamp, TemplateContext};
use crate::publish::{Publisher, VideoMetadata};
use crate::render::{purge_stale_renders, RenderJob, Renderer};
use crate::state::UploadStore;
use crate::template::{
    finalize_title, render_or, sanitize_text, DEFAULT_DESCRIPTION_TEMPLATE, DEFAULT_TITLE_TEMPLATE,
};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Which files a run is allowed to touch
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub only: Option<String>,
    pub limit: Option<usize>,
    pub dry_run: bool,
}

#[derive(Debug, Default)]
pub struct ProcessingStats {
    pub total_files: usize,
    pub uploaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pending: usize,
    pub playlist_failures: usize,
    pub stale_renders_removed: usize,
}

/// Runs the render + upload pipeline over the audio directory, one file at a time
pub struct Processor<R: Rng> {
    config: Config,
    store: UploadStore,
    renderer: Box<dyn Renderer>,
    publisher: Box<dyn Publisher>,
    probe: Box<dyn AudioProbe>,
    rng: R,
    stats: ProcessingStats,
}

impl<R: Rng> Processor<R> {
    pub fn new(
        config: Config,
        store: UploadStore,
        renderer: Box<dyn Renderer>,
        publisher: Box<dyn Publisher>,
        probe: Box<dyn AudioProbe>,
        rng: R,
    ) -> Self {
        Processor {
            config,
            store,
            renderer,
            publisher,
            probe,
            rng,
            stats: ProcessingStats::default(),
        }
    }

    pub fn stats(&self) -> &ProcessingStats {
        &self.stats
    }

    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    pub fn run(&mut self, selection: &Selection) -> Result<()> {
        tracing::info!("Audio directory: {}", self.config.audio_dir.display());
        tracing::info!("State file: {}", self.store.path().display());

        if self.config.delete_rendered_files && !selection.dry_run {
            self.stats.stale_renders_removed = purge_stale_renders(&self.config.out_dir)?;
        }

        let candidates = match &selection.only {
            Some(name) => vec![self.resolve_only(name)?],
            None => self.collect_audio_files()?,
        };
        self.stats.total_files = candidates.len();
        tracing::info!("Found {} audio file(s)", candidates.len());

        let mut attempted = 0;
        for path in candidates {
            if let Some(limit) = selection.limit {
                if attempted >= limit {
                    tracing::info!("Limit of {} new file(s) reached", limit);
                    break;
                }
            }

            let (key, stamp) = match identify(&path) {
                Ok(identity) => identity,
                Err(e) => {
                    self.handle_failure(&path, e)?;
                    continue;
                }
            };

            if self.store.is_uploaded(&key, stamp) {
                self.stats.skipped += 1;
                tracing::debug!("Already uploaded: {}", path.display());
                continue;
            }

            attempted += 1;

            if selection.dry_run {
                self.stats.pending += 1;
                tracing::info!("Would process: {}", display_name(&path));
                continue;
            }

            if let Err(e) = self.process_file(&path, &key, stamp) {
                self.handle_failure(&path, e)?;
            }
        }

        Ok(())
    }

    /// Count a per-file failure; Err when the batch must stop
    fn handle_failure(&mut self, path: &Path, error: anyhow::Error) -> Result<()> {
        self.stats.failed += 1;

        if self.config.failure_policy == FailurePolicy::Abort || aborts_batch(&error) {
            return Err(error.context(format!("Failed to process {}", path.display())));
        }

        tracing::warn!("Skipping {}: {:#}", path.display(), error);
        Ok(())
    }

    fn process_file(&mut self, path: &Path, key: &Path, stamp: FileStamp) -> Result<()> {
        let ctx = extract_context(path, self.probe.as_ref())?;
        let metadata = build_metadata(&self.config, &ctx);

        let image = self.pick_image()?;
        tracing::info!("Rendering: {} with {}", ctx.filename, display_name(&image));

        let job = RenderJob::new(path, &image, &self.config.out_dir, self.config.video_size);
        let video = self.renderer.render(&job)?;

        tracing::info!("Uploading: {}", display_name(&video));
        let video_id = self.publisher.upload(&video, &metadata)?;

        // Nothing may come between a successful upload and recording it
        self.store.record(key, stamp, &video_id)?;
        self.stats.uploaded += 1;
        tracing::info!("Uploaded video ID: {}", video_id);

        if let Some(playlist_id) = &metadata.playlist_id {
            tracing::info!("Adding to playlist: {}", playlist_id);
            if let Err(e) = self.publisher.add_to_playlist(&video_id, playlist_id) {
                self.stats.playlist_failures += 1;
                tracing::warn!("Could not add {} to playlist {}: {}", video_id, playlist_id, e);
            }
        }

        if self.config.delete_rendered_files {
            if let Err(e) = fs::remove_file(&video) {
                tracing::warn!("Failed to delete rendered file {}: {}", video.display(), e);
            }
        }

        Ok(())
    }

    fn resolve_only(&self, name: &str) -> Result<PathBuf> {
        let requested = PathBuf::from(name);
        let path = if requested.is_absolute() || requested.components().count() > 1 {
            requested
        } else {
            self.config.audio_dir.join(requested)
        };

        if !path.is_file() {
            return Err(BatchError::NotFound(path).into());
        }
        Ok(path)
    }

    fn collect_audio_files(&self) -> Result<Vec<PathBuf>> {
        list_files(&self.config.audio_dir, |p| self.config.is_audio_file(p))
    }

    fn pick_image(&mut self) -> Result<PathBuf> {
        let images = list_files(&self.config.images_dir, is_image_file)?;
        images
            .choose(&mut self.rng)
            .cloned()
            .ok_or_else(|| BatchError::NoImages(self.config.images_dir.clone()).into())
    }

    pub fn print_summary(&self) {
        let stats = &self.stats;

        println!();
        println!("=== PROCESSING COMPLETE ===");
        println!("Audio files scanned: {}", stats.total_files);
        println!("Uploaded: {}", stats.uploaded);
        println!("Skipped (already uploaded): {}", stats.skipped);
        if stats.pending > 0 {
            println!("Would process (dry run): {}", stats.pending);
        }
        println!("Failed: {}", stats.failed);

        if stats.playlist_failures > 0 {
            println!("Playlist additions failed: {}", stats.playlist_failures);
        }
        if stats.stale_renders_removed > 0 {
            println!("Stale renders removed: {}", stats.stale_renders_removed);
        }
    }
}

/// Dedup key and stamp for an audio file
fn identify(path: &Path) -> Result<(PathBuf, FileStamp)> {
    let key = fs::canonicalize(path)
        .with_context(|| format!("Failed to resolve {}", path.display()))?;
    let stamp = FileStamp::of(path)?;
    Ok((key, stamp))
}

/// Failures that stop the batch whatever the failure policy says
fn aborts_batch(error: &anyhow::Error) -> bool {
    if let Some(publish) = error.downcast_ref::<PublishError>() {
        return publish.is_fatal_for_batch();
    }
    error.downcast_ref::<StoreError>().is_some()
        || matches!(error.downcast_ref::<BatchError>(), Some(BatchError::NoImages(_)))
}

/// Title and description for one file, falling back to the basename
pub fn build_metadata(config: &Config, ctx: &TemplateContext) -> VideoMetadata {
    let title_template = config
        .title_template
        .as_deref()
        .unwrap_or(DEFAULT_TITLE_TEMPLATE);
    let title = format!(
        "{}{}",
        config.title_prefix,
        render_or(title_template, ctx, &ctx.basename)
    );

    let description_template = config
        .description_template
        .as_deref()
        .unwrap_or(DEFAULT_DESCRIPTION_TEMPLATE);
    let mut description = format!(
        "{}{}",
        config.description_prefix,
        render_or(description_template, ctx, &ctx.basename)
    );
    if !config.description.is_empty() {
        description.push_str("\n\n");
        description.push_str(&config.description);
    }

    VideoMetadata {
        title: finalize_title(&title),
        description: sanitize_text(&description),
        tags: config.tags.clone(),
        category_id: config.category_id.clone(),
        privacy_status: config.privacy_status,
        playlist_id: config.playlist().map(str::to_string),
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|i| i.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// Regular files directly inside `dir`, sorted by name
fn list_files(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for entry_result in WalkDir::new(dir)
        .max_depth(1)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = match entry_result {
            Ok(e) => e,
            Err(err) => {
                if let Some(path) = err.path() {
                    tracing::warn!("Failed to access {}: {}", path.display(), err);
                } else {
                    tracing::warn!("WalkDir error: {}", err);
                }
                continue;
            }
        };

        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let filename = path.file_name().and_then(|n| n.to_str()).unwrap_or("");

        // AppleDouble and Finder metadata files
        if filename.starts_with("._") || filename == ".DS_Store" {
            continue;
        }

        if keep(path) {
            files.push(path.to_path_buf());
        }
    }

    if files.is_empty() && !dir.is_dir() {
        anyhow::bail!("Directory does not exist: {}", dir.display());
    }

    Ok(files)
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PrivacyStatus;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::cell::RefCell;
    use std::rc::Rc;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    #[derive(Default)]
    struct Log {
        renders: Vec<RenderJob>,
        uploads: Vec<(PathBuf, VideoMetadata)>,
        playlist_adds: Vec<(String, String)>,
        rendered_existed_at_upload: Vec<bool>,
    }

    type SharedLog = Rc<RefCell<Log>>;

    struct FakeRenderer {
        log: SharedLog,
        fail_on: Option<String>,
    }

    impl Renderer for FakeRenderer {
        fn render(&self, job: &RenderJob) -> Result<PathBuf> {
            let name = display_name(&job.audio);
            if self.fail_on.as_deref() == Some(name.as_str()) {
                anyhow::bail!("ffmpeg exited with status 1");
            }
            fs::write(&job.output, b"video").unwrap();
            self.log.borrow_mut().renders.push(job.clone());
            Ok(job.output.clone())
        }
    }

    enum UploadFailure {
        Quota,
        Transport,
    }

    struct FakePublisher {
        log: SharedLog,
        fail_on: Option<(String, UploadFailure)>,
        fail_playlist: bool,
    }

    impl Publisher for FakePublisher {
        fn upload(&mut self, video: &Path, metadata: &VideoMetadata) -> Result<String, PublishError> {
            if let Some((title, failure)) = &self.fail_on {
                if *title == metadata.title {
                    return Err(match failure {
                        UploadFailure::Quota => PublishError::QuotaExceeded("daily".into()),
                        UploadFailure::Transport => PublishError::Transport("reset".into()),
                    });
                }
            }
            let mut log = self.log.borrow_mut();
            log.rendered_existed_at_upload.push(video.exists());
            log.uploads.push((video.to_path_buf(), metadata.clone()));
            Ok(format!("vid-{}", metadata.title))
        }

        fn add_to_playlist(&mut self, video_id: &str, playlist_id: &str) -> Result<(), PublishError> {
            if self.fail_playlist {
                return Err(PublishError::Api {
                    status: 404,
                    message: "playlistNotFound".into(),
                });
            }
            self.log
                .borrow_mut()
                .playlist_adds
                .push((video_id.to_string(), playlist_id.to_string()));
            Ok(())
        }
    }

    struct FakeProbe;

    impl AudioProbe for FakeProbe {
        fn bitrate_kbps(&self, _path: &Path) -> Option<u64> {
            Some(192)
        }
    }

    struct Fixture {
        dir: TempDir,
        config: Config,
        log: SharedLog,
    }

    impl Fixture {
        fn new(audio: &[&str], images: &[&str]) -> Self {
            let dir = TempDir::new().unwrap();
            for sub in ["audio", "images", "out"] {
                fs::create_dir(dir.path().join(sub)).unwrap();
            }
            for name in audio {
                fs::write(dir.path().join("audio").join(name), name.as_bytes()).unwrap();
            }
            for name in images {
                fs::write(dir.path().join("images").join(name), b"img").unwrap();
            }

            let config = Config {
                audio_dir: dir.path().join("audio"),
                images_dir: dir.path().join("images"),
                out_dir: dir.path().join("out"),
                state_path: dir.path().join("state.json"),
                ..Default::default()
            };

            Fixture {
                dir,
                config,
                log: SharedLog::default(),
            }
        }

        fn processor(&self) -> Processor<StdRng> {
            self.processor_with(None, None, false)
        }

        fn processor_with(
            &self,
            render_fail: Option<&str>,
            upload_fail: Option<(&str, UploadFailure)>,
            fail_playlist: bool,
        ) -> Processor<StdRng> {
            let store = UploadStore::load(&self.config.state_path).unwrap();
            Processor::new(
                self.config.clone(),
                store,
                Box::new(FakeRenderer {
                    log: self.log.clone(),
                    fail_on: render_fail.map(str::to_string),
                }),
                Box::new(FakePublisher {
                    log: self.log.clone(),
                    fail_on: upload_fail.map(|(t, f)| (t.to_string(), f)),
                    fail_playlist,
                }),
                Box::new(FakeProbe),
                StdRng::seed_from_u64(7),
            )
        }

        fn uploaded_titles(&self) -> Vec<String> {
            self.log
                .borrow()
                .uploads
                .iter()
                .map(|(_, m)| m.title.clone())
                .collect()
        }

        fn audio(&self, name: &str) -> PathBuf {
            self.dir.path().join("audio").join(name)
        }

        fn set_mtime(&self, name: &str, secs: u64, nanos: u32) {
            let file = fs::OpenOptions::new().write(true).open(self.audio(name)).unwrap();
            file.set_modified(UNIX_EPOCH + Duration::new(secs, nanos)).unwrap();
        }
    }

    fn all() -> Selection {
        Selection::default()
    }

    #[test]
    fn test_second_run_uploads_nothing() {
        let fx = Fixture::new(&["a.mp3", "b.mp3"], &["cover.jpg"]);
        // Fractions that do not survive a lossy float parse
        fx.set_mtime("a.mp3", 1_700_007_919, 654_435_957);
        fx.set_mtime("b.mp3", 1_712_345_678, 123_456_789);

        let mut first = fx.processor();
        first.run(&all()).unwrap();
        assert_eq!(first.stats().uploaded, 2);

        let mut second = fx.processor();
        second.run(&all()).unwrap();
        assert_eq!(second.stats().uploaded, 0);
        assert_eq!(second.stats().skipped, 2);
        assert_eq!(fx.uploaded_titles(), vec!["a", "b"]);
    }

    #[test]
    fn test_changed_file_is_uploaded_again() {
        let fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.processor().run(&all()).unwrap();

        fs::write(fx.audio("a.mp3"), b"a longer take of the same track").unwrap();

        let mut again = fx.processor();
        again.run(&all()).unwrap();
        assert_eq!(again.stats().uploaded, 1);
        assert_eq!(again.store().len(), 1);
        assert_eq!(fx.uploaded_titles(), vec!["a", "a"]);
    }

    #[test]
    fn test_touched_file_is_uploaded_again() {
        let fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.set_mtime("a.mp3", 1_700_000_000, 111_111_111);
        fx.processor().run(&all()).unwrap();

        fx.set_mtime("a.mp3", 1_700_000_000, 222_222_222);

        let mut again = fx.processor();
        again.run(&all()).unwrap();
        assert_eq!(again.stats().uploaded, 1);
        assert_eq!(again.stats().skipped, 0);
        assert_eq!(fx.uploaded_titles(), vec!["a", "a"]);

        let mut third = fx.processor();
        third.run(&all()).unwrap();
        assert_eq!(third.stats().uploaded, 0);
        assert_eq!(third.stats().skipped, 1);
    }

    #[test]
    fn test_limit_processes_first_files_only() {
        let fx = Fixture::new(&["c.mp3", "a.mp3", "b.mp3"], &["cover.jpg"]);

        let mut processor = fx.processor();
        processor
            .run(&Selection {
                limit: Some(1),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(fx.uploaded_titles(), vec!["a"]);
        assert_eq!(processor.store().len(), 1);
        let key = fs::canonicalize(fx.audio("b.mp3")).unwrap();
        assert!(processor.store().get(&key).is_none());
    }

    #[test]
    fn test_uploaded_files_do_not_count_against_limit() {
        let fx = Fixture::new(&["a.mp3", "b.mp3", "c.mp3"], &["cover.jpg"]);
        let limit_one = Selection {
            limit: Some(1),
            ..Default::default()
        };

        fx.processor().run(&limit_one).unwrap();
        fx.processor().run(&limit_one).unwrap();

        assert_eq!(fx.uploaded_titles(), vec!["a", "b"]);
    }

    #[test]
    fn test_only_selects_single_file() {
        let fx = Fixture::new(&["demo.mp3", "other.mp3"], &["cover.jpg"]);

        fx.processor()
            .run(&Selection {
                only: Some("demo.mp3".to_string()),
                ..Default::default()
            })
            .unwrap();

        assert_eq!(fx.uploaded_titles(), vec!["demo"]);
    }

    #[test]
    fn test_only_missing_file_is_not_found() {
        let fx = Fixture::new(&["other.mp3"], &["cover.jpg"]);

        let err = fx
            .processor()
            .run(&Selection {
                only: Some("demo.mp3".to_string()),
                ..Default::default()
            })
            .unwrap_err();

        assert!(matches!(err.downcast_ref::<BatchError>(), Some(BatchError::NotFound(_))));
        assert!(fx.uploaded_titles().is_empty());
    }

    #[test]
    fn test_only_skips_already_uploaded_file() {
        let fx = Fixture::new(&["demo.mp3"], &["cover.jpg"]);
        let only = Selection {
            only: Some("demo.mp3".to_string()),
            ..Default::default()
        };

        fx.processor().run(&only).unwrap();
        let mut again = fx.processor();
        again.run(&only).unwrap();

        assert_eq!(again.stats().skipped, 1);
        assert_eq!(fx.uploaded_titles().len(), 1);
    }

    #[test]
    fn test_rendered_file_deleted_after_upload() {
        let fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.processor().run(&all()).unwrap();

        assert_eq!(fx.log.borrow().rendered_existed_at_upload, vec![true]);
        assert!(!fx.dir.path().join("out").join("a.mp4").exists());
    }

    #[test]
    fn test_rendered_file_kept_when_configured() {
        let mut fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.config.delete_rendered_files = false;
        fs::write(fx.dir.path().join("out").join("old.mp4"), b"x").unwrap();

        fx.processor().run(&all()).unwrap();

        assert!(fx.dir.path().join("out").join("a.mp4").exists());
        assert!(fx.dir.path().join("out").join("old.mp4").exists());
    }

    #[test]
    fn test_stale_renders_purged_at_startup() {
        let fx = Fixture::new(&[], &["cover.jpg"]);
        fs::write(fx.dir.path().join("out").join("interrupted.mp4"), b"x").unwrap();

        let mut processor = fx.processor();
        processor.run(&all()).unwrap();

        assert_eq!(processor.stats().stale_renders_removed, 1);
        assert!(!fx.dir.path().join("out").join("interrupted.mp4").exists());
    }

    #[test]
    fn test_no_images_fails_run() {
        let fx = Fixture::new(&["a.mp3"], &["notes.txt"]);

        let mut processor = fx.processor();
        processor.config.failure_policy = FailurePolicy::Skip;
        let err = processor.run(&all()).unwrap_err();

        assert!(matches!(err.downcast_ref::<BatchError>(), Some(BatchError::NoImages(_))));
        assert!(processor.store().is_empty());
    }

    #[test]
    fn test_render_failure_aborts_by_default() {
        let fx = Fixture::new(&["a.mp3", "b.mp3"], &["cover.jpg"]);

        let mut processor = fx.processor_with(Some("a.mp3"), None, false);
        assert!(processor.run(&all()).is_err());

        assert_eq!(processor.stats().failed, 1);
        assert!(fx.uploaded_titles().is_empty());
        assert!(processor.store().is_empty());
        assert!(!fx.config.state_path.exists());
    }

    #[test]
    fn test_skip_policy_continues_after_failure() {
        let mut fx = Fixture::new(&["a.mp3", "b.mp3"], &["cover.jpg"]);
        fx.config.failure_policy = FailurePolicy::Skip;

        let mut processor = fx.processor_with(None, Some(("a", UploadFailure::Transport)), false);
        processor.run(&all()).unwrap();

        assert_eq!(processor.stats().failed, 1);
        assert_eq!(processor.stats().uploaded, 1);
        assert_eq!(fx.uploaded_titles(), vec!["b"]);
    }

    #[test]
    fn test_quota_aborts_even_when_skipping() {
        let mut fx = Fixture::new(&["a.mp3", "b.mp3"], &["cover.jpg"]);
        fx.config.failure_policy = FailurePolicy::Skip;

        let mut processor = fx.processor_with(None, Some(("a", UploadFailure::Quota)), false);
        let err = processor.run(&all()).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PublishError>(),
            Some(PublishError::QuotaExceeded(_))
        ));
        assert!(fx.uploaded_titles().is_empty());
        assert!(processor.store().is_empty());
    }

    #[test]
    fn test_dry_run_touches_nothing() {
        let fx = Fixture::new(&["a.mp3", "b.mp3"], &["cover.jpg"]);
        fs::write(fx.dir.path().join("out").join("old.mp4"), b"x").unwrap();

        let mut processor = fx.processor();
        processor
            .run(&Selection {
                dry_run: true,
                ..Default::default()
            })
            .unwrap();

        assert_eq!(processor.stats().pending, 2);
        assert!(fx.log.borrow().renders.is_empty());
        assert!(fx.uploaded_titles().is_empty());
        assert!(!fx.config.state_path.exists());
        assert!(fx.dir.path().join("out").join("old.mp4").exists());
    }

    #[test]
    fn test_playlist_addition() {
        let mut fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.config.playlist_id = "PL42".to_string();

        fx.processor().run(&all()).unwrap();

        assert_eq!(
            fx.log.borrow().playlist_adds,
            vec![("vid-a".to_string(), "PL42".to_string())]
        );
    }

    #[test]
    fn test_playlist_failure_keeps_upload_recorded() {
        let mut fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.config.playlist_id = "PL42".to_string();

        let mut processor = fx.processor_with(None, None, true);
        processor.run(&all()).unwrap();

        assert_eq!(processor.stats().playlist_failures, 1);
        let reloaded = UploadStore::load(&fx.config.state_path).unwrap();
        let key = fs::canonicalize(fx.audio("a.mp3")).unwrap();
        assert_eq!(reloaded.get(&key).unwrap().video_id, "vid-a");
    }

    #[test]
    fn test_ignores_non_audio_and_metadata_files() {
        let fx = Fixture::new(&["a.mp3", "._a.mp3", "notes.txt", "b.MP3"], &["cover.jpg"]);
        fs::create_dir(fx.audio("sub.mp3")).unwrap();

        fx.processor().run(&all()).unwrap();

        assert_eq!(fx.uploaded_titles(), vec!["a", "b"]);
    }

    #[test]
    fn test_seeded_image_choice_is_reproducible() {
        let images = ["1.jpg", "2.jpeg", "3.png", "4.jpg", "5.jpg"];
        let audio = ["a.mp3", "b.mp3", "c.mp3", "d.mp3"];

        let pick = || {
            let fx = Fixture::new(&audio, &images);
            fx.processor().run(&all()).unwrap();
            let chosen: Vec<String> = fx
                .log
                .borrow()
                .renders
                .iter()
                .map(|job| display_name(&job.image))
                .collect();
            chosen
        };

        let first = pick();
        assert_eq!(first.len(), 4);
        assert_eq!(first, pick());
    }

    #[test]
    fn test_render_job_uses_config() {
        let mut fx = Fixture::new(&["a.mp3"], &["cover.jpg"]);
        fx.config.delete_rendered_files = false;
        fx.config.video_size = "640x360".parse().unwrap();

        fx.processor().run(&all()).unwrap();

        let log = fx.log.borrow();
        let job = &log.renders[0];
        assert_eq!(job.output, fx.dir.path().join("out").join("a.mp4"));
        assert_eq!(job.size.width, 640);
        assert_eq!(display_name(&job.image), "cover.jpg");
    }

    fn ctx() -> TemplateContext {
        TemplateContext {
            filename: "demo.mp3".to_string(),
            basename: "demo".to_string(),
            creation_date: "2024-01-05".to_string(),
            update_date: "2024-01-06".to_string(),
            mp3_rate: "192".to_string(),
        }
    }

    #[test]
    fn test_default_metadata() {
        let config = Config {
            tags: vec!["synth".to_string()],
            privacy_status: PrivacyStatus::Private,
            ..Default::default()
        };
        let metadata = build_metadata(&config, &ctx());

        assert_eq!(metadata.title, "demo");
        assert_eq!(metadata.description, "demo\nRecorded on 2024-01-06");
        assert_eq!(metadata.tags, vec!["synth"]);
        assert_eq!(metadata.category_id, "10");
        assert_eq!(metadata.privacy_status, PrivacyStatus::Private);
        assert_eq!(metadata.playlist_id, None);
    }

    #[test]
    fn test_templated_metadata() {
        let config = Config {
            title_prefix: "PO-33 | ".to_string(),
            title_template: Some("{basename} ({mp3_rate}kbps)".to_string()),
            description_prefix: "pocket operator tinkering - ".to_string(),
            description_template: Some("{filename} recorded on {creation_date}".to_string()),
            description: "More at example.org".to_string(),
            ..Default::default()
        };
        let metadata = build_metadata(&config, &ctx());

        assert_eq!(metadata.title, "PO-33 | demo (192kbps)");
        assert_eq!(
            metadata.description,
            "pocket operator tinkering - demo.mp3 recorded on 2024-01-05\n\nMore at example.org"
        );
    }

    #[test]
    fn test_malformed_templates_fall_back_to_basename() {
        let config = Config {
            title_prefix: "T: ".to_string(),
            title_template: Some("{basename".to_string()),
            description_template: Some("{filename}}".to_string()),
            ..Default::default()
        };
        let metadata = build_metadata(&config, &ctx());

        assert_eq!(metadata.title, "T: demo");
        assert_eq!(metadata.description, "demo");
    }
}
