use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "tape2tube")]
#[command(about = "Upload audio files as static-image videos", long_about = None)]
pub struct Args {
    /// JSON config file; relative paths inside it resolve against its directory
    #[arg(long)]
    pub config: PathBuf,

    /// Maximum number of new files to process (0 = no limit)
    #[arg(long, default_value_t = 0)]
    pub limit: usize,

    /// Process only this audio file (name inside the audio dir, or a path)
    #[arg(long)]
    pub only: Option<String>,

    /// Override the config's audio_dir
    #[arg(long)]
    pub audio_dir: Option<PathBuf>,

    /// Override the config's images_dir
    #[arg(long)]
    pub images_dir: Option<PathBuf>,

    /// List what would be processed without rendering or uploading
    #[arg(long)]
    pub dry_run: bool,
}

impl Args {
    pub fn limit(&self) -> Option<usize> {
        if self.limit == 0 {
            None
        } else {
            Some(self.limit)
        }
    }
}
