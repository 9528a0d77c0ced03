use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;

use tape2tube::args::Args;
use tape2tube::config::Config;
use tape2tube::metadata::FfprobeProbe;
use tape2tube::processor::{Processor, Selection};
use tape2tube::publish::YouTubePublisher;
use tape2tube::render::FfmpegRenderer;
use tape2tube::state::UploadStore;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = Config::load(&args.config)?;
    if let Some(dir) = &args.audio_dir {
        config.audio_dir = dir.clone();
    }
    if let Some(dir) = &args.images_dir {
        config.images_dir = dir.clone();
    }
    config.validate()?;

    if !args.dry_run && !config.client_secrets.exists() && !config.token_path.exists() {
        anyhow::bail!("Missing client secrets at {}", config.client_secrets.display());
    }

    // Fails on a corrupt state file rather than risk duplicate uploads
    let store = UploadStore::load(&config.state_path)?;

    let renderer = FfmpegRenderer::new(config.ffmpeg_path.clone(), config.waveform.clone());
    let probe = FfprobeProbe::new(config.ffprobe_path.clone());
    let publisher = YouTubePublisher::new(config.client_secrets.clone(), config.token_path.clone());

    let selection = Selection {
        only: args.only.clone(),
        limit: args.limit(),
        dry_run: args.dry_run,
    };

    let mut processor = Processor::new(
        config,
        store,
        Box::new(renderer),
        Box::new(publisher),
        Box::new(probe),
        StdRng::from_entropy(),
    );

    let result = processor.run(&selection);
    processor.print_summary();
    result
}
