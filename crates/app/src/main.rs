use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use spectrum_player_core::{
    audio, decode, AppConfig, AudioMode, Pipeline, TailPolicy, TraceVisualizer, WindowFunction,
};
use tracing_subscriber::EnvFilter;

fn main() -> spectrum_player_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Play(args) => run_play(args),
        Commands::Inspect { input } => run_inspect(&input),
    }
}

fn run_play(args: PlayArgs) -> spectrum_player_core::Result<()> {
    let mut config = match &args.config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(block_size) = args.block_size {
        config.audio.block_size = block_size;
    }
    if args.zero_pad_tail {
        config.audio.tail = TailPolicy::ZeroPad;
    }
    if args.hann {
        config.audio.window = WindowFunction::Hann;
    }

    let mode = AudioMode::from(args.mode);
    tracing::info!(input = ?args.input, ?mode, block_size = config.audio.block_size, "starting playback");

    let mut pipeline = Pipeline::new(config.audio.clone(), audio::driver_for(mode))?;
    pipeline.load(&args.input)?;
    let sample_rate = pipeline.sample_rate().unwrap_or_default();
    pipeline.start()?;

    let mut visualizer = TraceVisualizer::new(&config.render, sample_rate);
    if let Some(frames) = args.frames {
        visualizer = visualizer.with_frame_limit(frames);
    }

    let rendered = pipeline.drive(&mut visualizer)?;
    tracing::info!(rendered, "playback finished");
    Ok(())
}

fn run_inspect(input: &Path) -> spectrum_player_core::Result<()> {
    let source = decode::load(input)?;
    tracing::info!(
        ?input,
        sample_rate = source.sample_rate(),
        frames = source.frames(),
        duration_seconds = source.duration_seconds(),
        "decoded source"
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Plays audio and streams its spectrum", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play an audio file and report its spectrum while it plays.
    Play(PlayArgs),
    /// Decode an audio file and print its format.
    Inspect {
        /// Path to a `.wav` or `.mp3` file.
        input: PathBuf,
    },
}

#[derive(clap::Args, Debug)]
struct PlayArgs {
    /// Path to a `.wav` or `.mp3` file.
    input: PathBuf,
    /// Optional JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Frames per block; overrides the configuration file.
    #[arg(short, long)]
    block_size: Option<usize>,
    #[arg(short, long, value_enum, default_value_t = ModeArg::Device)]
    mode: ModeArg,
    /// Stop after rendering this many spectra.
    #[arg(short, long)]
    frames: Option<usize>,
    /// Pad and play the final partial block instead of dropping it.
    #[arg(long)]
    zero_pad_tail: bool,
    /// Apply a Hann window before the transform.
    #[arg(long)]
    hann: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ModeArg {
    /// Play through the default output device.
    Device,
    /// No device, paced at the playback rate.
    Headless,
    /// No device, as fast as possible.
    Unpaced,
}

impl From<ModeArg> for AudioMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Device => AudioMode::Device,
            ModeArg::Headless => AudioMode::Headless,
            ModeArg::Unpaced => AudioMode::Unpaced,
        }
    }
}
