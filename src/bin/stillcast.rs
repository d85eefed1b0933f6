use std::path::PathBuf;

use anyhow::Context as _;
use clap::{Parser, Subcommand};

use stillcast::{
    Resolution,
    effect::EffectConfig,
    musicgen::{DEFAULT_ENDPOINT, MusicClient, TrackRequest},
    render::{self, PlaylistJob, TrackJob},
};

#[derive(Parser, Debug)]
#[command(name = "stillcast", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render one still image with a looped music track (requires `ffmpeg` on PATH).
    Track(TrackArgs),
    /// Render every row of a CSV manifest (image,audio,output per row).
    Batch(BatchArgs),
    /// Concatenate image+track pairs into one video with crossfades.
    Playlist(PlaylistArgs),
    /// Request a generated track from the music API and save the audio bytes.
    GenerateMusic(GenerateMusicArgs),
}

#[derive(Parser, Debug)]
struct TrackArgs {
    /// Input still image.
    #[arg(long)]
    image: PathBuf,

    /// Music track laid under the image.
    #[arg(long)]
    audio: PathBuf,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    /// Named output resolution (SD, HD, FullHD, QHD, UHD, Vertical, Square).
    #[arg(long, default_value = "FullHD")]
    resolution: Resolution,

    /// Output frame rate. 1 fps is plenty for a static image.
    #[arg(long, default_value_t = 1)]
    fps: u32,

    /// Target length in seconds; the track loops to fill it. Defaults to the
    /// track's own duration.
    #[arg(long)]
    duration: Option<f64>,

    /// JSON effect-overlay config (effect_path, background_color, effect_color).
    #[arg(long)]
    effect: Option<PathBuf>,

    /// Overwrite the output if it already exists.
    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Encoder thread count passed through to ffmpeg.
    #[arg(long)]
    threads: Option<u32>,
}

#[derive(Parser, Debug)]
struct BatchArgs {
    /// CSV manifest with image,audio,output rows.
    #[arg(long)]
    manifest: PathBuf,

    #[arg(long, default_value = "FullHD")]
    resolution: Resolution,

    #[arg(long, default_value_t = 1)]
    fps: u32,

    /// Target length in seconds applied to every row.
    #[arg(long)]
    duration: Option<f64>,

    #[arg(long)]
    effect: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    overwrite: bool,

    #[arg(long)]
    threads: Option<u32>,
}

#[derive(Parser, Debug)]
struct PlaylistArgs {
    /// Directory of still images (paired with tracks in sorted order).
    #[arg(long)]
    images: PathBuf,

    /// Directory of music tracks.
    #[arg(long)]
    music: PathBuf,

    /// Image file extension to pick up.
    #[arg(long, default_value = "jpeg")]
    image_ext: String,

    /// Music file extension to pick up.
    #[arg(long, default_value = "mp3")]
    music_ext: String,

    /// Output MP4 path.
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "FullHD")]
    resolution: Resolution,

    #[arg(long, default_value_t = 25)]
    fps: u32,

    /// Crossfade length in seconds between adjacent clips.
    #[arg(long, default_value_t = 2.0)]
    fade: f64,

    #[arg(long)]
    effect: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    overwrite: bool,

    /// Encoder thread count passed through to ffmpeg.
    #[arg(long, default_value_t = 8)]
    threads: u32,
}

#[derive(Parser, Debug)]
struct GenerateMusicArgs {
    /// Genre, e.g. rock, classical, jazz.
    #[arg(long, default_value = "")]
    genre: String,

    /// Mood, e.g. happy, sad, calm.
    #[arg(long, default_value = "")]
    mood: String,

    /// Output audio file.
    #[arg(long)]
    out: PathBuf,

    /// API key; falls back to the STILLCAST_API_KEY environment variable.
    #[arg(long)]
    api_key: Option<String>,

    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    #[arg(long, default_value_t = 0)]
    intensity: u32,

    #[arg(long, default_value_t = 0)]
    tempo: u32,

    /// Requested track length in seconds.
    #[arg(long, default_value_t = 0)]
    duration: u32,

    #[arg(long, default_value = "")]
    instrument: String,

    #[arg(long, default_value = "wav")]
    format: String,

    #[arg(long, default_value = "")]
    title: String,

    #[arg(long, default_value = "")]
    artist: String,

    #[arg(long, default_value = "")]
    album: String,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Track(args) => cmd_track(args),
        Command::Batch(args) => cmd_batch(args),
        Command::Playlist(args) => cmd_playlist(args),
        Command::GenerateMusic(args) => cmd_generate_music(args),
    }
}

fn load_effect(path: Option<&PathBuf>) -> anyhow::Result<Option<EffectConfig>> {
    match path {
        Some(p) => Ok(Some(EffectConfig::from_path(p)?)),
        None => Ok(None),
    }
}

fn cmd_track(args: TrackArgs) -> anyhow::Result<()> {
    let job = TrackJob {
        image: args.image,
        audio: args.audio,
        output: args.out.clone(),
        resolution: args.resolution,
        fps: args.fps,
        duration_sec: args.duration,
        effect: load_effect(args.effect.as_ref())?,
        overwrite: args.overwrite,
        threads: args.threads,
    };
    render::render_track(&job)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_batch(args: BatchArgs) -> anyhow::Result<()> {
    let template = TrackJob {
        image: PathBuf::new(),
        audio: PathBuf::new(),
        output: PathBuf::new(),
        resolution: args.resolution,
        fps: args.fps,
        duration_sec: args.duration,
        effect: load_effect(args.effect.as_ref())?,
        overwrite: args.overwrite,
        threads: args.threads,
    };
    render::render_batch(&args.manifest, &template)?;
    Ok(())
}

fn cmd_playlist(args: PlaylistArgs) -> anyhow::Result<()> {
    let job = PlaylistJob {
        image_dir: args.images,
        music_dir: args.music,
        image_ext: args.image_ext,
        music_ext: args.music_ext,
        output: args.out.clone(),
        resolution: args.resolution,
        fps: args.fps,
        fade_sec: args.fade,
        effect: load_effect(args.effect.as_ref())?,
        overwrite: args.overwrite,
        threads: Some(args.threads),
    };
    render::render_playlist(&job)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}

fn cmd_generate_music(args: GenerateMusicArgs) -> anyhow::Result<()> {
    let api_key = match args.api_key {
        Some(key) => key,
        None => std::env::var("STILLCAST_API_KEY")
            .context("no --api-key given and STILLCAST_API_KEY is not set")?,
    };

    let mut req = TrackRequest::new(api_key, args.genre, args.mood);
    req.intensity = args.intensity;
    req.tempo = args.tempo;
    req.duration = args.duration;
    req.instrument = args.instrument;
    req.audio_format = args.format;
    req.title = args.title;
    req.artist = args.artist;
    req.album = args.album;

    let client = MusicClient::new(args.endpoint)?;
    client.generate_to_file(&req, &args.out)?;
    eprintln!("wrote {}", args.out.display());
    Ok(())
}
