mod frontend;
mod synth;

use std::{path::PathBuf, thread, time::Duration};

use clap::Parser;
use picofront_audio::{BlockSink, SoundSettings};
use picofront_runtime::{
    EmuConfig, FrameskipPolicy, Movie, Platform, PumpedSound, Runtime, Session, SystemClock,
    persist::SaveStore,
};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

use frontend::{LogVideo, ScriptedInput};
use synth::{CoreOptions, SyntheticCore};

/// Headless frame pacing harness
#[derive(Parser, Debug)]
#[command(name = "picofront-headless")]
#[command(about = "Drive the emulation loop with a synthetic core", long_about = None)]
struct Args {
    /// Run at 50 fps instead of 60
    #[arg(long)]
    pal: bool,

    /// `auto` or the number of frames to skip after each rendered one
    #[arg(long, default_value = "auto", value_parser = parse_frameskip)]
    frameskip: FrameskipPolicy,

    /// Simulated CPU cost of a fully rendered frame, in microseconds
    #[arg(long, default_value_t = 4_000)]
    cost_us: u64,

    /// How long to run before quitting
    #[arg(long, default_value_t = 5)]
    seconds: u64,

    /// Frame on which to inject a stall
    #[arg(long)]
    stall_at: Option<u32>,

    /// Length of the injected stall, in milliseconds
    #[arg(long, default_value_t = 300)]
    stall_ms: u64,

    /// Hold fast-forward starting at this frame
    #[arg(long)]
    ff_at: Option<u32>,

    /// Number of frames fast-forward stays held
    #[arg(long, default_value_t = 180)]
    ff_frames: u32,

    /// Disable the frame limiter
    #[arg(long)]
    no_limit: bool,

    /// Disable sound output
    #[arg(long)]
    no_sound: bool,

    /// Sound rate in Hz
    #[arg(long, default_value_t = 44_100)]
    sound_rate: u32,

    /// Show the rendered/done counter
    #[arg(long)]
    show_fps: bool,

    /// Directory for save states and battery RAM
    #[arg(long, default_value = "saves")]
    save_dir: PathBuf,

    /// Store save states lz4-compressed
    #[arg(long)]
    compress: bool,

    /// Behave like a Pico and steer the pen from scripted input
    #[arg(long)]
    pico: bool,

    /// Replay pad input from a Gens movie (.gmv)
    #[arg(long)]
    movie: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,
}

fn parse_frameskip(s: &str) -> Result<FrameskipPolicy, String> {
    if s.eq_ignore_ascii_case("auto") {
        return Ok(FrameskipPolicy::Auto);
    }
    s.parse::<u32>()
        .map(FrameskipPolicy::Fixed)
        .map_err(|e| format!("expected `auto` or a frame count: {e}"))
}

#[cfg(feature = "host-audio")]
fn open_sink(settings: SoundSettings) -> Result<Box<dyn BlockSink>, picofront_audio::AudioError> {
    let sink = picofront_audio::CpalSink::open(picofront_audio::block_len_for_rate(settings.rate))?;
    if sink.sample_rate() != settings.rate {
        tracing::warn!(
            device = sink.sample_rate(),
            requested = settings.rate,
            "device rate differs, tone will play off-pitch"
        );
    }
    Ok(Box::new(sink))
}

#[cfg(not(feature = "host-audio"))]
fn open_sink(settings: SoundSettings) -> Result<Box<dyn BlockSink>, picofront_audio::AudioError> {
    Ok(Box::new(picofront_audio::NullSink::paced(
        settings.rate,
        settings.channels(),
    )))
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(false)
        .with_thread_names(true)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let config = EmuConfig {
        frameskip: args.frameskip,
        frame_limit: !args.no_limit,
        sound: !args.no_sound,
        sound_rate: args.sound_rate,
        show_fps: args.show_fps,
        compress_saves: args.compress,
        ..EmuConfig::default()
    };

    let core_opts = CoreOptions {
        pal: args.pal,
        cost: Duration::from_micros(args.cost_us),
        stall_at: args.stall_at,
        stall: Duration::from_millis(args.stall_ms),
        sound_rate: config.sound_rate,
        stereo: config.stereo,
        pico: args.pico,
    };
    let ff = args.ff_at.map(|at| at..at.saturating_add(args.ff_frames));
    let save_dir = args.save_dir.clone();
    let compress = config.compress_saves;
    let movie = args.movie.as_deref().map(Movie::load).transpose()?;
    let pen = args.pico;

    let runtime = Runtime::start(config, move || {
        let core = SyntheticCore::new(core_opts)?;
        let store = SaveStore::new(save_dir, "synthetic", compress);
        store.ensure_dirs();

        Ok(Session {
            core: Box::new(core),
            platform: Platform {
                clock: Box::new(SystemClock::new()),
                video: Box::new(LogVideo::default()),
                input: Box::new(ScriptedInput::new(ff, pen)),
                sound: Box::new(PumpedSound::new(Box::new(open_sink))),
            },
            persistence: Box::new(store),
            movie,
        })
    })?;

    info!(
        seconds = args.seconds,
        cost_us = args.cost_us,
        pal = args.pal,
        "running"
    );

    let handle = runtime.handle();
    thread::sleep(Duration::from_secs(args.seconds));

    let stats = handle.stats();
    handle.quit();
    runtime.join();

    let total = stats.frames_rendered + stats.frames_skipped;
    info!(
        rendered = stats.frames_rendered,
        skipped = stats.frames_skipped,
        resets = stats.timing_resets,
        fps = total as f64 / args.seconds.max(1) as f64,
        "done"
    );
    Ok(())
}
