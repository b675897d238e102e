use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing::{error, info, Level};

use shared_utils::constants::{
    AUDIO_BITRATE_BPS, DEFAULT_MAXRATE_MULTIPLIER, DEFAULT_SAMPLE_DURATION_SECS,
    DEFAULT_SEARCH_MARGIN, DEFAULT_TWO_PASS_MARGIN, SEARCH_CRF_MAX, SEARCH_CRF_MIN,
};
use shared_utils::logging::{init_logging, LogConfig};
use shared_utils::{
    is_ffmpeg_available, is_ffprobe_available, CrfRange, FileSize, SizeTargetError, VideoCodec,
};
use vid_target::{
    run_pipeline, validate_descriptor, BitrateTargeter, FfmpegEncoder, FfmpegJoiner,
    FfprobeProber, Prober, TargetConfig, TargetMode, Toolchain,
};

#[derive(Parser)]
#[command(name = "vid-target")]
#[command(version, about = "Join .mov clips and compress the result to a target size", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Join the source clips and encode them under the size budget
    #[command(name = "run")]
    Run {
        #[arg(long, default_value = "sourceVids")]
        source_dir: PathBuf,
        /// Compress this video instead of joining clips
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,
        /// CamelCase name part, asked for when omitted
        #[arg(short, long)]
        descriptor: Option<String>,
        #[arg(long, value_enum, default_value_t = TargetMode::CrfSearch)]
        mode: TargetMode,
        #[arg(long, default_value = "2GiB")]
        target_size: FileSize,
        /// Sample length in seconds
        #[arg(long, default_value_t = DEFAULT_SAMPLE_DURATION_SECS)]
        sample_duration: f64,
        #[arg(long, default_value_t = SEARCH_CRF_MIN)]
        min_crf: u8,
        #[arg(long, default_value_t = SEARCH_CRF_MAX)]
        max_crf: u8,
        #[arg(long, default_value_t = DEFAULT_SEARCH_MARGIN)]
        search_margin: f64,
        #[arg(long, default_value_t = DEFAULT_TWO_PASS_MARGIN)]
        two_pass_margin: f64,
        #[arg(long, default_value_t = DEFAULT_MAXRATE_MULTIPLIER)]
        maxrate_multiplier: f64,
        #[arg(long, default_value = "x264")]
        codec: VideoCodec,
        #[arg(long)]
        keep_audio: bool,
        /// Delete the joined video after encoding
        #[arg(long)]
        discard_joined: bool,
        #[arg(short, long)]
        verbose: bool,
    },

    /// Print the two-pass bitrate plan without encoding
    Plan {
        #[arg(long, default_value = "2GiB")]
        target_size: FileSize,
        /// Video length in seconds
        #[arg(long, required_unless_present = "input")]
        duration: Option<f64>,
        /// Probe the length from this file
        #[arg(short, long, value_name = "FILE")]
        input: Option<PathBuf>,
        #[arg(long, default_value_t = DEFAULT_TWO_PASS_MARGIN)]
        margin: f64,
        #[arg(long, default_value_t = DEFAULT_MAXRATE_MULTIPLIER)]
        maxrate_multiplier: f64,
        /// Reserve room for an AAC audio track
        #[arg(long)]
        keep_audio: bool,
        #[arg(long)]
        json: bool,
    },
}

fn require_tool(name: &str, available: bool) -> Result<(), SizeTargetError> {
    if available {
        Ok(())
    } else {
        Err(SizeTargetError::ToolNotFound(name.to_string()))
    }
}

fn prompt_descriptor() -> anyhow::Result<String> {
    print!("Enter the filename descriptor in CamelCase: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read descriptor")?;
    Ok(validate_descriptor(&line)?.to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = matches!(cli.command, Commands::Run { verbose: true, .. });
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    if let Err(e) = init_logging("vid_target", LogConfig::default().with_level(level)) {
        eprintln!("⚠️  Could not initialise logging: {}", e);
    }

    match cli.command {
        Commands::Run {
            source_dir,
            input,
            output_dir,
            descriptor,
            mode,
            target_size,
            sample_duration,
            min_crf,
            max_crf,
            search_margin,
            two_pass_margin,
            maxrate_multiplier,
            codec,
            keep_audio,
            discard_joined,
            verbose: _,
        } => {
            require_tool("ffmpeg", is_ffmpeg_available())?;
            require_tool("ffprobe", is_ffprobe_available())?;

            let descriptor = match (descriptor, &input) {
                (Some(d), _) => d,
                (None, Some(_)) => String::new(),
                (None, None) => prompt_descriptor()?,
            };
            let crf_range = CrfRange::new(min_crf, max_crf).map_err(SizeTargetError::from)?;

            let config = TargetConfig {
                source_dir,
                input,
                output_dir,
                descriptor,
                mode,
                target: target_size,
                sample_duration,
                crf_range,
                search_margin,
                two_pass_margin,
                maxrate_multiplier,
                codec,
                keep_audio,
                discard_joined,
            };

            info!("🎬 Size-targeted compression ({})", config.mode);
            info!("   Budget: {}", config.target.display());
            info!("   Codec: {}", config.codec);
            if config.mode == TargetMode::CrfSearch {
                info!(
                    "   CRF window: {}, sample {}s",
                    config.crf_range, config.sample_duration
                );
            }
            if config.keep_audio {
                info!("   🔊 Audio: kept");
            }

            let tools = Toolchain {
                encoder: &FfmpegEncoder,
                prober: &FfprobeProber,
                joiner: &FfmpegJoiner,
            };
            match run_pipeline(&config, &tools) {
                Ok(outcome) => {
                    info!("✅ Complete!");
                    info!("   {}", outcome.summary());
                }
                Err(e) => {
                    error!(kind = e.kind(), "❌ {}", e);
                    return Err(e.into());
                }
            }
        }

        Commands::Plan {
            target_size,
            duration,
            input,
            margin,
            maxrate_multiplier,
            keep_audio,
            json,
        } => {
            let duration = match (duration, input) {
                (Some(secs), _) => secs,
                (None, Some(path)) => {
                    require_tool("ffprobe", is_ffprobe_available())?;
                    FfprobeProber.duration(&path)?
                }
                (None, None) => bail!("either --duration or --input is required"),
            };
            let audio_reserve = if keep_audio { AUDIO_BITRATE_BPS } else { 0 };
            let plan = BitrateTargeter::new(margin, maxrate_multiplier)?
                .with_audio_reserve(audio_reserve)
                .plan(target_size, duration)?;

            if json {
                println!("{}", serde_json::to_string_pretty(&plan)?);
            } else {
                println!("\n🎯 Two-Pass Plan");
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
                println!("💾 Budget: {} (margin {})", target_size.display(), margin);
                println!("⏱️  Duration: {:.2}s", duration);
                println!("📊 Video bitrate: {} bps", plan.video_bitrate());
                println!("📈 Max rate: {} bps", plan.max_rate_bps);
                println!("🪣 Buffer: {} bits", plan.bufsize_bits());
                if plan.audio_bitrate_bps > 0 {
                    println!("🔊 Audio: {} bps", plan.audio_bitrate_bps);
                }
                println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
            }
        }
    }

    Ok(())
}
