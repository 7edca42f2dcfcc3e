use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde_json::json;
use timeloop::{
    AnalysisResult, CaptureFormat, DecoderLogLevel, ExtractOptions, ExtractionState,
    FrameExtractor, GeminiClient, MediaFile, MediaSource, ProgressCallback, ProgressInfo, Segment,
    Session, Settings, VideoUpload, WorkflowEvent,
    plans::PLANS,
    webhook::{compute_signature, verify_signature},
};
use tracing_subscriber::EnvFilter;

const CLI_AFTER_HELP: &str = "Examples:\n  timeloop metadata input.mp4 --json\n  timeloop capture input.mp4 --at 2 --at 0:15 --out frames --progress\n  timeloop analyze input.mp4 --out keyframes\n  timeloop verify-webhook body.json --signature <hex>\n  timeloop completions zsh > _timeloop";

#[derive(Debug, Parser)]
#[command(
    name = "timeloop",
    version,
    about = "Reverse-engineer video generation prompts and capture keyframes",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging (overridden by RUST_LOG).
    #[arg(long, global = true)]
    verbose: bool,

    /// Show a progress bar while capturing keyframes.
    #[arg(long, global = true)]
    progress: bool,

    /// Allow writing into an existing output directory.
    #[arg(long, global = true)]
    overwrite: bool,

    /// FFmpeg log level (quiet, error, warning, info, debug).
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print media metadata.
    #[command(visible_alias = "probe")]
    Metadata {
        /// Input media path or URL.
        input: String,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Capture keyframes at the given timestamps.
    #[command(
        after_help = "Examples:\n  timeloop capture input.mp4 --at 1.5 --at 00:42 --out frames\n  timeloop capture input.mp4 --at 10 --format png --seek-timeout 5"
    )]
    Capture {
        /// Input media path or URL.
        input: String,
        /// Timestamp to capture (seconds, MM:SS, or HH:MM:SS). Repeatable.
        #[arg(long = "at", required = true)]
        at: Vec<String>,
        /// Output directory for captured images.
        #[arg(long)]
        out: PathBuf,
        /// Image format (jpg, png).
        #[arg(long, default_value = "jpg")]
        format: String,
        /// JPEG quality (1-100).
        #[arg(long, default_value_t = timeloop::DEFAULT_JPEG_QUALITY)]
        quality: u8,
        /// Give up on a seek after this many seconds.
        #[arg(long)]
        seek_timeout: Option<f64>,
    },

    /// Analyze a video with the model and capture its keyframes.
    #[command(
        after_help = "Requires GEMINI_API_KEY (environment or .env).\n\nExamples:\n  timeloop analyze input.mp4\n  timeloop analyze input.mp4 --json --out keyframes"
    )]
    Analyze {
        /// Input video file.
        input: PathBuf,
        /// Print the result as JSON (keyframes as data URIs).
        #[arg(long)]
        json: bool,
        /// Also save keyframe images to this directory.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Override the MIME type inferred from the file extension.
        #[arg(long)]
        mime_type: Option<String>,
    },

    /// Print the webhook signature for a body file.
    SignWebhook {
        /// File containing the raw request body.
        body: PathBuf,
        /// Shared secret (defaults to RAZORPAY_WEBHOOK_SECRET).
        #[arg(long)]
        secret: Option<String>,
    },

    /// Check a webhook signature against a body file.
    VerifyWebhook {
        /// File containing the raw request body.
        body: PathBuf,
        /// Hex signature from the x-razorpay-signature header.
        #[arg(long)]
        signature: String,
        /// Shared secret (defaults to RAZORPAY_WEBHOOK_SECRET).
        #[arg(long)]
        secret: Option<String>,
    },

    /// List subscription plans.
    Plans {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Run the HTTP service.
    #[cfg(feature = "server")]
    Serve {
        /// Listen address (defaults to TIMELOOP_BIND_ADDRESS or 127.0.0.1:8080).
        #[arg(long)]
        bind: Option<String>,
    },

    /// Generate shell completion scripts.
    Completions {
        /// Shell to generate completions for.
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<f64, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        return Ok(seconds);
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    if parts.len() < 2 || parts.len() > 3 {
        return Err(format!("invalid time format: {trimmed}").into());
    }

    let (hours, minutes, seconds_str) = if parts.len() == 3 {
        (parts[0].parse::<u64>()?, parts[1].parse::<u64>()?, parts[2])
    } else {
        (0_u64, parts[0].parse::<u64>()?, parts[1])
    };

    let seconds = seconds_str.parse::<f64>()?;
    Ok((hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds)
}

fn parse_capture_format(value: &str, quality: u8) -> Option<CaptureFormat> {
    match value.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => Some(CaptureFormat::Jpeg { quality }),
        "png" => Some(CaptureFormat::Png),
        _ => None,
    }
}

fn mime_type_for_path(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        "mkv" => "video/x-matroska",
        "avi" => "video/x-msvideo",
        "m4v" => "video/x-m4v",
        _ => "video/mp4",
    }
}

fn prepare_output_dir(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if !overwrite {
            return Err(format!(
                "output directory already exists: {} (use --overwrite)",
                path.display()
            )
            .into());
        }
        eprintln!(
            "{} {}",
            "warning:".yellow().bold(),
            format!("writing into existing {}", path.display()).yellow()
        );
    } else {
        fs::create_dir_all(path)?;
    }
    Ok(())
}

fn init_logging(global: &GlobalOptions) {
    let default_level = if global.verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let level = match &global.log_level {
        Some(level) => {
            DecoderLogLevel::parse(level).ok_or(format!("unsupported --log-level: {level}"))?
        }
        None if global.verbose => DecoderLogLevel::Warning,
        None => DecoderLogLevel::Error,
    };
    timeloop::set_decoder_log_level(level);
    Ok(())
}

struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(total: u64) -> Result<Self, Box<dyn std::error::Error>> {
        let bar = ProgressBar::new(total);
        let style = ProgressStyle::with_template("{spinner:.green} {bar:40.cyan/blue} {pos}/{len} {msg}")?;
        bar.set_style(style.progress_chars("##-"));
        Ok(Self { bar })
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, info: &ProgressInfo) {
        self.bar.set_length(info.total);
        self.bar.set_position(info.current);
    }

    fn on_state(&self, state: ExtractionState) {
        if state.is_terminal() {
            self.bar.finish_with_message(state.to_string());
        } else {
            self.bar.set_message(state.to_string());
        }
    }
}

fn extract_options(global: &GlobalOptions, total: usize) -> Result<ExtractOptions, Box<dyn std::error::Error>> {
    let mut options = ExtractOptions::new();
    if global.progress {
        options = options.with_progress(Arc::new(TerminalProgress::new(total as u64)?));
    }
    Ok(options)
}

fn save_keyframes(segments: &[Segment], out: &Path) -> Result<usize, Box<dyn std::error::Error>> {
    let mut saved = 0;
    for (index, segment) in segments.iter().enumerate() {
        match segment.captured_image() {
            Some(image) => {
                let path = out.join(format!(
                    "keyframe_{index:02}_{}.{}",
                    segment.timestamp.replace(':', "-"),
                    image.extension()
                ));
                image.save(&path)?;
                saved += 1;
            }
            None => eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("no keyframe for segment {index} at {:.2}s", segment.target_time_seconds).yellow()
            ),
        }
    }
    Ok(saved)
}

fn print_analysis(result: &AnalysisResult) {
    println!("{}", "Master prompt".cyan().bold());
    println!("{}\n", result.master_prompt);

    let details = &result.details;
    for (label, value) in [
        ("Subject", &details.subject),
        ("Action", &details.action),
        ("Camera", &details.camera),
        ("Lighting", &details.lighting),
        ("Style", &details.style),
    ] {
        if !value.is_empty() {
            println!("{} {value}", format!("{label}:").bold());
        }
    }

    println!("\n{}", "Segments".cyan().bold());
    for segment in &result.segments {
        let marker = if segment.has_image() { "●".green() } else { "○".dimmed() };
        println!("{marker} [{}] {}", segment.timestamp, segment.label);
        if !segment.generation_text.is_empty() {
            println!("    {}", segment.generation_text.dimmed());
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime, Box<dyn std::error::Error>> {
    Ok(tokio::runtime::Builder::new_multi_thread().enable_all().build()?)
}

fn webhook_secret(explicit: Option<String>, settings: &Settings) -> Result<String, Box<dyn std::error::Error>> {
    explicit
        .or_else(|| settings.razorpay_webhook_secret.clone())
        .ok_or_else(|| "no secret given and RAZORPAY_WEBHOOK_SECRET is not set".into())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(&cli.global);
    apply_global_options(&cli.global)?;
    let settings = Settings::from_env();

    match cli.command {
        Commands::Metadata { input, json } => {
            let mut media = MediaFile::new(input);
            let metadata = media.load_metadata()?;
            media.release();
            if json {
                let payload = json!({
                    "format": metadata.format,
                    "duration_seconds": metadata.duration_seconds(),
                    "video": {
                        "width": metadata.video.width,
                        "height": metadata.video.height,
                        "fps": metadata.video.frames_per_second,
                        "frame_count": metadata.video.frame_count,
                        "codec": metadata.video.codec,
                    },
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", metadata.format);
                println!("Duration: {:.3}s", metadata.duration_seconds());
                println!(
                    "Video: {}x{} @ {:.2} fps [{}]",
                    metadata.video.width,
                    metadata.video.height,
                    metadata.video.frames_per_second,
                    metadata.video.codec,
                );
            }
        }
        Commands::Capture {
            input,
            at,
            out,
            format,
            quality,
            seek_timeout,
        } => {
            let capture_format = parse_capture_format(&format, quality)
                .ok_or(format!("unsupported --format: {format}"))?;
            let segments = at
                .iter()
                .map(|value| parse_timecode(value).map(|seconds| Segment::new(seconds, value.as_str(), "")))
                .collect::<Result<Vec<_>, _>>()?;

            prepare_output_dir(&out, cli.global.overwrite)?;

            let mut options = extract_options(&cli.global, segments.len())?
                .with_capture_format(capture_format);
            if let Some(seconds) = seek_timeout {
                options = options.with_seek_timeout(Duration::from_secs_f64(seconds.max(0.0)));
            }

            let mut media = MediaFile::new(input);
            let segments = FrameExtractor::new(options).extract(&mut media, segments)?;
            let saved = save_keyframes(&segments, &out)?;
            println!(
                "{} {saved}/{} keyframes to {}",
                "saved".green().bold(),
                segments.len(),
                out.display()
            );
        }
        Commands::Analyze {
            input,
            json,
            out,
            mime_type,
        } => {
            let analyzer = GeminiClient::from_settings(&settings)?;
            let mime_type = mime_type.unwrap_or_else(|| mime_type_for_path(&input).to_string());
            let upload = VideoUpload::new(fs::read(&input)?, mime_type)?
                .with_file_name(input.to_string_lossy());
            if let Some(out) = &out {
                prepare_output_dir(out, cli.global.overwrite)?;
            }

            let options = extract_options(&cli.global, 6)?;
            let locator = input.to_string_lossy().into_owned();
            let result = runtime()?.block_on(async {
                let mut session = Session::new();
                session.apply(WorkflowEvent::VideoSelected(upload))?;
                let result = session.run(&analyzer, locator, options).await?.clone();
                Ok::<AnalysisResult, timeloop::TimeloopError>(result)
            })?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print_analysis(&result);
            }
            if let Some(out) = &out {
                let saved = save_keyframes(&result.segments, out)?;
                eprintln!("{} {saved} keyframes to {}", "saved".green().bold(), out.display());
            }
        }
        Commands::SignWebhook { body, secret } => {
            let secret = webhook_secret(secret, &settings)?;
            println!("{}", compute_signature(&secret, &fs::read(body)?)?);
        }
        Commands::VerifyWebhook {
            body,
            signature,
            secret,
        } => {
            let secret = webhook_secret(secret, &settings)?;
            verify_signature(&secret, &fs::read(body)?, &signature)?;
            println!("{}", "signature valid".green().bold());
        }
        Commands::Plans { json } => {
            if json {
                println!("{}", serde_json::to_string_pretty(&PLANS)?);
            } else {
                for plan in &PLANS {
                    println!(
                        "{:<16} {:<16} {}",
                        plan.id.bold(),
                        plan.price_display,
                        plan.description.dimmed()
                    );
                }
            }
        }
        #[cfg(feature = "server")]
        Commands::Serve { bind } => {
            let mut settings = settings;
            if let Some(bind) = bind {
                settings.bind_address = bind;
            }
            runtime()?.block_on(timeloop::server::serve(&settings))?;
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "timeloop", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    dotenvy::dotenv().ok();
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{mime_type_for_path, parse_capture_format, parse_timecode};

    #[test]
    fn parse_timecode_formats() {
        assert_eq!(parse_timecode("75").unwrap(), 75.0);
        assert_eq!(parse_timecode("01:15").unwrap(), 75.0);
        assert_eq!(parse_timecode("00:01:15.5").unwrap(), 75.5);
        assert_eq!(parse_timecode("-3").unwrap(), -3.0);
        assert!(parse_timecode("").is_err());
        assert!(parse_timecode("1:2:3:4").is_err());
    }

    #[test]
    fn parse_capture_format_aliases() {
        assert!(matches!(
            parse_capture_format("JPEG", 70),
            Some(timeloop::CaptureFormat::Jpeg { quality: 70 })
        ));
        assert!(parse_capture_format("png", 80).is_some());
        assert!(parse_capture_format("gif", 80).is_none());
    }

    #[test]
    fn mime_type_from_extension() {
        assert_eq!(mime_type_for_path(Path::new("clip.MOV")), "video/quicktime");
        assert_eq!(mime_type_for_path(Path::new("clip.webm")), "video/webm");
        assert_eq!(mime_type_for_path(Path::new("clip")), "video/mp4");
    }
}
