//! boxcut command-line interface
//!
//! `boxcut cut` runs one cutout from a file or stdin; `boxcut serve` starts the
//! HTTP service.

use super::config::CliConfigBuilder;
use crate::{
    processor::CutoutProcessor,
    tracing_config::{init_cli_tracing, spans, TracingFormat},
    types::{BoxPrompt, CropOutcome, CutoutResult},
};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Box-prompted object cutouts
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "boxcut")]
pub struct Cli {
    /// Enable verbose logging (-v: DEBUG, -vv: TRACE); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, value_enum, default_value_t = CliLogFormat::Console, global = true, env = "BOXCUT_LOG_FORMAT")]
    pub log_format: CliLogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Cut one object out of an image
    Cut(CutArgs),
    /// Serve POST /segment-box over HTTP
    #[cfg(feature = "server")]
    Serve(ServeArgs),
    /// Show execution provider diagnostics
    Providers,
}

/// Model and post-processing options shared by `cut` and `serve`
#[derive(Args, Debug, Clone)]
pub struct ModelArgs {
    /// ONNX export of the SAM image encoder
    #[arg(long, value_name = "PATH", env = "BOXCUT_ENCODER", default_value = "checkpoints/sam_vit_h_encoder.onnx")]
    pub encoder: PathBuf,

    /// ONNX export of the SAM prompt decoder
    #[arg(long, value_name = "PATH", env = "BOXCUT_DECODER", default_value = "checkpoints/sam_vit_h_decoder.onnx")]
    pub decoder: PathBuf,

    /// Execution provider (auto, cpu, cuda, coreml)
    #[arg(short, long, default_value = "auto", env = "BOXCUT_EXECUTION_PROVIDER")]
    pub execution_provider: String,

    /// Number of threads (0 = auto-detect)
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Side of the square kernel used to close mask holes (odd)
    #[arg(long, default_value_t = 15)]
    pub closing_kernel: u32,

    /// Side of the Gaussian kernel feathering the alpha edge (odd)
    #[arg(long, default_value_t = 5)]
    pub blur_kernel: u32,

    /// Which mask to keep when the model returns several
    #[arg(long, value_enum, default_value_t = CliMaskSelection::First)]
    pub mask_selection: CliMaskSelection,

    /// Ask the model for several mask hypotheses
    #[arg(long)]
    pub multimask: bool,

    /// Use box-shaped masks instead of the model (no model files needed)
    #[arg(long, env = "BOXCUT_MOCK")]
    pub mock: bool,
}

#[derive(Args, Debug)]
pub struct CutArgs {
    /// Input image ("-" for stdin)
    #[arg(value_name = "INPUT")]
    pub input: String,

    /// Box around the object
    #[arg(long = "box", value_name = "X1,Y1,X2,Y2", allow_hyphen_values = true)]
    pub box_prompt: BoxPrompt,

    /// Output PNG ("-" for stdout) [default: <INPUT stem>_cutout.png]
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[cfg(feature = "server")]
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(long, default_value = "127.0.0.1", env = "BOXCUT_HOST")]
    pub host: String,

    #[arg(long, default_value_t = 8000, env = "BOXCUT_PORT")]
    pub port: u16,

    /// Directory cutouts are written to
    #[arg(long, value_name = "DIR", default_value = "uploads", env = "BOXCUT_UPLOAD_DIR")]
    pub upload_dir: PathBuf,

    /// Allowed CORS origin (repeatable)
    #[arg(
        long = "allowed-origin",
        value_name = "ORIGIN",
        env = "BOXCUT_ALLOWED_ORIGINS",
        value_delimiter = ',',
        default_values_t = [
            "http://localhost:3000".to_string(),
            "http://127.0.0.1:3000".to_string(),
        ]
    )]
    pub allowed_origins: Vec<String>,

    /// Request body limit in MiB
    #[arg(long, default_value_t = 20, env = "BOXCUT_MAX_UPLOAD_MB")]
    pub max_upload_mb: usize,

    #[command(flatten)]
    pub model: ModelArgs,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliMaskSelection {
    First,
    HighestScore,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum, Debug)]
pub enum CliLogFormat {
    Console,
    Compact,
    /// Requires the `tracing-json` feature
    Json,
}

impl CliLogFormat {
    fn tracing_format(self) -> Result<TracingFormat> {
        match self {
            Self::Console => Ok(TracingFormat::Console),
            Self::Compact => Ok(TracingFormat::Compact),
            #[cfg(feature = "tracing-json")]
            Self::Json => Ok(TracingFormat::Json),
            #[cfg(not(feature = "tracing-json"))]
            Self::Json => anyhow::bail!("JSON logging requires the 'tracing-json' feature"),
        }
    }
}

/// Parse arguments and run the selected command
///
/// # Errors
/// - Invalid arguments or configuration
/// - Any failure of the selected command
pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose, cli.log_format.tracing_format()?).context("Failed to initialize tracing")?;

    match cli.command {
        Command::Cut(args) => run_cut(&args, cli.verbose),
        #[cfg(feature = "server")]
        Command::Serve(args) => run_serve(args, cli.verbose).await,
        Command::Providers => {
            show_provider_diagnostics();
            Ok(())
        },
    }
}

fn run_cut(args: &CutArgs, verbose: u8) -> Result<()> {
    let (config, backend_type) =
        CliConfigBuilder::from_model_args(&args.model, verbose).context("Invalid configuration")?;
    let _session = spans::session("cut", &backend_type.to_string()).entered();

    let mut processor =
        CutoutProcessor::new(config, backend_type).context("Failed to create processor")?;

    let result = if args.input == "-" {
        let data = read_stdin()?;
        let _span = spans::image_loading("stdin", data.len()).entered();
        processor
            .process_bytes(&data, &args.box_prompt)
            .context("Failed to cut out object from stdin")?
    } else {
        let input = Path::new(&args.input);
        processor
            .process_file(input, &args.box_prompt)
            .with_context(|| format!("Failed to cut out object from {}", input.display()))?
    };

    report(&result);

    match args.output.as_deref() {
        Some("-") => {
            let png = result.to_png_bytes().context("Failed to encode PNG")?;
            write_stdout(&png)?;
        },
        target => {
            let output = target.map_or_else(|| generate_output_path(&args.input), PathBuf::from);
            result
                .save_png(&output)
                .with_context(|| format!("Failed to save {}", output.display()))?;
            info!("💾 Saved cutout to {}", output.display());
        },
    }

    Ok(())
}

#[cfg(feature = "server")]
async fn run_serve(args: ServeArgs, verbose: u8) -> Result<()> {
    let (config, backend_type) =
        CliConfigBuilder::from_model_args(&args.model, verbose).context("Invalid configuration")?;
    let server_config = CliConfigBuilder::server_config(&args);

    info!(backend = %backend_type, "Loading segmentation model");
    let service = tokio::task::spawn_blocking(move || {
        crate::service::SegmentationService::from_config(config, backend_type)
    })
    .await
    .context("Model loading task failed")?
    .context("Failed to initialize segmentation service")?;

    crate::server::run_server(service, server_config)
        .await
        .context("Server failed")
}

fn report(result: &CutoutResult) {
    let timings = &result.timings;
    info!("📊 Processing breakdown:");
    if timings.model_load_ms > 0 {
        info!("  ├─ Model Load: {}ms", timings.model_load_ms);
    }
    info!("  ├─ Encode: {}ms", timings.encode_ms);
    info!("  ├─ Predict: {}ms", timings.predict_ms);
    info!("  ├─ Postprocessing: {}ms", timings.postprocessing_ms());
    info!("  └─ Total: {}ms", timings.total_ms);

    match result.outcome {
        CropOutcome::Cropped(bounds) => info!(
            "✂️  Cropped to {}x{} at ({}, {})-({}, {}) from {}x{}",
            bounds.width,
            bounds.height,
            bounds.x,
            bounds.y,
            bounds.right(),
            bounds.bottom(),
            result.original_dimensions.0,
            result.original_dimensions.1
        ),
        CropOutcome::NoContent => {
            warn!("No object found inside {}; returning the uncropped transparent image", result.prompt);
        },
    }
}

fn show_provider_diagnostics() {
    let cpu_count = std::thread::available_parallelism()
        .map(std::num::NonZeroUsize::get)
        .unwrap_or(1);
    println!("💻 System: {cpu_count} CPU cores detected");

    #[cfg(feature = "onnx")]
    {
        println!("\n🚀 Execution Providers:");
        for (name, available, description) in crate::backends::SamOnnxBackend::list_providers() {
            let status = if available { "✅ Available" } else { "❌ Not Available" };
            println!("  • {name}: {status} - {description}");
        }
    }

    #[cfg(not(feature = "onnx"))]
    println!("\nONNX backend not compiled in; only --mock is available");
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;
    if buffer.is_empty() {
        anyhow::bail!("No image data received on stdin");
    }
    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout
        .write_all(data)
        .context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// `<dir>/<stem>_cutout.png` next to the input; stdin input writes to the working directory
fn generate_output_path(input: &str) -> PathBuf {
    if input == "-" {
        return PathBuf::from("stdin_cutout.png");
    }
    let input_path = Path::new(input);
    let stem = input_path.file_stem().unwrap_or_default();
    let dir = input_path.parent().unwrap_or(Path::new("."));
    dir.join(format!("{}_cutout.png", stem.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_cut_command() {
        let cli = Cli::try_parse_from([
            "boxcut",
            "cut",
            "photo.jpg",
            "--box",
            "10,20,300,400",
            "-o",
            "out.png",
            "--closing-kernel",
            "21",
            "--mock",
            "-vv",
        ])
        .unwrap();

        assert_eq!(cli.verbose, 2);
        let Command::Cut(args) = cli.command else {
            panic!("expected cut command");
        };
        assert_eq!(args.box_prompt, BoxPrompt::new(10, 20, 300, 400));
        assert_eq!(args.output.as_deref(), Some("out.png"));
        assert_eq!(args.model.closing_kernel, 21);
        assert!(args.model.mock);
    }

    #[test]
    fn test_box_is_required_and_parsed() {
        assert!(Cli::try_parse_from(["boxcut", "cut", "photo.jpg"]).is_err());
        assert!(Cli::try_parse_from(["boxcut", "cut", "photo.jpg", "--box", "1,2,3"]).is_err());
    }

    #[cfg(feature = "server")]
    #[test]
    fn test_parse_serve_defaults() {
        let cli = Cli::try_parse_from(["boxcut", "serve", "--port", "9000"]).unwrap();
        let Command::Serve(args) = cli.command else {
            panic!("expected serve command");
        };
        assert_eq!(args.port, 9000);
        assert_eq!(args.upload_dir, PathBuf::from("uploads"));
        assert_eq!(args.allowed_origins.len(), 2);
    }

    #[test]
    fn test_generate_output_path() {
        assert_eq!(
            generate_output_path("images/cat.jpeg"),
            PathBuf::from("images/cat_cutout.png")
        );
        assert_eq!(generate_output_path("cat.png"), PathBuf::from("cat_cutout.png"));
        assert_eq!(generate_output_path("-"), PathBuf::from("stdin_cutout.png"));
    }
}
