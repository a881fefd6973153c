//! CLI binary for passport-verify.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ServiceConfig` and either serves HTTP or runs one operation and prints
//! JSON.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use passport_verify::{
    server, EmbeddableImage, PassportService, ServiceConfig, VerificationStrategy,
};
use std::io;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the web service on 127.0.0.1:8000
  passport-verify serve

  # Read the fields off a passport
  passport-verify extract passport.jpg

  # Check a selfie against a passport with the vision model
  passport-verify --strategy model verify selfie.jpg passport.jpg

  # Use an edgequake-llm provider instead of the Gemini endpoint
  passport-verify --provider openai --model gpt-4.1-nano --alt-model gpt-4.1 extract passport.jpg

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Key for the default OpenAI-compatible endpoint
  AWS_ACCESS_KEY_ID       Rekognition credentials (managed strategy)
  AWS_SECRET_ACCESS_KEY
  AWS_SESSION_TOKEN       Optional
  AWS_REGION              Rekognition region (default us-east-1)
  RUST_LOG                Log filter override
"#;

/// Passport extraction and selfie verification.
#[derive(Parser, Debug)]
#[command(
    name = "passport-verify",
    version,
    about = "Extract passport fields and verify selfies against passports",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// edgequake-llm provider (openai, anthropic, gemini, ollama, ...).
    /// Without it the OpenAI-compatible endpoint at --base-url is used.
    #[arg(long, global = true, env = "PASSPORT_PROVIDER")]
    provider: Option<String>,

    /// OpenAI-compatible base URL.
    #[arg(long, global = true, env = "PASSPORT_BASE_URL")]
    base_url: Option<String>,

    /// API key for the OpenAI-compatible endpoint (default: $GEMINI_API_KEY).
    #[arg(long, global = true, env = "PASSPORT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Model for passport field extraction.
    #[arg(long, global = true, env = "PASSPORT_MODEL")]
    model: Option<String>,

    /// Model for same-person judgment and face location.
    #[arg(long, global = true, env = "PASSPORT_ALT_MODEL")]
    alt_model: Option<String>,

    /// Verification strategy.
    #[arg(long, global = true, env = "PASSPORT_STRATEGY", value_enum, default_value = "managed")]
    strategy: StrategyArg,

    /// Minimum similarity (0-100) for a managed-service match.
    #[arg(long, global = true, env = "PASSPORT_SIMILARITY_THRESHOLD")]
    similarity_threshold: Option<f32>,

    /// Skip locating and cropping the passport face (model strategy).
    #[arg(long, global = true, env = "PASSPORT_NO_LOCATE_FACE")]
    no_locate_face: bool,

    /// AWS region for Rekognition.
    #[arg(long, global = true, env = "AWS_REGION")]
    aws_region: Option<String>,

    /// Custom face-comparison endpoint URL.
    #[arg(long, global = true, env = "PASSPORT_FACE_ENDPOINT")]
    face_endpoint: Option<String>,

    /// Per-call provider timeout in seconds.
    #[arg(long, global = true, env = "PASSPORT_API_TIMEOUT", default_value_t = 60)]
    api_timeout: u64,

    /// Max output tokens per completion.
    #[arg(long, global = true, env = "PASSPORT_MAX_TOKENS", default_value_t = 1024)]
    max_tokens: usize,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PASSPORT_VERBOSE")]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve {
        /// Address to bind (host:port).
        #[arg(long, env = "PASSPORT_BIND", default_value = "127.0.0.1:8000")]
        bind: String,

        /// Largest accepted request body in bytes.
        #[arg(long, env = "PASSPORT_MAX_UPLOAD_BYTES", default_value_t = 10 * 1024 * 1024)]
        max_upload_bytes: usize,
    },
    /// Extract the data-page fields of a passport image.
    Extract {
        /// Passport image file.
        image: PathBuf,
    },
    /// Verify that a selfie shows the holder of a passport.
    Verify {
        /// Selfie image file.
        selfie: PathBuf,
        /// Passport image file.
        passport: PathBuf,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum StrategyArg {
    Managed,
    Model,
}

impl From<StrategyArg> for VerificationStrategy {
    fn from(v: StrategyArg) -> Self {
        match v {
            StrategyArg::Managed => VerificationStrategy::Managed,
            StrategyArg::Model => VerificationStrategy::Model,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = build_config(&cli)?;

    match &cli.command {
        Command::Serve { .. } => {
            server::serve(&config).await.context("Server failed")?;
        }
        Command::Extract { image } => {
            let service = PassportService::new(&config).context("Failed to set up service")?;
            let passport = read_image(image)?;
            let record = service
                .extract_passport_info(&passport)
                .await
                .context("Extraction failed")?;
            print_json(&record)?;
        }
        Command::Verify { selfie, passport } => {
            let service = PassportService::new(&config).context("Failed to set up service")?;
            let selfie = read_image(selfie)?;
            let passport = read_image(passport)?;
            let result = service
                .verify(&selfie, &passport)
                .await
                .context("Verification failed")?;
            print_json(&result)?;
        }
    }
    Ok(())
}

/// Map CLI flags onto the config builder.
fn build_config(cli: &Cli) -> Result<ServiceConfig> {
    let mut builder = ServiceConfig::builder()
        .strategy(cli.strategy.into())
        .locate_face(!cli.no_locate_face)
        .api_timeout_secs(cli.api_timeout)
        .max_tokens(cli.max_tokens);

    if let Some(ref p) = cli.provider {
        builder = builder.provider_name(p);
    }
    if let Some(ref u) = cli.base_url {
        builder = builder.base_url(u);
    }
    if let Some(ref k) = cli.api_key {
        builder = builder.api_key(k);
    }
    if let Some(ref m) = cli.model {
        builder = builder.model(m);
    }
    if let Some(ref m) = cli.alt_model {
        builder = builder.alt_model(m);
    }
    if let Some(t) = cli.similarity_threshold {
        builder = builder.similarity_threshold(t);
    }
    if let Some(ref r) = cli.aws_region {
        builder = builder.aws_region(r);
    }
    if let Some(ref e) = cli.face_endpoint {
        builder = builder.face_endpoint(e);
    }
    if let Command::Serve {
        bind,
        max_upload_bytes,
    } = &cli.command
    {
        builder = builder.bind_addr(bind).max_upload_bytes(*max_upload_bytes);
    }

    builder.build().context("Invalid configuration")
}

/// Read an image file, taking the MIME type from its content.
fn read_image(path: &Path) -> Result<EmbeddableImage> {
    let bytes =
        std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let mime = image::guess_format(&bytes)
        .map(|f| f.to_mime_type())
        .with_context(|| format!("{} is not a supported image", path.display()))?;
    Ok(EmbeddableImage::new(bytes, mime))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!(
        "{}",
        serde_json::to_string_pretty(value).context("Failed to serialize output")?
    );
    Ok(())
}
