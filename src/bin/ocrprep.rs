//! CLI binary for ocrprep.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, runs one operation and prints the result.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_llm::{LLMProvider, ProviderFactory};
use indicatif::{ProgressBar, ProgressStyle};
use ocrprep::ocr::{
    HttpOcrProvider, JsonlOutcomeStore, MemoryOutcomeStore, OcrProvider, OutcomeStore, TokioWait,
    VisionOcrProvider,
};
use ocrprep::pipeline::encode::decode_image;
use ocrprep::pipeline::normalize_image;
use ocrprep::storage::LocalObjectStore;
use ocrprep::{
    ExtractionService, JobProgressCallback, PipelineConfig, PreprocessJob,
    SkewSearch, StorageNotification, StorageObjectRef,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

fn bar_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "{spinner:.cyan} {prefix:.bold}  \
         [{bar:42.green/238}] {pos:>3}/{len} images  ⏱ {elapsed_precise}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("█▉▊▋▌▍▎▏  ")
    .tick_strings(TICKS)
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Renders a progress bar for a notification batch. Objects complete out of
/// order, so every line names its object.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        bar.set_style(bar_style());
        bar.set_prefix("Preprocessing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl JobProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize, ignored: usize) {
        self.bar.set_length(total as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("{total} intake object(s), {ignored} ignored"))
        ));
    }

    fn on_object_start(&self, object: &StorageObjectRef) {
        self.bar.set_message(object.key.clone());
    }

    fn on_object_complete(&self, object: &StorageObjectRef, output: &StorageObjectRef, angle: f32) {
        self.bar.println(format!(
            "  {} {}  →  {}  {}",
            green("✓"),
            object.key,
            output.key,
            dim(&format!("{angle:+.1}°")),
        ));
        self.bar.inc(1);
    }

    fn on_object_error(&self, object: &StorageObjectRef, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = match error.char_indices().nth(80) {
            Some((idx, _)) => format!("{}\u{2026}", &error[..idx]),
            None => error.to_string(),
        };
        self.bar
            .println(format!("  {} {}  {}", red("✗"), object.key, red(&msg)));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, success_count: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(success_count);
        if failed == 0 {
            eprintln!("{} {} object(s) written", green("✔"), bold(&success_count.to_string()));
        } else {
            eprintln!(
                "{} {}/{} object(s) written  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&success_count.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Show the skew search for one scan
  ocrprep skew receipt.png

  # Normalize local files into ./out
  ocrprep preprocess scans/*.png -o out

  # Replay an S3 object-created event against a local bucket directory
  ocrprep notify event.json --store-root ./buckets

  # Extract text, falling back to the preprocessed variant
  ocrprep extract https://cdn.example.com/public/ocr/a/receipt.png \
      --endpoint https://ocr.example.com/v1/ocr --outcomes outcomes.jsonl

  # Use a vision LLM as the OCR provider
  ocrprep extract https://cdn.example.com/public/ocr/receipt.png --vision

ENVIRONMENT VARIABLES:
  OCRPREP_MAX_LONG_EDGE    Longest output edge in pixels (2000)
  OCRPREP_SKEW_MIN_ANGLE   Skew search lower bound in degrees (-5)
  OCRPREP_SKEW_MAX_ANGLE   Skew search upper bound in degrees (5)
  OCRPREP_SKEW_STEP        Skew search step in degrees (0.5)
  OCRPREP_SKEW_DOWNSCALE   Longest edge used during the search (800)
  OCRPREP_RETRY_DELAY_MS   Wait before the fallback attempt (3000)
  OCRPREP_JPEG_QUALITY     Output JPEG quality (90)
  OCRPREP_CONCURRENCY      Objects processed in parallel (4)
  OCRPREP_OCR_ENDPOINT     HTTP OCR endpoint for `extract`
  OCRPREP_OCR_API_KEY      Bearer token for the OCR endpoint
  EDGEQUAKE_LLM_PROVIDER   Vision provider for `extract --vision`
  EDGEQUAKE_MODEL          Vision model for `extract --vision`
"#;

/// Deskew and normalize document images, and extract their text.
#[derive(Parser, Debug)]
#[command(
    name = "ocrprep",
    version,
    about = "Deskew and normalize document images, and extract their text via OCR",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    pipeline: PipelineArgs,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "OCRPREP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "OCRPREP_QUIET")]
    quiet: bool,
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Longest edge of the normalized output, in pixels.
    #[arg(long, global = true, env = "OCRPREP_MAX_LONG_EDGE", default_value_t = 2000)]
    max_long_edge: u32,

    /// Lower bound of the skew search, in degrees.
    #[arg(long, global = true, env = "OCRPREP_SKEW_MIN_ANGLE", default_value_t = -5.0,
          allow_negative_numbers = true)]
    skew_min: f32,

    /// Upper bound of the skew search, in degrees.
    #[arg(long, global = true, env = "OCRPREP_SKEW_MAX_ANGLE", default_value_t = 5.0,
          allow_negative_numbers = true)]
    skew_max: f32,

    /// Step between skew candidates, in degrees.
    #[arg(long, global = true, env = "OCRPREP_SKEW_STEP", default_value_t = 0.5)]
    skew_step: f32,

    /// Longest edge used during the skew search.
    #[arg(long, global = true, env = "OCRPREP_SKEW_DOWNSCALE", default_value_t = 800)]
    skew_downscale: u32,

    /// Wait before the fallback OCR attempt, in milliseconds.
    #[arg(long, global = true, env = "OCRPREP_RETRY_DELAY_MS", default_value_t = 3000)]
    retry_delay_ms: u64,

    /// JPEG quality of the normalized output (1–100).
    #[arg(long, global = true, env = "OCRPREP_JPEG_QUALITY", default_value_t = 90)]
    jpeg_quality: u8,

    /// Objects processed in parallel.
    #[arg(short, long, global = true, env = "OCRPREP_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the skew candidates of an image and the chosen angle.
    Skew {
        /// Local image file.
        image: PathBuf,
    },

    /// Deskew and normalize local images into `<stem>.jpg`.
    Preprocess {
        /// Local image files.
        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Output directory (created if missing).
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Run the upload-triggered job for an S3-style event against a local store.
    Notify {
        /// Event JSON file (`Records[].s3.bucket.name` / `Records[].s3.object.key`).
        event: PathBuf,

        /// Directory holding one subdirectory per container.
        #[arg(long, env = "OCRPREP_STORE_ROOT")]
        store_root: PathBuf,

        /// Print the batch report as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Extract text from an image URL, falling back to its preprocessed variant.
    Extract {
        /// Original image URL (`…/public/ocr/…`).
        url: String,

        /// HTTP OCR endpoint accepting `{"image_url": …}`.
        #[arg(long, env = "OCRPREP_OCR_ENDPOINT", conflicts_with = "vision")]
        endpoint: Option<String>,

        /// Bearer token for the HTTP OCR endpoint.
        #[arg(long, env = "OCRPREP_OCR_API_KEY", hide_env_values = true)]
        api_key: Option<String>,

        /// Use a vision LLM instead of an HTTP OCR endpoint.
        #[arg(long)]
        vision: bool,

        /// Vision LLM provider (openai, anthropic, gemini, ollama, …).
        #[arg(long, env = "EDGEQUAKE_LLM_PROVIDER")]
        provider: Option<String>,

        /// Vision LLM model ID.
        #[arg(long, env = "EDGEQUAKE_MODEL")]
        model: Option<String>,

        /// Append successful outcomes to this JSON-lines file.
        #[arg(long, env = "OCRPREP_OUTCOMES")]
        outcomes: Option<PathBuf>,

        /// Per-request provider timeout in seconds.
        #[arg(long, default_value_t = 60)]
        timeout: u64,
    },
}

impl PipelineArgs {
    fn to_config(&self) -> Result<PipelineConfig> {
        PipelineConfig::builder()
            .max_long_edge(self.max_long_edge)
            .skew_range(self.skew_min, self.skew_max)
            .skew_step(self.skew_step)
            .skew_downscale_px(self.skew_downscale)
            .retry_delay_ms(self.retry_delay_ms)
            .jpeg_quality(self.jpeg_quality)
            .concurrency(self.concurrency)
            .build()
            .context("Invalid configuration")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let config = cli.pipeline.to_config()?;

    match cli.command {
        Command::Skew { ref image } => run_skew(image, &config).await,
        Command::Preprocess { ref images, ref output } => {
            run_preprocess(images, output, &config, cli.quiet).await
        }
        Command::Notify {
            ref event,
            ref store_root,
            json,
        } => run_notify(event, store_root, config, json, cli.quiet).await,
        Command::Extract {
            url,
            endpoint,
            api_key,
            vision,
            provider,
            model,
            outcomes,
            timeout,
        } => {
            let timeout = Duration::from_secs(timeout);
            let ocr: Arc<dyn OcrProvider> = if vision {
                let llm = resolve_vision_llm(provider.as_deref(), model.as_deref())?;
                let name = match (&provider, &model) {
                    (Some(p), Some(m)) => format!("vision:{p}/{m}"),
                    (Some(p), None) => format!("vision:{p}"),
                    _ => "vision".to_string(),
                };
                Arc::new(VisionOcrProvider::new(llm, name, timeout)?)
            } else {
                let endpoint = endpoint
                    .context("Set --endpoint (or OCRPREP_OCR_ENDPOINT), or pass --vision")?;
                let mut http = HttpOcrProvider::new(endpoint, timeout)?;
                if let Some(key) = api_key {
                    http = http.with_api_key(key);
                }
                Arc::new(http)
            };
            run_extract(&url, ocr, outcomes, &config).await
        }
    }
}

// ── Subcommands ─────────────────────────────────────────────────────────────

async fn run_skew(image: &Path, config: &PipelineConfig) -> Result<()> {
    let bytes = tokio::fs::read(image)
        .await
        .with_context(|| format!("Failed to read {}", image.display()))?;
    let img = decode_image(&bytes).with_context(|| format!("Not an image: {}", image.display()))?;

    let search = SkewSearch::new(config);
    let estimate = tokio::task::spawn_blocking(move || search.estimate(&img))
        .await
        .context("Skew search task failed")?;

    let winner = estimate.best_index();
    for (idx, c) in estimate.candidates.iter().enumerate() {
        let marker = if Some(idx) == winner {
            green("◀")
        } else {
            String::new()
        };
        println!("{:>6.1}°  {:>14.2}  {}", c.angle, c.score, marker);
    }
    println!("{} best angle {}", cyan("◆"), bold(&format!("{:+.1}°", estimate.angle)));
    Ok(())
}

async fn run_preprocess(
    images: &[PathBuf],
    output: &Path,
    config: &PipelineConfig,
    quiet: bool,
) -> Result<()> {
    tokio::fs::create_dir_all(output)
        .await
        .with_context(|| format!("Failed to create {}", output.display()))?;

    let bar = if quiet {
        ProgressBar::hidden()
    } else {
        ProgressBar::new(images.len() as u64)
    };
    bar.set_style(bar_style());
    bar.set_prefix("Preprocessing");

    let mut failed = 0usize;
    for path in images {
        bar.set_message(path.display().to_string());
        match preprocess_file(path, output, config).await {
            Ok((dest, angle)) => bar.println(format!(
                "  {} {}  →  {}  {}",
                green("✓"),
                path.display(),
                dest.display(),
                dim(&format!("{angle:+.1}°")),
            )),
            Err(e) => {
                failed += 1;
                bar.println(format!("  {} {}  {}", red("✗"), path.display(), red(&format!("{e:#}"))));
            }
        }
        bar.inc(1);
    }
    bar.finish_and_clear();

    if failed > 0 {
        anyhow::bail!("{failed} of {} image(s) failed", images.len());
    }
    if !quiet {
        eprintln!("{} {} image(s) written", green("✔"), bold(&images.len().to_string()));
    }
    Ok(())
}

async fn preprocess_file(path: &Path, output: &Path, config: &PipelineConfig) -> Result<(PathBuf, f32)> {
    let bytes = tokio::fs::read(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .context("File name has no stem")?
        .to_string();

    let config = config.clone();
    let result = tokio::task::spawn_blocking(move || {
        let img = decode_image(&bytes)?;
        let estimate = SkewSearch::new(&config).estimate(&img);
        normalize_image(&img, estimate.angle, &config)
    })
    .await
    .context("Preprocessing task failed")??;

    let dest = output.join(format!("{stem}.jpg"));
    let mut tmp = tempfile::NamedTempFile::new_in(output)
        .with_context(|| format!("Failed to create a temp file in {}", output.display()))?;
    tmp.write_all(&result.bytes)
        .with_context(|| format!("Failed to write {}", tmp.path().display()))?;
    tmp.persist(&dest)
        .with_context(|| format!("Failed to move output to {}", dest.display()))?;
    Ok((dest, result.angle))
}

async fn run_notify(
    event: &Path,
    store_root: &Path,
    config: PipelineConfig,
    json: bool,
    quiet: bool,
) -> Result<()> {
    let raw = tokio::fs::read_to_string(event)
        .await
        .with_context(|| format!("Failed to read {}", event.display()))?;
    let notification =
        StorageNotification::from_s3_event_json(&raw).context("Failed to parse event")?;

    let store = Arc::new(LocalObjectStore::new(store_root));
    let mut job = PreprocessJob::new(store, config);
    if !quiet && !json {
        job = job.with_progress(CliProgressCallback::new());
    }
    let report = job.handle_notification(&notification).await;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
    }
    if report.failed() > 0 {
        anyhow::bail!("{} object(s) failed", report.failed());
    }
    Ok(())
}

async fn run_extract(
    url: &str,
    provider: Arc<dyn OcrProvider>,
    outcomes: Option<PathBuf>,
    config: &PipelineConfig,
) -> Result<()> {
    let store: Arc<dyn OutcomeStore> = match outcomes {
        Some(path) => Arc::new(JsonlOutcomeStore::new(path)),
        None => Arc::new(MemoryOutcomeStore::new()),
    };

    // Ctrl-C during the fallback wait fails the request instead of retrying.
    let (cancel, waiter) = TokioWait::cancellable();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let service = ExtractionService::new(provider, store, Arc::new(waiter), config);
    let success = service
        .extract(url)
        .await
        .with_context(|| format!("Extraction failed for {url}"))?;

    eprintln!(
        "{} {} {}",
        green("✔"),
        bold(&format!("{:?}", success.variant)),
        dim(&success.used_url)
    );
    println!("{}", success.text);
    Ok(())
}

/// Resolve the vision LLM: explicit provider first, then environment
/// auto-detection.
fn resolve_vision_llm(provider: Option<&str>, model: Option<&str>) -> Result<Arc<dyn LLMProvider>> {
    if let Some(name) = provider.filter(|p| !p.is_empty()) {
        let model = model.unwrap_or("gpt-4.1-nano");
        return ProviderFactory::create_llm_provider(name, model)
            .map_err(|e| anyhow::anyhow!("Provider '{name}' is not configured: {e}"));
    }
    let (llm, _embedding) = ProviderFactory::from_env().map_err(|e| {
        anyhow::anyhow!(
            "No vision provider could be auto-detected; set OPENAI_API_KEY or --provider: {e}"
        )
    })?;
    Ok(llm)
}
