//! bomscan CLI
//!
//! Command-line interface for normalizing photographed bill-of-materials
//! pages and handing them to a recognition backend.
//!
//! Copyright (c) 2025 Michael A Wright

mod files;

/// Build metadata generated by `build.rs`
#[allow(dead_code)]
mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use core_pipeline::batch::normalize_batch;
use core_pipeline::{FailurePolicy, ImageSource, Pipeline, PipelineConfig, StageReport};
use ocr_bridge::pool::ProgressFn;
use ocr_bridge::{
    OllamaClient, OllamaConfig, ProxyConfig, ProxyRecognizer, RecognitionPool, Recognizer,
    VisionRecognizer,
};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    "\ncommit: ",
    env!("BUILT_GIT_COMMIT_HASH"),
    "\nbuilt: ",
    env!("BUILT_TIME_UTC"),
    "\nhost: ",
    env!("BUILT_HOST"),
);

#[derive(Parser)]
#[command(name = "bomscan")]
#[command(version, long_version = LONG_VERSION)]
#[command(about = "Normalize photographed BOM pages and run character recognition", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace); RUST_LOG takes precedence
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deskew, crop and enhance page images
    Normalize {
        /// Input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Output directory for normalized pages
        #[arg(short, long)]
        output: PathBuf,

        /// Write a JSON report of every stage to this file
        #[arg(long)]
        report: Option<PathBuf>,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },

    /// Normalize pages and send them to a recognition backend
    Recognize {
        /// Input image or directory
        #[arg(short, long)]
        input: PathBuf,

        /// Write recognition results as JSON to this file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(short, long, value_enum, default_value = "proxy")]
        backend: Backend,

        /// Recognition proxy URL (defaults to BOMSCAN_OCR_ENDPOINT)
        #[arg(long)]
        endpoint: Option<String>,

        /// Bearer token for the proxy (defaults to BOMSCAN_OCR_API_KEY)
        #[arg(long)]
        api_key: Option<String>,

        /// Ollama base URL (defaults to OLLAMA_HOST or http://localhost:11434)
        #[arg(long)]
        ollama_url: Option<String>,

        /// Ollama vision model
        #[arg(long, default_value = "qwen2.5vl:7b")]
        model: String,

        /// Concurrent pages in flight
        #[arg(short, long, default_value_t = ocr_bridge::pool::DEFAULT_WORKERS)]
        workers: usize,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Backend {
    Proxy,
    Ollama,
    Tesseract,
}

/// Pipeline options shared by every subcommand
#[derive(Args, Debug, Default)]
struct PipelineArgs {
    /// JSON pipeline configuration (camelCase keys); flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Skip skew estimation and rotation
    #[arg(long)]
    no_rotate: bool,

    /// Skip content cropping
    #[arg(long)]
    no_crop: bool,

    /// Skip contrast enhancement
    #[arg(long)]
    no_enhance: bool,

    /// Keep grayscale output instead of re-binarizing after enhancement
    #[arg(long)]
    no_binarize: bool,

    /// Rotate by this skew (degrees, clockwise positive) instead of estimating
    #[arg(long, allow_hyphen_values = true)]
    angle: Option<f32>,

    /// Margin kept around detected content, in pixels
    #[arg(long)]
    margin: Option<u32>,

    /// Downscale pages wider than this before processing
    #[arg(long)]
    max_width: Option<u32>,

    /// Downscale pages taller than this before processing
    #[arg(long)]
    max_height: Option<u32>,

    /// Fail a page on any stage error instead of passing the original through
    #[arg(long)]
    strict: bool,
}

impl PipelineArgs {
    fn to_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let json = fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                PipelineConfig::from_json(&json)
                    .with_context(|| format!("Invalid config {}", path.display()))?
            }
            None => PipelineConfig::default(),
        };

        if self.no_rotate {
            config.auto_rotate = false;
        }
        if self.no_crop {
            config.auto_crop = false;
        }
        if self.no_enhance {
            config.enhance_contrast = false;
        }
        if self.no_binarize {
            config.binarize_after_enhance = false;
        }
        if self.angle.is_some() {
            config.rotation_angle_override = self.angle;
        }
        if let Some(margin) = self.margin {
            config.crop_margin = margin;
        }
        if self.max_width.is_some() {
            config.max_width = self.max_width;
        }
        if self.max_height.is_some() {
            config.max_height = self.max_height;
        }

        config.validate()?;
        Ok(config)
    }

    fn policy(&self) -> FailurePolicy {
        if self.strict {
            FailurePolicy::Strict
        } else {
            FailurePolicy::BestEffort
        }
    }
}

#[derive(Debug, Serialize)]
struct PageEntry {
    input: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    width: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    height: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    stages: Option<StageReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recognition: Option<core_pipeline::RecognitionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl PageEntry {
    fn failed(input: PathBuf, error: String) -> Self {
        Self {
            input,
            output: None,
            width: None,
            height: None,
            stages: None,
            recognition: None,
            error: Some(error),
        }
    }
}

/// Which build produced a report
#[derive(Debug, Serialize)]
struct ToolInfo {
    name: &'static str,
    version: &'static str,
    commit: &'static str,
    target: &'static str,
    profile: &'static str,
    rustc: &'static str,
}

impl ToolInfo {
    fn current() -> Self {
        Self {
            name: built_info::PKG_NAME,
            version: built_info::PKG_VERSION,
            commit: env!("BUILT_GIT_COMMIT_HASH"),
            target: built_info::TARGET,
            profile: built_info::PROFILE,
            rustc: built_info::RUSTC_VERSION,
        }
    }
}

#[derive(Debug, Serialize)]
struct RunReport {
    generated_at: String,
    tool: ToolInfo,
    pages: Vec<PageEntry>,
}

impl RunReport {
    fn new(pages: Vec<PageEntry>) -> Self {
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            tool: ToolInfo::current(),
            pages,
        }
    }

    fn failures(&self) -> usize {
        self.pages.iter().filter(|p| p.error.is_some()).count()
    }
}

fn init_tracing(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancel `token` on Ctrl-C so pages not yet started are skipped
fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing pages in flight");
            token.cancel();
        }
    });
}

fn read_sources(paths: &[PathBuf]) -> Result<Vec<ImageSource>> {
    paths
        .iter()
        .map(|path| {
            fs::read(path)
                .map(ImageSource::Bytes)
                .with_context(|| format!("Failed to read {}", path.display()))
        })
        .collect()
}

fn write_json<T: Serialize>(value: &T, path: Option<&Path>) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    match path {
        Some(path) => fs::write(path, json)
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}

async fn run_normalize(
    input: PathBuf,
    output: PathBuf,
    report_path: Option<PathBuf>,
    args: PipelineArgs,
) -> Result<()> {
    let pipeline = Pipeline::new(args.to_config()?)?;
    let policy = args.policy();
    let paths = files::collect_images(&input)?;
    let sources = read_sources(&paths)?;
    fs::create_dir_all(&output)
        .with_context(|| format!("Failed to create {}", output.display()))?;

    info!(pages = paths.len(), output = %output.display(), "Normalizing");

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());

    let results = tokio::task::spawn_blocking(move || {
        normalize_batch(&pipeline, &sources, policy, &cancel, |done, total| {
            info!(done, total, "Progress");
        })
    })
    .await
    .context("Normalization worker panicked")?;

    let mut pages = Vec::with_capacity(paths.len());
    for (path, result) in paths.into_iter().zip(results) {
        let entry = match result {
            Ok(normalized) => {
                let target = files::output_path(&output, &path, normalized.extension());
                fs::write(&target, normalized.payload_bytes()?)
                    .with_context(|| format!("Failed to write {}", target.display()))?;
                if let Some(reason) = &normalized.report.degraded {
                    warn!(input = %path.display(), reason = %reason, "Wrote original image");
                }
                PageEntry {
                    input: path,
                    output: Some(target),
                    width: Some(normalized.width),
                    height: Some(normalized.height),
                    stages: Some(normalized.report),
                    recognition: None,
                    error: None,
                }
            }
            Err(err) => PageEntry::failed(path, err.to_string()),
        };
        pages.push(entry);
    }

    let report = RunReport::new(pages);
    if let Some(path) = report_path {
        write_json(&report, Some(&path))?;
    }
    finish(&report)
}

/// `--endpoint`/`--api-key` with the environment as fallback
fn proxy_config(endpoint: Option<String>, api_key: Option<String>) -> Result<ProxyConfig> {
    let config = match endpoint {
        Some(endpoint) => ProxyConfig::new(endpoint),
        None => ProxyConfig::from_env()?,
    };
    let api_key = api_key
        .or_else(|| config.api_key.clone())
        .or_else(ProxyConfig::api_key_from_env);
    Ok(config.with_api_key(api_key))
}

fn build_recognizer(
    backend: Backend,
    endpoint: Option<String>,
    api_key: Option<String>,
    ollama_url: Option<String>,
    model: String,
) -> Result<Arc<dyn Recognizer>> {
    let recognizer: Arc<dyn Recognizer> = match backend {
        Backend::Proxy => {
            Arc::new(ProxyRecognizer::new(proxy_config(endpoint, api_key)?)?)
        }
        Backend::Ollama => {
            let mut config = OllamaConfig::from_env();
            if let Some(url) = ollama_url {
                config.base_url = url.trim_end_matches('/').to_string();
            }
            Arc::new(VisionRecognizer::new(OllamaClient::new(config)?, model))
        }
        #[cfg(feature = "tesseract")]
        Backend::Tesseract => Arc::new(ocr_bridge::TesseractRecognizer::default()),
        #[cfg(not(feature = "tesseract"))]
        Backend::Tesseract => {
            bail!("bomscan was built without Tesseract support; rebuild with --features tesseract")
        }
    };
    Ok(recognizer)
}

#[allow(clippy::too_many_arguments)]
async fn run_recognize(
    input: PathBuf,
    output: Option<PathBuf>,
    backend: Backend,
    endpoint: Option<String>,
    api_key: Option<String>,
    ollama_url: Option<String>,
    model: String,
    workers: usize,
    args: PipelineArgs,
) -> Result<()> {
    let pipeline = Pipeline::new(args.to_config()?)?;
    let recognizer = build_recognizer(backend, endpoint, api_key, ollama_url, model)?;
    let paths = files::collect_images(&input)?;
    let sources = read_sources(&paths)?;

    let pool = RecognitionPool::new(pipeline, recognizer)
        .with_workers(workers)
        .with_policy(args.policy());

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let progress: ProgressFn =
        Arc::new(|done: usize, total: usize| info!(done, total, "Progress"));

    let results = pool.run(sources, cancel, Some(progress)).await;
    let status = pool.status();
    info!(completed = status.completed, "Recognition finished");

    let pages = paths
        .into_iter()
        .zip(results)
        .map(|(path, result)| match result {
            Ok(outcome) => PageEntry {
                input: path,
                output: None,
                width: Some(outcome.normalized.width),
                height: Some(outcome.normalized.height),
                stages: Some(outcome.normalized.report),
                recognition: Some(outcome.recognition),
                error: None,
            },
            Err(err) => PageEntry::failed(path, format!("{:#}", err)),
        })
        .collect();

    let report = RunReport::new(pages);
    write_json(&report, output.as_deref())?;
    finish(&report)
}

fn finish(report: &RunReport) -> Result<()> {
    let failures = report.failures();
    if failures > 0 {
        bail!("{} of {} pages failed", failures, report.pages.len());
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Normalize {
            input,
            output,
            report,
            pipeline,
        } => run_normalize(input, output, report, pipeline).await,
        Commands::Recognize {
            input,
            output,
            backend,
            endpoint,
            api_key,
            ollama_url,
            model,
            workers,
            pipeline,
        } => {
            run_recognize(
                input, output, backend, endpoint, api_key, ollama_url, model, workers, pipeline,
            )
            .await
        }
    }
}
