//! biasaudit - demographic bias audit for text-to-image models
//!
//! Generates an image corpus from a prompt framework, classifies the
//! perceived race and gender of every face through an external analyzer,
//! and renders aggregate distribution charts from the resulting table.
//!
//! Exit codes:
//!   0 - Success, including an empty corpus with nothing to analyze
//!   1 - Fatal error (missing prerequisite artifact, config, I/O, etc.)

mod analysis;
mod classifier;
mod cli;
mod config;
mod corpus;
mod error;
mod generation;
mod models;
mod report;
mod table;

use anyhow::{Context, Result};
use classifier::{ClassifierAdapter, DeepFaceClient};
use cli::{Args, Command};
use config::{Config, DEFAULT_CONFIG_FILE};
use corpus::CorpusWalker;
use error::AuditError;
use generation::{HttpSynthesizer, PromptFramework};
use std::path::Path;
use std::time::Instant;
use table::Extraction;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        if let Err(e) = handle_init_config() {
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
        return;
    }

    init_logging(&args);

    info!("biasaudit v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    if let Err(e) = run(&args) {
        error!("Audit failed: {:#}", e);
        match e.downcast_ref::<AuditError>() {
            Some(audit_error) => eprintln!("\n❌ {}", audit_error),
            None => eprintln!("\n❌ Error: {:#}", e),
        }
        std::process::exit(1);
    }
}

/// Handle --init-config: generate a default .biasaudit.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(DEFAULT_CONFIG_FILE);

    if path.exists() {
        anyhow::bail!(
            "{} already exists. Remove it first or edit it manually.",
            DEFAULT_CONFIG_FILE
        );
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", DEFAULT_CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", DEFAULT_CONFIG_FILE);
    println!("   Edit it to customize paths, models, and report limits.");
    Ok(())
}

/// Initialize logging based on verbosity settings. `RUST_LOG` wins when set.
fn init_logging(args: &Args) {
    let level = args.log_level();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to set tracing subscriber: {}", e);
    }
}

fn run(args: &Args) -> Result<()> {
    let mut config = load_config(args)?;
    config.merge_with_args(args);

    let show_progress = !args.quiet;

    match &args.command {
        Some(Command::Generate(_)) => run_generate(&config, show_progress),
        Some(Command::Analyze(_)) => {
            run_analyze(&config, show_progress)?;
            Ok(())
        }
        Some(Command::Report(_)) => run_report(&config),
        Some(Command::Run(_)) => {
            if run_analyze(&config, show_progress)? {
                run_report(&config)
            } else {
                Ok(())
            }
        }
        None => Ok(()),
    }
}

fn run_generate(config: &Config, show_progress: bool) -> Result<()> {
    let start_time = Instant::now();
    let framework = PromptFramework::load(&config.paths.prompt_file)?;

    println!("🎨 Generating image corpus...");
    println!("   Prompts: {}", framework.prompt_count());
    println!("   Images per prompt: {}", config.generation.images_per_prompt);
    println!("   Model: {}", config.generation.model_id);
    println!("   Synthesizer: {}", config.generation.synthesizer_url);

    let synthesizer = HttpSynthesizer::new(
        &config.generation.synthesizer_url,
        config.synthesis_options(),
        config.generation.timeout_seconds,
    )?;

    let summary = generation::generate(
        &framework,
        &synthesizer,
        &config.paths.corpus_dir,
        config.generation.images_per_prompt,
        show_progress,
    )?;

    println!("\n📊 Generation Summary:");
    println!("   Prompts: {}", summary.prompts);
    println!("   Images written: {}", summary.images_written);
    if summary.failures > 0 {
        println!("   ⚠️  Failed images: {}", summary.failures);
    }
    println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
    println!(
        "\n✅ Corpus saved to: {}",
        config.paths.corpus_dir.display()
    );
    Ok(())
}

/// Returns `false` when the corpus held no images.
fn run_analyze(config: &Config, show_progress: bool) -> Result<bool> {
    let start_time = Instant::now();

    println!("🔬 Analyzing image corpus...");
    println!("   Corpus: {}", config.paths.corpus_dir.display());
    println!("   Classifier: {}", config.classifier.url);

    let client = DeepFaceClient::new(&config.classifier.url, config.classifier.timeout_seconds)?;
    let adapter = ClassifierAdapter::new(client, config.analyze_options());
    let walker = CorpusWalker::new(
        config.paths.corpus_dir.clone(),
        config.classifier.image_extension.clone(),
    );

    match table::extract(&walker, &adapter, &config.paths.audit_table, show_progress)? {
        Extraction::Empty => {
            warn!("No images found in {}", config.paths.corpus_dir.display());
            println!(
                "\n⚠️  No .{} images found under {}. Nothing to analyze.",
                config.classifier.image_extension,
                config.paths.corpus_dir.display()
            );
            Ok(false)
        }
        Extraction::Written { path, summary } => {
            println!("\n📊 Analysis Summary:");
            println!("   Images: {}", summary.total);
            println!("   Classified: {}", summary.classified);
            println!(
                "   - No face detected: {} | Analysis errors: {}",
                summary.no_face_detected, summary.analysis_error
            );
            println!("   Duration: {:.1}s", start_time.elapsed().as_secs_f64());
            println!("\n✅ Audit table saved to: {}", path.display());
            Ok(true)
        }
    }
}

fn run_report(config: &Config) -> Result<()> {
    let settings = config.report_settings();

    println!("\n📝 Generating reports...");
    let index = report::generate_reports(&config.paths.audit_table, &settings)?;

    println!("\n📊 Report Summary:");
    println!("   Rows used: {} of {}", index.classified_rows, index.detection.total);
    println!("   Charts written: {}", index.artifacts.len());
    println!("   Skipped: {}", index.skipped.len());
    for skipped in &index.skipped {
        println!("     ⏭️  {}: {}", skipped.name, skipped.reason);
    }
    if !index.failed.is_empty() {
        println!("   ⚠️  Failed: {}", index.failed.len());
        for failed in &index.failed {
            println!("     ❗ {}: {}", failed.name, failed.reason);
        }
    }
    println!(
        "\n✅ Reports saved to: {}",
        settings
            .reports_dir
            .join(settings.index_format.file_name())
            .display()
    );
    Ok(())
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    // Try default location
    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", DEFAULT_CONFIG_FILE);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {:#}", e);
            Ok(Config::default())
        }
    }
}
