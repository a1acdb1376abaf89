//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation. Values left unset fall back to the
//! configuration file.

use crate::report::IndexFormat;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// biasaudit - demographic bias audit for text-to-image models
///
/// Generates an image corpus from a prompt framework, classifies the
/// perceived race and gender of every face, and renders aggregate
/// distribution charts.
///
/// Examples:
///   biasaudit generate --images-per-prompt 5
///   biasaudit analyze --classifier-url http://localhost:5005
///   biasaudit report --format json
///   biasaudit run
///   biasaudit --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .biasaudit.toml in the current directory
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Root of the image corpus
    #[arg(long, value_name = "DIR", global = true)]
    pub corpus: Option<PathBuf>,

    /// Audit table path
    #[arg(long, value_name = "FILE", global = true)]
    pub table: Option<PathBuf>,

    /// Directory for rendered reports
    #[arg(long, value_name = "DIR", global = true)]
    pub reports_dir: Option<PathBuf>,

    /// Generate a default .biasaudit.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Generate the image corpus from the prompt framework
    Generate(GenerateArgs),
    /// Classify every image in the corpus into the audit table
    Analyze(ClassifierArgs),
    /// Render charts from the audit table
    Report(ReportArgs),
    /// Analyze, then report
    Run(RunArgs),
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct GenerateArgs {
    /// JSON file mapping categories to prompts
    #[arg(long, value_name = "FILE")]
    pub prompt_file: Option<PathBuf>,

    /// Images generated per prompt
    #[arg(long, value_name = "COUNT", env = "IMAGES_PER_PROMPT")]
    pub images_per_prompt: Option<usize>,

    /// Model checkpoint requested from the synthesizer
    #[arg(long, value_name = "ID", env = "MODEL_ID")]
    pub model_id: Option<String>,

    /// Denoising steps per image
    #[arg(long, value_name = "STEPS", env = "NUM_INFERENCE_STEPS")]
    pub num_inference_steps: Option<u32>,

    /// Classifier-free guidance scale
    #[arg(long, value_name = "SCALE", env = "GUIDANCE_SCALE")]
    pub guidance_scale: Option<f32>,

    /// txt2img server URL
    #[arg(long, value_name = "URL", env = "BIASAUDIT_SYNTHESIZER_URL")]
    pub synthesizer_url: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ClassifierArgs {
    /// Face analyzer server URL
    #[arg(long, value_name = "URL", env = "BIASAUDIT_CLASSIFIER_URL")]
    pub classifier_url: Option<String>,

    /// Face detector backend passed to the analyzer
    #[arg(long, value_name = "NAME")]
    pub detector_backend: Option<String>,

    /// Extension of the image files to classify
    #[arg(long, value_name = "EXT")]
    pub image_extension: Option<String>,

    /// Request timeout in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct ReportArgs {
    /// Index format (markdown, json)
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<IndexFormat>,

    /// Most distinct coloring values a grouped count chart may show
    #[arg(long, value_name = "COUNT")]
    pub max_hue_values: Option<usize>,

    /// Most distinct values either heatmap axis may show
    #[arg(long, value_name = "COUNT")]
    pub max_heatmap_values: Option<usize>,

    /// Category whose gender split gets its own chart
    #[arg(long, value_name = "NAME")]
    pub focus_category: Option<String>,

    /// Prompts compared by race (comma-separated)
    #[arg(long, value_name = "PROMPTS", value_delimiter = ',')]
    pub contrast_prompts: Option<Vec<String>>,
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RunArgs {
    #[command(flatten)]
    pub classifier: ClassifierArgs,

    #[command(flatten)]
    pub report: ReportArgs,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        let Some(ref command) = self.command else {
            return Err(
                "No command given. Use one of: generate, analyze, report, run (see --help)"
                    .to_string(),
            );
        };

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        match command {
            Command::Generate(generate) => {
                if generate.images_per_prompt == Some(0) {
                    return Err("Images per prompt must be at least 1".to_string());
                }
                if generate.num_inference_steps == Some(0) {
                    return Err("Inference steps must be at least 1".to_string());
                }
                if let Some(scale) = generate.guidance_scale {
                    if !scale.is_finite() || scale < 0.0 {
                        return Err("Guidance scale must be a non-negative number".to_string());
                    }
                }
                validate_url("Synthesizer", generate.synthesizer_url.as_deref())?;
                validate_timeout(generate.timeout)?;
            }
            Command::Analyze(classifier) => validate_classifier(classifier)?,
            Command::Report(report) => validate_report(report)?,
            Command::Run(run) => {
                validate_classifier(&run.classifier)?;
                validate_report(&run.report)?;
            }
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

fn validate_url(name: &str, url: Option<&str>) -> Result<(), String> {
    match url {
        Some(url) if !url.starts_with("http://") && !url.starts_with("https://") => Err(format!(
            "{} URL must start with 'http://' or 'https://'",
            name
        )),
        _ => Ok(()),
    }
}

fn validate_timeout(timeout: Option<u64>) -> Result<(), String> {
    if timeout == Some(0) {
        return Err("Timeout must be at least 1 second".to_string());
    }
    Ok(())
}

fn validate_classifier(args: &ClassifierArgs) -> Result<(), String> {
    validate_url("Classifier", args.classifier_url.as_deref())?;
    validate_timeout(args.timeout)?;
    if let Some(ref extension) = args.image_extension {
        if extension.trim_start_matches('.').is_empty() {
            return Err("Image extension must not be empty".to_string());
        }
    }
    Ok(())
}

fn validate_report(args: &ReportArgs) -> Result<(), String> {
    if args.max_hue_values == Some(0) || args.max_heatmap_values == Some(0) {
        return Err("Legibility limits must be at least 1".to_string());
    }
    Ok(())
}
