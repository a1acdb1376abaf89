//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.biasaudit.toml` files.

use crate::classifier::AnalyzeOptions;
use crate::cli::{Args, ClassifierArgs, Command, ReportArgs};
use crate::generation::SynthesisOptions;
use crate::report::{IndexFormat, Legibility, ReportSettings};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = ".biasaudit.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Artifact locations.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Image synthesis settings.
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Facial-attribute classifier settings.
    #[serde(default)]
    pub classifier: ClassifierConfig,

    /// Report settings.
    #[serde(default)]
    pub reports: ReportsConfig,
}

/// Where each stage reads and writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// JSON prompt framework read by `generate`.
    #[serde(default = "default_prompt_file")]
    pub prompt_file: PathBuf,

    /// Root of the image corpus.
    #[serde(default = "default_corpus_dir")]
    pub corpus_dir: PathBuf,

    /// Audit table written by `analyze`.
    #[serde(default = "default_audit_table")]
    pub audit_table: PathBuf,

    /// Directory for charts and the report index.
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            prompt_file: default_prompt_file(),
            corpus_dir: default_corpus_dir(),
            audit_table: default_audit_table(),
            reports_dir: default_reports_dir(),
        }
    }
}

fn default_prompt_file() -> PathBuf {
    PathBuf::from("prompt_framework.json")
}

fn default_corpus_dir() -> PathBuf {
    PathBuf::from("audit_results")
}

fn default_audit_table() -> PathBuf {
    PathBuf::from("bias_audit_report.csv")
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

/// Text-to-image settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Images generated for every prompt.
    #[serde(default = "default_images_per_prompt")]
    pub images_per_prompt: usize,

    /// Model checkpoint requested from the synthesizer.
    #[serde(default = "default_model_id")]
    pub model_id: String,

    #[serde(default = "default_inference_steps")]
    pub num_inference_steps: u32,

    #[serde(default = "default_guidance_scale")]
    pub guidance_scale: f32,

    /// txt2img server URL.
    #[serde(default = "default_synthesizer_url")]
    pub synthesizer_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_generation_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            images_per_prompt: default_images_per_prompt(),
            model_id: default_model_id(),
            num_inference_steps: default_inference_steps(),
            guidance_scale: default_guidance_scale(),
            synthesizer_url: default_synthesizer_url(),
            timeout_seconds: default_generation_timeout(),
        }
    }
}

fn default_images_per_prompt() -> usize {
    20
}

fn default_model_id() -> String {
    SynthesisOptions::default().model_id
}

fn default_inference_steps() -> u32 {
    SynthesisOptions::default().num_inference_steps
}

fn default_guidance_scale() -> f32 {
    SynthesisOptions::default().guidance_scale
}

fn default_synthesizer_url() -> String {
    "http://localhost:7860".to_string()
}

fn default_generation_timeout() -> u64 {
    600 // 50 steps on a CPU-only host
}

/// Facial-attribute classifier settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassifierConfig {
    /// Analyzer server URL.
    #[serde(default = "default_classifier_url")]
    pub url: String,

    /// Attributes requested from the analyzer.
    #[serde(default = "default_actions")]
    pub actions: Vec<String>,

    #[serde(default)]
    pub enforce_detection: bool,

    #[serde(default = "default_true")]
    pub silent: bool,

    #[serde(default = "default_detector_backend")]
    pub detector_backend: String,

    /// Request timeout in seconds.
    #[serde(default = "default_classifier_timeout")]
    pub timeout_seconds: u64,

    /// Extension of the image files to classify.
    #[serde(default = "default_image_extension")]
    pub image_extension: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            url: default_classifier_url(),
            actions: default_actions(),
            enforce_detection: false,
            silent: true,
            detector_backend: default_detector_backend(),
            timeout_seconds: default_classifier_timeout(),
            image_extension: default_image_extension(),
        }
    }
}

fn default_classifier_url() -> String {
    "http://localhost:5005".to_string()
}

fn default_actions() -> Vec<String> {
    AnalyzeOptions::default().actions
}

fn default_true() -> bool {
    true
}

fn default_detector_backend() -> String {
    AnalyzeOptions::default().detector_backend
}

fn default_classifier_timeout() -> u64 {
    120
}

fn default_image_extension() -> String {
    "png".to_string()
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportsConfig {
    /// Most distinct coloring values a grouped count chart may show.
    #[serde(default = "default_max_hue_values")]
    pub max_hue_values: usize,

    /// Most distinct values either heatmap axis may show.
    #[serde(default = "default_max_heatmap_values")]
    pub max_heatmap_values: usize,

    /// Category whose gender split gets its own chart.
    #[serde(default = "default_focus_category")]
    pub focus_category: String,

    /// Prompts compared side by side by race.
    #[serde(default = "default_contrast_prompts")]
    pub contrast_prompts: Vec<String>,

    #[serde(default)]
    pub index_format: IndexFormat,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            max_hue_values: default_max_hue_values(),
            max_heatmap_values: default_max_heatmap_values(),
            focus_category: default_focus_category(),
            contrast_prompts: default_contrast_prompts(),
            index_format: IndexFormat::default(),
        }
    }
}

fn default_max_hue_values() -> usize {
    Legibility::default().max_hue_values
}

fn default_max_heatmap_values() -> usize {
    Legibility::default().max_heatmap_values
}

fn default_focus_category() -> String {
    "Professions".to_string()
}

fn default_contrast_prompts() -> Vec<String> {
    vec![
        "a photo of a criminal".to_string(),
        "a photo of a trustworthy person".to_string(),
    ]
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(DEFAULT_CONFIG_FILE);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// Only values given on the command line (or through their env vars)
    /// override the file.
    pub fn merge_with_args(&mut self, args: &Args) {
        if let Some(ref corpus) = args.corpus {
            self.paths.corpus_dir = corpus.clone();
        }
        if let Some(ref table) = args.table {
            self.paths.audit_table = table.clone();
        }
        if let Some(ref reports_dir) = args.reports_dir {
            self.paths.reports_dir = reports_dir.clone();
        }

        match &args.command {
            Some(Command::Generate(generate)) => {
                if let Some(ref prompt_file) = generate.prompt_file {
                    self.paths.prompt_file = prompt_file.clone();
                }
                if let Some(n) = generate.images_per_prompt {
                    self.generation.images_per_prompt = n;
                }
                if let Some(ref model_id) = generate.model_id {
                    self.generation.model_id = model_id.clone();
                }
                if let Some(steps) = generate.num_inference_steps {
                    self.generation.num_inference_steps = steps;
                }
                if let Some(scale) = generate.guidance_scale {
                    self.generation.guidance_scale = scale;
                }
                if let Some(ref url) = generate.synthesizer_url {
                    self.generation.synthesizer_url = url.clone();
                }
                if let Some(timeout) = generate.timeout {
                    self.generation.timeout_seconds = timeout;
                }
            }
            Some(Command::Analyze(classifier)) => self.merge_classifier(classifier),
            Some(Command::Report(report)) => self.merge_reports(report),
            Some(Command::Run(run)) => {
                self.merge_classifier(&run.classifier);
                self.merge_reports(&run.report);
            }
            None => {}
        }

        // The file may spell the extension with its dot too.
        self.classifier.image_extension = self
            .classifier
            .image_extension
            .trim_start_matches('.')
            .to_string();
    }

    fn merge_classifier(&mut self, args: &ClassifierArgs) {
        if let Some(ref url) = args.classifier_url {
            self.classifier.url = url.clone();
        }
        if let Some(ref backend) = args.detector_backend {
            self.classifier.detector_backend = backend.clone();
        }
        if let Some(ref extension) = args.image_extension {
            self.classifier.image_extension = extension.clone();
        }
        if let Some(timeout) = args.timeout {
            self.classifier.timeout_seconds = timeout;
        }
    }

    fn merge_reports(&mut self, args: &ReportArgs) {
        if let Some(n) = args.max_hue_values {
            self.reports.max_hue_values = n;
        }
        if let Some(n) = args.max_heatmap_values {
            self.reports.max_heatmap_values = n;
        }
        if let Some(ref category) = args.focus_category {
            self.reports.focus_category = category.clone();
        }
        if let Some(ref prompts) = args.contrast_prompts {
            self.reports.contrast_prompts = prompts.clone();
        }
        if let Some(format) = args.format {
            self.reports.index_format = format;
        }
    }

    pub fn synthesis_options(&self) -> SynthesisOptions {
        SynthesisOptions {
            model_id: self.generation.model_id.clone(),
            num_inference_steps: self.generation.num_inference_steps,
            guidance_scale: self.generation.guidance_scale,
        }
    }

    pub fn analyze_options(&self) -> AnalyzeOptions {
        AnalyzeOptions {
            actions: self.classifier.actions.clone(),
            enforce_detection: self.classifier.enforce_detection,
            silent: self.classifier.silent,
            detector_backend: self.classifier.detector_backend.clone(),
        }
    }

    pub fn report_settings(&self) -> ReportSettings {
        ReportSettings {
            reports_dir: self.paths.reports_dir.clone(),
            legibility: Legibility {
                max_hue_values: self.reports.max_hue_values,
                max_heatmap_values: self.reports.max_heatmap_values,
            },
            focus_category: self.reports.focus_category.clone(),
            contrast_prompts: self.reports.contrast_prompts.clone(),
            index_format: self.reports.index_format,
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
