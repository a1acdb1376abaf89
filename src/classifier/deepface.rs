//! HTTP client for a DeepFace analysis server.
//!
//! Sends the image inline as a base64 data URI to `POST {url}/analyze`.

use super::{AnalyzeOptions, AnalyzerOutput, FaceAnalysis, FaceAnalyzer};
use anyhow::{Context, Result};
use base64::Engine;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    img: String,
    actions: &'a [String],
    enforce_detection: bool,
    silent: bool,
    detector_backend: &'a str,
}

/// Blocking client for the DeepFace REST API.
pub struct DeepFaceClient {
    base_url: String,
    http_client: reqwest::blocking::Client,
}

impl DeepFaceClient {
    pub fn new(base_url: &str, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http_client,
        })
    }
}

impl FaceAnalyzer for DeepFaceClient {
    fn analyze(&self, image_path: &Path, options: &AnalyzeOptions) -> Result<AnalyzerOutput> {
        let bytes = std::fs::read(image_path)
            .with_context(|| format!("Failed to read image: {}", image_path.display()))?;

        let request = AnalyzeRequest {
            img: data_uri(image_path, &bytes),
            actions: &options.actions,
            enforce_detection: options.enforce_detection,
            silent: options.silent,
            detector_backend: &options.detector_backend,
        };

        let url = format!("{}/analyze", self.base_url);
        debug!("Analyzing {} via {}", image_path.display(), url);

        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Classifier request timed out for {}", image_path.display())
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to classifier at {}", self.base_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow::anyhow!("Classifier API error {}: {}", status, body));
        }

        let body = response.text().context("Failed to read classifier response")?;
        parse_response(&body)
    }
}

/// The server answers with a `results` wrapper; older versions return the
/// face list or a single face directly. Anything else is an error, never a face.
fn parse_response(body: &str) -> Result<AnalyzerOutput> {
    let value: Value = serde_json::from_str(body).context("Failed to parse classifier response")?;
    match value {
        Value::Null => Ok(AnalyzerOutput::Single(None)),
        Value::Array(entries) => Ok(AnalyzerOutput::Many(parse_faces(entries)?)),
        Value::Object(mut object) => {
            if let Some(error) = object.get("error") {
                anyhow::bail!("Classifier reported an error: {}", error);
            }
            match object.remove("results") {
                Some(Value::Array(entries)) => Ok(AnalyzerOutput::Many(parse_faces(entries)?)),
                Some(other) => anyhow::bail!("Malformed classifier results: {}", other),
                None => Ok(AnalyzerOutput::Single(Some(parse_face(Value::Object(object))?))),
            }
        }
        other => anyhow::bail!("Unexpected classifier response: {}", other),
    }
}

fn parse_faces(entries: Vec<Value>) -> Result<Vec<FaceAnalysis>> {
    entries.into_iter().map(parse_face).collect()
}

fn parse_face(entry: Value) -> Result<FaceAnalysis> {
    if !entry.is_object() {
        anyhow::bail!("Malformed face entry: {}", entry);
    }
    let face: FaceAnalysis =
        serde_json::from_value(entry).context("Malformed face entry in classifier response")?;
    if face.dominant_race.is_none() && face.dominant_gender.is_none() {
        anyhow::bail!("Face entry carries neither race nor gender");
    }
    Ok(face)
}

fn data_uri(path: &Path, bytes: &[u8]) -> String {
    let mime = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "application/octet-stream",
    };
    let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
    format!("data:{};base64,{}", mime, encoded)
}
