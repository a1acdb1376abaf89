//! Image synthesizer capability and its HTTP implementation.

use anyhow::{Context, Result};
use base64::Engine;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Capability interface for an external text-to-image model.
pub trait Synthesizer {
    /// Generate one image for `prompt` as encoded PNG bytes.
    ///
    /// `Ok(None)` means the model ran but returned no image.
    fn synthesize(&self, prompt: &str) -> Result<Option<Vec<u8>>>;
}

/// Sampling settings sent with every request.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisOptions {
    pub model_id: String,
    pub num_inference_steps: u32,
    pub guidance_scale: f32,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            model_id: "runwayml/stable-diffusion-v1-5".to_string(),
            num_inference_steps: 50,
            guidance_scale: 7.5,
        }
    }
}

#[derive(Debug, Serialize)]
struct Txt2ImgRequest<'a> {
    prompt: &'a str,
    steps: u32,
    cfg_scale: f32,
    batch_size: u32,
    override_settings: OverrideSettings<'a>,
}

#[derive(Debug, Serialize)]
struct OverrideSettings<'a> {
    sd_model_checkpoint: &'a str,
}

#[derive(Debug, Deserialize)]
struct Txt2ImgResponse {
    #[serde(default)]
    images: Vec<String>,
}

/// Blocking client for a txt2img HTTP server (`POST {url}/sdapi/v1/txt2img`).
pub struct HttpSynthesizer {
    base_url: String,
    options: SynthesisOptions,
    http_client: reqwest::blocking::Client,
}

impl HttpSynthesizer {
    pub fn new(base_url: &str, options: SynthesisOptions, timeout_seconds: u64) -> Result<Self> {
        let http_client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            options,
            http_client,
        })
    }
}

impl Synthesizer for HttpSynthesizer {
    fn synthesize(&self, prompt: &str) -> Result<Option<Vec<u8>>> {
        let url = format!("{}/sdapi/v1/txt2img", self.base_url);
        let request = Txt2ImgRequest {
            prompt,
            steps: self.options.num_inference_steps,
            cfg_scale: self.options.guidance_scale,
            batch_size: 1,
            override_settings: OverrideSettings {
                sd_model_checkpoint: &self.options.model_id,
            },
        };

        debug!("Requesting image from {}", url);
        let response = self
            .http_client
            .post(&url)
            .json(&request)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    anyhow::anyhow!("Synthesizer request timed out")
                } else if e.is_connect() {
                    anyhow::anyhow!("Cannot connect to synthesizer at {}", self.base_url)
                } else {
                    anyhow::anyhow!("Failed to send request: {}", e)
                }
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(anyhow::anyhow!("Synthesizer API error {}: {}", status, body));
        }

        let body = response.text().context("Failed to read synthesizer response")?;
        decode_first_image(&body)
    }
}

fn decode_first_image(body: &str) -> Result<Option<Vec<u8>>> {
    let response: Txt2ImgResponse =
        serde_json::from_str(body).context("Failed to parse synthesizer response")?;

    let Some(encoded) = response.images.into_iter().next() else {
        return Ok(None);
    };

    // Some servers prefix the payload with a data URI header.
    let payload = encoded.split_once(',').map_or(encoded.as_str(), |(_, data)| data);
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .context("Synthesizer returned invalid base64 image data")?;
    Ok(Some(bytes))
}
