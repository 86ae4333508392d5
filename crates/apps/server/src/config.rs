use photomesh::config::{
    DEFAULT_CHUNK_SIZE, DEFAULT_DEVICE, DEFAULT_MAX_IMAGE_BYTES, DEFAULT_MC_RESOLUTION,
    DEFAULT_MODEL_ID, DEFAULT_PREVIEW_SIZE,
};
use photomesh::PipelineConfig;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Slack on top of the base64-expanded image for the rest of the JSON body
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Configuration for the photomesh server binary.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address and port the server binds to (e.g. `0.0.0.0:8000`).
    pub bind_address: String,
    /// Requested compute device (`cpu`, `cuda`, `cuda:N`).
    pub device: String,
    /// Jobs that may wait for the inference worker before submitters block.
    pub queue_capacity: usize,
    /// Period of the metrics log line; `None` disables it.
    pub metrics_interval: Option<Duration>,
    /// Settings handed to the request pipeline.
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    /// Builds a configuration from environment variables while falling back to
    /// the documented defaults.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`ServerConfig::from_env`] with a custom variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let bind_address = lookup("PHOTOMESH_BIND").unwrap_or_else(|| "0.0.0.0:8000".into());
        let device = lookup("PHOTOMESH_DEVICE").unwrap_or_else(|| DEFAULT_DEVICE.into());
        let model_id = lookup("PHOTOMESH_MODEL_ID").unwrap_or_else(|| DEFAULT_MODEL_ID.into());

        let chunk_size = parsed(&lookup, "PHOTOMESH_CHUNK_SIZE").unwrap_or(DEFAULT_CHUNK_SIZE);
        let max_image_bytes =
            parsed(&lookup, "PHOTOMESH_MAX_IMAGE_BYTES").unwrap_or(DEFAULT_MAX_IMAGE_BYTES);
        let default_mc_resolution =
            parsed(&lookup, "PHOTOMESH_DEFAULT_MC_RESOLUTION").unwrap_or(DEFAULT_MC_RESOLUTION);
        let preview_size = parsed(&lookup, "PHOTOMESH_PREVIEW_SIZE").unwrap_or(DEFAULT_PREVIEW_SIZE);
        let queue_capacity: usize = parsed(&lookup, "PHOTOMESH_QUEUE_CAPACITY").unwrap_or(16);
        let metrics_secs: u64 = parsed(&lookup, "PHOTOMESH_METRICS_INTERVAL_SECS").unwrap_or(30);
        let expose_error_details = lookup("PHOTOMESH_EXPOSE_ERRORS")
            .and_then(|v| parse_bool(&v))
            .unwrap_or(true);

        anyhow::ensure!(chunk_size >= 1, "chunk size must be >= 1");
        anyhow::ensure!(max_image_bytes >= 1, "max image bytes must be >= 1");
        anyhow::ensure!(queue_capacity >= 1, "queue capacity must be >= 1");
        anyhow::ensure!(preview_size >= 1, "preview size must be >= 1");

        let pipeline = PipelineConfig {
            model_id,
            chunk_size,
            max_image_bytes,
            default_mc_resolution,
            preview_size,
            expose_error_details,
        };
        pipeline.validate().map_err(anyhow::Error::msg)?;

        Ok(Self {
            bind_address,
            device,
            queue_capacity,
            metrics_interval: (metrics_secs > 0).then(|| Duration::from_secs(metrics_secs)),
            pipeline,
        })
    }

    /// Largest request body accepted by the HTTP layer.
    ///
    /// Sized so a payload just over the decoded-image limit still arrives
    /// intact and is refused by the pipeline's own size check.
    pub fn body_limit(&self) -> usize {
        body_limit_for(self.pipeline.max_image_bytes)
    }
}

pub fn body_limit_for(max_image_bytes: usize) -> usize {
    max_image_bytes.div_ceil(3) * 4 + BODY_OVERHEAD_BYTES
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|v| v.trim().parse().ok())
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
