use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Tunables for the detection pipeline and its model provisioning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum score (exclusive) for a vehicle candidate
    #[serde(default = "default_threshold")]
    pub vehicle_threshold: f32,

    /// Minimum score (exclusive) for a plate candidate
    #[serde(default = "default_threshold")]
    pub plate_threshold: f32,

    /// Fraction of a plate's area that must fall inside a vehicle box
    #[serde(default = "default_overlap_ratio")]
    pub overlap_ratio: f32,

    /// Root folder for downloaded model artifacts
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    /// Base URL artifacts are fetched from, as `<base>/<model>/<model>.onnx`
    #[serde(default = "default_model_base_url")]
    pub model_base_url: String,

    /// Expected SHA-256 per model name
    #[serde(default)]
    pub model_checksums: HashMap<String, String>,

    /// Never touch the network; artifacts must already be on disk
    #[serde(default)]
    pub offline: bool,

    /// Preferred execution provider: "TensorRT", "CUDA" or "CPU"
    #[serde(default = "default_execution_provider")]
    pub execution_provider: String,

    #[serde(default)]
    pub device_id: i32,

    #[serde(default = "default_intra_threads")]
    pub intra_threads: usize,

    #[serde(default = "default_inter_threads")]
    pub inter_threads: usize,

    /// Extra attempts after a failed download
    #[serde(default = "default_download_retries")]
    pub download_retries: u32,
}

fn default_threshold() -> f32 {
    0.5
}

fn default_overlap_ratio() -> f32 {
    0.8
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_model_base_url() -> String {
    "https://github.com/emgucv/models/raw/master".to_string()
}

fn default_execution_provider() -> String {
    "CUDA".to_string()
}

fn default_intra_threads() -> usize {
    4
}

fn default_inter_threads() -> usize {
    1
}

fn default_download_retries() -> u32 {
    2
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            vehicle_threshold: default_threshold(),
            plate_threshold: default_threshold(),
            overlap_ratio: default_overlap_ratio(),
            model_dir: default_model_dir(),
            model_base_url: default_model_base_url(),
            model_checksums: HashMap::new(),
            offline: false,
            execution_provider: default_execution_provider(),
            device_id: 0,
            intra_threads: default_intra_threads(),
            inter_threads: default_inter_threads(),
            download_retries: default_download_retries(),
        }
    }
}

impl PipelineConfig {
    /// Defaults overlaid with `LPR_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(value) = parse_var(&lookup, "LPR_VEHICLE_THRESHOLD")? {
            config.vehicle_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, "LPR_PLATE_THRESHOLD")? {
            config.plate_threshold = value;
        }
        if let Some(value) = parse_var(&lookup, "LPR_OVERLAP_RATIO")? {
            config.overlap_ratio = value;
        }
        if let Some(dir) = lookup("LPR_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Some(url) = lookup("LPR_MODEL_BASE_URL") {
            config.model_base_url = url;
        }
        if let Some(value) = parse_var(&lookup, "LPR_OFFLINE")? {
            config.offline = value;
        }
        if let Some(provider) = lookup("LPR_EXECUTION_PROVIDER") {
            config.execution_provider = provider;
        }
        if let Some(value) = parse_var(&lookup, "LPR_DEVICE_ID")? {
            config.device_id = value;
        }
        if let Some(value) = parse_var(&lookup, "LPR_INTRA_THREADS")? {
            config.intra_threads = value;
        }
        if let Some(value) = parse_var(&lookup, "LPR_INTER_THREADS")? {
            config.inter_threads = value;
        }
        if let Some(value) = parse_var(&lookup, "LPR_DOWNLOAD_RETRIES")? {
            config.download_retries = value;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("vehicle_threshold", self.vehicle_threshold),
            ("plate_threshold", self.plate_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                anyhow::bail!("{} must be within [0, 1], got {}", name, value);
            }
        }
        if !(self.overlap_ratio > 0.0 && self.overlap_ratio <= 1.0) {
            anyhow::bail!(
                "overlap_ratio must be within (0, 1], got {}",
                self.overlap_ratio
            );
        }
        Ok(())
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .with_context(|| format!("Invalid {}: {}", key, raw))
        })
        .transpose()
}

/// Settings for the command-line binary.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub pipeline: PipelineConfig,

    /// Image to analyse
    pub input: PathBuf,

    /// Where the annotated copy is written
    pub output: PathBuf,

    /// TrueType font for labels; the system font is tried when unset
    pub font_path: Option<PathBuf>,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let pipeline = PipelineConfig::from_lookup(&lookup)?;
        let input = lookup("LPR_INPUT")
            .map(PathBuf::from)
            .context("LPR_INPUT must point at an image to analyse")?;
        let output = lookup("LPR_OUTPUT")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("annotated.png"));
        let font_path = lookup("LPR_FONT").map(PathBuf::from);

        Ok(Self {
            pipeline,
            input,
            output,
            font_path,
        })
    }
}
