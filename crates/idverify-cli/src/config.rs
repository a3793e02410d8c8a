use anyhow::{bail, Context, Result};
use idverify_core::TensorLayout;
use idverify_doc::Language;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

/// Runtime configuration: optional TOML file, then `IDVERIFY_*` environment overrides.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory containing ONNX model files and OCR dictionaries.
    pub model_dir: PathBuf,
    /// SCRFD face detection model file name.
    pub detector_model: String,
    /// Embedding backbone model file name.
    pub backbone_model: String,
    /// Square input side of the backbone.
    pub backbone_input_size: u32,
    /// Output dimension of the backbone.
    pub embedding_dim: usize,
    /// Backbone input layout: "nhwc" or "nchw".
    pub backbone_layout: String,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Minimum detector score for a face candidate.
    pub detector_confidence: f32,
    /// Images wider than this are downscaled before face detection.
    pub max_image_width: u32,
    /// DB text detection model file name.
    pub text_detector_model: String,
    /// Comma-separated OCR language codes.
    pub languages: String,
    /// Timeout in seconds for fetching a remote image.
    pub fetch_timeout_secs: u64,
    /// Timeout in seconds for one pipeline run.
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("models"),
            detector_model: "det_500m.onnx".to_string(),
            backbone_model: "mobilenetv2_face64.onnx".to_string(),
            backbone_input_size: 128,
            embedding_dim: 64,
            backbone_layout: "nhwc".to_string(),
            similarity_threshold: 0.60,
            detector_confidence: 0.5,
            max_image_width: 800,
            text_detector_model: "text_det.onnx".to_string(),
            languages: "en,hi".to_string(),
            fetch_timeout_secs: 10,
            request_timeout_secs: 30,
        }
    }
}

impl Config {
    /// Load from `path` (or defaults), apply environment overrides and validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?
            }
            None => Config::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `IDVERIFY_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup("IDVERIFY_MODEL_DIR") {
            self.model_dir = PathBuf::from(v);
        }
        override_string(&lookup, "IDVERIFY_DETECTOR_MODEL", &mut self.detector_model);
        override_string(&lookup, "IDVERIFY_BACKBONE_MODEL", &mut self.backbone_model);
        override_string(&lookup, "IDVERIFY_BACKBONE_LAYOUT", &mut self.backbone_layout);
        override_string(&lookup, "IDVERIFY_TEXT_DETECTOR_MODEL", &mut self.text_detector_model);
        override_string(&lookup, "IDVERIFY_LANGUAGES", &mut self.languages);
        override_parsed(&lookup, "IDVERIFY_BACKBONE_INPUT_SIZE", &mut self.backbone_input_size)?;
        override_parsed(&lookup, "IDVERIFY_EMBEDDING_DIM", &mut self.embedding_dim)?;
        override_parsed(&lookup, "IDVERIFY_SIMILARITY_THRESHOLD", &mut self.similarity_threshold)?;
        override_parsed(&lookup, "IDVERIFY_DETECTOR_CONFIDENCE", &mut self.detector_confidence)?;
        override_parsed(&lookup, "IDVERIFY_MAX_IMAGE_WIDTH", &mut self.max_image_width)?;
        override_parsed(&lookup, "IDVERIFY_FETCH_TIMEOUT_SECS", &mut self.fetch_timeout_secs)?;
        override_parsed(&lookup, "IDVERIFY_REQUEST_TIMEOUT_SECS", &mut self.request_timeout_secs)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            bail!("similarity_threshold must be within [-1, 1], got {}", self.similarity_threshold);
        }
        if self.backbone_input_size == 0 || self.embedding_dim == 0 {
            bail!("backbone_input_size and embedding_dim must be positive");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be positive");
        }
        self.layout()?;
        if self.languages()?.is_empty() {
            bail!("at least one OCR language is required");
        }
        Ok(())
    }

    pub fn layout(&self) -> Result<TensorLayout> {
        TensorLayout::from_str(&self.backbone_layout).map_err(anyhow::Error::msg)
    }

    pub fn languages(&self) -> Result<Vec<Language>> {
        Ok(Language::parse_list(&self.languages)?)
    }

    pub fn detector_model_path(&self) -> String {
        self.model_dir.join(&self.detector_model).to_string_lossy().into_owned()
    }

    pub fn backbone_model_path(&self) -> String {
        self.model_dir.join(&self.backbone_model).to_string_lossy().into_owned()
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

fn override_string(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut String) {
    if let Some(v) = lookup(key) {
        *target = v;
    }
}

fn override_parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, target: &mut T) -> Result<()>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(v) = lookup(key) {
        *target = v
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{key}={v}: {e}"))?;
    }
    Ok(())
}
