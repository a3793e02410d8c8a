//! Face embedding extraction with a frozen feature backbone via ONNX Runtime.
//!
//! The default backbone is MobileNetV2 (ImageNet weights, 128×128 input)
//! followed by global average pooling and a 64-unit dense projection,
//! exported to ONNX. It runs in inference mode only, so the same crop
//! always yields the same embedding.

use crate::crop::{FaceCrop, TensorLayout};
use crate::types::Embedding;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use thiserror::Error;

pub const DEFAULT_INPUT_SIZE: u32 = 128;
pub const DEFAULT_EMBEDDING_DIM: usize = 64;
pub const BACKBONE_METHOD: &str = "MobileNetV2";

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Maps a face crop to a fixed-length embedding.
///
/// Embeddings are only comparable between backbones that report the same
/// [`Backbone::model_version`].
pub trait Backbone: Send {
    /// Side length of the square crop this backbone consumes.
    fn input_size(&self) -> u32;
    /// Method name reported in match details.
    fn name(&self) -> &str;
    fn model_version(&self) -> &str;
    fn embed(&mut self, crop: &FaceCrop) -> Result<Embedding, ExtractError>;
}

pub struct OnnxBackbone {
    session: Session,
    input_size: u32,
    embedding_dim: usize,
    layout: TensorLayout,
    model_version: String,
}

impl OnnxBackbone {
    /// Load the backbone ONNX model from the given path.
    pub fn load(
        model_path: &str,
        input_size: u32,
        embedding_dim: usize,
        layout: TensorLayout,
    ) -> Result<Self, ExtractError> {
        if !Path::new(model_path).exists() {
            return Err(ExtractError::ModelNotFound(model_path.to_string()));
        }

        let session = Session::builder()?
            .with_intra_threads(2)?
            .commit_from_file(model_path)?;

        tracing::info!(
            path = model_path,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            input_size,
            embedding_dim,
            "loaded embedding backbone"
        );

        Ok(Self {
            session,
            input_size,
            embedding_dim,
            layout,
            model_version: format!("mobilenetv2-{input_size}-d{embedding_dim}"),
        })
    }
}

impl Backbone for OnnxBackbone {
    fn input_size(&self) -> u32 {
        self.input_size
    }

    fn name(&self) -> &str {
        BACKBONE_METHOD
    }

    fn model_version(&self) -> &str {
        &self.model_version
    }

    fn embed(&mut self, crop: &FaceCrop) -> Result<Embedding, ExtractError> {
        if crop.size() != self.input_size {
            return Err(ExtractError::InferenceFailed(format!(
                "crop is {0}x{0}, backbone expects {1}x{1}",
                crop.size(),
                self.input_size
            )));
        }

        let input = crop.to_tensor(self.layout);
        let outputs = self.session.run(ort::inputs![TensorRef::from_array_view(input.view())?])?;

        let (_, raw_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ExtractError::InferenceFailed(format!("embedding extraction: {e}")))?;

        let values = flatten_checked(raw_data, self.embedding_dim)?;

        Ok(Embedding {
            values,
            model_version: Some(self.model_version.clone()),
        })
    }
}

/// Flatten the backbone output and check its length.
fn flatten_checked(raw: &[f32], expected_dim: usize) -> Result<Vec<f32>, ExtractError> {
    if raw.len() != expected_dim {
        return Err(ExtractError::InferenceFailed(format!(
            "expected {expected_dim}-dim embedding, got {}",
            raw.len()
        )));
    }
    if raw.iter().any(|v| !v.is_finite()) {
        return Err(ExtractError::InferenceFailed("embedding contains non-finite values".into()));
    }
    Ok(raw.to_vec())
}
