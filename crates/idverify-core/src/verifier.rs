//! Document-vs-selfie face verification.

use crate::crop::FaceCrop;
use crate::embedder::{Backbone, ExtractError};
use crate::loader::{ImageLoader, ImageSource, LoadError};
use crate::locator::{FaceLocator, LocateError};
use crate::types::{CosineMatcher, Embedding, ErrorKind, ImageSide, MatchResult, Matcher};
use thiserror::Error;

/// Why one side of a verification could not produce an embedding.
#[derive(Error, Debug)]
pub enum SideError {
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error(transparent)]
    Locate(#[from] LocateError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
}

impl SideError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SideError::Load(LoadError::ImageLoadFailed(_)) => ErrorKind::ImageLoadFailed,
            SideError::Load(LoadError::UnsupportedInputType(_)) => ErrorKind::UnsupportedInputType,
            SideError::Locate(LocateError::NoFaceDetected) => ErrorKind::NoFaceDetected,
            SideError::Locate(LocateError::Detector(_)) | SideError::Extract(_) => {
                ErrorKind::FeatureExtractionFailed
            }
        }
    }

    /// User-facing reason for this failure on `side`.
    pub fn reason(&self, side: ImageSide) -> String {
        match self.kind() {
            ErrorKind::NoFaceDetected => format!("Face missing in {side} image"),
            _ => format!("{side} image: {self}"),
        }
    }
}

/// Runs load → locate → crop → embed for both images and scores the pair.
///
/// Holds the detector and backbone for its whole lifetime; nothing else
/// carries over between calls.
pub struct FaceVerifier {
    loader: ImageLoader,
    locator: FaceLocator,
    backbone: Box<dyn Backbone>,
    default_threshold: f32,
}

impl FaceVerifier {
    pub fn new(
        loader: ImageLoader,
        locator: FaceLocator,
        backbone: Box<dyn Backbone>,
        default_threshold: f32,
    ) -> Self {
        tracing::info!(
            backbone = backbone.name(),
            version = backbone.model_version(),
            default_threshold,
            "face verifier ready"
        );
        Self {
            loader,
            locator,
            backbone,
            default_threshold,
        }
    }

    pub fn default_threshold(&self) -> f32 {
        self.default_threshold
    }

    pub fn method(&self) -> &str {
        self.backbone.name()
    }

    /// Compare the face on `document` with the face on `selfie`.
    ///
    /// The document is processed first; if it fails the selfie is not touched.
    pub fn verify(
        &mut self,
        document: &ImageSource,
        selfie: &ImageSource,
        threshold: Option<f32>,
    ) -> MatchResult {
        let threshold = threshold.unwrap_or(self.default_threshold);

        let doc_embedding = match self.embed_source(document) {
            Ok(e) => e,
            Err(err) => return self.side_failure(ImageSide::Document, &err, threshold),
        };
        let selfie_embedding = match self.embed_source(selfie) {
            Ok(e) => e,
            Err(err) => return self.side_failure(ImageSide::Selfie, &err, threshold),
        };

        self.compare(&doc_embedding, &selfie_embedding, threshold)
    }

    /// Load an image, locate its face and extract the embedding.
    pub fn embed_source(&mut self, source: &ImageSource) -> Result<Embedding, SideError> {
        let image = self.loader.load(source)?;
        let face = self.locator.locate(&image)?;
        let crop = FaceCrop::extract(&face.image, &face.region, self.backbone.input_size());
        Ok(self.backbone.embed(&crop)?)
    }

    fn compare(&self, doc: &Embedding, selfie: &Embedding, threshold: f32) -> MatchResult {
        if !doc.is_comparable(selfie) {
            tracing::error!(
                doc_dim = doc.values.len(),
                selfie_dim = selfie.values.len(),
                doc_version = ?doc.model_version,
                selfie_version = ?selfie.model_version,
                expected_version = self.backbone.model_version(),
                "embeddings from different backbone configurations"
            );
            return MatchResult::failure(
                ErrorKind::FeatureExtractionFailed,
                None,
                "embeddings are not comparable",
                threshold,
                self.method(),
            );
        }

        let score = CosineMatcher.score(doc, selfie, threshold);
        tracing::info!(
            similarity = score.similarity,
            threshold,
            matched = score.matched,
            "face comparison"
        );
        MatchResult::from_score(score, self.method())
    }

    fn side_failure(&self, side: ImageSide, err: &SideError, threshold: f32) -> MatchResult {
        let kind = err.kind();
        match kind {
            ErrorKind::NoFaceDetected => tracing::info!(%side, "no face detected"),
            _ => tracing::warn!(%side, error = %err, ?kind, "face pipeline failed"),
        }
        MatchResult::failure(kind, Some(side), err.reason(side), threshold, self.method())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::DetectorError;

    #[test]
    fn test_kinds_map_from_stage_errors() {
        let load: SideError = LoadError::ImageLoadFailed("x".into()).into();
        assert_eq!(load.kind(), ErrorKind::ImageLoadFailed);
        let unsupported: SideError = LoadError::UnsupportedInputType("x".into()).into();
        assert_eq!(unsupported.kind(), ErrorKind::UnsupportedInputType);
        let none: SideError = LocateError::NoFaceDetected.into();
        assert_eq!(none.kind(), ErrorKind::NoFaceDetected);
        let det: SideError = LocateError::Detector(DetectorError::InferenceFailed("bad".into())).into();
        assert_eq!(det.kind(), ErrorKind::FeatureExtractionFailed);
        let ext: SideError = ExtractError::InferenceFailed("shape".into()).into();
        assert_eq!(ext.kind(), ErrorKind::FeatureExtractionFailed);
    }

    #[test]
    fn test_no_face_reason_names_side() {
        let err: SideError = LocateError::NoFaceDetected.into();
        assert_eq!(err.reason(ImageSide::Document), "Face missing in document image");
        assert_eq!(err.reason(ImageSide::Selfie), "Face missing in selfie image");
    }
}
