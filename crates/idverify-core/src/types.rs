use serde::{Deserialize, Serialize};

/// Default cosine similarity threshold for the MobileNetV2/64 backbone.
pub const DEFAULT_THRESHOLD: f32 = 0.60;

/// Raw face candidate from a detector, in pixel coordinates of the detector input image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Integer face box inside one image. Always non-empty and within bounds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaceRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub confidence: f32,
}

impl FaceRegion {
    /// Snap a detector candidate to the pixel grid of an `image_w` × `image_h` image.
    ///
    /// Returns `None` when nothing of the box is left after clipping.
    pub fn from_bbox(bbox: &BoundingBox, image_w: u32, image_h: u32) -> Option<Self> {
        if !(bbox.x.is_finite() && bbox.y.is_finite() && bbox.width.is_finite() && bbox.height.is_finite()) {
            return None;
        }
        let x1 = bbox.x.max(0.0).floor() as i64;
        let y1 = bbox.y.max(0.0).floor() as i64;
        let x2 = ((bbox.x + bbox.width).ceil() as i64).min(image_w as i64);
        let y2 = ((bbox.y + bbox.height).ceil() as i64).min(image_h as i64);
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(Self {
            x: x1 as u32,
            y: y1 as u32,
            width: (x2 - x1) as u32,
            height: (y2 - y1) as u32,
            confidence: bbox.confidence,
        })
    }

    /// Grow the box by 10% of its shorter side on every edge, clamped to the image.
    pub fn padded(&self, image_w: u32, image_h: u32) -> Self {
        let padding = self.width.min(self.height) / 10;
        let x1 = self.x.saturating_sub(padding);
        let y1 = self.y.saturating_sub(padding);
        let x2 = (self.x + self.width + padding).min(image_w);
        let y2 = (self.y + self.height + padding).min(image_h);
        Self {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
            confidence: self.confidence,
        }
    }
}

/// Face embedding vector (64-dimensional for the default backbone).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Backbone configuration that produced this embedding (e.g., "mobilenetv2-128-d64").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Compute cosine similarity between two embeddings.
    ///
    /// Returns a value in [-1, 1]. Higher = more similar. Zero vectors score 0.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Whether two embeddings come from the same backbone configuration.
    pub fn is_comparable(&self, other: &Embedding) -> bool {
        self.values.len() == other.values.len() && self.model_version == other.model_version
    }
}

/// Outcome of scoring one embedding pair against a threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Score {
    /// Cosine similarity in [-1, 1].
    pub similarity: f32,
    /// `similarity * 100`, not clamped.
    pub confidence: f32,
    pub matched: bool,
    pub threshold: f32,
}

/// Strategy for scoring two face embeddings.
pub trait Matcher {
    fn score(&self, a: &Embedding, b: &Embedding, threshold: f32) -> Score;
}

/// Cosine similarity matcher.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn score(&self, a: &Embedding, b: &Embedding, threshold: f32) -> Score {
        let similarity = a.similarity(b);
        Score {
            similarity,
            confidence: similarity * 100.0,
            matched: similarity >= threshold,
            threshold,
        }
    }
}

/// Failure categories surfaced to callers of the verification engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ImageLoadFailed,
    NoFaceDetected,
    FeatureExtractionFailed,
    UnsupportedInputType,
    Timeout,
}

/// Which of the two verification inputs a result refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSide {
    Document,
    Selfie,
}

impl ImageSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImageSide::Document => "document",
            ImageSide::Selfie => "selfie",
        }
    }
}

impl std::fmt::Display for ImageSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchDetails {
    /// Backbone used to produce the embeddings.
    pub method: String,
}

/// Result of a document-vs-selfie face comparison.
///
/// Either a populated similarity/confidence pair with no error, or
/// `error_kind` set with `matched = false` and `confidence = 0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub matched: bool,
    /// Similarity × 100, rounded to 2 decimals.
    pub confidence: f32,
    /// Cosine similarity rounded to 4 decimals.
    pub similarity_score: f32,
    pub threshold: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Human-readable failure reason.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Input that failed, when `error_kind` is set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub side: Option<ImageSide>,
    pub details: MatchDetails,
}

impl MatchResult {
    pub fn from_score(score: Score, method: &str) -> Self {
        Self {
            matched: score.matched,
            confidence: round_to(score.confidence, 2),
            similarity_score: round_to(score.similarity, 4),
            threshold: score.threshold,
            error_kind: None,
            error: None,
            side: None,
            details: MatchDetails { method: method.to_string() },
        }
    }

    pub fn failure(
        kind: ErrorKind,
        side: Option<ImageSide>,
        reason: impl Into<String>,
        threshold: f32,
        method: &str,
    ) -> Self {
        Self {
            matched: false,
            confidence: 0.0,
            similarity_score: 0.0,
            threshold,
            error_kind: Some(kind),
            error: Some(reason.into()),
            side,
            details: MatchDetails { method: method.to_string() },
        }
    }
}

fn round_to(value: f32, decimals: i32) -> f32 {
    let factor = 10f32.powi(decimals);
    (value * factor).round() / factor
}
