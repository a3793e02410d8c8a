//! idverify-core — Face verification engine.
//!
//! Loads document and selfie images, finds the face on each with SCRFD,
//! embeds the crops with a frozen MobileNetV2 backbone, and compares the
//! embeddings by cosine similarity. Models run via ONNX Runtime.

pub mod crop;
pub mod detector;
pub mod embedder;
pub mod loader;
pub mod locator;
pub mod types;
pub mod verifier;

pub use crop::{FaceCrop, TensorLayout};
pub use detector::{FaceDetector, ScrfdDetector};
pub use embedder::{Backbone, OnnxBackbone};
pub use loader::{ImageLoader, ImageSource, LoadError};
pub use locator::FaceLocator;
pub use types::{
    BoundingBox, CosineMatcher, Embedding, ErrorKind, FaceRegion, ImageSide, MatchResult, Matcher,
    DEFAULT_THRESHOLD,
};
pub use verifier::FaceVerifier;
