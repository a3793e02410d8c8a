use idverify_core::detector::DetectorError;
use idverify_core::embedder::ExtractError;
use idverify_core::{
    Backbone, BoundingBox, Embedding, ErrorKind, FaceCrop, FaceDetector, FaceLocator, FaceVerifier,
    ImageLoader, ImageSide, ImageSource,
};
use image::{Rgb, RgbImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Finds one centered face unless the image is pure black.
struct MarkerDetector {
    calls: Arc<AtomicUsize>,
}

impl FaceDetector for MarkerDetector {
    fn detect(&mut self, image: &RgbImage) -> Result<Vec<BoundingBox>, DetectorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if image.get_pixel(0, 0) == &Rgb([0, 0, 0]) {
            return Ok(vec![]);
        }
        let (w, h) = image.dimensions();
        Ok(vec![BoundingBox {
            x: w as f32 / 4.0,
            y: h as f32 / 4.0,
            width: w as f32 / 2.0,
            height: h as f32 / 2.0,
            confidence: 0.9,
        }])
    }
}

/// Embeds a crop as its mean RGB colour.
struct MeanColorBackbone {
    calls: Arc<AtomicUsize>,
    /// Dimension override per call, to simulate mismatched configurations.
    dims: Vec<usize>,
}

impl Backbone for MeanColorBackbone {
    fn input_size(&self) -> u32 {
        16
    }

    fn name(&self) -> &str {
        "mean-color"
    }

    fn model_version(&self) -> &str {
        "mean-color-v1"
    }

    fn embed(&mut self, crop: &FaceCrop) -> Result<Embedding, ExtractError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let mut sum = [0.0f32; 3];
        for y in 0..crop.size() {
            for x in 0..crop.size() {
                let p = crop.pixel(x, y);
                for c in 0..3 {
                    sum[c] += p[c];
                }
            }
        }
        let n = (crop.size() * crop.size()) as f32;
        let mut values: Vec<f32> = sum.iter().map(|s| s / n).collect();
        if let Some(&dim) = self.dims.get(call) {
            values.resize(dim, 0.0);
        }
        Ok(Embedding {
            values,
            model_version: Some(self.model_version().to_string()),
        })
    }
}

struct Harness {
    verifier: FaceVerifier,
    detector_calls: Arc<AtomicUsize>,
    backbone_calls: Arc<AtomicUsize>,
}

fn harness_with_dims(dims: Vec<usize>) -> Harness {
    let detector_calls = Arc::new(AtomicUsize::new(0));
    let backbone_calls = Arc::new(AtomicUsize::new(0));
    let locator = FaceLocator::new(
        Box::new(MarkerDetector { calls: detector_calls.clone() }),
        800,
    );
    let backbone = MeanColorBackbone { calls: backbone_calls.clone(), dims };
    Harness {
        verifier: FaceVerifier::new(ImageLoader::default(), locator, Box::new(backbone), 0.6),
        detector_calls,
        backbone_calls,
    }
}

fn harness() -> Harness {
    harness_with_dims(Vec::new())
}

fn solid(color: [u8; 3]) -> ImageSource {
    ImageSource::Buffer(RgbImage::from_pixel(64, 48, Rgb(color)))
}

#[test]
fn test_same_face_matches() {
    let mut h = harness();
    let result = h.verifier.verify(&solid([200, 120, 90]), &solid([200, 120, 90]), None);
    assert!(result.error_kind.is_none());
    assert!(result.matched);
    assert!((result.similarity_score - 1.0).abs() < 1e-4);
    assert!((result.confidence - 100.0).abs() < 1e-2);
    assert_eq!(result.threshold, 0.6);
    assert_eq!(result.details.method, "mean-color");
}

#[test]
fn test_different_faces_do_not_match() {
    let mut h = harness();
    let result = h.verifier.verify(&solid([255, 0, 0]), &solid([0, 0, 255]), None);
    assert!(result.error_kind.is_none());
    assert!(!result.matched);
    assert!(result.similarity_score.abs() < 1e-4);
}

#[test]
fn test_threshold_override_is_applied() {
    let mut h = harness();
    // cos([1,1,0],[1,0,0]) ≈ 0.7071
    let doc = solid([255, 255, 0]);
    let selfie = solid([255, 0, 0]);
    let strict = h.verifier.verify(&doc, &selfie, Some(0.9));
    assert!(!strict.matched);
    assert_eq!(strict.threshold, 0.9);
    let lenient = h.verifier.verify(&doc, &selfie, Some(0.65));
    assert!(lenient.matched);
    assert_eq!(strict.similarity_score, lenient.similarity_score);
}

#[test]
fn test_document_without_face_short_circuits() {
    let mut h = harness();
    let result = h.verifier.verify(&solid([0, 0, 0]), &solid([10, 200, 30]), None);
    assert_eq!(result.error_kind, Some(ErrorKind::NoFaceDetected));
    assert_eq!(result.side, Some(ImageSide::Document));
    assert!(!result.matched);
    assert_eq!(result.confidence, 0.0);
    assert_eq!(result.error.as_deref(), Some("Face missing in document image"));
    // selfie never reached the detector, nothing reached the backbone
    assert_eq!(h.detector_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.backbone_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_selfie_without_face_reports_selfie() {
    let mut h = harness();
    let result = h.verifier.verify(&solid([10, 200, 30]), &solid([0, 0, 0]), None);
    assert_eq!(result.error_kind, Some(ErrorKind::NoFaceDetected));
    assert_eq!(result.side, Some(ImageSide::Selfie));
    assert_eq!(result.confidence, 0.0);
    assert_eq!(h.backbone_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unreadable_document_is_load_failure() {
    let mut h = harness();
    let dir = tempfile::tempdir().unwrap();
    let missing = ImageSource::Path(dir.path().join("missing.png"));
    let result = h.verifier.verify(&missing, &solid([1, 2, 3]), None);
    assert_eq!(result.error_kind, Some(ErrorKind::ImageLoadFailed));
    assert_eq!(result.side, Some(ImageSide::Document));
    assert_eq!(h.detector_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_undecodable_selfie_bytes_is_load_failure() {
    let mut h = harness();
    let result = h.verifier.verify(&solid([1, 2, 3]), &ImageSource::Bytes(b"\x00\x01junk".to_vec()), None);
    assert_eq!(result.error_kind, Some(ErrorKind::ImageLoadFailed));
    assert_eq!(result.side, Some(ImageSide::Selfie));
}

#[test]
fn test_mismatched_embeddings_are_extraction_failure() {
    let mut h = harness_with_dims(vec![3, 5]);
    let result = h.verifier.verify(&solid([9, 9, 9]), &solid([9, 9, 9]), None);
    assert_eq!(result.error_kind, Some(ErrorKind::FeatureExtractionFailed));
    assert!(!result.matched);
}

#[test]
fn test_repeated_runs_are_identical() {
    let mut h = harness();
    let doc = solid([120, 80, 40]);
    let selfie = solid([110, 90, 60]);
    let first = h.verifier.verify(&doc, &selfie, None);
    let second = h.verifier.verify(&doc, &selfie, None);
    assert_eq!(first, second);
}

#[test]
fn test_embedding_is_deterministic() {
    let mut h = harness();
    let source = solid([33, 66, 99]);
    let a = h.verifier.embed_source(&source).unwrap();
    let b = h.verifier.embed_source(&source).unwrap();
    assert_eq!(a.values, b.values);
}
