//! Single-face localization on top of a [`FaceDetector`].

use crate::detector::{DetectorError, FaceDetector};
use crate::types::FaceRegion;
use image::imageops::{self, FilterType};
use image::RgbImage;
use thiserror::Error;

/// Images wider than this are downscaled before detection.
pub const DEFAULT_MAX_WIDTH: u32 = 800;

#[derive(Error, Debug)]
pub enum LocateError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
}

/// The best face of an image together with the image it refers to.
///
/// `image` is the (possibly downscaled) working copy the region was found in.
pub struct LocatedFace {
    pub image: RgbImage,
    pub region: FaceRegion,
}

pub struct FaceLocator {
    detector: Box<dyn FaceDetector>,
    max_width: u32,
}

impl FaceLocator {
    pub fn new(detector: Box<dyn FaceDetector>, max_width: u32) -> Self {
        Self { detector, max_width }
    }

    /// Find the highest-confidence face and pad it by 10% of its shorter side.
    pub fn locate(&mut self, image: &RgbImage) -> Result<LocatedFace, LocateError> {
        let working = downscale(image, self.max_width);
        let (w, h) = working.dimensions();

        let candidates = self.detector.detect(&working)?;
        let best = select_best(candidates.iter().filter_map(|b| FaceRegion::from_bbox(b, w, h)))
            .ok_or(LocateError::NoFaceDetected)?;

        let region = best.padded(w, h);
        tracing::debug!(
            candidates = candidates.len(),
            confidence = region.confidence,
            x = region.x,
            y = region.y,
            width = region.width,
            height = region.height,
            "face located"
        );

        Ok(LocatedFace { image: working, region })
    }
}

/// Highest confidence wins; the first one seen wins a tie.
fn select_best(regions: impl Iterator<Item = FaceRegion>) -> Option<FaceRegion> {
    regions.fold(None, |best: Option<FaceRegion>, r| match best {
        Some(b) if b.confidence >= r.confidence => Some(b),
        _ => Some(r),
    })
}

/// Resize to `max_width` keeping the aspect ratio; narrower images are copied unchanged.
fn downscale(image: &RgbImage, max_width: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    if max_width == 0 || w <= max_width {
        return image.clone();
    }
    let scale = max_width as f32 / w as f32;
    let new_h = ((h as f32 * scale) as u32).max(1);
    imageops::resize(image, max_width, new_h, FilterType::Triangle)
}
