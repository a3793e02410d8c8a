//! Image loading from paths, URLs and in-memory buffers.
//!
//! Every source is normalized into an 8-bit RGB [`RgbImage`]. Failures are
//! returned as [`LoadError`]; a partially decoded image is never handed out.

use image::{DynamicImage, RgbImage};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("could not load image: {0}")]
    ImageLoadFailed(String),
    #[error("unsupported input type: {0}")]
    UnsupportedInputType(String),
}

/// Where an input image comes from.
#[derive(Debug, Clone)]
pub enum ImageSource {
    /// Local file path.
    Path(PathBuf),
    /// Remote `http(s)` URL, fetched synchronously.
    Url(String),
    /// Encoded image bytes (e.g., an uploaded file).
    Bytes(Vec<u8>),
    /// Already decoded pixels.
    Buffer(RgbImage),
}

impl ImageSource {
    /// Classify a command-line style reference as a URL or a local path.
    pub fn parse(reference: &str) -> Result<Self, LoadError> {
        let trimmed = reference.trim();
        if trimmed.is_empty() {
            return Err(LoadError::UnsupportedInputType("empty image reference".into()));
        }
        match trimmed.split_once("://") {
            Some((scheme, _)) if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") => {
                Ok(ImageSource::Url(trimmed.to_string()))
            }
            Some((scheme, _)) if is_scheme(scheme) => Err(LoadError::UnsupportedInputType(format!(
                "scheme '{scheme}' is not supported; use a file path or an http(s) URL"
            ))),
            _ => Ok(ImageSource::Path(PathBuf::from(trimmed))),
        }
    }

    /// Short description for logs (never the pixel payload).
    pub fn describe(&self) -> String {
        match self {
            ImageSource::Path(p) => p.display().to_string(),
            ImageSource::Url(u) => u.clone(),
            ImageSource::Bytes(b) => format!("<{} bytes>", b.len()),
            ImageSource::Buffer(img) => format!("<{}x{} buffer>", img.width(), img.height()),
        }
    }
}

fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

/// Decodes [`ImageSource`]s into RGB images.
pub struct ImageLoader {
    fetch_timeout: Duration,
}

impl Default for ImageLoader {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl ImageLoader {
    pub fn new(fetch_timeout: Duration) -> Self {
        Self { fetch_timeout }
    }

    pub fn load(&self, source: &ImageSource) -> Result<RgbImage, LoadError> {
        let image = match source {
            ImageSource::Path(path) => {
                let decoded = image::ImageReader::open(path)
                    .map_err(|e| LoadError::ImageLoadFailed(format!("{}: {e}", path.display())))?
                    .with_guessed_format()
                    .map_err(|e| LoadError::ImageLoadFailed(format!("{}: {e}", path.display())))?
                    .decode()
                    .map_err(|e| LoadError::ImageLoadFailed(format!("{}: {e}", path.display())))?;
                decoded.into_rgb8()
            }
            ImageSource::Url(url) => {
                let bytes = self.fetch(url)?;
                decode_bytes(&bytes).map_err(|e| LoadError::ImageLoadFailed(format!("{url}: {e}")))?
            }
            ImageSource::Bytes(bytes) => {
                decode_bytes(bytes).map_err(|e| LoadError::ImageLoadFailed(e.to_string()))?
            }
            ImageSource::Buffer(buffer) => buffer.clone(),
        };

        if image.width() == 0 || image.height() == 0 {
            return Err(LoadError::ImageLoadFailed(format!(
                "{} decoded to an empty image",
                source.describe()
            )));
        }

        tracing::debug!(
            source = %source.describe(),
            width = image.width(),
            height = image.height(),
            "image loaded"
        );
        Ok(image)
    }

    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.fetch_timeout)
            .build()
            .map_err(|e| LoadError::ImageLoadFailed(format!("http client: {e}")))?;

        let response = client
            .get(url)
            .send()
            .map_err(|e| LoadError::ImageLoadFailed(format!("{url}: {e}")))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(LoadError::ImageLoadFailed(format!("{url}: HTTP {status}")));
        }

        let body = response
            .bytes()
            .map_err(|e| LoadError::ImageLoadFailed(format!("{url}: {e}")))?;
        Ok(body.to_vec())
    }
}

fn decode_bytes(bytes: &[u8]) -> Result<RgbImage, image::ImageError> {
    let decoded: DynamicImage = image::load_from_memory(bytes)?;
    Ok(decoded.into_rgb8())
}
