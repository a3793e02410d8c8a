//! idverify-doc — Document identity extraction.
//!
//! Reads the text on an identity document (DB + CRNN via ONNX Runtime),
//! picks out the date of birth and holder name(s), and derives age and
//! the adult flag. Failures degrade to empty fields, never to errors.

pub mod age;
pub mod ctc;
pub mod db;
pub mod fields;
pub mod recognizer;

pub use age::AgeResult;
pub use fields::IdentityResult;
pub use recognizer::{Language, OnnxTextRecognizer, RecognizedLine, TextRecognizer};

use chrono::{Local, NaiveDate};
use idverify_core::{ImageLoader, ImageSource};
use serde::{Deserialize, Serialize};

/// Everything extracted from one document image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DocumentReport {
    pub date_of_birth: Option<String>,
    pub name_local: Option<String>,
    pub name_alt: Option<String>,
    /// Whole years, or 0 when no date of birth was found.
    pub age: u32,
    pub is_adult: bool,
}

impl DocumentReport {
    pub fn new(identity: IdentityResult, age: AgeResult) -> Self {
        Self {
            date_of_birth: identity.date_of_birth,
            name_local: identity.name_local,
            name_alt: identity.name_alt,
            age: age.age.unwrap_or(0),
            is_adult: age.is_adult,
        }
    }
}

/// Runs load → recognize → parse → age for one document image.
pub struct DocumentExtractor {
    loader: ImageLoader,
    recognizer: Box<dyn TextRecognizer>,
}

impl DocumentExtractor {
    pub fn new(loader: ImageLoader, recognizer: Box<dyn TextRecognizer>) -> Self {
        Self { loader, recognizer }
    }

    pub fn extract(&mut self, document: &ImageSource) -> DocumentReport {
        self.extract_on(document, Local::now().date_naive())
    }

    /// [`extract`](Self::extract) with an explicit evaluation date.
    pub fn extract_on(&mut self, document: &ImageSource, today: NaiveDate) -> DocumentReport {
        let lines = self.recognize(document);
        let identity = fields::extract_identity(&lines);
        let age = age::evaluate(identity.date_of_birth.as_deref(), today);
        DocumentReport::new(identity, age)
    }

    /// Recognized lines of the document; empty when it cannot be read.
    pub fn recognize(&mut self, document: &ImageSource) -> Vec<RecognizedLine> {
        let image = match self.loader.load(document) {
            Ok(image) => image,
            Err(e) => {
                tracing::warn!(source = %document.describe(), error = %e, "document not loaded; skipping OCR");
                return Vec::new();
            }
        };
        match self.recognizer.recognize(&image) {
            Ok(lines) => {
                tracing::debug!(lines = lines.len(), "document text recognized");
                lines
            }
            Err(e) => {
                tracing::warn!(error = %e, "text recognition failed");
                Vec::new()
            }
        }
    }
}
