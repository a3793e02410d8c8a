//! Multi-language text recognition via ONNX Runtime.
//!
//! A DB detector finds text lines; every line is then read by one CRNN
//! recognizer per configured language and the most confident reading wins.

use crate::ctc::{self, CharDictionary};
use crate::db::{self, DbParams, TextBox};
use image::imageops::{self, FilterType};
use image::RgbImage;
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;
use std::path::{Path, PathBuf};
use thiserror::Error;

const REC_HEIGHT: u32 = 48;
const REC_MIN_WIDTH: u32 = 16;
const REC_MAX_WIDTH: u32 = 320;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("model file not found: {0}")]
    ModelNotFound(String),
    #[error("failed to read dictionary {path}: {source}")]
    Dictionary {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unsupported language code '{0}'")]
    UnsupportedLanguage(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Recognition languages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Language {
    En,
    Hi,
}

impl Language {
    pub fn code(&self) -> &'static str {
        match self {
            Language::En => "en",
            Language::Hi => "hi",
        }
    }

    /// Parse a comma-separated list such as `"en,hi"`.
    pub fn parse_list(codes: &str) -> Result<Vec<Language>, OcrError> {
        let mut langs = Vec::new();
        for code in codes.split(',').map(str::trim).filter(|c| !c.is_empty()) {
            let lang: Language = code.parse()?;
            if !langs.contains(&lang) {
                langs.push(lang);
            }
        }
        Ok(langs)
    }
}

impl std::str::FromStr for Language {
    type Err = OcrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Language::En),
            "hi" => Ok(Language::Hi),
            other => Err(OcrError::UnsupportedLanguage(other.to_string())),
        }
    }
}

/// One line of recognized text, in recognizer reading order.
#[derive(Debug, Clone, PartialEq)]
pub struct RecognizedLine {
    pub text: String,
    pub confidence: f32,
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), confidence: 1.0 }
    }
}

/// Text recognition backend.
///
/// Output order is approximately as printed; no text yields an empty vector.
pub trait TextRecognizer: Send {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedLine>, OcrError>;
}

struct LanguageModel {
    language: Language,
    session: Session,
    dictionary: CharDictionary,
}

pub struct OnnxTextRecognizer {
    detector: Session,
    params: DbParams,
    recognizers: Vec<LanguageModel>,
}

impl OnnxTextRecognizer {
    /// Load the detector and one `<code>_rec.onnx` / `<code>_dict.txt` pair per language.
    pub fn load(model_dir: &Path, detector_file: &str, languages: &[Language]) -> Result<Self, OcrError> {
        let detector = load_session(&model_dir.join(detector_file))?;

        let mut recognizers = Vec::with_capacity(languages.len());
        for &language in languages {
            let session = load_session(&model_dir.join(format!("{}_rec.onnx", language.code())))?;
            let dict_path = model_dir.join(format!("{}_dict.txt", language.code()));
            let dictionary = CharDictionary::load(&dict_path)
                .map_err(|source| OcrError::Dictionary { path: dict_path.clone(), source })?;
            tracing::info!(
                language = language.code(),
                classes = dictionary.num_classes(),
                "loaded text recognition model"
            );
            recognizers.push(LanguageModel { language, session, dictionary });
        }

        Ok(Self {
            detector,
            params: DbParams::default(),
            recognizers,
        })
    }

    fn detect_lines(&mut self, image: &RgbImage) -> Result<Vec<TextBox>, OcrError> {
        let input = db::preprocess(image);
        let outputs = self
            .detector
            .run(ort::inputs![TensorRef::from_array_view(input.tensor.view())?])?;
        let (_, prob) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| OcrError::InferenceFailed(format!("text detection map: {e}")))?;

        Ok(db::boxes_from_map(
            prob,
            input.map_width,
            input.map_height,
            image.width(),
            image.height(),
            &self.params,
        ))
    }

    fn read_line(&mut self, image: &RgbImage, text_box: &TextBox) -> Result<Option<RecognizedLine>, OcrError> {
        let tensor = line_tensor(image, text_box);
        let mut best: Option<(Language, ctc::Decoded)> = None;

        for model in &mut self.recognizers {
            let outputs = model
                .session
                .run(ort::inputs![TensorRef::from_array_view(tensor.view())?])?;
            let (shape, probs) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(|e| OcrError::InferenceFailed(format!("recognition output: {e}")))?;

            let classes = shape.last().copied().unwrap_or(0) as usize;
            if classes != model.dictionary.num_classes() {
                return Err(OcrError::InferenceFailed(format!(
                    "{} model has {classes} classes, dictionary has {}",
                    model.language.code(),
                    model.dictionary.num_classes()
                )));
            }

            let decoded = ctc::greedy_decode(probs, classes, &model.dictionary);
            let better = match &best {
                None => true,
                Some((_, prev)) => decoded.confidence > prev.confidence,
            };
            if !decoded.text.is_empty() && better {
                best = Some((model.language, decoded));
            }
        }

        Ok(best.map(|(language, decoded)| {
            tracing::trace!(language = language.code(), text = %decoded.text, "line read");
            RecognizedLine {
                text: decoded.text,
                confidence: decoded.confidence,
            }
        }))
    }
}

impl TextRecognizer for OnnxTextRecognizer {
    fn recognize(&mut self, image: &RgbImage) -> Result<Vec<RecognizedLine>, OcrError> {
        let boxes = self.detect_lines(image)?;
        let mut lines = Vec::with_capacity(boxes.len());
        for text_box in &boxes {
            if let Some(line) = self.read_line(image, text_box)? {
                lines.push(line);
            }
        }
        tracing::debug!(boxes = boxes.len(), lines = lines.len(), "text recognition done");
        Ok(lines)
    }
}

fn load_session(path: &Path) -> Result<Session, OcrError> {
    if !path.exists() {
        return Err(OcrError::ModelNotFound(path.display().to_string()));
    }
    let session = Session::builder()?
        .with_intra_threads(2)?
        .commit_from_file(path)?;
    tracing::info!(
        path = %path.display(),
        inputs = ?session.inputs().iter().map(|i| i.name()).collect::<Vec<_>>(),
        outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
        "loaded OCR model"
    );
    Ok(session)
}

/// Crop a text line and build the CRNN input: height 48, aspect kept,
/// BGR, normalized to [-1, 1], right-padded with zeros to a width of 320.
fn line_tensor(image: &RgbImage, text_box: &TextBox) -> Array4<f32> {
    let crop = imageops::crop_imm(image, text_box.x, text_box.y, text_box.width, text_box.height).to_image();
    let (cw, ch) = crop.dimensions();
    let aspect = cw as f32 / ch.max(1) as f32;
    let width = ((REC_HEIGHT as f32 * aspect).ceil() as u32).clamp(REC_MIN_WIDTH, REC_MAX_WIDTH);

    let resized = imageops::resize(&crop, width, REC_HEIGHT, FilterType::Triangle);
    let mut tensor = Array4::<f32>::zeros((1, 3, REC_HEIGHT as usize, REC_MAX_WIDTH as usize));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for (c, src) in [2usize, 1, 0].into_iter().enumerate() {
            tensor[[0, c, y as usize, x as usize]] = pixel[src] as f32 / 127.5 - 1.0;
        }
    }
    tensor
}
