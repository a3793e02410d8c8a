use crate::config::Config;
use idverify_core::{
    ErrorKind, FaceLocator, FaceVerifier, ImageLoader, ImageSide, ImageSource, LoadError, MatchResult,
    OnnxBackbone, ScrfdDetector,
};
use idverify_doc::{DocumentExtractor, DocumentReport, OnnxTextRecognizer};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout_at, Instant};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("detector error: {0}")]
    Detector(#[from] idverify_core::detector::DetectorError),
    #[error("backbone error: {0}")]
    Backbone(#[from] idverify_core::embedder::ExtractError),
    #[error("text recognizer error: {0}")]
    Ocr(#[from] idverify_doc::recognizer::OcrError),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent to the face verification thread.
struct VerifyRequest {
    id: Uuid,
    document: ImageSource,
    selfie: ImageSource,
    threshold: Option<f32>,
    reply: oneshot::Sender<MatchResult>,
}

/// Messages sent to the document extraction thread.
struct ExtractRequest {
    id: Uuid,
    document: ImageSource,
    reply: oneshot::Sender<DocumentReport>,
}

/// Clone-safe handle to the engine threads.
///
/// Each pipeline owns its models on a dedicated OS thread and serves one
/// request at a time; the two pipelines run independently of each other.
#[derive(Clone)]
pub struct EngineHandle {
    face_tx: mpsc::Sender<VerifyRequest>,
    doc_tx: mpsc::Sender<ExtractRequest>,
    timeout: Duration,
    default_threshold: f32,
    method: String,
}

impl EngineHandle {
    /// Move the pipelines onto their own threads.
    pub fn spawn(
        mut verifier: FaceVerifier,
        mut extractor: DocumentExtractor,
        timeout: Duration,
    ) -> Result<Self, EngineError> {
        let default_threshold = verifier.default_threshold();
        let method = verifier.method().to_string();

        let (face_tx, mut face_rx) = mpsc::channel::<VerifyRequest>(4);
        std::thread::Builder::new()
            .name("idverify-face".into())
            .spawn(move || {
                tracing::info!("face engine thread started");
                while let Some(req) = face_rx.blocking_recv() {
                    let _span = tracing::info_span!("verify", request_id = %req.id).entered();
                    if req.reply.is_closed() {
                        tracing::debug!("caller gave up, skipping");
                        continue;
                    }
                    let result = verifier.verify(&req.document, &req.selfie, req.threshold);
                    let _ = req.reply.send(result);
                }
                tracing::info!("face engine thread exiting");
            })?;

        let (doc_tx, mut doc_rx) = mpsc::channel::<ExtractRequest>(4);
        std::thread::Builder::new()
            .name("idverify-doc".into())
            .spawn(move || {
                tracing::info!("document engine thread started");
                while let Some(req) = doc_rx.blocking_recv() {
                    let _span = tracing::info_span!("extract", request_id = %req.id).entered();
                    if req.reply.is_closed() {
                        tracing::debug!("caller gave up, skipping");
                        continue;
                    }
                    let report = extractor.extract(&req.document);
                    let _ = req.reply.send(report);
                }
                tracing::info!("document engine thread exiting");
            })?;

        Ok(Self {
            face_tx,
            doc_tx,
            timeout,
            default_threshold,
            method,
        })
    }

    /// Compare the faces on two images, giving up after the request timeout.
    ///
    /// The deadline covers both waiting for a queue slot and inference.
    pub async fn verify(
        &self,
        document: ImageSource,
        selfie: ImageSource,
        threshold: Option<f32>,
    ) -> Result<MatchResult, EngineError> {
        let id = Uuid::new_v4();
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = VerifyRequest {
            id,
            document,
            selfie,
            threshold,
            reply: reply_tx,
        };

        let outcome = timeout_at(deadline, async {
            self.face_tx
                .send(request)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        })
        .await;

        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                tracing::warn!(request_id = %id, timeout = ?self.timeout, "face verification timed out");
                Ok(MatchResult::failure(
                    ErrorKind::Timeout,
                    None,
                    format!("face verification did not finish within {:?}", self.timeout),
                    threshold.unwrap_or(self.default_threshold),
                    &self.method,
                ))
            }
        }
    }

    /// [`verify`](Self::verify) for command-line references (paths or URLs).
    pub async fn verify_references(
        &self,
        document: &str,
        selfie: &str,
        threshold: Option<f32>,
    ) -> Result<MatchResult, EngineError> {
        let threshold_or_default = threshold.unwrap_or(self.default_threshold);
        let document = match ImageSource::parse(document) {
            Ok(s) => s,
            Err(e) => return Ok(self.reference_failure(ImageSide::Document, &e, threshold_or_default)),
        };
        let selfie = match ImageSource::parse(selfie) {
            Ok(s) => s,
            Err(e) => return Ok(self.reference_failure(ImageSide::Selfie, &e, threshold_or_default)),
        };
        self.verify(document, selfie, threshold).await
    }

    /// Extract identity fields from a document image.
    /// A timeout degrades to an empty report.
    pub async fn extract(&self, document: ImageSource) -> Result<DocumentReport, EngineError> {
        let id = Uuid::new_v4();
        let deadline = Instant::now() + self.timeout;
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ExtractRequest {
            id,
            document,
            reply: reply_tx,
        };

        let outcome = timeout_at(deadline, async {
            self.doc_tx
                .send(request)
                .await
                .map_err(|_| EngineError::ChannelClosed)?;
            reply_rx.await.map_err(|_| EngineError::ChannelClosed)
        })
        .await;

        match outcome {
            Ok(reply) => reply,
            Err(_) => {
                tracing::warn!(request_id = %id, timeout = ?self.timeout, "document extraction timed out");
                Ok(DocumentReport::default())
            }
        }
    }

    /// [`extract`](Self::extract) for a command-line reference.
    pub async fn extract_reference(&self, document: &str) -> Result<DocumentReport, EngineError> {
        match ImageSource::parse(document) {
            Ok(source) => self.extract(source).await,
            Err(e) => {
                tracing::warn!(error = %e, "document reference rejected");
                Ok(DocumentReport::default())
            }
        }
    }

    fn reference_failure(&self, side: ImageSide, err: &LoadError, threshold: f32) -> MatchResult {
        let kind = match err {
            LoadError::ImageLoadFailed(_) => ErrorKind::ImageLoadFailed,
            LoadError::UnsupportedInputType(_) => ErrorKind::UnsupportedInputType,
        };
        tracing::warn!(%side, error = %err, "image reference rejected");
        MatchResult::failure(kind, Some(side), format!("{side} image: {err}"), threshold, &self.method)
    }
}

/// Load every model named by `config`. Fails fast if any is missing.
pub fn load_pipelines(config: &Config) -> Result<(FaceVerifier, DocumentExtractor), EngineError> {
    let layout = config.layout().map_err(|e| EngineError::Config(e.to_string()))?;
    let languages = config.languages().map_err(|e| EngineError::Config(e.to_string()))?;

    let detector_path = config.detector_model_path();
    let detector = ScrfdDetector::load(&detector_path, config.detector_confidence)?;
    tracing::info!(path = %detector_path, "SCRFD detector loaded");

    let backbone_path = config.backbone_model_path();
    let backbone = OnnxBackbone::load(
        &backbone_path,
        config.backbone_input_size,
        config.embedding_dim,
        layout,
    )?;
    tracing::info!(path = %backbone_path, "embedding backbone loaded");

    let recognizer = OnnxTextRecognizer::load(&config.model_dir, &config.text_detector_model, &languages)?;
    tracing::info!(languages = %config.languages, "text recognizer loaded");

    let verifier = FaceVerifier::new(
        ImageLoader::new(config.fetch_timeout()),
        FaceLocator::new(Box::new(detector), config.max_image_width),
        Box::new(backbone),
        config.similarity_threshold,
    );
    let extractor = DocumentExtractor::new(ImageLoader::new(config.fetch_timeout()), Box::new(recognizer));
    Ok((verifier, extractor))
}
