use thiserror::Error;

/// Errors surfaced by the VAD engine.
///
/// Construction-time failures (`InvalidConfig`, `ModelLoad`, `ModelDownload`)
/// are returned from the creation APIs. `Inference` is raised per frame and is
/// converted into an `error` event by the detector; it never aborts the
/// stream.
#[derive(Debug, Error)]
pub enum VadError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to load VAD model: {0}")]
    ModelLoad(String),

    #[error("failed to download VAD model: {0}")]
    ModelDownload(String),

    #[error("inference failed: {0}")]
    Inference(String),
}
