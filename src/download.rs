//! Model provisioning.
//!
//! URL model sources are fetched once and cached under
//! `~/.cache/susurro/models`. Downloads stream into a `.downloading` temp
//! file that is renamed into place only when complete, so an interrupted
//! fetch never leaves a truncated model behind.

use std::fs;
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use log::{debug, info};
use tokio::io::AsyncWriteExt;

use crate::error::VadError;
use crate::silero::ModelVariant;

/// Official Silero VAD v4 release.
const SILERO_V4_URL: &str =
    "https://github.com/snakers4/silero-vad/raw/v4.0stable/files/silero_vad.onnx";

/// Official Silero VAD v5 release.
const SILERO_V5_URL: &str =
    "https://github.com/snakers4/silero-vad/raw/master/src/silero_vad/data/silero_vad.onnx";

pub fn default_model_url(variant: ModelVariant) -> &'static str {
    match variant {
        ModelVariant::V4 => SILERO_V4_URL,
        ModelVariant::V5 => SILERO_V5_URL,
    }
}

/// Get the model cache directory, creating it if needed.
fn models_dir() -> Result<PathBuf, VadError> {
    let home = std::env::var("HOME")
        .map_err(|_| VadError::ModelDownload("HOME directory is not set".to_string()))?;
    let dir = PathBuf::from(home).join(".cache/susurro/models");
    if !dir.exists() {
        fs::create_dir_all(&dir).map_err(|e| {
            VadError::ModelDownload(format!(
                "failed to create models directory {}: {e}",
                dir.display()
            ))
        })?;
    }
    Ok(dir)
}

/// A well-formed Silero model is a few megabytes; anything tiny is a failed
/// or truncated download.
fn is_model_valid(path: &Path) -> bool {
    match fs::metadata(path) {
        Ok(metadata) => metadata.len() > 10_000,
        Err(_) => false,
    }
}

/// Fetch the model for `variant` from `url`, reusing the cached copy when
/// one is present and plausible.
pub async fn fetch_model(variant: ModelVariant, url: &str) -> Result<PathBuf, VadError> {
    let models_dir = models_dir()?;
    let model_path = models_dir.join(format!("silero_vad_{variant}.onnx"));

    if is_model_valid(&model_path) {
        debug!("using cached {variant} model at {}", model_path.display());
        return Ok(model_path);
    }

    info!("downloading {variant} VAD model from {url}");
    download_file(url, &model_path).await?;

    if !is_model_valid(&model_path) {
        return Err(VadError::ModelDownload(
            "downloaded model is truncated or corrupted".to_string(),
        ));
    }

    info!("{variant} VAD model ready at {}", model_path.display());
    Ok(model_path)
}

/// Stream a file from `url` to `output_path` via a temp file.
async fn download_file(url: &str, output_path: &Path) -> Result<(), VadError> {
    if let Some(parent) = output_path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .map_err(|e| VadError::ModelDownload(format!("failed to create {}: {e}", parent.display())))?;
        }
    }

    let temp_path = output_path.with_extension("downloading");

    let response = reqwest::get(url)
        .await
        .map_err(|e| VadError::ModelDownload(format!("request to {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(VadError::ModelDownload(format!(
            "download from {url} failed with status {}",
            response.status()
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| VadError::ModelDownload(format!("failed to create {}: {e}", temp_path.display())))?;

    let mut stream = response.bytes_stream();
    let mut downloaded: u64 = 0;
    while let Some(item) = stream.next().await {
        let chunk =
            item.map_err(|e| VadError::ModelDownload(format!("download interrupted: {e}")))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| VadError::ModelDownload(format!("write failed: {e}")))?;
        downloaded += chunk.len() as u64;
    }
    debug!("downloaded {downloaded} of {total_size} bytes");

    file.flush()
        .await
        .map_err(|e| VadError::ModelDownload(format!("flush failed: {e}")))?;
    drop(file);

    tokio::fs::rename(&temp_path, output_path).await.map_err(|e| {
        VadError::ModelDownload(format!(
            "failed to move {} into place: {e}",
            temp_path.display()
        ))
    })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_variant_urls_point_at_the_right_release() {
        assert!(default_model_url(ModelVariant::V4).contains("v4.0stable"));
        assert!(default_model_url(ModelVariant::V5).contains("silero_vad.onnx"));
        assert_ne!(
            default_model_url(ModelVariant::V4),
            default_model_url(ModelVariant::V5)
        );
    }

    #[test]
    fn tiny_files_are_rejected() {
        let dir = std::env::temp_dir();
        let path = dir.join("susurro_test_tiny_model.onnx");
        fs::write(&path, b"not a model").unwrap();
        assert!(!is_model_valid(&path));
        fs::remove_file(&path).ok();
        assert!(!is_model_valid(&path));
    }
}
