//! Model downloader for MusicGen ONNX models.
//!
//! Downloads model files from HuggingFace if not present locally.

use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::error::{GeneratorError, Result};

use super::registry::{ResolvedModel, CONFIG_FILE};

/// Downloads every missing model file of a resolved model.
///
/// Local directories have nothing to download and are left untouched.
/// A failed `config.json` download is logged and ignored.
pub fn ensure_models(model: &ResolvedModel) -> Result<()> {
    let downloads = model.downloads();
    if downloads.is_empty() {
        return Ok(());
    }

    let model_dir = &model.dir;
    if !model_dir.exists() {
        fs::create_dir_all(model_dir).map_err(|e| {
            GeneratorError::model_download_failed(format!(
                "Failed to create model directory {}: {}",
                model_dir.display(),
                e
            ))
        })?;
    }

    let missing: Vec<&(&str, String)> = downloads
        .iter()
        .filter(|(file, _)| !model_dir.join(file).exists())
        .collect();

    if missing.is_empty() {
        info!("All model files present in {}", model_dir.display());
        return Ok(());
    }

    info!(
        "Downloading {} missing model files (this may take several minutes)",
        missing.len()
    );

    for (file, url) in missing {
        let result = download_file_streaming(url, &model_dir.join(file));
        match result {
            Err(e) if *file == CONFIG_FILE => {
                warn!("Skipping optional {}: {}", CONFIG_FILE, e);
            }
            other => other?,
        }
    }

    info!("All models downloaded successfully");
    Ok(())
}

/// Downloads a file using streaming to handle large files.
///
/// Data is written to `<dest>.part` and renamed once complete, so an
/// interrupted download is never mistaken for a finished file.
fn download_file_streaming(url: &str, dest: &Path) -> Result<()> {
    let filename = dest.file_name().unwrap_or_default().to_string_lossy();
    info!("Downloading {}", filename);

    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(3600)) // 1 hour timeout
        .build()
        .map_err(|e| {
            GeneratorError::model_download_failed(format!("Failed to create HTTP client: {}", e))
        })?;

    let mut response = client.get(url).send().map_err(|e| {
        GeneratorError::model_download_failed(format!("Failed to download {}: {}", url, e))
    })?;

    if !response.status().is_success() {
        return Err(GeneratorError::model_download_failed(format!(
            "HTTP {} for {}",
            response.status(),
            url
        )));
    }

    let total_size = response.content_length().unwrap_or(0);
    let downloaded = stream_into_place(&mut response, dest, total_size)?;

    let size_mb = downloaded as f64 / (1024.0 * 1024.0);
    info!("  {} done ({:.1} MB)", filename, size_mb);

    Ok(())
}

/// Copies `reader` into `<dest>.part`, then renames it to `dest`.
///
/// The partial file is removed if any step fails.
fn stream_into_place(reader: &mut impl Read, dest: &Path, total_size: u64) -> Result<u64> {
    let partial = partial_path(dest);
    let label = dest.file_name().unwrap_or_default().to_string_lossy();
    let result = write_partial(reader, &partial, &label, total_size).and_then(|downloaded| {
        fs::rename(&partial, dest).map_err(|e| {
            GeneratorError::model_download_failed(format!(
                "Failed to move {} into place: {}",
                partial.display(),
                e
            ))
        })?;
        Ok(downloaded)
    });

    if result.is_err() && partial.exists() {
        if let Err(e) = fs::remove_file(&partial) {
            warn!("Could not remove {}: {}", partial.display(), e);
        }
    }
    result
}

fn partial_path(dest: &Path) -> PathBuf {
    dest.with_extension(format!(
        "{}.part",
        dest.extension().unwrap_or_default().to_string_lossy()
    ))
}

fn write_partial(
    reader: &mut impl Read,
    partial: &Path,
    filename: &str,
    total_size: u64,
) -> Result<u64> {
    let mut file = fs::File::create(partial).map_err(|e| {
        GeneratorError::model_download_failed(format!(
            "Failed to create file {}: {}",
            partial.display(),
            e
        ))
    })?;

    let mut downloaded: u64 = 0;
    let mut buffer = [0u8; 65536]; // 64KB buffer
    let mut last_progress = 0;

    loop {
        let bytes_read = reader.read(&mut buffer).map_err(|e| {
            GeneratorError::model_download_failed(format!("Failed to read response: {}", e))
        })?;

        if bytes_read == 0 {
            break;
        }

        file.write_all(&buffer[..bytes_read]).map_err(|e| {
            GeneratorError::model_download_failed(format!("Failed to write file: {}", e))
        })?;

        downloaded += bytes_read as u64;

        if total_size > 0 {
            let progress = (downloaded * 100 / total_size) as usize;
            if progress >= last_progress + 10 {
                info!("  {}: {}%", filename, progress);
                last_progress = progress;
            }
        }
    }

    file.flush().map_err(|e| {
        GeneratorError::model_download_failed(format!("Failed to flush file: {}", e))
    })?;

    Ok(downloaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::registry::{find_registered, REQUIRED_MODEL_FILES};
    use tempfile::tempdir;

    #[test]
    fn local_models_need_no_download() {
        let dir = tempdir().unwrap();
        let model = ResolvedModel {
            dir: dir.path().to_path_buf(),
            registered: None,
        };
        assert!(ensure_models(&model).is_ok());
    }

    #[test]
    fn present_files_are_not_downloaded() {
        let dir = tempdir().unwrap();
        for file in REQUIRED_MODEL_FILES.iter().chain(std::iter::once(&CONFIG_FILE)) {
            fs::write(dir.path().join(file), b"stub").unwrap();
        }
        let model = ResolvedModel {
            dir: dir.path().to_path_buf(),
            registered: find_registered("facebook/musicgen-small"),
        };

        // No network access happens when nothing is missing.
        assert!(ensure_models(&model).is_ok());
    }

    /// Yields `good` bytes, then fails.
    struct BrokenStream {
        good: usize,
    }

    impl Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            if self.good == 0 {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::ConnectionReset,
                    "connection reset",
                ));
            }
            let n = self.good.min(buf.len());
            buf[..n].fill(7);
            self.good -= n;
            Ok(n)
        }
    }

    #[test]
    fn completed_stream_is_renamed_into_place() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("decoder_model.onnx");

        let written = stream_into_place(&mut std::io::Cursor::new(vec![1u8; 1000]), &dest, 1000)
            .unwrap();

        assert_eq!(written, 1000);
        assert_eq!(fs::read(&dest).unwrap().len(), 1000);
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn failed_stream_leaves_no_partial_file() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("decoder_model.onnx");

        let err = stream_into_place(&mut BrokenStream { good: 4096 }, &dest, 1 << 20).unwrap_err();

        assert_eq!(err.code, crate::error::ErrorCode::ModelDownloadFailed);
        assert!(!partial_path(&dest).exists());
        assert!(!dest.exists());
    }

    #[test]
    fn failed_rename_removes_partial_file() {
        let dir = tempdir().unwrap();
        // A non-empty directory at the destination makes the rename fail.
        let dest = dir.path().join("tokenizer.json");
        fs::create_dir(&dest).unwrap();
        fs::write(dest.join("occupied"), b"x").unwrap();

        assert!(stream_into_place(&mut std::io::Cursor::new(vec![1u8; 10]), &dest, 10).is_err());
        assert!(!partial_path(&dest).exists());
    }

    #[test]
    fn partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("/models/text_encoder.onnx")),
            Path::new("/models/text_encoder.onnx.part")
        );
    }

    #[test]
    fn every_required_file_has_a_url() {
        let model = ResolvedModel {
            dir: "/unused".into(),
            registered: find_registered("musicgen-medium-fp16"),
        };
        let downloads = model.downloads();
        for file in REQUIRED_MODEL_FILES {
            assert!(
                downloads.iter().any(|(name, _)| name == file),
                "Missing URL for required file: {}",
                file
            );
        }
    }
}
