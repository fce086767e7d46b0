//! Audio container transcoding via ffmpeg.
//!
//! Browser and mobile recorders hand us m4a or webm containers; the analysis
//! code only understands the canonical waveform format (mono, 16-bit PCM,
//! 16 kHz WAV). Everything here shells out to ffmpeg rather than linking
//! codec libraries.

use std::path::Path;
use std::process::Stdio;
use thiserror::Error;
use tokio::process::Command;

/// Sample rate of the canonical waveform produced by [`transcode_to_pcm_wav`].
pub const CANONICAL_SAMPLE_RATE: u32 = 16_000;

/// Errors that can occur during transcoding.
#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("ffmpeg failed: {0}")]
    ConversionFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert an audio file to the canonical waveform format: single channel,
/// 16-bit PCM, 16 kHz WAV.
pub async fn transcode_to_pcm_wav(
    input_path: &Path,
    output_path: &Path,
) -> Result<(), TranscodeError> {
    // Ensure output directory exists
    if let Some(parent) = output_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let output = Command::new("ffmpeg")
        .args([
            "-y", // Overwrite output
            "-i",
            input_path.to_str().unwrap_or(""),
            "-acodec",
            "pcm_s16le",
            "-ac",
            "1",
            "-ar",
            "16000",
            "-f",
            "wav",
            "-vn", // No video
        ])
        .arg(output_path)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(TranscodeError::ConversionFailed(stderr.to_string()));
    }

    Ok(())
}

/// Check if ffmpeg is available.
pub async fn check_ffmpeg_available() -> Result<(), TranscodeError> {
    let ffmpeg_result = Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await;

    match ffmpeg_result {
        Ok(status) if status.success() => Ok(()),
        _ => Err(TranscodeError::ConversionFailed(
            "ffmpeg not found or not working".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_transcode_missing_input_fails() {
        // ffmpeg may not be installed where tests run; either way this must
        // produce an error, never a silent success.
        let dir = tempfile::tempdir().unwrap();
        let result = transcode_to_pcm_wav(
            &dir.path().join("does-not-exist.m4a"),
            &dir.path().join("out.wav"),
        )
        .await;
        assert!(result.is_err());
    }
}
