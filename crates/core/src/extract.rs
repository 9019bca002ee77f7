use std::{
    path::{Path, PathBuf},
    process::Stdio,
};

use async_trait::async_trait;
use tokio::process::Command;

use crate::{
    collaborators::AudioExtractor,
    error::{Collaborator, FailureKind, KeyMomentsError, Result},
};

/// Audio extraction through the `ffmpeg` binary.
pub struct FfmpegExtractor {
    bin: PathBuf,
}

impl FfmpegExtractor {
    pub fn new(bin: impl Into<PathBuf>) -> Self {
        Self { bin: bin.into() }
    }
}

impl Default for FfmpegExtractor {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl AudioExtractor for FfmpegExtractor {
    async fn extract(&self, video: &Path, audio_out: &Path) -> Result<()> {
        tracing::debug!(bin = %self.bin.display(), video = %video.display(), "running ffmpeg");

        let output = Command::new(&self.bin)
            .arg("-y")
            .arg("-i")
            .arg(video)
            .arg("-vn")
            .arg("-acodec")
            .arg("pcm_s16le")
            .arg("-ar")
            .arg("16000")
            .arg("-ac")
            .arg("1")
            .arg("-f")
            .arg("wav")
            .arg(audio_out)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                KeyMomentsError::external(
                    Collaborator::AudioExtraction,
                    FailureKind::Process,
                    format!("could not start {}: {}", self.bin.display(), e),
                )
            })?;

        if !output.status.success() {
            return Err(KeyMomentsError::external(
                Collaborator::AudioExtraction,
                FailureKind::Process,
                format!(
                    "ffmpeg exited with {}: {}",
                    output.status,
                    stderr_tail(&output.stderr)
                ),
            ));
        }

        Ok(())
    }
}

/// Last few lines of a tool's stderr; ffmpeg prints its banner first.
pub(crate) fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(5);
    lines[start..].join("\n")
}
