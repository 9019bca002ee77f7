use std::path::Path;

use async_trait::async_trait;

use crate::{error::Result, types::Transcript};

/// Pulls a 16 kHz mono PCM track out of a video.
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    async fn extract(&self, video: &Path, audio_out: &Path) -> Result<()>;
}

/// Speech-to-text over an extracted audio track.
#[async_trait]
pub trait SpeechToText: Send + Sync {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript>;
}

/// A single-shot text completion.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String>;
}
