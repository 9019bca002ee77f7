use std::{
    fmt,
    path::{Path, PathBuf},
};

use tokio::fs;

use crate::{
    error::{KeyMomentsError, Result},
    pipeline::Stage,
};

/// Every file a pipeline run persists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactKind {
    Audio,
    TranscriptJson,
    Subtitles,
    AnalysisJson,
    SummaryHtml,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 5] = [
        ArtifactKind::Audio,
        ArtifactKind::TranscriptJson,
        ArtifactKind::Subtitles,
        ArtifactKind::AnalysisJson,
        ArtifactKind::SummaryHtml,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "audio",
            ArtifactKind::TranscriptJson => "transcript-json",
            ArtifactKind::Subtitles => "subtitles",
            ArtifactKind::AnalysisJson => "analysis-json",
            ArtifactKind::SummaryHtml => "summary-html",
        }
    }

    /// Appended to the video's base name. Other tooling depends on these.
    pub fn suffix(&self) -> &'static str {
        match self {
            ArtifactKind::Audio => "_audio.wav",
            ArtifactKind::TranscriptJson => "_transcript.json",
            ArtifactKind::Subtitles => "_subtitles.srt",
            ArtifactKind::AnalysisJson => "_analysis.json",
            ArtifactKind::SummaryHtml => "_summary.html",
        }
    }

    /// The single stage allowed to write this artifact.
    pub fn producer(&self) -> Stage {
        match self {
            ArtifactKind::Audio => Stage::Extract,
            ArtifactKind::TranscriptJson | ArtifactKind::Subtitles => Stage::Transcribe,
            ArtifactKind::AnalysisJson => Stage::Analyze,
            ArtifactKind::SummaryHtml => Stage::Generate,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Deterministic artifact paths under one output directory.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    output_dir: PathBuf,
    base: String,
}

impl ArtifactStore {
    pub fn new(output_dir: impl Into<PathBuf>, video_path: &Path) -> Self {
        let base = video_path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .filter(|stem| !stem.is_empty())
            .unwrap_or_else(|| "video".to_string());
        Self {
            output_dir: output_dir.into(),
            base,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn base_name(&self) -> &str {
        &self.base
    }

    pub fn path(&self, kind: ArtifactKind) -> PathBuf {
        self.output_dir.join(format!("{}{}", self.base, kind.suffix()))
    }

    pub fn exists(&self, kind: ArtifactKind) -> bool {
        self.path(kind).is_file()
    }

    /// Artifacts currently on disk, in pipeline order.
    pub fn checkpointed(&self) -> Vec<ArtifactKind> {
        ArtifactKind::ALL
            .into_iter()
            .filter(|kind| self.exists(*kind))
            .collect()
    }

    pub async fn read(&self, kind: ArtifactKind) -> Result<Vec<u8>> {
        let path = self.path(kind);
        match fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(KeyMomentsError::NotFound { kind, path })
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn read_to_string(&self, kind: ArtifactKind) -> Result<String> {
        let bytes = self.read(kind).await?;
        String::from_utf8(bytes).map_err(|e| {
            KeyMomentsError::IoError(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Write through a sibling temp file and rename, so an interrupted run
    /// never leaves a half-written checkpoint behind.
    pub async fn write(&self, kind: ArtifactKind, bytes: &[u8]) -> Result<PathBuf> {
        let tmp = self.prepare_partial(kind).await?;
        fs::write(&tmp, bytes).await?;
        self.commit(kind).await
    }

    /// Temp location for collaborators that write files themselves.
    pub fn partial_path(&self, kind: ArtifactKind) -> PathBuf {
        self.output_dir.join(format!(".{}{}.partial", self.base, kind.suffix()))
    }

    /// Creates the output directory and clears any stale partial file.
    pub async fn prepare_partial(&self, kind: ArtifactKind) -> Result<PathBuf> {
        fs::create_dir_all(&self.output_dir).await?;
        let tmp = self.partial_path(kind);
        match fs::remove_file(&tmp).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(tmp)
    }

    /// Delete a checkpoint. Absent artifacts are fine.
    pub async fn remove(&self, kind: ArtifactKind) -> Result<()> {
        match fs::remove_file(self.path(kind)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the partial file into place.
    pub async fn commit(&self, kind: ArtifactKind) -> Result<PathBuf> {
        let path = self.path(kind);
        fs::rename(self.partial_path(kind), &path).await?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_derive_from_video_base_name() {
        let store = ArtifactStore::new("/out", Path::new("/videos/standup.2024.mp4"));
        assert_eq!(store.base_name(), "standup.2024");
        assert_eq!(
            store.path(ArtifactKind::Audio),
            PathBuf::from("/out/standup.2024_audio.wav")
        );
        assert_eq!(
            store.path(ArtifactKind::TranscriptJson),
            PathBuf::from("/out/standup.2024_transcript.json")
        );
        assert_eq!(
            store.path(ArtifactKind::Subtitles),
            PathBuf::from("/out/standup.2024_subtitles.srt")
        );
        assert_eq!(
            store.path(ArtifactKind::AnalysisJson),
            PathBuf::from("/out/standup.2024_analysis.json")
        );
        assert_eq!(
            store.path(ArtifactKind::SummaryHtml),
            PathBuf::from("/out/standup.2024_summary.html")
        );
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("nested"), Path::new("meeting.mp4"));

        assert!(!store.exists(ArtifactKind::AnalysisJson));
        assert!(store.checkpointed().is_empty());

        store.write(ArtifactKind::AnalysisJson, b"[]").await.unwrap();
        assert!(store.exists(ArtifactKind::AnalysisJson));
        assert_eq!(store.read(ArtifactKind::AnalysisJson).await.unwrap(), b"[]");
        assert_eq!(store.checkpointed(), vec![ArtifactKind::AnalysisJson]);
    }

    #[tokio::test]
    async fn partial_file_is_invisible_until_commit() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), Path::new("meeting.mp4"));

        let tmp = store.prepare_partial(ArtifactKind::Audio).await.unwrap();
        tokio::fs::write(&tmp, b"RIFF").await.unwrap();
        assert!(!store.exists(ArtifactKind::Audio));

        let path = store.commit(ArtifactKind::Audio).await.unwrap();
        assert_eq!(path, store.path(ArtifactKind::Audio));
        assert!(store.exists(ArtifactKind::Audio));
        assert!(!tmp.exists());
    }

    #[tokio::test]
    async fn remove_clears_checkpoint_and_tolerates_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), Path::new("meeting.mp4"));

        store.write(ArtifactKind::SummaryHtml, b"<html>").await.unwrap();
        store.remove(ArtifactKind::SummaryHtml).await.unwrap();
        assert!(!store.exists(ArtifactKind::SummaryHtml));
        store.remove(ArtifactKind::SummaryHtml).await.unwrap();
    }

    #[tokio::test]
    async fn reading_absent_artifact_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ArtifactStore::new(dir.path(), Path::new("meeting.mp4"));
        let err = store.read(ArtifactKind::TranscriptJson).await.unwrap_err();
        assert!(matches!(
            err,
            KeyMomentsError::NotFound {
                kind: ArtifactKind::TranscriptJson,
                ..
            }
        ));
    }
}
