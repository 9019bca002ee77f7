use std::{fmt, path::PathBuf};

use thiserror::Error;

use crate::{artifacts::ArtifactKind, pipeline::Stage};

#[derive(Error, Debug)]
pub enum KeyMomentsError {
    #[error("Invalid timestamp {input:?}: expected HH:MM:SS,mmm")]
    Format { input: String },

    #[error("Time value out of range: {value}")]
    Range { value: String },

    #[error("Artifact {kind} not found at {path}")]
    NotFound { kind: ArtifactKind, path: PathBuf },

    #[error("Missing artifact {kind} at {path}; it is produced by the {producer} stage")]
    MissingArtifact {
        kind: ArtifactKind,
        path: PathBuf,
        producer: Stage,
    },

    #[error("Could not parse analysis response: {reason}")]
    AnalysisParse { reason: String, raw: String },

    #[error("Missing API key for {provider}: pass --api-key or set {env_var}")]
    AuthConfig {
        provider: &'static str,
        env_var: &'static str,
    },

    #[error("{collaborator} failed ({kind}): {message}. {}", .kind.hint())]
    External {
        collaborator: Collaborator,
        kind: FailureKind,
        message: String,
    },

    #[error("Input video not found: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Invalid config {path}: {reason}")]
    Config { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl KeyMomentsError {
    pub fn external(
        collaborator: Collaborator,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        KeyMomentsError::External {
            collaborator,
            kind,
            message: message.into(),
        }
    }
}

/// The third-party boundary an [`KeyMomentsError::External`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collaborator {
    AudioExtraction,
    Transcription,
    LanguageModel,
}

impl fmt::Display for Collaborator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Collaborator::AudioExtraction => "Audio extraction",
            Collaborator::Transcription => "Transcription",
            Collaborator::LanguageModel => "Language model request",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    Authentication,
    Network,
    Process,
    InvalidResponse,
}

impl FailureKind {
    /// What the operator can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            FailureKind::RateLimited => {
                "Wait for the provider's rate limit window to reset, then retry with --skip"
            }
            FailureKind::Authentication => {
                "Check that the API key is valid for the selected provider"
            }
            FailureKind::Network => "Check network connectivity and the provider's status page",
            FailureKind::Process => "Check that the external tool is installed and on PATH",
            FailureKind::InvalidResponse => {
                "The service returned an unexpected response; retry or pick another provider"
            }
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FailureKind::RateLimited => "rate limited",
            FailureKind::Authentication => "authentication",
            FailureKind::Network => "network",
            FailureKind::Process => "process",
            FailureKind::InvalidResponse => "invalid response",
        })
    }
}

pub type Result<T> = std::result::Result<T, KeyMomentsError>;
