pub mod analysis;
pub mod artifacts;
pub mod collaborators;
pub mod config;
pub mod error;
pub mod extract;
pub mod format;
pub mod llm;
pub mod pipeline;
pub mod provider;
pub mod render;
pub mod template;
pub mod timestamp;
pub mod transcribe;
pub mod types;

pub use analysis::{Notice, ValidatedAnalysis, validate_response};
pub use artifacts::{ArtifactKind, ArtifactStore};
pub use collaborators::{AudioExtractor, LanguageModel, SpeechToText};
pub use config::{Config, default_config_path, get_model_dir, get_root_cache_dir};
pub use error::{Collaborator, FailureKind, KeyMomentsError, Result};
pub use extract::FfmpegExtractor;
pub use format::{format_analysis_readable, format_transcript_srt};
pub use llm::ChatClient;
pub use pipeline::{
    Collaborators, NoopObserver, Pipeline, PipelineFailure, PipelineObserver, PipelineRun,
    PipelineState, RunReport, Stage,
};
pub use provider::{Provider, ProviderConfig};
pub use render::{SummaryDocument, render_summary};
pub use template::{HtmlTemplate, SummaryTemplate};
pub use timestamp::{TimeOffset, nearest_segment};
pub use transcribe::{WhisperTranscriber, ensure_model, silence_backend_logs};
pub use types::{Analysis, KeyMoment, Topic, Transcript, TranscriptSegment, Word};
