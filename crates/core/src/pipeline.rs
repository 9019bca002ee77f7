//! Stage sequencing for one video.
//!
//! A run starts at the stage named by the skip directive (or at
//! [`Stage::Extract`]), checks that every artifact the starting stage reads is
//! already on disk, clears whatever the remaining stages wrote in an earlier
//! run, then runs each remaining stage to completion in order.
//! Every stage writes its artifacts through the [`ArtifactStore`] before the
//! state machine advances, so a failed run can be resumed with `--skip`.

use std::{
    fmt,
    path::{Path, PathBuf},
};

use crate::{
    analysis::{self, Notice, prompt},
    artifacts::{ArtifactKind, ArtifactStore},
    collaborators::{AudioExtractor, LanguageModel, SpeechToText},
    config::Config,
    error::{Collaborator, FailureKind, KeyMomentsError, Result},
    extract::FfmpegExtractor,
    format::format_transcript_srt,
    llm::ChatClient,
    provider::Provider,
    render::{relative_media_src, render_summary},
    template::{HtmlTemplate, SummaryTemplate},
    transcribe::WhisperTranscriber,
    types::{Analysis, Transcript},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Extract,
    Transcribe,
    Analyze,
    Generate,
}

impl Stage {
    pub const ORDER: [Stage; 4] = [
        Stage::Extract,
        Stage::Transcribe,
        Stage::Analyze,
        Stage::Generate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Stage::Extract => "extract",
            Stage::Transcribe => "transcribe",
            Stage::Analyze => "analyze",
            Stage::Generate => "generate",
        }
    }

    /// Artifacts that must exist before this stage can run.
    pub fn requires(&self) -> &'static [ArtifactKind] {
        match self {
            Stage::Extract => &[],
            Stage::Transcribe => &[ArtifactKind::Audio],
            Stage::Analyze => &[ArtifactKind::TranscriptJson],
            Stage::Generate => &[ArtifactKind::TranscriptJson, ArtifactKind::AnalysisJson],
        }
    }

    /// Artifacts this stage is the single writer of.
    pub fn produces(&self) -> &'static [ArtifactKind] {
        match self {
            Stage::Extract => &[ArtifactKind::Audio],
            Stage::Transcribe => &[ArtifactKind::TranscriptJson, ArtifactKind::Subtitles],
            Stage::Analyze => &[ArtifactKind::AnalysisJson],
            Stage::Generate => &[ArtifactKind::SummaryHtml],
        }
    }

    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Extract => Some(Stage::Transcribe),
            Stage::Transcribe => Some(Stage::Analyze),
            Stage::Analyze => Some(Stage::Generate),
            Stage::Generate => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub enum PipelineState {
    Running(Stage),
    Done,
    Failed(Stage, KeyMomentsError),
}

impl PipelineState {
    fn after(stage: Stage) -> Self {
        stage.next().map_or(PipelineState::Done, PipelineState::Running)
    }
}

/// Everything one invocation needs, passed explicitly to the orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub video_path: PathBuf,
    pub output_dir: PathBuf,
    pub provider: Provider,
    pub skip: Option<Stage>,
    pub config: Config,
}

impl PipelineRun {
    /// Without an explicit output directory artifacts land next to the video.
    pub fn new(
        video_path: impl Into<PathBuf>,
        output_dir: Option<PathBuf>,
        provider: Provider,
    ) -> Self {
        let video_path = video_path.into();
        let output_dir = output_dir.unwrap_or_else(|| {
            video_path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from("."))
        });
        Self {
            video_path,
            output_dir,
            provider,
            skip: None,
            config: Config::default(),
        }
    }

    pub fn with_skip(mut self, skip: Option<Stage>) -> Self {
        self.skip = skip;
        self
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn start_stage(&self) -> Stage {
        self.skip.unwrap_or(Stage::Extract)
    }

    pub fn will_run(&self, stage: Stage) -> bool {
        stage >= self.start_stage()
    }

    pub fn artifacts(&self) -> ArtifactStore {
        ArtifactStore::new(&self.output_dir, &self.video_path)
    }
}

/// The external services a run talks to.
pub struct Collaborators {
    pub extractor: Box<dyn AudioExtractor>,
    pub transcriber: Box<dyn SpeechToText>,
    /// Absent when the run never reaches the analyze stage.
    pub language_model: Option<Box<dyn LanguageModel>>,
    pub template: Box<dyn SummaryTemplate>,
}

impl Collaborators {
    /// ffmpeg, local whisper, the run's hosted model, and the HTML page.
    ///
    /// The API key is only looked up when the run reaches the analyze stage;
    /// an unresolvable key leaves `language_model` empty and the pipeline
    /// rejects the run before any stage starts.
    pub fn standard(run: &PipelineRun, api_key: Option<&str>) -> Self {
        let config = &run.config;
        let language_model = if run.will_run(Stage::Analyze) {
            match run.provider.resolve_api_key(api_key) {
                Ok(key) => Some(
                    Box::new(ChatClient::new(run.provider, key, config)) as Box<dyn LanguageModel>
                ),
                Err(error) => {
                    tracing::debug!(%error, "no API key resolved");
                    None
                }
            }
        } else {
            None
        };

        Self {
            extractor: Box::new(FfmpegExtractor::new(config.ffmpeg_bin())),
            transcriber: Box::new(
                WhisperTranscriber::new(config.whisper_model_dir(), config.whisper_model())
                    .with_language(config.whisper.language.clone()),
            ),
            language_model,
            template: Box::new(HtmlTemplate),
        }
    }
}

/// Progress hooks. Every method defaults to doing nothing.
pub trait PipelineObserver {
    fn stage_skipped(&mut self, _stage: Stage) {}
    fn stage_started(&mut self, _stage: Stage) {}
    fn stage_finished(&mut self, _stage: Stage, _artifacts: &[PathBuf]) {}
    fn stage_failed(&mut self, _stage: Stage, _error: &KeyMomentsError) {}
    fn notice(&mut self, _notice: &Notice) {}
}

pub struct NoopObserver;

impl PipelineObserver for NoopObserver {}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub stages_run: Vec<Stage>,
    pub analysis: Analysis,
    pub notices: Vec<Notice>,
    pub summary_path: PathBuf,
}

/// Why a run ended in [`PipelineState::Failed`] and what it left behind.
#[derive(Debug)]
pub struct PipelineFailure {
    /// `None` when the run was rejected before any stage started.
    pub stage: Option<Stage>,
    pub error: KeyMomentsError,
    pub checkpointed: Vec<(ArtifactKind, PathBuf)>,
    /// Latest stage whose inputs are all checkpointed.
    pub resume_from: Option<Stage>,
}

impl fmt::Display for PipelineFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.stage {
            Some(stage) => write!(f, "{} stage failed: {}", stage, self.error)?,
            None => write!(f, "cannot start pipeline: {}", self.error)?,
        }

        if self.checkpointed.is_empty() {
            write!(f, "\nNo artifacts were checkpointed.")?;
        } else {
            let kinds: Vec<&str> = self.checkpointed.iter().map(|(kind, _)| kind.name()).collect();
            write!(f, "\nCheckpointed artifacts: {}", kinds.join(", "))?;
        }

        match self.resume_from {
            Some(Stage::Extract) | None => Ok(()),
            Some(stage) => write!(f, "\nRetry with --skip {}", stage),
        }
    }
}

impl std::error::Error for PipelineFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

pub struct Pipeline<'a> {
    run: &'a PipelineRun,
    collaborators: &'a Collaborators,
    store: ArtifactStore,
}

impl<'a> Pipeline<'a> {
    pub fn new(run: &'a PipelineRun, collaborators: &'a Collaborators) -> Self {
        Self {
            run,
            collaborators,
            store: run.artifacts(),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub async fn run(
        &self,
        observer: &mut dyn PipelineObserver,
    ) -> std::result::Result<RunReport, PipelineFailure> {
        let start = self.run.start_stage();
        if let Err(error) = self.check_preconditions(start) {
            return Err(self.failure(None, error));
        }

        if let Err(error) = self.invalidate_from(start).await {
            return Err(self.failure(None, error));
        }

        for stage in Stage::ORDER.into_iter().filter(|stage| *stage < start) {
            tracing::info!(%stage, "skipping stage, reusing checkpoint");
            observer.stage_skipped(stage);
        }

        let mut outcome = Outcome::default();
        let mut state = PipelineState::Running(start);

        loop {
            state = match state {
                PipelineState::Running(stage) => {
                    tracing::info!(%stage, "stage started");
                    observer.stage_started(stage);

                    match self.run_stage(stage, &mut outcome, observer).await {
                        Ok(written) => {
                            tracing::info!(%stage, artifacts = written.len(), "stage finished");
                            observer.stage_finished(stage, &written);
                            outcome.stages_run.push(stage);
                            PipelineState::after(stage)
                        }
                        Err(error) => {
                            tracing::error!(%stage, %error, "stage failed");
                            observer.stage_failed(stage, &error);
                            PipelineState::Failed(stage, error)
                        }
                    }
                }
                PipelineState::Failed(stage, error) => {
                    return Err(self.failure(Some(stage), error));
                }
                PipelineState::Done => break,
            };
        }

        Ok(RunReport {
            stages_run: outcome.stages_run,
            analysis: outcome.analysis.unwrap_or_default(),
            notices: outcome.notices,
            summary_path: self.store.path(ArtifactKind::SummaryHtml),
        })
    }

    /// Runs before any stage so a bad skip directive never touches a
    /// collaborator.
    fn check_preconditions(&self, start: Stage) -> Result<()> {
        if start == Stage::Extract && !self.run.video_path.is_file() {
            return Err(KeyMomentsError::InputNotFound {
                path: self.run.video_path.clone(),
            });
        }

        for kind in start.requires() {
            if !self.store.exists(*kind) {
                return Err(KeyMomentsError::MissingArtifact {
                    kind: *kind,
                    path: self.store.path(*kind),
                    producer: kind.producer(),
                });
            }
        }

        if self.run.will_run(Stage::Analyze) && self.collaborators.language_model.is_none() {
            let config = self.run.provider.config();
            return Err(KeyMomentsError::AuthConfig {
                provider: self.run.provider.name(),
                env_var: config.env_var,
            });
        }

        Ok(())
    }

    /// Drop what `start` and later stages wrote in an earlier run, so the
    /// store only ever holds outputs consistent with this run's inputs.
    async fn invalidate_from(&self, start: Stage) -> Result<()> {
        for stage in Stage::ORDER.into_iter().filter(|stage| *stage >= start) {
            for kind in stage.produces() {
                if self.store.exists(*kind) {
                    tracing::debug!(%kind, "removing stale artifact");
                }
                self.store.remove(*kind).await?;
            }
        }
        Ok(())
    }

    fn failure(&self, stage: Option<Stage>, error: KeyMomentsError) -> PipelineFailure {
        let checkpointed: Vec<(ArtifactKind, PathBuf)> = self
            .store
            .checkpointed()
            .into_iter()
            .map(|kind| (kind, self.store.path(kind)))
            .collect();

        let resume_from = Stage::ORDER.into_iter().rev().find(|stage| {
            stage
                .requires()
                .iter()
                .all(|kind| checkpointed.iter().any(|(have, _)| have == kind))
        });

        PipelineFailure {
            stage,
            error,
            checkpointed,
            resume_from,
        }
    }

    async fn run_stage(
        &self,
        stage: Stage,
        outcome: &mut Outcome,
        observer: &mut dyn PipelineObserver,
    ) -> Result<Vec<PathBuf>> {
        match stage {
            Stage::Extract => self.extract().await,
            Stage::Transcribe => self.transcribe().await,
            Stage::Analyze => self.analyze(outcome, observer).await,
            Stage::Generate => self.generate(outcome).await,
        }
    }

    async fn extract(&self) -> Result<Vec<PathBuf>> {
        let partial = self.store.prepare_partial(ArtifactKind::Audio).await?;
        self.collaborators
            .extractor
            .extract(&self.run.video_path, &partial)
            .await?;

        if !partial.is_file() {
            return Err(KeyMomentsError::external(
                Collaborator::AudioExtraction,
                FailureKind::Process,
                "extractor reported success but wrote no audio",
            ));
        }

        Ok(vec![self.store.commit(ArtifactKind::Audio).await?])
    }

    async fn transcribe(&self) -> Result<Vec<PathBuf>> {
        let audio = self.store.path(ArtifactKind::Audio);
        let transcript = self.collaborators.transcriber.transcribe(&audio).await?;
        if transcript.is_empty() {
            tracing::warn!("transcription produced no segments");
        }

        let json = serde_json::to_vec_pretty(&transcript)?;
        let transcript_path = self.store.write(ArtifactKind::TranscriptJson, &json).await?;
        let srt = format_transcript_srt(&transcript);
        let subtitles_path = self
            .store
            .write(ArtifactKind::Subtitles, srt.as_bytes())
            .await?;

        Ok(vec![transcript_path, subtitles_path])
    }

    async fn analyze(
        &self,
        outcome: &mut Outcome,
        observer: &mut dyn PipelineObserver,
    ) -> Result<Vec<PathBuf>> {
        let transcript = self.load_transcript().await?;
        let model = self.collaborators.language_model.as_deref().ok_or_else(|| {
            KeyMomentsError::AuthConfig {
                provider: self.run.provider.name(),
                env_var: self.run.provider.config().env_var,
            }
        })?;

        let request = prompt::build_analysis_prompt(&transcript);
        let raw = model
            .complete(prompt::ANALYSIS_SYSTEM_PROMPT, &request)
            .await?;
        tracing::debug!(response = %raw, "raw analysis response");

        let validated = analysis::validate_response(&raw, &transcript)?;
        for notice in &validated.notices {
            tracing::warn!(%notice, "analysis repaired");
            observer.notice(notice);
        }
        outcome.notices.extend(validated.notices);

        let json = serde_json::to_vec_pretty(&validated.analysis)?;
        let path = self.store.write(ArtifactKind::AnalysisJson, &json).await?;
        Ok(vec![path])
    }

    async fn generate(&self, outcome: &mut Outcome) -> Result<Vec<PathBuf>> {
        let transcript = self.load_transcript().await?;
        let analysis: Analysis =
            serde_json::from_slice(&self.store.read(ArtifactKind::AnalysisJson).await?)?;

        let media_src = relative_media_src(&self.run.video_path, self.store.output_dir());
        let document = render_summary(&analysis, &transcript, self.store.base_name(), &media_src);
        let html = self.collaborators.template.render(&document)?;

        let path = self
            .store
            .write(ArtifactKind::SummaryHtml, html.as_bytes())
            .await?;
        outcome.analysis = Some(analysis);
        Ok(vec![path])
    }

    async fn load_transcript(&self) -> Result<Transcript> {
        let bytes = self.store.read(ArtifactKind::TranscriptJson).await?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[derive(Default)]
struct Outcome {
    stages_run: Vec<Stage>,
    analysis: Option<Analysis>,
    notices: Vec<Notice>,
}
