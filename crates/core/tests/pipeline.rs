use std::{
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use keymoments_core::{
    ArtifactKind, AudioExtractor, Collaborator, Collaborators, FailureKind, HtmlTemplate,
    KeyMomentsError, LanguageModel, Notice, NoopObserver, Pipeline, PipelineObserver,
    PipelineRun, Provider, Result, SpeechToText, Stage, TimeOffset, Transcript,
    TranscriptSegment,
};
use tempfile::TempDir;

const ANALYSIS: &str = r#"[
  {
    "topic": "Budget review",
    "timestamp": "00:02:30,500",
    "key_moments": [
      { "description": "Budget approved", "timestamp": "00:02:45,000" }
    ],
    "takeaways": ["Finance sends the final numbers"]
  },
  {
    "topic": "Hiring",
    "timestamp": "00:06:00,000",
    "key_moments": [
      { "description": "Two roles opened", "timestamp": "00:06:10,000" }
    ],
    "takeaways": []
  }
]"#;

#[derive(Default, Clone)]
struct Calls {
    extract: Arc<AtomicUsize>,
    transcribe: Arc<AtomicUsize>,
    complete: Arc<AtomicUsize>,
}

impl Calls {
    fn total(&self) -> usize {
        self.extract.load(Ordering::SeqCst)
            + self.transcribe.load(Ordering::SeqCst)
            + self.complete.load(Ordering::SeqCst)
    }
}

struct FakeExtractor(Arc<AtomicUsize>);

#[async_trait]
impl AudioExtractor for FakeExtractor {
    async fn extract(&self, _video: &Path, audio_out: &Path) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        tokio::fs::write(audio_out, b"RIFF").await?;
        Ok(())
    }
}

struct FakeTranscriber(Arc<AtomicUsize>);

#[async_trait]
impl SpeechToText for FakeTranscriber {
    async fn transcribe(&self, _audio: &Path) -> Result<Transcript> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(ten_minute_transcript())
    }
}

struct FakeModel {
    calls: Arc<AtomicUsize>,
    response: std::result::Result<String, FailureKind>,
}

#[async_trait]
impl LanguageModel for FakeModel {
    async fn complete(&self, _system: &str, prompt: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(prompt.contains("00:02:00,000 --> 00:03:00,000"));
        match &self.response {
            Ok(text) => Ok(text.clone()),
            Err(kind) => Err(KeyMomentsError::external(
                Collaborator::LanguageModel,
                *kind,
                "provider said no",
            )),
        }
    }
}

fn ten_minute_transcript() -> Transcript {
    let segments = (0..10u64)
        .map(|minute| TranscriptSegment {
            start: TimeOffset::from_millis(minute * 60_000),
            end: TimeOffset::from_millis((minute + 1) * 60_000),
            text: format!("minute {minute}"),
            words: Vec::new(),
        })
        .collect();
    Transcript::from_segments(Some("en".to_string()), segments)
}

fn collaborators(
    calls: &Calls,
    response: Option<std::result::Result<&str, FailureKind>>,
) -> Collaborators {
    Collaborators {
        extractor: Box::new(FakeExtractor(calls.extract.clone())),
        transcriber: Box::new(FakeTranscriber(calls.transcribe.clone())),
        language_model: response.map(|response| {
            Box::new(FakeModel {
                calls: calls.complete.clone(),
                response: response.map(str::to_string),
            }) as Box<dyn LanguageModel>
        }),
        template: Box::new(HtmlTemplate),
    }
}

struct Workspace {
    _dir: TempDir,
    video: PathBuf,
    out: PathBuf,
}

fn workspace() -> Workspace {
    let dir = tempfile::tempdir().unwrap();
    let video = dir.path().join("videos").join("standup.mp4");
    std::fs::create_dir_all(video.parent().unwrap()).unwrap();
    std::fs::write(&video, b"not really a video").unwrap();
    let out = dir.path().join("out");
    Workspace {
        _dir: dir,
        video,
        out,
    }
}

fn run_for(ws: &Workspace, skip: Option<Stage>) -> PipelineRun {
    PipelineRun::new(&ws.video, Some(ws.out.clone()), Provider::Anthropic).with_skip(skip)
}

#[derive(Default)]
struct Recorder {
    skipped: Vec<Stage>,
    started: Vec<Stage>,
    notices: Vec<Notice>,
}

impl PipelineObserver for Recorder {
    fn stage_skipped(&mut self, stage: Stage) {
        self.skipped.push(stage);
    }

    fn stage_started(&mut self, stage: Stage) {
        self.started.push(stage);
    }

    fn notice(&mut self, notice: &Notice) {
        self.notices.push(notice.clone());
    }
}

#[tokio::test]
async fn full_run_checkpoints_every_artifact() {
    let ws = workspace();
    let calls = Calls::default();
    let run = run_for(&ws, None);
    let collaborators = collaborators(&calls, Some(Ok(ANALYSIS)));
    let pipeline = Pipeline::new(&run, &collaborators);

    let report = pipeline.run(&mut NoopObserver).await.unwrap();

    assert_eq!(report.stages_run, Stage::ORDER.to_vec());
    assert_eq!(report.analysis.topics.len(), 2);
    assert!(report.notices.is_empty());
    assert_eq!(report.summary_path, ws.out.join("standup_summary.html"));
    for kind in ArtifactKind::ALL {
        assert!(pipeline.store().exists(kind), "{kind} missing");
    }

    let srt = std::fs::read_to_string(ws.out.join("standup_subtitles.srt")).unwrap();
    assert!(srt.starts_with("1\n00:00:00,000 --> 00:01:00,000\nminute 0\n"));

    let html = std::fs::read_to_string(&report.summary_path).unwrap();
    assert!(html.contains("<source src=\"../videos/standup.mp4\">"));
    assert!(html.contains("data-seek=\"150.500\""));
    assert!(html.contains("data-seek=\"165.000\""));

    let persisted = std::fs::read_to_string(ws.out.join("standup_analysis.json")).unwrap();
    assert!(persisted.contains("\"timestamp\": \"00:02:45,000\""));
}

#[tokio::test]
async fn skip_generate_rerenders_byte_identical_summary() {
    let ws = workspace();
    let calls = Calls::default();

    let first_run = run_for(&ws, None);
    let first = collaborators(&calls, Some(Ok(ANALYSIS)));
    let report = Pipeline::new(&first_run, &first)
        .run(&mut NoopObserver)
        .await
        .unwrap();
    let before = std::fs::read(&report.summary_path).unwrap();
    let calls_after_first = calls.total();

    let rerun = run_for(&ws, Some(Stage::Generate));
    let second = collaborators(&calls, None);
    let mut recorder = Recorder::default();
    let report = Pipeline::new(&rerun, &second)
        .run(&mut recorder)
        .await
        .unwrap();

    assert_eq!(std::fs::read(&report.summary_path).unwrap(), before);
    assert_eq!(calls.total(), calls_after_first);
    assert_eq!(report.stages_run, vec![Stage::Generate]);
    assert_eq!(
        recorder.skipped,
        vec![Stage::Extract, Stage::Transcribe, Stage::Analyze]
    );
    assert_eq!(report.analysis.topics[0].title, "Budget review");
}

#[tokio::test]
async fn skip_analyze_without_transcript_invokes_nothing() {
    let ws = workspace();
    let calls = Calls::default();
    let run = run_for(&ws, Some(Stage::Analyze));
    let collaborators = collaborators(&calls, Some(Ok(ANALYSIS)));
    let mut recorder = Recorder::default();

    let failure = Pipeline::new(&run, &collaborators)
        .run(&mut recorder)
        .await
        .unwrap_err();

    assert!(failure.stage.is_none());
    match &failure.error {
        KeyMomentsError::MissingArtifact { kind, producer, .. } => {
            assert_eq!(*kind, ArtifactKind::TranscriptJson);
            assert_eq!(*producer, Stage::Transcribe);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(failure.to_string().contains("transcript-json"));
    assert_eq!(calls.total(), 0);
    assert!(recorder.started.is_empty());
    assert!(failure.checkpointed.is_empty());
}

#[tokio::test]
async fn model_failure_reports_checkpoints_for_retry() {
    let ws = workspace();
    let calls = Calls::default();
    let run = run_for(&ws, None);
    let collaborators = collaborators(&calls, Some(Err(FailureKind::RateLimited)));

    let failure = Pipeline::new(&run, &collaborators)
        .run(&mut NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Some(Stage::Analyze));
    assert!(matches!(
        failure.error,
        KeyMomentsError::External {
            kind: FailureKind::RateLimited,
            ..
        }
    ));
    let kinds: Vec<ArtifactKind> = failure.checkpointed.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::Audio,
            ArtifactKind::TranscriptJson,
            ArtifactKind::Subtitles
        ]
    );
    assert_eq!(failure.resume_from, Some(Stage::Analyze));
    assert!(failure.to_string().contains("--skip analyze"));
    assert!(!ws.out.join("standup_analysis.json").exists());
    assert!(!ws.out.join("standup_summary.html").exists());
}

#[tokio::test]
async fn skip_transcribe_reuses_existing_audio() {
    let ws = workspace();
    std::fs::create_dir_all(&ws.out).unwrap();
    std::fs::write(ws.out.join("standup_audio.wav"), b"RIFF").unwrap();

    let calls = Calls::default();
    let run = run_for(&ws, Some(Stage::Transcribe));
    let collaborators = collaborators(&calls, Some(Ok(ANALYSIS)));

    let report = Pipeline::new(&run, &collaborators)
        .run(&mut NoopObserver)
        .await
        .unwrap();

    assert_eq!(calls.extract.load(Ordering::SeqCst), 0);
    assert_eq!(calls.transcribe.load(Ordering::SeqCst), 1);
    assert_eq!(
        report.stages_run,
        vec![Stage::Transcribe, Stage::Analyze, Stage::Generate]
    );
}

#[tokio::test]
async fn missing_api_key_is_rejected_before_extraction() {
    let ws = workspace();
    let calls = Calls::default();
    let run = run_for(&ws, None);
    let collaborators = collaborators(&calls, None);

    let failure = Pipeline::new(&run, &collaborators)
        .run(&mut NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        KeyMomentsError::AuthConfig {
            env_var: "ANTHROPIC_API_KEY",
            ..
        }
    ));
    assert_eq!(calls.total(), 0);
}

#[tokio::test]
async fn missing_video_fails_without_running_stages() {
    let ws = workspace();
    std::fs::remove_file(&ws.video).unwrap();
    let calls = Calls::default();
    let run = run_for(&ws, None);
    let collaborators = collaborators(&calls, Some(Ok(ANALYSIS)));

    let failure = Pipeline::new(&run, &collaborators)
        .run(&mut NoopObserver)
        .await
        .unwrap_err();

    assert!(matches!(failure.error, KeyMomentsError::InputNotFound { .. }));
    assert_eq!(calls.total(), 0);
}

#[tokio::test]
async fn repaired_response_surfaces_notices() {
    let ws = workspace();
    let calls = Calls::default();
    let run = run_for(&ws, None);
    let truncated = format!(
        "Here is the analysis:\n{}",
        &ANALYSIS[..ANALYSIS.find("\"Hiring\"").unwrap()]
    );
    let collaborators = collaborators(&calls, Some(Ok(truncated.as_str())));
    let mut recorder = Recorder::default();

    let report = Pipeline::new(&run, &collaborators)
        .run(&mut recorder)
        .await
        .unwrap();

    assert_eq!(report.analysis.topics.len(), 1);
    assert_eq!(report.analysis.topics[0].title, "Budget review");
    assert!(
        recorder
            .notices
            .iter()
            .any(|notice| matches!(notice, Notice::TruncatedResponse { kept: 1 }))
    );
    assert_eq!(recorder.notices, report.notices);
}

#[tokio::test]
async fn unsalvageable_response_fails_analyze_with_raw_text() {
    let ws = workspace();
    let calls = Calls::default();
    let run = run_for(&ws, None);
    let collaborators = collaborators(&calls, Some(Ok("I could not analyze this meeting.")));

    let failure = Pipeline::new(&run, &collaborators)
        .run(&mut NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Some(Stage::Analyze));
    match failure.error {
        KeyMomentsError::AnalysisParse { raw, .. } => {
            assert_eq!(raw, "I could not analyze this meeting.")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn rerun_failure_does_not_report_previous_outputs() {
    let ws = workspace();
    let calls = Calls::default();

    let first_run = run_for(&ws, None);
    let first = collaborators(&calls, Some(Ok(ANALYSIS)));
    Pipeline::new(&first_run, &first)
        .run(&mut NoopObserver)
        .await
        .unwrap();

    let rerun = run_for(&ws, None);
    let second = collaborators(&calls, Some(Err(FailureKind::RateLimited)));
    let failure = Pipeline::new(&rerun, &second)
        .run(&mut NoopObserver)
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Some(Stage::Analyze));
    assert_eq!(failure.resume_from, Some(Stage::Analyze));
    let kinds: Vec<ArtifactKind> = failure.checkpointed.iter().map(|(kind, _)| *kind).collect();
    assert_eq!(
        kinds,
        vec![
            ArtifactKind::Audio,
            ArtifactKind::TranscriptJson,
            ArtifactKind::Subtitles
        ]
    );
    assert!(!failure.to_string().contains("--skip generate"));
    assert!(!ws.out.join("standup_analysis.json").exists());
    assert!(!ws.out.join("standup_summary.html").exists());
}

#[tokio::test]
async fn skip_generate_without_analysis_invokes_nothing() {
    let ws = workspace();
    std::fs::create_dir_all(&ws.out).unwrap();
    let transcript = serde_json::to_vec(&ten_minute_transcript()).unwrap();
    std::fs::write(ws.out.join("standup_transcript.json"), transcript).unwrap();

    let calls = Calls::default();
    let run = run_for(&ws, Some(Stage::Generate));
    let collaborators = collaborators(&calls, None);
    let mut recorder = Recorder::default();

    let failure = Pipeline::new(&run, &collaborators)
        .run(&mut recorder)
        .await
        .unwrap_err();

    assert!(failure.stage.is_none());
    match &failure.error {
        KeyMomentsError::MissingArtifact { kind, producer, .. } => {
            assert_eq!(*kind, ArtifactKind::AnalysisJson);
            assert_eq!(*producer, Stage::Analyze);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(calls.total(), 0);
    assert!(recorder.started.is_empty());
    assert_eq!(failure.resume_from, Some(Stage::Analyze));
}
