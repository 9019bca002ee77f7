use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::{fs, process::Command};
use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::{
    collaborators::SpeechToText,
    error::{Collaborator, FailureKind, KeyMomentsError, Result},
    extract::stderr_tail,
    timestamp::TimeOffset,
    types::{Transcript, TranscriptSegment},
};

const MODEL_BASE_URL: &str = "https://huggingface.co/ggerganov/whisper.cpp/resolve/main";

fn transcription_error(kind: FailureKind, message: impl Into<String>) -> KeyMomentsError {
    KeyMomentsError::external(Collaborator::Transcription, kind, message)
}

/// Download `model` into `model_dir` unless it is already there.
pub async fn ensure_model(model_dir: &Path, model: &str) -> Result<PathBuf> {
    let model_path = model_dir.join(model);
    if model_path.is_file() {
        return Ok(model_path);
    }

    fs::create_dir_all(model_dir).await?;
    let download_url = format!("{}/{}", MODEL_BASE_URL, model);
    let partial = model_dir.join(format!("{model}.partial"));
    tracing::info!(url = %download_url, "downloading whisper model");

    let output = Command::new("curl")
        .arg("-L")
        .arg("--fail")
        .arg("--silent")
        .arg("--show-error")
        .arg(&download_url)
        .arg("-o")
        .arg(&partial)
        .output()
        .await
        .map_err(|e| transcription_error(FailureKind::Process, format!("could not start curl: {e}")))?;

    if !output.status.success() {
        let _ = fs::remove_file(&partial).await;
        return Err(transcription_error(
            FailureKind::Network,
            format!(
                "model download from {} failed: {}",
                download_url,
                stderr_tail(&output.stderr)
            ),
        ));
    }

    fs::rename(&partial, &model_path).await?;
    Ok(model_path)
}

extern "C" fn whisper_log_callback(
    _level: u32,
    _message: *const std::ffi::c_char,
    _user_data: *mut std::ffi::c_void,
) {
    // silent
}

/// Stop whisper.cpp from printing model-loading chatter to stderr.
pub fn silence_backend_logs() {
    unsafe {
        whisper_rs::set_log_callback(Some(whisper_log_callback), std::ptr::null_mut());
    }
}

/// Local whisper.cpp transcription. The model is fetched on first use.
pub struct WhisperTranscriber {
    model_dir: PathBuf,
    model: String,
    language: Option<String>,
    use_gpu: bool,
}

impl WhisperTranscriber {
    pub fn new(model_dir: impl Into<PathBuf>, model: impl Into<String>) -> Self {
        Self {
            model_dir: model_dir.into(),
            model: model.into(),
            language: None,
            use_gpu: cfg!(feature = "cuda"),
        }
    }

    /// Force a spoken language instead of auto-detecting.
    pub fn with_language(mut self, language: Option<String>) -> Self {
        self.language = language;
        self
    }
}

#[async_trait]
impl SpeechToText for WhisperTranscriber {
    async fn transcribe(&self, audio: &Path) -> Result<Transcript> {
        let model_path = ensure_model(&self.model_dir, &self.model).await?;
        let audio = audio.to_path_buf();
        let language = self.language.clone();
        let use_gpu = self.use_gpu;

        tokio::task::spawn_blocking(move || {
            run_whisper(&model_path, &audio, language.as_deref(), use_gpu)
        })
        .await
        .map_err(|e| transcription_error(FailureKind::Process, format!("worker panicked: {e}")))?
    }
}

fn read_samples(audio: &Path) -> Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(audio).map_err(|e| {
        transcription_error(
            FailureKind::InvalidResponse,
            format!("cannot read {}: {}", audio.display(), e),
        )
    })?;

    reader
        .samples::<i16>()
        .map(|sample| sample.map(|s| s as f32 / i16::MAX as f32))
        .collect::<std::result::Result<Vec<f32>, _>>()
        .map_err(|e| {
            transcription_error(
                FailureKind::InvalidResponse,
                format!("corrupt audio in {}: {}", audio.display(), e),
            )
        })
}

fn run_whisper(
    model_path: &Path,
    audio: &Path,
    language: Option<&str>,
    use_gpu: bool,
) -> Result<Transcript> {
    let samples = read_samples(audio)?;

    let model_path_str = model_path.to_str().ok_or_else(|| {
        transcription_error(
            FailureKind::Process,
            format!("model path is not valid UTF-8: {}", model_path.display()),
        )
    })?;

    let ctx_params = WhisperContextParameters {
        use_gpu,
        flash_attn: use_gpu,
        ..Default::default()
    };
    let ctx = WhisperContext::new_with_params(model_path_str, ctx_params).map_err(|e| {
        transcription_error(FailureKind::Process, format!("failed to load model: {e}"))
    })?;

    let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 5 });
    params.set_language(Some(language.unwrap_or("auto")));
    params.set_print_progress(false);
    params.set_print_realtime(false);
    params.set_print_special(false);

    let mut state = ctx.create_state().map_err(|e| {
        transcription_error(FailureKind::Process, format!("failed to create state: {e}"))
    })?;
    state.full(params, &samples).map_err(|e| {
        transcription_error(FailureKind::Process, format!("whisper run failed: {e}"))
    })?;

    let mut segments = Vec::new();
    for segment in state.as_iter() {
        let text = match segment.to_str() {
            Ok(text) => text.trim().to_string(),
            Err(_) => continue,
        };
        if text.is_empty() {
            continue;
        }
        segments.push(TranscriptSegment {
            start: TimeOffset::from_centis(segment.start_timestamp().max(0) as u64),
            end: TimeOffset::from_centis(segment.end_timestamp().max(0) as u64),
            text,
            words: Vec::new(),
        });
    }

    let language = whisper_rs::get_lang_str(state.full_lang_id_from_state()).map(str::to_string);
    tracing::debug!(segments = segments.len(), ?language, "whisper finished");

    Ok(Transcript::from_segments(language, segments))
}
