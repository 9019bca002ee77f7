use crate::{format::format_transcript_srt, types::Transcript};

pub static ANALYSIS_SYSTEM_PROMPT: &str = "You are a meeting analyzer that breaks down discussions into topics, key moments, and takeaways. You only respond with properly formatted JSON.";

static ANALYSIS_INSTRUCTIONS: &str = r#"Analyze this meeting transcript and break it down into major topics.
For each topic, identify its key moments and extract actionable takeaways.
Format your response as a JSON array where each object represents a topic section with this structure:

[
  {
    "topic": "Brief topic description",
    "timestamp": "HH:MM:SS,mmm",
    "key_moments": [
      {
        "description": "Description of an important moment",
        "timestamp": "HH:MM:SS,mmm"
      }
    ],
    "takeaways": [
      "Actionable takeaway or key decision 1",
      "Actionable takeaway or key decision 2"
    ]
  }
]

Important:
- Each topic should be a distinct discussion point or agenda item
- Timestamps must match the exact SRT format from the transcript (HH:MM:SS,mmm)
- A topic's timestamp must not be later than its first key moment
- Key moments should capture significant points, decisions, or transitions
- Takeaways should be actionable items or important conclusions
- Keep descriptions concise but informative"#;

/// User message for the analysis request: instructions plus the transcript
/// rendered as SRT, so the model sees the same timestamps it must echo back.
pub fn build_analysis_prompt(transcript: &Transcript) -> String {
    let language = transcript
        .language
        .as_deref()
        .map(|lang| format!(" (language: {lang})"))
        .unwrap_or_default();

    format!(
        "{}\n\nTranscript{}:\n{}\nRespond only with the JSON array.",
        ANALYSIS_INSTRUCTIONS,
        language,
        format_transcript_srt(transcript)
    )
}
