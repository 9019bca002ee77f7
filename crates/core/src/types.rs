use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::timestamp::TimeOffset;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Word {
    pub word: String,
    pub start: TimeOffset,
    pub end: TimeOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start: TimeOffset,
    pub end: TimeOffset,
    pub text: String,
    #[serde(default)]
    pub words: Vec<Word>,
}

/// Ordered transcript segments plus the detected language.
///
/// On disk a transcript is just the segment array; the language tag only
/// lives for the run that produced it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    pub language: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

impl Transcript {
    /// Build a transcript that upholds the segment invariants: segments are
    /// ordered by start, no segment ends before it starts, and words sit
    /// inside their segment.
    pub fn from_segments(language: Option<String>, mut segments: Vec<TranscriptSegment>) -> Self {
        segments.sort_by_key(|segment| segment.start);
        for segment in &mut segments {
            segment.end = segment.end.max(segment.start);
            let (start, end) = (segment.start, segment.end);
            segment
                .words
                .retain(|word| word.start >= start && word.end <= end && word.start <= word.end);
        }
        Transcript { language, segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn start(&self) -> TimeOffset {
        self.segments
            .first()
            .map(|segment| segment.start)
            .unwrap_or(TimeOffset::ZERO)
    }

    pub fn end(&self) -> TimeOffset {
        self.segments
            .iter()
            .map(|segment| segment.end)
            .max()
            .unwrap_or(TimeOffset::ZERO)
    }

    pub fn text(&self) -> String {
        self.segments
            .iter()
            .map(|segment| segment.text.trim())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

impl Serialize for Transcript {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.segments.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Transcript {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let segments = Vec::<TranscriptSegment>::deserialize(deserializer)?;
        Ok(Transcript::from_segments(None, segments))
    }
}

pub type Takeaway = String;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyMoment {
    pub description: String,
    pub timestamp: TimeOffset,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    #[serde(rename = "topic")]
    pub title: String,
    pub timestamp: TimeOffset,
    pub key_moments: Vec<KeyMoment>,
    pub takeaways: Vec<Takeaway>,
}

/// Topics in timestamp order, as persisted in the analysis artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Analysis {
    pub topics: Vec<Topic>,
}

impl Analysis {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
    }

    pub fn moment_count(&self) -> usize {
        self.topics.iter().map(|topic| topic.key_moments.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transcript_serializes_as_segment_array() {
        let transcript = Transcript::from_segments(
            Some("en".to_string()),
            vec![TranscriptSegment {
                start: TimeOffset::from_millis(1_000),
                end: TimeOffset::from_millis(2_500),
                text: "Hello".to_string(),
                words: vec![Word {
                    word: "Hello".to_string(),
                    start: TimeOffset::from_millis(1_000),
                    end: TimeOffset::from_millis(1_400),
                }],
            }],
        );

        let json: serde_json::Value = serde_json::to_value(&transcript).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{
                "start": "00:00:01,000",
                "end": "00:00:02,500",
                "text": "Hello",
                "words": [{"word": "Hello", "start": "00:00:01,000", "end": "00:00:01,400"}]
            }])
        );

        let back: Transcript = serde_json::from_value(json).unwrap();
        assert_eq!(back.segments, transcript.segments);
        assert_eq!(back.language, None);
    }

    #[test]
    fn from_segments_restores_invariants() {
        let seg = |start, end, words: Vec<(u64, u64)>| TranscriptSegment {
            start: TimeOffset::from_millis(start),
            end: TimeOffset::from_millis(end),
            text: String::new(),
            words: words
                .into_iter()
                .map(|(s, e)| Word {
                    word: "w".to_string(),
                    start: TimeOffset::from_millis(s),
                    end: TimeOffset::from_millis(e),
                })
                .collect(),
        };
        let transcript = Transcript::from_segments(
            None,
            vec![seg(5_000, 4_000, vec![]), seg(0, 2_000, vec![(0, 500), (1_900, 2_100)])],
        );

        assert_eq!(transcript.segments[0].start, TimeOffset::ZERO);
        assert_eq!(transcript.segments[0].words.len(), 1);
        assert_eq!(transcript.segments[1].end, TimeOffset::from_millis(5_000));
        assert_eq!(transcript.end(), TimeOffset::from_millis(5_000));
    }

    #[test]
    fn analysis_uses_topic_field_name() {
        let analysis = Analysis {
            topics: vec![Topic {
                title: "Budget".to_string(),
                timestamp: TimeOffset::from_millis(150_500),
                key_moments: vec![KeyMoment {
                    description: "Approved".to_string(),
                    timestamp: TimeOffset::from_millis(165_000),
                }],
                takeaways: vec!["Ship it".to_string()],
            }],
        };
        let json = serde_json::to_value(&analysis).unwrap();
        assert_eq!(json[0]["topic"], "Budget");
        assert_eq!(json[0]["timestamp"], "00:02:30,500");
        assert_eq!(json[0]["key_moments"][0]["timestamp"], "00:02:45,000");
    }
}
