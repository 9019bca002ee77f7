use crate::types::{Analysis, Transcript};

/// Render a transcript as numbered SRT cues.
pub fn format_transcript_srt(transcript: &Transcript) -> String {
    let mut output = String::new();
    for (i, segment) in transcript.segments.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            segment.start.to_subtitle_time(),
            segment.end.to_subtitle_time()
        ));
        output.push_str(segment.text.trim());
        output.push_str("\n\n");
    }
    output
}

/// Format an analysis as a readable terminal outline
pub fn format_analysis_readable(analysis: &Analysis) -> String {
    let mut output = String::new();

    for topic in &analysis.topics {
        output.push_str(&format!(
            "## [{}] {}\n\n",
            topic.timestamp.to_clock_string(),
            topic.title
        ));

        for moment in &topic.key_moments {
            output.push_str(&format!(
                "  [{}] {}\n",
                moment.timestamp.to_clock_string(),
                moment.description
            ));
        }
        if !topic.key_moments.is_empty() {
            output.push('\n');
        }

        for takeaway in &topic.takeaways {
            output.push_str(&format!("  • {}\n", takeaway));
        }
        output.push('\n');
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        timestamp::TimeOffset,
        types::{KeyMoment, Topic, TranscriptSegment},
    };

    #[test]
    fn srt_cues_are_numbered() {
        let transcript = Transcript::from_segments(
            None,
            vec![
                TranscriptSegment {
                    start: TimeOffset::ZERO,
                    end: TimeOffset::from_millis(5_000),
                    text: " Welcome to our project meeting.".to_string(),
                    words: Vec::new(),
                },
                TranscriptSegment {
                    start: TimeOffset::from_millis(5_000),
                    end: TimeOffset::from_millis(10_000),
                    text: "Today we'll discuss the roadmap.".to_string(),
                    words: Vec::new(),
                },
            ],
        );

        assert_eq!(
            format_transcript_srt(&transcript),
            "1\n00:00:00,000 --> 00:00:05,000\nWelcome to our project meeting.\n\n\
             2\n00:00:05,000 --> 00:00:10,000\nToday we'll discuss the roadmap.\n\n"
        );
    }

    #[test]
    fn readable_outline_uses_clock_labels() {
        let analysis = Analysis {
            topics: vec![Topic {
                title: "Roadmap".to_string(),
                timestamp: TimeOffset::from_millis(150_500),
                key_moments: vec![KeyMoment {
                    description: "Phase one done".to_string(),
                    timestamp: TimeOffset::from_millis(165_000),
                }],
                takeaways: vec!["Plan phase two".to_string()],
            }],
        };
        let text = format_analysis_readable(&analysis);
        assert!(text.contains("## [02:30] Roadmap"));
        assert!(text.contains("  [02:45] Phase one done"));
        assert!(text.contains("  • Plan phase two"));
    }
}
