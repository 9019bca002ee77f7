//! Navigation data for the summary page: one record per topic, each topic
//! and key moment carrying an anchor the player can seek to.

use std::{
    collections::HashMap,
    path::{Component, Path, PathBuf},
};

use serde::Serialize;

use crate::{
    timestamp::{TimeOffset, nearest_segment},
    types::{Analysis, Transcript},
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Anchor {
    /// Unique within the document.
    pub id: String,
    /// Seconds from video start, clamped to the transcript duration.
    pub seek_seconds: f64,
    /// `MM:SS` or `HH:MM:SS` label for display.
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MomentRecord {
    pub anchor: Anchor,
    pub description: String,
    /// Text of the transcript segment the moment falls in.
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopicRecord {
    pub anchor: Anchor,
    pub title: String,
    pub key_moments: Vec<MomentRecord>,
    pub takeaways: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryDocument {
    pub title: String,
    /// Video source as referenced from the summary page.
    pub media_src: String,
    pub duration_seconds: f64,
    pub topics: Vec<TopicRecord>,
}

/// Hands out anchor ids. A repeated base id gets `-2`, `-3`, ... in document
/// order, so identical timestamps still yield distinct, stable ids.
#[derive(Default)]
struct AnchorIds {
    seen: HashMap<String, usize>,
}

impl AnchorIds {
    fn next(&mut self, prefix: &str, at: TimeOffset) -> String {
        let base = format!("{}-{}", prefix, at.as_millis());
        let count = self.seen.entry(base.clone()).or_insert(0);
        *count += 1;
        if *count == 1 {
            base
        } else {
            format!("{}-{}", base, count)
        }
    }
}

pub fn render_summary(
    analysis: &Analysis,
    transcript: &Transcript,
    title: &str,
    media_src: &str,
) -> SummaryDocument {
    let duration = transcript.end();
    let mut ids = AnchorIds::default();

    let mut anchor = |prefix: &str, at: TimeOffset| {
        let at = at.min(duration);
        Anchor {
            id: ids.next(prefix, at),
            seek_seconds: at.to_seconds(),
            label: at.to_clock_string(),
        }
    };

    let topics = analysis
        .topics
        .iter()
        .map(|topic| {
            let topic_anchor = anchor("topic", topic.timestamp);
            let key_moments = topic
                .key_moments
                .iter()
                .map(|moment| MomentRecord {
                    anchor: anchor("moment", moment.timestamp),
                    description: moment.description.clone(),
                    context: nearest_segment(transcript, moment.timestamp)
                        .map(|segment| segment.text.trim().to_string())
                        .filter(|text| !text.is_empty()),
                })
                .collect();
            TopicRecord {
                anchor: topic_anchor,
                title: topic.title.clone(),
                key_moments,
                takeaways: topic.takeaways.clone(),
            }
        })
        .collect();

    SummaryDocument {
        title: title.to_string(),
        media_src: media_src.to_string(),
        duration_seconds: duration.to_seconds(),
        topics,
    }
}

/// Path of `media` relative to `from_dir` as a URL: `/` separators, each
/// segment percent-encoded so names with `#`, `?` or `%` stay intact.
pub fn relative_media_src(media: &Path, from_dir: &Path) -> String {
    let absolute = |p: &Path| std::path::absolute(p).unwrap_or_else(|_| p.to_path_buf());
    let media = normalize(&absolute(media));
    let from_dir = normalize(&absolute(from_dir));

    let media_parts: Vec<Component> = media.components().collect();
    let dir_parts: Vec<Component> = from_dir.components().collect();
    let common = media_parts
        .iter()
        .zip(&dir_parts)
        .take_while(|(a, b)| a == b)
        .count();

    // Different roots (e.g. another drive): fall back to the absolute path.
    if common == 0 {
        let mut out = String::new();
        for component in media_parts {
            match component {
                Component::Prefix(prefix) => {
                    out.push_str(&prefix.as_os_str().to_string_lossy().replace('\\', "/"))
                }
                Component::RootDir => out.push('/'),
                other => {
                    if !out.is_empty() && !out.ends_with('/') {
                        out.push('/');
                    }
                    out.push_str(&encode_segment(other));
                }
            }
        }
        return out;
    }

    let mut parts: Vec<String> = vec!["..".to_string(); dir_parts.len() - common];
    parts.extend(media_parts[common..].iter().map(|c| encode_segment(*c)));
    parts.join("/")
}

fn encode_segment(component: Component) -> String {
    urlencoding::encode(&component.as_os_str().to_string_lossy()).into_owned()
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
