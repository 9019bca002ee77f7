//! Turning raw language-model output into a validated [`Analysis`].

pub mod prompt;
pub mod repair;

use std::fmt;

use serde_json::Value;

use crate::{
    error::{KeyMomentsError, Result},
    timestamp::TimeOffset,
    types::{Analysis, KeyMoment, Topic, Transcript},
};

/// Something the validator repaired or discarded on the way.
#[derive(Debug, Clone, PartialEq)]
pub enum Notice {
    ProseStripped,
    TruncatedResponse {
        kept: usize,
    },
    WrapperUnwrapped,
    RangeCheckSkipped,
    TopicDropped {
        index: usize,
        reason: String,
    },
    MomentDropped {
        topic: String,
        index: usize,
        reason: String,
    },
    TakeawayDropped {
        topic: String,
        index: usize,
    },
    MomentsReordered {
        topic: String,
    },
    TopicTimestampLowered {
        topic: String,
        from: TimeOffset,
        to: TimeOffset,
    },
    TopicsReordered,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::ProseStripped => write!(f, "stripped text around the JSON payload"),
            Notice::TruncatedResponse { kept } => write!(
                f,
                "response was truncated; kept {} complete topic{}",
                kept,
                if *kept == 1 { "" } else { "s" }
            ),
            Notice::WrapperUnwrapped => write!(f, "unwrapped topics from a top-level object"),
            Notice::RangeCheckSkipped => {
                write!(f, "transcript is empty; key moment range check skipped")
            }
            Notice::TopicDropped { index, reason } => {
                write!(f, "dropped topic #{}: {}", index + 1, reason)
            }
            Notice::MomentDropped {
                topic,
                index,
                reason,
            } => write!(
                f,
                "dropped key moment #{} of {:?}: {}",
                index + 1,
                topic,
                reason
            ),
            Notice::TakeawayDropped { topic, index } => write!(
                f,
                "dropped takeaway #{} of {:?}: not a string",
                index + 1,
                topic
            ),
            Notice::MomentsReordered { topic } => {
                write!(f, "sorted key moments of {:?} by timestamp", topic)
            }
            Notice::TopicTimestampLowered { topic, from, to } => write!(
                f,
                "moved {:?} from {} to {} to precede its first key moment",
                topic, from, to
            ),
            Notice::TopicsReordered => write!(f, "sorted topics by timestamp"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedAnalysis {
    pub analysis: Analysis,
    pub notices: Vec<Notice>,
}

/// Parse, repair, and validate a raw model response against the transcript
/// it was produced from.
pub fn validate_response(raw: &str, transcript: &Transcript) -> Result<ValidatedAnalysis> {
    let parse_error = |reason: String| KeyMomentsError::AnalysisParse {
        reason,
        raw: raw.to_string(),
    };

    let (value, mut notices) = repair::recover_json(raw).map_err(|e| parse_error(e.0))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("topics") {
            Some(Value::Array(items)) => {
                notices.push(Notice::WrapperUnwrapped);
                items
            }
            _ => return Err(parse_error("expected a JSON array of topics".to_string())),
        },
        _ => return Err(parse_error("expected a JSON array of topics".to_string())),
    };

    let bounds = if transcript.is_empty() {
        notices.push(Notice::RangeCheckSkipped);
        None
    } else {
        Some((transcript.start(), transcript.end()))
    };

    let mut topics: Vec<Topic> = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| validate_topic(item, index, bounds, &mut notices))
        .collect();

    if topics.is_empty() {
        return Err(parse_error("response contained no valid topics".to_string()));
    }

    if !topics.is_sorted_by_key(|topic| topic.timestamp) {
        topics.sort_by_key(|topic| topic.timestamp);
        notices.push(Notice::TopicsReordered);
    }

    Ok(ValidatedAnalysis {
        analysis: Analysis { topics },
        notices,
    })
}

fn validate_topic(
    item: &Value,
    index: usize,
    bounds: Option<(TimeOffset, TimeOffset)>,
    notices: &mut Vec<Notice>,
) -> Option<Topic> {
    let dropped = |notices: &mut Vec<Notice>, reason: String| {
        notices.push(Notice::TopicDropped { index, reason });
        None
    };

    let Some(fields) = item.as_object() else {
        return dropped(notices, "not an object".to_string());
    };

    let title = match fields
        .get("topic")
        .or_else(|| fields.get("title"))
        .and_then(Value::as_str)
        .map(str::trim)
    {
        Some(title) if !title.is_empty() => title.to_string(),
        _ => return dropped(notices, "missing \"topic\"".to_string()),
    };

    let mut timestamp = match fields.get("timestamp").and_then(Value::as_str) {
        Some(raw) => match TimeOffset::parse_subtitle_time(raw.trim()) {
            Ok(timestamp) => timestamp,
            Err(e) => return dropped(notices, e.to_string()),
        },
        None => return dropped(notices, "missing \"timestamp\"".to_string()),
    };

    let Some(raw_moments) = fields.get("key_moments").and_then(Value::as_array) else {
        return dropped(notices, "missing \"key_moments\" list".to_string());
    };
    let Some(raw_takeaways) = fields.get("takeaways").and_then(Value::as_array) else {
        return dropped(notices, "missing \"takeaways\" list".to_string());
    };

    let mut key_moments = Vec::with_capacity(raw_moments.len());
    for (moment_index, raw) in raw_moments.iter().enumerate() {
        match validate_moment(raw, bounds) {
            Ok(moment) => key_moments.push(moment),
            Err(reason) => notices.push(Notice::MomentDropped {
                topic: title.clone(),
                index: moment_index,
                reason,
            }),
        }
    }

    if !key_moments.is_sorted_by_key(|moment| moment.timestamp) {
        key_moments.sort_by_key(|moment| moment.timestamp);
        notices.push(Notice::MomentsReordered {
            topic: title.clone(),
        });
    }

    if let Some(first) = key_moments.first()
        && first.timestamp < timestamp
    {
        notices.push(Notice::TopicTimestampLowered {
            topic: title.clone(),
            from: timestamp,
            to: first.timestamp,
        });
        timestamp = first.timestamp;
    }

    let mut takeaways = Vec::with_capacity(raw_takeaways.len());
    for (takeaway_index, raw) in raw_takeaways.iter().enumerate() {
        match raw.as_str() {
            Some(text) => takeaways.push(text.trim().to_string()),
            None => notices.push(Notice::TakeawayDropped {
                topic: title.clone(),
                index: takeaway_index,
            }),
        }
    }

    Some(Topic {
        title,
        timestamp,
        key_moments,
        takeaways,
    })
}

fn validate_moment(
    raw: &Value,
    bounds: Option<(TimeOffset, TimeOffset)>,
) -> std::result::Result<KeyMoment, String> {
    let fields = raw.as_object().ok_or("not an object")?;
    let description = fields
        .get("description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|description| !description.is_empty())
        .ok_or("missing \"description\"")?;
    let timestamp = fields
        .get("timestamp")
        .and_then(Value::as_str)
        .ok_or("missing \"timestamp\"")?;
    let timestamp = TimeOffset::parse_subtitle_time(timestamp.trim()).map_err(|e| e.to_string())?;

    if let Some((start, end)) = bounds
        && (timestamp < start || timestamp > end)
    {
        return Err(format!(
            "{} is outside the transcript ({} to {})",
            timestamp, start, end
        ));
    }

    Ok(KeyMoment {
        description: description.to_string(),
        timestamp,
    })
}
