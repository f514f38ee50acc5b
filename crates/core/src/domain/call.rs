use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallId(pub String);

impl CallId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Assistant,
}

impl Speaker {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One timestamped utterance. Serialized verbatim into the transcript's
/// storage JSON, so the field set here is the storage schema.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub content: String,
}

/// Append-only segment sequence. Order is arrival order; nothing re-sorts
/// by timestamp.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Segments(Vec<TranscriptSegment>);

impl Segments {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, segment: TranscriptSegment) {
        self.0.push(segment);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, TranscriptSegment> {
        self.0.iter()
    }
}

impl From<Vec<TranscriptSegment>> for Segments {
    fn from(segments: Vec<TranscriptSegment>) -> Self {
        Self(segments)
    }
}

/// Transcript row. Doubles as the call lifecycle record: `started_at`,
/// `ended_at` and `total_duration` track the call itself, keyed by the
/// provider call id (one transcript per call).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub id: String,
    pub call_id: CallId,
    pub agent_id: crate::domain::agent::AssistantId,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds, set when the call ends.
    pub total_duration: Option<i64>,
    pub segments: Segments,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallLogStatus {
    Started,
    Ended,
}

impl CallLogStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Ended => "ended",
        }
    }
}

/// Denormalized audit record of a call's lifecycle, kept separate from the
/// transcript for reporting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CallLog {
    pub id: String,
    pub call_id: CallId,
    pub agent_id: crate::domain::agent::AssistantId,
    pub phone_number: Option<String>,
    pub status: CallLogStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub duration: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{Segments, Speaker, TranscriptSegment};

    fn segment(speaker: Speaker, content: &str) -> TranscriptSegment {
        TranscriptSegment { timestamp: Utc::now(), speaker, content: content.to_string() }
    }

    #[test]
    fn append_preserves_arrival_order() {
        let mut segments = Segments::new();
        segments.push(segment(Speaker::User, "hi"));
        segments.push(segment(Speaker::Assistant, "hello"));
        segments.push(segment(Speaker::User, "there"));

        let contents: Vec<&str> = segments.iter().map(|s| s.content.as_str()).collect();
        assert_eq!(contents, vec!["hi", "hello", "there"]);
    }

    #[test]
    fn segments_serialize_as_a_bare_json_array() {
        let mut segments = Segments::new();
        segments.push(segment(Speaker::User, "hi"));

        let value = serde_json::to_value(&segments).expect("serialize");
        let array = value.as_array().expect("array");
        assert_eq!(array.len(), 1);
        assert_eq!(array[0]["speaker"], "user");
        assert_eq!(array[0]["content"], "hi");
        assert!(array[0]["timestamp"].is_string());
    }

    #[test]
    fn speaker_tags_use_lowercase_wire_labels() {
        assert_eq!(serde_json::to_value(Speaker::Assistant).expect("serialize"), "assistant");
        let parsed: Speaker = serde_json::from_str("\"user\"").expect("deserialize");
        assert_eq!(parsed, Speaker::User);
    }
}
