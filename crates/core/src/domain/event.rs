//! Wire shape of provider webhook deliveries and the tagged event union the
//! reconciler consumes.
//!
//! The envelope is deliberately liberal: every section and most fields are
//! optional, because the provider reuses the `call` object across several
//! event types with different subsets populated. Anything that cannot be
//! mapped onto a concrete variant becomes `ProviderEvent::Unknown`, which is
//! accepted and ignored rather than rejected.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::agent::AssistantId;
use crate::domain::call::{CallId, Speaker};

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookEnvelope {
    pub event_type: String,
    #[serde(default)]
    pub call: Option<WebhookCall>,
    #[serde(default)]
    pub transcript: Option<WebhookTranscript>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookCall {
    #[serde(default)]
    pub id: Option<String>,
    pub assistant_id: String,
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds.
    #[serde(default)]
    pub duration: Option<i64>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct WebhookTranscript {
    pub call_id: String,
    pub assistant_id: String,
    pub timestamp: DateTime<Utc>,
    pub speaker: Speaker,
    pub content: String,
}

#[derive(Clone, Debug)]
pub enum ProviderEvent {
    CallStarted {
        call_id: CallId,
        agent_id: AssistantId,
        phone_number_id: Option<String>,
        started_at: Option<DateTime<Utc>>,
    },
    CallEnded {
        call_id: CallId,
        agent_id: AssistantId,
        ended_at: Option<DateTime<Utc>>,
        duration_seconds: Option<i64>,
    },
    TranscriptUpdate {
        call_id: CallId,
        timestamp: DateTime<Utc>,
        speaker: Speaker,
        content: String,
    },
    AgentStatusUpdate {
        agent_id: AssistantId,
        provider_status: String,
    },
    Unknown {
        event_type: String,
    },
}

impl ProviderEvent {
    /// Short label for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CallStarted { .. } => "call.started",
            Self::CallEnded { .. } => "call.ended",
            Self::TranscriptUpdate { .. } => "transcript.update",
            Self::AgentStatusUpdate { .. } => "agent.status.update",
            Self::Unknown { .. } => "unknown",
        }
    }
}

impl From<WebhookEnvelope> for ProviderEvent {
    fn from(envelope: WebhookEnvelope) -> Self {
        let WebhookEnvelope { event_type, call, transcript } = envelope;

        let parsed = match event_type.as_str() {
            "call.started" => call.and_then(|call| match call {
                WebhookCall {
                    id: Some(call_id),
                    assistant_id,
                    phone_number_id,
                    started_at,
                    ..
                } => Some(Self::CallStarted {
                    call_id: CallId(call_id),
                    agent_id: AssistantId(assistant_id),
                    phone_number_id,
                    started_at,
                }),
                _ => None,
            }),
            "call.ended" => call.and_then(|call| match call {
                WebhookCall { id: Some(call_id), assistant_id, ended_at, duration, .. } => {
                    Some(Self::CallEnded {
                        call_id: CallId(call_id),
                        agent_id: AssistantId(assistant_id),
                        ended_at,
                        duration_seconds: duration,
                    })
                }
                _ => None,
            }),
            "transcript.update" => transcript.map(|transcript| Self::TranscriptUpdate {
                call_id: CallId(transcript.call_id),
                timestamp: transcript.timestamp,
                speaker: transcript.speaker,
                content: transcript.content,
            }),
            "agent.status.update" => call.and_then(|call| match call {
                WebhookCall { assistant_id, status: Some(status), .. } => {
                    Some(Self::AgentStatusUpdate {
                        agent_id: AssistantId(assistant_id),
                        provider_status: status,
                    })
                }
                _ => None,
            }),
            _ => None,
        };

        parsed.unwrap_or(Self::Unknown { event_type })
    }
}
