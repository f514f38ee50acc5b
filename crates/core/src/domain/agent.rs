use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Provider-assigned assistant identifier. Stable for the lifetime of the
/// agent and used as the primary key everywhere.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssistantId(pub String);

impl AssistantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for AssistantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgentStatus {
    Idle,
    Calling,
    Offline,
    Error,
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown agent status `{0}` (expected Idle|Calling|Offline|Error)")]
pub struct UnknownStatus(pub String);

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Calling => "Calling",
            Self::Offline => "Offline",
            Self::Error => "Error",
        }
    }

    /// Map a raw provider status label onto the canonical status set.
    /// Unrecognized labels fall back to `Idle` rather than failing the event.
    pub fn from_provider_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "calling" => Self::Calling,
            "error" => Self::Error,
            "offline" => Self::Offline,
            _ => Self::Idle,
        }
    }
}

impl std::str::FromStr for AgentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "Idle" => Ok(Self::Idle),
            "Calling" => Ok(Self::Calling),
            "Offline" => Ok(Self::Offline),
            "Error" => Ok(Self::Error),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AssistantId,
    pub name: String,
    pub description: Option<String>,
    pub phone_number_id: String,
    pub status: AgentStatus,
    pub minutes_today: i64,
    pub total_minutes_used: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Registration payload for a new agent.
#[derive(Clone, Debug, Deserialize)]
pub struct AgentDraft {
    pub assistant_id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub phone_number_id: String,
}

/// Partial update over the admin-mutable fields. Fields left as `None` are
/// untouched; keys outside this set are rejected at the serde boundary.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AgentPatch {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub phone_number_id: Option<String>,
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

impl AgentPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.phone_number_id.is_none()
            && self.status.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentPatch, AgentStatus};

    #[test]
    fn provider_labels_map_onto_canonical_statuses() {
        assert_eq!(AgentStatus::from_provider_label("idle"), AgentStatus::Idle);
        assert_eq!(AgentStatus::from_provider_label("calling"), AgentStatus::Calling);
        assert_eq!(AgentStatus::from_provider_label("error"), AgentStatus::Error);
        assert_eq!(AgentStatus::from_provider_label("offline"), AgentStatus::Offline);
    }

    #[test]
    fn unrecognized_provider_label_defaults_to_idle() {
        assert_eq!(AgentStatus::from_provider_label("bogus"), AgentStatus::Idle);
        assert_eq!(AgentStatus::from_provider_label(""), AgentStatus::Idle);
    }

    #[test]
    fn canonical_status_round_trips_through_storage_label() {
        for status in
            [AgentStatus::Idle, AgentStatus::Calling, AgentStatus::Offline, AgentStatus::Error]
        {
            assert_eq!(status.as_str().parse::<AgentStatus>().expect("parse"), status);
        }
        assert!("calling".parse::<AgentStatus>().is_err());
    }

    #[test]
    fn patch_rejects_unknown_fields() {
        let err = serde_json::from_str::<AgentPatch>(r#"{"minutes_today": 99}"#);
        assert!(err.is_err());
    }

    #[test]
    fn empty_patch_is_detected() {
        let patch: AgentPatch = serde_json::from_str("{}").expect("empty patch");
        assert!(patch.is_empty());
        let patch: AgentPatch = serde_json::from_str(r#"{"name": "n"}"#).expect("patch");
        assert!(!patch.is_empty());
    }
}
