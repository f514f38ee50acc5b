pub mod config;
pub mod domain;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::agent::{Agent, AgentDraft, AgentPatch, AgentStatus, AssistantId};
pub use domain::call::{
    CallId, CallLog, CallLogStatus, Segments, Speaker, Transcript, TranscriptSegment,
};
pub use domain::event::{ProviderEvent, WebhookCall, WebhookEnvelope, WebhookTranscript};
pub use domain::upload::{ContactRow, CsvUpload, UploadReport};
pub use domain::user::AdminUser;
