//! Outbound client for the external calling provider's API.

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use calldeck_core::config::ProviderConfig;
use calldeck_core::domain::upload::ContactRow;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("provider rejected the request with status {0}")]
    Status(reqwest::StatusCode),
}

#[derive(Clone)]
pub struct ProviderClient {
    http: Client,
    base_url: String,
    api_key: SecretString,
}

#[derive(Debug, Serialize)]
struct OutboundContact<'a> {
    name: &'a str,
    #[serde(rename = "phoneNumber")]
    phone_number: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    notes: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct PushContactsRequest<'a> {
    contacts: Vec<OutboundContact<'a>>,
}

impl ProviderClient {
    /// `None` when no API key is configured; the upload pipeline then keeps
    /// manifests unprocessed instead of calling out.
    pub fn from_config(config: &ProviderConfig) -> Option<Self> {
        let api_key = config.api_key.clone()?;
        Some(Self {
            http: Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    pub async fn push_contacts(
        &self,
        assistant_id: &str,
        contacts: &[ContactRow],
    ) -> Result<(), ProviderError> {
        let payload = PushContactsRequest {
            contacts: contacts
                .iter()
                .map(|contact| OutboundContact {
                    name: &contact.name,
                    phone_number: &contact.phone_number,
                    notes: contact.notes.as_deref(),
                })
                .collect(),
        };

        let url = format!("{}/assistants/{}/contacts", self.base_url, assistant_id);
        let response = self
            .http
            .post(&url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ProviderError::Status(response.status()));
        }

        info!(
            event_name = "provider.contacts_pushed",
            assistant_id = %assistant_id,
            contact_count = contacts.len(),
            "contact list forwarded to provider"
        );
        Ok(())
    }
}
