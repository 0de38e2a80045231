//! Gmail REST client. Bearer-token access to the users/me mailbox.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::ProviderError;
use crate::provider::{MailProvider, UNREAD_LABEL};
use crate::rules::model::MessageRecord;
use crate::store::Label;

/// Default API root for the authenticated user's mailbox.
pub const DEFAULT_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

/// Gmail caps `maxResults` on message listing.
pub const MAX_LIST_RESULTS: u32 = 500;

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct MessageList {
    #[serde(default)]
    messages: Vec<MessageRef>,
}

#[derive(Debug, Deserialize)]
struct MessageRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MessageMetadata {
    id: String,
    #[serde(default)]
    snippet: String,
    #[serde(default)]
    internal_date: String,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    payload: Payload,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct LabelList {
    #[serde(default)]
    labels: Vec<LabelResource>,
}

#[derive(Debug, Deserialize)]
struct LabelResource {
    id: String,
    name: String,
}

impl From<LabelResource> for Label {
    fn from(label: LabelResource) -> Self {
        Label {
            id: label.id,
            name: label.name,
        }
    }
}

impl MessageMetadata {
    fn header(&self, name: &str) -> &str {
        self.payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
            .unwrap_or_default()
    }

    fn into_record(self) -> MessageRecord {
        let sender = self.header("From").to_string();
        let subject = self.header("Subject").to_string();
        let received = received_from_internal_date(&self.internal_date);
        let is_read = !self.label_ids.iter().any(|l| l == UNREAD_LABEL);

        MessageRecord {
            id: self.id,
            sender,
            subject,
            snippet: self.snippet,
            received,
            is_read,
            labels: self.label_ids,
        }
    }
}

/// RFC 3339 form of an epoch-millisecond `internalDate`, or the raw value.
fn received_from_internal_date(raw: &str) -> String {
    raw.parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
        .unwrap_or_else(|| raw.to_string())
}

// ── Client ──────────────────────────────────────────────────────────

/// Gmail API client. Never retries.
pub struct GmailClient {
    base_url: String,
    token: SecretString,
    client: reqwest::Client,
}

impl GmailClient {
    pub fn new(base_url: impl Into<String>, token: SecretString) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn send<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, ProviderError> {
        let resp = request
            .bearer_auth(self.token.expose_secret())
            .send()
            .await
            .map_err(|e| ProviderError::RequestFailed {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        resp.json::<T>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                endpoint: endpoint.to_string(),
                reason: e.to_string(),
            })
    }

    async fn modify(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError> {
        let mut body = serde_json::Map::new();
        if !add.is_empty() {
            body.insert("addLabelIds".into(), serde_json::json!(add));
        }
        if !remove.is_empty() {
            body.insert("removeLabelIds".into(), serde_json::json!(remove));
        }

        let request = self
            .client
            .post(self.api_url(&format!("messages/{id}/modify")))
            .json(&body);
        self.send::<serde_json::Value>("messages.modify", request)
            .await?;
        debug!(id = id, add = ?add, remove = ?remove, "Labels modified upstream");
        Ok(())
    }
}

#[async_trait]
impl MailProvider for GmailClient {
    async fn list_message_ids(
        &self,
        after: DateTime<Utc>,
        before: DateTime<Utc>,
        max_results: u32,
    ) -> Result<Vec<String>, ProviderError> {
        let query = format!("after:{} before:{}", after.timestamp(), before.timestamp());
        let request = self.client.get(self.api_url("messages")).query(&[
            ("q", query),
            ("maxResults", max_results.min(MAX_LIST_RESULTS).to_string()),
            ("includeSpamTrash", "false".to_string()),
        ]);

        let list: MessageList = self.send("messages.list", request).await?;
        Ok(list.messages.into_iter().map(|m| m.id).collect())
    }

    async fn get_message(&self, id: &str) -> Result<MessageRecord, ProviderError> {
        let request = self
            .client
            .get(self.api_url(&format!("messages/{id}")))
            .query(&[
                ("format", "metadata"),
                ("metadataHeaders", "From"),
                ("metadataHeaders", "Subject"),
            ]);

        let message: MessageMetadata = self.send("messages.get", request).await?;
        Ok(message.into_record())
    }

    async fn mark_read(&self, id: &str) -> Result<(), ProviderError> {
        self.modify(id, &[], &[UNREAD_LABEL.to_string()]).await
    }

    async fn mark_unread(&self, id: &str) -> Result<(), ProviderError> {
        self.modify(id, &[UNREAD_LABEL.to_string()], &[]).await
    }

    async fn modify_labels(
        &self,
        id: &str,
        add: &[String],
        remove: &[String],
    ) -> Result<(), ProviderError> {
        self.modify(id, add, remove).await
    }

    async fn list_labels(&self) -> Result<Vec<Label>, ProviderError> {
        let request = self.client.get(self.api_url("labels"));
        let list: LabelList = self.send("labels.list", request).await?;
        Ok(list.labels.into_iter().map(Label::from).collect())
    }

    async fn create_label(&self, name: &str) -> Result<Label, ProviderError> {
        let request = self
            .client
            .post(self.api_url("labels"))
            .json(&serde_json::json!({
                "name": name,
                "labelListVisibility": "labelShow",
                "messageListVisibility": "show",
            }));

        let created: LabelResource = self.send("labels.create", request).await?;
        debug!(id = %created.id, name = %created.name, "Label created upstream");
        Ok(created.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata(json: serde_json::Value) -> MessageMetadata {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn metadata_maps_to_record() {
        let record = metadata(serde_json::json!({
            "id": "18c",
            "snippet": "Your assignment is ready",
            "internalDate": "1773144000000",
            "labelIds": ["INBOX", "UNREAD"],
            "payload": {"headers": [
                {"name": "from", "value": "Alerts <alerts@trakstar.com>"},
                {"name": "Subject", "value": "New assignment"}
            ]}
        }))
        .into_record();

        assert_eq!(record.id, "18c");
        assert_eq!(record.sender, "Alerts <alerts@trakstar.com>");
        assert_eq!(record.subject, "New assignment");
        assert_eq!(record.received, "2026-03-10T12:00:00.000Z");
        assert!(!record.is_read);
        assert_eq!(record.labels, vec!["INBOX", "UNREAD"]);
    }

    #[test]
    fn missing_fields_default_to_empty() {
        let record = metadata(serde_json::json!({"id": "x", "labelIds": ["INBOX"]})).into_record();
        assert_eq!(record.sender, "");
        assert_eq!(record.subject, "");
        assert_eq!(record.received, "");
        assert!(record.is_read);
    }

    #[test]
    fn unconvertible_internal_date_is_kept_raw() {
        assert_eq!(received_from_internal_date("soon"), "soon");
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = GmailClient::new("http://localhost:9/", SecretString::from("t"));
        assert_eq!(client.api_url("labels"), "http://localhost:9/labels");
    }
}
