//! Consent change notifications published by gICS.
//!
//! A notification only says *that* a person's consent changed. The current
//! state is always fetched from the registry afterwards.

use serde::{Deserialize, Serialize};

use crate::TransformError;

/// A gICS consent change notification as read from the input topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<NotificationContext>,
    pub consent_key: ConsentKey,
    #[serde(default)]
    pub previous_policy_states: Vec<PolicyState>,
    #[serde(default)]
    pub current_policy_states: Vec<PolicyState>,
}

/// Quality-control context attached by the consent management UI.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationContext {
    #[serde(default)]
    pub qc: QualityControl,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QualityControl {
    #[serde(default)]
    pub qc_passed: bool,
    #[serde(default, rename = "type")]
    pub qc_type: String,
    #[serde(default)]
    pub inspector: String,
    #[serde(default)]
    pub comment: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentKey {
    pub consent_template_key: TemplateKey,
    pub signer_ids: Vec<SignerId>,
    /// As-of timestamp, passed to the registry verbatim.
    pub consent_date: String,
}

/// Identifies a consent template (or a policy) within a gICS domain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateKey {
    pub domain_name: String,
    pub name: String,
    pub version: String,
}

impl TemplateKey {
    /// `name|version`, the key used for policy lookups.
    pub fn policy_name(&self) -> String {
        format!("{}|{}", self.name, self.version)
    }
}

/// A subject identifier, typed by its identifier scheme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignerId {
    pub id_type: String,
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_number: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    pub key: TemplateKey,
    pub value: bool,
}

impl Notification {
    /// Decode a notification from the raw message payload.
    pub fn from_slice(payload: &[u8]) -> Result<Self, TransformError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// The subject a notification is about: always the first signer id.
    pub fn primary_signer(&self) -> Result<&SignerId, TransformError> {
        self.consent_key
            .signer_ids
            .first()
            .ok_or(TransformError::MissingSigner)
    }

    pub fn domain(&self) -> &str {
        &self.consent_key.consent_template_key.domain_name
    }
}
