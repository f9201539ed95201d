//! The consent registry capability.
//!
//! The mapper only ever talks to a [`PolicyRegistry`]. The HTTP client for
//! gICS lives in `consentrelay-registry`; [`StaticRegistry`] serves canned
//! bundles for tests and local runs.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;

use crate::fhir::Bundle;
use crate::notification::SignerId;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("request failed: {0}")]
    Transport(String),
    #[error("registry returned {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed registry response: {0}")]
    Malformed(String),
    #[error("no canned response for subject {0}")]
    NotFound(String),
}

/// Source of truth for a person's current policy state.
#[async_trait]
pub trait PolicyRegistry: Send + Sync {
    /// Current policy states of `signer` in `domain`, as of `date`.
    async fn fetch_policy_state(
        &self,
        signer: &SignerId,
        domain: &str,
        date: &str,
    ) -> Result<Bundle, RegistryError>;
}

/// A registry double answering from a fixed table of bundles.
///
/// Responses are keyed by `(domain, subject id)`. Every request is recorded so
/// tests can assert on what the mapper asked for.
#[derive(Debug, Default)]
pub struct StaticRegistry {
    bundles: HashMap<(String, String), Bundle>,
    requests: Mutex<Vec<RecordedRequest>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub subject: String,
    pub id_type: String,
    pub domain: String,
    pub date: String,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bundle(mut self, domain: &str, subject: &str, bundle: Bundle) -> Self {
        self.bundles
            .insert((domain.to_string(), subject.to_string()), bundle);
        self
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl PolicyRegistry for StaticRegistry {
    async fn fetch_policy_state(
        &self,
        signer: &SignerId,
        domain: &str,
        date: &str,
    ) -> Result<Bundle, RegistryError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(RecordedRequest {
                subject: signer.id.clone(),
                id_type: signer.id_type.clone(),
                domain: domain.to_string(),
                date: date.to_string(),
            });
        }
        self.bundles
            .get(&(domain.to_string(), signer.id.clone()))
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(signer.id.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(id: &str) -> SignerId {
        SignerId {
            id_type: "Patienten-ID".into(),
            id: id.into(),
            order_number: None,
        }
    }

    #[tokio::test]
    async fn serves_canned_bundle_and_records_request() {
        let registry = StaticRegistry::new().with_bundle("MII", "42", Bundle::default());

        let bundle = registry
            .fetch_policy_state(&signer("42"), "MII", "2024-01-01")
            .await
            .unwrap();
        assert!(bundle.entry.is_empty());

        let requests = registry.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].domain, "MII");
        assert_eq!(requests[0].date, "2024-01-01");
    }

    #[tokio::test]
    async fn unknown_subject_is_an_error() {
        let registry = StaticRegistry::new();
        let result = registry
            .fetch_policy_state(&signer("1"), "MII", "2024-01-01")
            .await;
        assert!(matches!(result, Err(RegistryError::NotFound(id)) if id == "1"));
    }
}
