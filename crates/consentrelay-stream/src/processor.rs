//! Turns an input payload into the bytes to publish, if any.

use async_trait::async_trait;
use consentrelay_core::{ConsentMapper, Notification, TransformError};
use tracing::warn;

/// What a worker should do with one message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Processed {
    /// The payload could not be decoded. The message is dropped uncommitted.
    Malformed(String),
    /// Nothing to publish. The offset is committed.
    Skipped(String),
    Emit(Vec<u8>),
}

#[async_trait]
pub trait RecordProcessor: Send + Sync {
    async fn process(&self, payload: &[u8]) -> Processed;
}

#[async_trait]
impl RecordProcessor for ConsentMapper {
    async fn process(&self, payload: &[u8]) -> Processed {
        let notification = match Notification::from_slice(payload) {
            Ok(n) => n,
            Err(e) => return Processed::Malformed(e.to_string()),
        };

        let encoded = self
            .transform(&notification)
            .await
            .and_then(|record| self.to_transaction(&record))
            .and_then(|bundle| serde_json::to_vec(&bundle).map_err(TransformError::Encode));

        match encoded {
            Ok(bytes) => Processed::Emit(bytes),
            Err(e) => {
                warn!(domain = notification.domain(), error = %e, "notification not mapped");
                Processed::Skipped(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use consentrelay_core::config::MapperConfig;
    use consentrelay_core::fhir::Bundle;
    use consentrelay_core::StaticRegistry;

    fn mapper(registry: StaticRegistry) -> ConsentMapper {
        ConsentMapper::new(Arc::new(registry), MapperConfig::default())
    }

    const NOTIFICATION: &str = r#"{
        "consentKey": {
            "consentTemplateKey": { "domainName": "MII", "name": "Consent", "version": "1" },
            "signerIds": [{ "idType": "Patienten-ID", "id": "42" }],
            "consentDate": "2023-05-02 01:57:27"
        }
    }"#;

    #[tokio::test]
    async fn garbage_is_malformed() {
        let processed = mapper(StaticRegistry::new()).process(b"not json").await;
        assert!(matches!(processed, Processed::Malformed(_)));
    }

    #[tokio::test]
    async fn unmapped_notification_is_skipped() {
        let registry = StaticRegistry::new().with_bundle("MII", "42", Bundle::default());
        let processed = mapper(registry).process(NOTIFICATION.as_bytes()).await;
        assert!(matches!(processed, Processed::Skipped(_)));
    }

    #[tokio::test]
    async fn registry_error_is_skipped() {
        let processed = mapper(StaticRegistry::new())
            .process(NOTIFICATION.as_bytes())
            .await;
        assert!(matches!(processed, Processed::Skipped(_)));
    }
}
