use thiserror::Error;

use crate::registry::RegistryError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error("malformed notification: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("notification has no signer ids")]
    MissingSigner,

    #[error("registry request failed: {0}")]
    Registry(#[from] RegistryError),

    #[error("no Consent resource found in registry bundle")]
    NoRecord,

    #[error("failed to encode consent record: {0}")]
    Encode(#[source] serde_json::Error),
}
