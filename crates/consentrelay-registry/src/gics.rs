//! HTTP client for the gICS FHIR gateway.

use async_trait::async_trait;
use consentrelay_core::config::{BasicAuth, GicsConfig};
use consentrelay_core::fhir::{Bundle, Parameter, Parameters};
use consentrelay_core::{PolicyRegistry, RegistryError, SignerId};
use thiserror::Error;
use tracing::{debug, error};

/// Identifier systems of gICS signer id types share this prefix.
pub const IDENTIFIER_SYSTEM_BASE: &str = "https://ths-greifswald.de/fhir/gics/identifiers/";

const OPERATION: &str = "$currentPolicyStatesForPerson";
const FHIR_JSON: &str = "application/fhir+json";

#[derive(Error, Debug)]
pub enum GicsError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GicsError> for RegistryError {
    fn from(err: GicsError) -> Self {
        match err {
            GicsError::Http(e) => RegistryError::Transport(e.to_string()),
            GicsError::Server { status, body } => RegistryError::Status { status, body },
            GicsError::Json(e) => RegistryError::Malformed(e.to_string()),
        }
    }
}

/// Client for gICS' `$currentPolicyStatesForPerson` operation.
pub struct GicsClient {
    client: reqwest::Client,
    request_url: String,
    auth: Option<BasicAuth>,
}

impl GicsClient {
    /// Create a client for the FHIR base URL in `config`.
    ///
    /// Basic auth is only sent when both user and password are configured.
    pub fn new(config: &GicsConfig) -> Self {
        let base = config.fhir.base.trim_end_matches('/');
        Self {
            client: reqwest::Client::new(),
            request_url: format!("{base}/{OPERATION}"),
            auth: config.fhir.auth.clone().filter(BasicAuth::is_complete),
        }
    }

    pub fn request_url(&self) -> &str {
        &self.request_url
    }

    pub fn auth(&self) -> Option<&BasicAuth> {
        self.auth.as_ref()
    }

    /// Fetch the current policy states of `signer` within `domain`.
    pub async fn current_policy_states(
        &self,
        signer: &SignerId,
        domain: &str,
        date: &str,
    ) -> Result<Bundle, GicsError> {
        let body = serde_json::to_vec(&request_parameters(signer, domain, date))?;

        debug!(url = %self.request_url, domain, "requesting current policy states");
        let mut request = self
            .client
            .post(&self.request_url)
            .header(reqwest::header::CONTENT_TYPE, FHIR_JSON)
            .header(reqwest::header::ACCEPT, FHIR_JSON)
            .body(body);
        if let Some(auth) = &self.auth {
            request = request.basic_auth(&auth.user, Some(&auth.password));
        }

        let resp = request.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            error!(status = status.as_u16(), url = %self.request_url, "gICS request failed");
            return Err(GicsError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = resp.bytes().await?;
        let bundle: Bundle = serde_json::from_slice(&bytes)?;
        debug!(entries = bundle.entry.len(), "received policy states");
        Ok(bundle)
    }
}

#[async_trait]
impl PolicyRegistry for GicsClient {
    async fn fetch_policy_state(
        &self,
        signer: &SignerId,
        domain: &str,
        date: &str,
    ) -> Result<Bundle, RegistryError> {
        Ok(self.current_policy_states(signer, domain, date).await?)
    }
}

fn request_parameters(signer: &SignerId, domain: &str, date: &str) -> Parameters {
    let system = format!("{IDENTIFIER_SYSTEM_BASE}{}", signer.id_type);
    Parameters::new(vec![
        Parameter::identifier("personIdentifier", &system, &signer.id),
        Parameter::string("domain", domain),
        Parameter::date("requestDate", request_date(date)),
    ])
}

/// The date part of a gICS timestamp (`2023-05-02 01:57:27` → `2023-05-02`).
fn request_date(date: &str) -> &str {
    let date = date.trim();
    date.split(|c: char| c == ' ' || c == 'T')
        .next()
        .unwrap_or(date)
}
