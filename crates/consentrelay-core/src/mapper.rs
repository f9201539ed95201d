//! Maps consent notifications to canonical FHIR consent records.
//!
//! For every notification the current state of the subject is fetched from
//! the registry, the reported policies are merged into a single `Consent`,
//! and the result is addressed so that repeated runs upsert the same
//! resource.

use std::collections::HashMap;
use std::sync::Arc;

use ring::digest::{SHA256, digest};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::TransformError;
use crate::config::MapperConfig;
use crate::fhir::{
    Bundle, Consent, ConsentPolicy, Extension, Identifier, Meta, Provision, ProvisionType,
    Reference,
};
use crate::merge::merge_provisions;
use crate::notification::Notification;
use crate::period::normalize_period;
use crate::profile::ConsentProfile;
use crate::registry::PolicyRegistry;

pub const DOMAIN_REFERENCE_EXTENSION: &str =
    "http://fhir.de/ConsentManagement/StructureDefinition/DomainReference";

/// A merged, normalized consent ready to be published.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalRecord {
    /// Deterministic resource id, see [`record_id`].
    pub id: String,
    pub consent: Consent,
}

/// Target profile chosen for a domain.
#[derive(Debug, Clone)]
enum DomainProfile {
    Known(ConsentProfile),
    /// Profile URL configured but without categorization rules.
    Url(String),
}

pub struct ConsentMapper {
    registry: Arc<dyn PolicyRegistry>,
    config: MapperConfig,
    profiles: HashMap<String, DomainProfile>,
}

impl ConsentMapper {
    pub fn new(registry: Arc<dyn PolicyRegistry>, config: MapperConfig) -> Self {
        let profiles = config
            .profiles
            .iter()
            .map(|(domain, url)| {
                let profile = match ConsentProfile::from_url(url) {
                    Some(known) => DomainProfile::Known(known),
                    None => DomainProfile::Url(url.clone()),
                };
                (domain.clone(), profile)
            })
            .collect();

        Self {
            registry,
            config,
            profiles,
        }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// Fetch the subject's current state and build the canonical record.
    pub async fn transform(
        &self,
        notification: &Notification,
    ) -> Result<CanonicalRecord, TransformError> {
        let signer = notification.primary_signer()?;
        let domain = notification.domain();
        let template = notification.consent_key.consent_template_key.policy_name();

        let bundle = self
            .registry
            .fetch_policy_state(signer, domain, &notification.consent_key.consent_date)
            .await?;

        let record = self.map_bundle(&bundle, domain, &signer.id, &template)?;
        info!(
            domain,
            consent_id = %record.id,
            provisions = record
                .consent
                .provision
                .as_ref()
                .map_or(0, |p| p.provision.len()),
            "consent mapped"
        );
        Ok(record)
    }

    /// Merge the registry bundle into one record for `(domain, subject)`.
    pub fn map_bundle(
        &self,
        bundle: &Bundle,
        domain: &str,
        subject: &str,
        template: &str,
    ) -> Result<CanonicalRecord, TransformError> {
        if bundle.entry.is_empty() {
            return Err(TransformError::NoRecord);
        }

        // Unusable entries are left out of the merge.
        let consents: Vec<Consent> = bundle
            .entry
            .iter()
            .enumerate()
            .filter_map(|(index, entry)| {
                let Some(resource) = entry.resource.clone() else {
                    warn!(entry = index, "bundle entry without resource skipped");
                    return None;
                };
                serde_json::from_value(resource)
                    .inspect_err(|e| {
                        warn!(entry = index, error = %e, "bundle entry is not a Consent, skipped")
                    })
                    .ok()
            })
            .collect();

        let merged = merge_provisions(&consents);

        let mut consent = consents.into_iter().next().ok_or(TransformError::NoRecord)?;
        let mut period = consent.provision.take().and_then(|p| p.period);
        if let Some(period) = period.as_mut() {
            normalize_period(period);
        }
        consent.provision = Some(Provision {
            provision_type: Some(ProvisionType::Deny),
            period,
            provision: merged,
            ..Provision::default()
        });

        let id = record_id(domain, subject);
        self.address(&mut consent, &id, domain, subject);
        self.categorize(&mut consent, domain, template);

        Ok(CanonicalRecord { id, consent })
    }

    /// Wrap a record in a transaction bundle that upserts it by identifier.
    pub fn to_transaction(&self, record: &CanonicalRecord) -> Result<Bundle, TransformError> {
        let resource = serde_json::to_value(&record.consent).map_err(TransformError::Encode)?;
        let url = format!(
            "Consent?identifier={}|{}",
            self.config.consent_system, record.id
        );
        Ok(Bundle::upsert_transaction(resource, url))
    }

    fn address(&self, consent: &mut Consent, id: &str, domain: &str, subject: &str) {
        consent.id = Some(id.to_string());
        consent.identifier = vec![Identifier {
            system: Some(self.config.consent_system.clone()),
            value: Some(id.to_string()),
            ..Identifier::default()
        }];
        consent.patient = Some(Reference {
            reference: Some(format!(
                "Patient?identifier={}|{}",
                self.config.patient_system, subject
            )),
            ..Reference::default()
        });
        consent.policy_rule = None;
        consent.source_reference = None;
        self.rewrite_domain_reference(&mut consent.extension, domain);
    }

    fn rewrite_domain_reference(&self, extensions: &mut [Extension], domain: &str) {
        let reference = Reference {
            reference: Some(format!(
                "ResearchStudy?identifier={}|{}",
                self.config.domain_system, domain
            )),
            display: Some(domain.to_string()),
            ..Reference::default()
        };

        for ext in extensions
            .iter_mut()
            .filter(|e| e.url == DOMAIN_REFERENCE_EXTENSION)
        {
            if let Some(slot) = ext.extension.iter_mut().find(|e| e.url == "domain") {
                *slot = Extension {
                    url: "domain".to_string(),
                    value_reference: Some(reference.clone()),
                    ..Extension::default()
                };
            }
        }
    }

    fn categorize(&self, consent: &mut Consent, domain: &str, template: &str) {
        let profile = match self.profiles.get(domain) {
            Some(DomainProfile::Known(profile)) => profile,
            Some(DomainProfile::Url(url)) => {
                set_profile(consent, url);
                return;
            }
            None => {
                debug!(domain, "no profile configured for domain");
                return;
            }
        };

        set_profile(consent, &profile.url);
        consent.category = profile.category.clone();
        match profile.policy_uri(template) {
            Some(uri) => {
                consent.policy = vec![ConsentPolicy {
                    uri: Some(uri.to_string()),
                    ..ConsentPolicy::default()
                }];
            }
            None => debug!(domain, template, "no policy uri for template"),
        }
    }
}

fn set_profile(consent: &mut Consent, url: &str) {
    consent.meta.get_or_insert_with(Meta::default).profile = vec![url.to_string()];
}

/// Deterministic consent id: lowercase hex SHA-256 of `domain` followed by
/// `subject`.
pub fn record_id(domain: &str, subject: &str) -> String {
    let mut input = Vec::with_capacity(domain.len() + subject.len());
    input.extend_from_slice(domain.as_bytes());
    input.extend_from_slice(subject.as_bytes());
    digest(&SHA256, &input)
        .as_ref()
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}
