//! Provision merge: one permit per registry entry, one tag per permit.
//!
//! gICS reports every policy of a person as its own `Consent` resource. Each
//! one wraps the actual decision in the first child of its root provision.
//! The merge keeps the permitted, identifiable decisions and drops the rest.
//!
//! # Fixed conventions
//!
//! - Only the first child provision of each entry is inspected.
//! - Entries whose child is `deny`, or carries no tags, are dropped. A policy
//!   that cannot be identified is never granted.
//! - Tags within a group are ordered from least to most specific and the
//!   first group is authoritative, so the representative tag is the *last*
//!   coding of the *first* group.

use tracing::warn;

use crate::fhir::{CodeableConcept, Coding, Consent, Provision, ProvisionType};
use crate::period::normalize_period;

/// Merge the decisions of all entries into a list of permit provisions.
pub fn merge_provisions<'a>(consents: impl IntoIterator<Item = &'a Consent>) -> Vec<Provision> {
    consents
        .into_iter()
        .enumerate()
        .filter_map(|(index, consent)| {
            let merged = merge_entry(consent);
            if merged.is_none() {
                warn!(
                    entry = index,
                    consent_id = consent.id.as_deref().unwrap_or_default(),
                    "provision skipped: denied or without policy code"
                );
            }
            merged
        })
        .collect()
}

fn merge_entry(consent: &Consent) -> Option<Provision> {
    let decision = consent.provision.as_ref()?.provision.first()?;
    if decision.provision_type == Some(ProvisionType::Deny) {
        return None;
    }

    let tag = representative_tag(&decision.code)?;

    let mut provision = decision.clone();
    provision.code = vec![CodeableConcept {
        coding: vec![tag],
        ..CodeableConcept::default()
    }];
    if let Some(period) = provision.period.as_mut() {
        normalize_period(period);
    }
    Some(provision)
}

/// The last coding of the first tag-group, with a cleaned-up display.
pub fn representative_tag(groups: &[CodeableConcept]) -> Option<Coding> {
    let mut tag = groups.first()?.coding.last()?.clone();
    tag.display = tag.display.map(|d| d.replace('_', " "));
    Some(tag)
}
