//! Consent profiles: categorization and policy metadata per target profile.

use crate::fhir::{CodeableConcept, Coding};

pub const MII_PROFILE: &str = "https://www.medizininformatik-initiative.de/fhir/modul-consent/StructureDefinition/mii-pr-consent-einwilligung";
pub const LOINC_CATEGORY_SYSTEM: &str = "http://loinc.org";
pub const LOINC_CATEGORY_CODE: &str = "57016-8";
pub const MII_CATEGORY_SYSTEM: &str = "https://www.medizininformatik-initiative.de/fhir/modul-consent/CodeSystem/mii-cs-consent-consent_category";
pub const MII_CATEGORY_CODE: &str = "2.16.840.1.113883.3.1937.777.24.2.184";
pub const MII_PROVISION_SYSTEM: &str = "urn:oid:2.16.840.1.113883.3.1937.777.24.5.3";

/// Policy URI of the MII broad consent, version 1.6.d.
pub const MII_POLICY_URI: &str = "urn:oid:2.16.840.1.113883.3.1937.777.24.2.1790";

/// Templates whose `name|version` contains this marker refer to the MII broad
/// consent, including the withdrawal templates "kompatibel zu
/// Patienteneinwilligung MII 1.6d".
const MII_TEMPLATE_MARKER: &str = "Patienteneinwilligung MII";

/// Profile-specific metadata attached to every consent of a domain.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsentProfile {
    pub url: String,
    pub category: Vec<CodeableConcept>,
    policies: Vec<PolicyRule>,
}

#[derive(Debug, Clone, PartialEq)]
struct PolicyRule {
    template_marker: &'static str,
    uri: &'static str,
}

impl ConsentProfile {
    /// Look up a known profile by its canonical URL.
    pub fn from_url(url: &str) -> Option<Self> {
        match url {
            MII_PROFILE => Some(Self::mii()),
            _ => None,
        }
    }

    /// The Medizininformatik-Initiative broad consent profile.
    pub fn mii() -> Self {
        Self {
            url: MII_PROFILE.to_string(),
            category: vec![
                CodeableConcept {
                    coding: vec![Coding::new(LOINC_CATEGORY_SYSTEM, LOINC_CATEGORY_CODE)],
                    ..CodeableConcept::default()
                },
                CodeableConcept {
                    coding: vec![Coding::new(MII_CATEGORY_SYSTEM, MII_CATEGORY_CODE)],
                    ..CodeableConcept::default()
                },
            ],
            policies: vec![PolicyRule {
                template_marker: MII_TEMPLATE_MARKER,
                uri: MII_POLICY_URI,
            }],
        }
    }

    /// Policy URI for a template (`name|version`), if the profile knows it.
    pub fn policy_uri(&self, template: &str) -> Option<&'static str> {
        self.policies
            .iter()
            .find(|rule| template.contains(rule.template_marker))
            .map(|rule| rule.uri)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mii_profile_by_url() {
        let profile = ConsentProfile::from_url(MII_PROFILE).unwrap();
        assert_eq!(profile.url, MII_PROFILE);
        assert_eq!(profile.category.len(), 2);
        assert_eq!(
            profile.category[0].coding[0].code.as_deref(),
            Some(LOINC_CATEGORY_CODE)
        );
        assert_eq!(
            profile.category[1].coding[0].system.as_deref(),
            Some(MII_CATEGORY_SYSTEM)
        );
    }

    #[test]
    fn unknown_profile() {
        assert!(ConsentProfile::from_url("https://example.org/StructureDefinition/other").is_none());
    }

    #[test]
    fn policy_lookup() {
        let mii = ConsentProfile::mii();
        let cases = [
            ("Patienteneinwilligung MII|1.6.d", Some(MII_POLICY_URI)),
            (
                "Teilwiderruf (kompatibel zu Patienteneinwilligung MII 1.6d)|2.0.a",
                Some(MII_POLICY_URI),
            ),
            (
                "Vollständiger Widerruf (kompatibel zu Patienteneinwilligung MII 1.6d)|1.0",
                Some(MII_POLICY_URI),
            ),
            (
                "Vollst\u{fffd}ndiger Widerruf (kompatibel zu Patienteneinwilligung MII 1.6d)|1.0",
                Some(MII_POLICY_URI),
            ),
            ("Patienteneinwilligung Projekt 42|1.0", None),
        ];
        for (template, expected) in cases {
            assert_eq!(mii.policy_uri(template), expected, "template {template}");
        }
    }
}
