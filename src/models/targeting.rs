//! Targeting predicate evaluated by the filter cascade's targeting stage.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceType {
    Desktop,
    Mobile,
    Tablet,
    Ctv,
    Unknown,
}

/// What a request must look like for a line-item to consider serving.
/// An empty collection on any field means "no restriction on this axis".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TargetingPredicate {
    pub countries: Vec<String>,
    pub device_types: Vec<DeviceType>,
    pub custom: HashMap<String, String>,
}

/// Resolved, request-scoped targeting facts.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub device_type: DeviceType,
    pub country: Option<String>,
    pub custom_params: HashMap<String, String>,
}

impl Default for DeviceType {
    fn default() -> Self {
        DeviceType::Unknown
    }
}

impl TargetingPredicate {
    /// A missing country resolution never matches a country-restricted
    /// target.
    pub fn matches(&self, ctx: &RequestContext) -> bool {
        if !self.countries.is_empty() {
            match &ctx.country {
                Some(country) => {
                    if !self.countries.iter().any(|c| c.eq_ignore_ascii_case(country)) {
                        return false;
                    }
                }
                None => return false,
            }
        }

        if !self.device_types.is_empty() && !self.device_types.contains(&ctx.device_type) {
            return false;
        }

        for (key, expected) in &self.custom {
            match ctx.custom_params.get(key) {
                Some(actual) if actual == expected => {}
                _ => return false,
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrestricted_predicate_matches_anything() {
        let pred = TargetingPredicate::default();
        let ctx = RequestContext::default();
        assert!(pred.matches(&ctx));
    }

    #[test]
    fn unknown_country_never_matches_restricted_target() {
        let pred = TargetingPredicate {
            countries: vec!["US".into()],
            ..Default::default()
        };
        let ctx = RequestContext {
            country: None,
            ..Default::default()
        };
        assert!(!pred.matches(&ctx));
    }

    #[test]
    fn country_match_is_case_insensitive() {
        let pred = TargetingPredicate {
            countries: vec!["us".into()],
            ..Default::default()
        };
        let ctx = RequestContext {
            country: Some("US".into()),
            ..Default::default()
        };
        assert!(pred.matches(&ctx));
    }

    #[test]
    fn custom_key_value_must_match_exactly() {
        let mut custom = HashMap::new();
        custom.insert("segment".to_string(), "sports".to_string());
        let pred = TargetingPredicate {
            custom,
            ..Default::default()
        };
        let mut ctx = RequestContext::default();
        assert!(!pred.matches(&ctx));
        ctx.custom_params.insert("segment".to_string(), "sports".to_string());
        assert!(pred.matches(&ctx));
    }
}
