//! Macro expander: resolves `{NAME}` and `{CUSTOM.key}` placeholders in
//! click-URL templates.
//!
//! A resolver failing leaves its macro unexpanded in place rather than
//! failing the whole URL: a click must never be lost to a single bad macro.
//! The registry is a fixed map of name to resolver function, preferring a
//! small trait-object-free lookup table over a dynamic plugin system.

use std::collections::{HashMap, HashSet};

use crate::errors::MacroError;
use crate::token::EventTokenPayload;

/// Everything a macro resolver can read from.
pub struct ExpansionContext<'a> {
    pub token: &'a EventTokenPayload,
    pub auction_id: &'a str,
    pub timestamp: i64,
}

type Resolver = fn(&ExpansionContext<'_>) -> Result<String, MacroError>;

pub struct MacroRegistry {
    resolvers: HashMap<&'static str, Resolver>,
}

impl Default for MacroRegistry {
    fn default() -> Self {
        let mut resolvers: HashMap<&'static str, Resolver> = HashMap::new();
        resolvers.insert("CREATIVE_ID", |ctx| Ok(ctx.token.creative_id.clone()));
        resolvers.insert("LINE_ITEM_ID", |ctx| Ok(ctx.token.line_item_id.clone()));
        resolvers.insert("CAMPAIGN_ID", |ctx| Ok(ctx.token.campaign_id.clone()));
        resolvers.insert("AUCTION_ID", |ctx| Ok(ctx.auction_id.to_string()));
        resolvers.insert("TIMESTAMP", |ctx| Ok(ctx.timestamp.to_string()));
        Self { resolvers }
    }
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers or overrides a macro resolver. Exposed so deployments can
    /// extend the core set; not used by any resolver in this crate.
    pub fn register(&mut self, name: &'static str, resolver: Resolver) {
        self.resolvers.insert(name, resolver);
    }

    /// `None` means "leave unexpanded": either the name is unknown to the
    /// registry, or its resolver returned an error.
    fn resolve_one(&self, name: &str, ctx: &ExpansionContext<'_>) -> Option<String> {
        if let Some(key) = name.strip_prefix("CUSTOM.") {
            return Some(ctx.token.custom_params.get(key).cloned().unwrap_or_default());
        }
        match self.resolvers.get(name) {
            Some(resolver) => match resolver(ctx) {
                Ok(value) => Some(value),
                Err(err) => {
                    tracing::debug!(macro_name = name, error = %err, "macro resolver failed, leaving unexpanded");
                    None
                }
            },
            None => None,
        }
    }

    /// Expands every `{NAME}` token in `url`. Unknown or failing macros are
    /// left in place verbatim.
    pub fn expand(&self, url: &str, ctx: &ExpansionContext<'_>) -> String {
        let mut out = String::with_capacity(url.len());
        let bytes = url.as_bytes();

        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = url[i..].find('}') {
                    let name = &url[i + 1..i + end];
                    match self.resolve_one(name, ctx) {
                        Some(value) => out.push_str(&value),
                        None => out.push_str(&url[i..i + end + 1]),
                    }
                    i += end + 1;
                    continue;
                }
            }
            let ch = url[i..].chars().next().unwrap();
            out.push(ch);
            i += ch.len_utf8();
        }
        out
    }

    /// Returns the set of macro names in `url` not known to this registry
    /// (custom params are always considered known). Used at line-item
    /// upload time to catch typos before they reach production traffic.
    pub fn validate(&self, url: &str) -> Vec<String> {
        let mut unknown = HashSet::new();
        let mut i = 0;
        let bytes = url.as_bytes();
        while i < bytes.len() {
            if bytes[i] == b'{' {
                if let Some(end) = url[i..].find('}') {
                    let name = &url[i + 1..i + end];
                    if !name.starts_with("CUSTOM.") && !self.resolvers.contains_key(name) {
                        unknown.insert(name.to_string());
                    }
                    i += end + 1;
                    continue;
                }
            }
            i += 1;
        }
        unknown.into_iter().collect()
    }
}

/// Chooses creative.clickURL if non-empty, else line-item.clickURL, else
/// empty (no redirect, pixel response instead).
pub fn select_click_url<'a>(creative_click_url: &'a str, line_item_click_url: &'a str) -> &'a str {
    if !creative_click_url.is_empty() {
        creative_click_url
    } else {
        line_item_click_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn token_with_custom(pairs: &[(&str, &str)]) -> EventTokenPayload {
        let mut custom_params = BTreeMap::new();
        for (k, v) in pairs {
            custom_params.insert(k.to_string(), v.to_string());
        }
        EventTokenPayload {
            request_id: "req1".into(),
            impression_id: "imp1".into(),
            creative_id: "123".into(),
            campaign_id: "camp1".into(),
            line_item_id: "li1".into(),
            user_id: "u1".into(),
            publisher_id: "pub1".into(),
            placement_id: "p1".into(),
            price: 2.5,
            currency: "USD".into(),
            custom_params,
            issued_at: 0,
        }
    }

    #[test]
    fn expands_core_and_custom_macros() {
        let registry = MacroRegistry::new();
        let token = token_with_custom(&[("utm_source", "google")]);
        let ctx = ExpansionContext {
            token: &token,
            auction_id: "auc1",
            timestamp: 1700000000,
        };
        let expanded = registry.expand("https://ex.com?c={CREATIVE_ID}&s={CUSTOM.utm_source}", &ctx);
        assert_eq!(expanded, "https://ex.com?c=123&s=google");
    }

    #[test]
    fn missing_custom_key_expands_to_empty_string() {
        let registry = MacroRegistry::new();
        let token = token_with_custom(&[]);
        let ctx = ExpansionContext {
            token: &token,
            auction_id: "auc1",
            timestamp: 0,
        };
        assert_eq!(registry.expand("a={CUSTOM.missing}", &ctx), "a=");
    }

    #[test]
    fn unknown_macro_is_left_unexpanded_in_place() {
        let registry = MacroRegistry::new();
        let token = token_with_custom(&[]);
        let ctx = ExpansionContext {
            token: &token,
            auction_id: "auc1",
            timestamp: 0,
        };
        let expanded = registry.expand("https://ex.com?a={CREATIVE_ID}&b={FAILING}", &ctx);
        assert_eq!(expanded, "https://ex.com?a=123&b={FAILING}");
    }

    #[test]
    fn a_resolver_that_errors_leaves_its_macro_unexpanded() {
        let mut registry = MacroRegistry::new();
        registry.register("BROKEN", |_ctx| Err(MacroError::ResolutionFailed("BROKEN".into())));
        let token = token_with_custom(&[]);
        let ctx = ExpansionContext {
            token: &token,
            auction_id: "auc1",
            timestamp: 0,
        };
        let expanded = registry.expand("a={CREATIVE_ID}&b={BROKEN}", &ctx);
        assert_eq!(expanded, "a=123&b={BROKEN}");
    }

    #[test]
    fn validate_reports_only_unknown_names() {
        let registry = MacroRegistry::new();
        let unknown = registry.validate("{CREATIVE_ID}{CUSTOM.x}{BOGUS}");
        assert_eq!(unknown, vec!["BOGUS".to_string()]);
    }

    #[test]
    fn select_click_url_prefers_creative_then_line_item() {
        assert_eq!(select_click_url("https://a", "https://b"), "https://a");
        assert_eq!(select_click_url("", "https://b"), "https://b");
        assert_eq!(select_click_url("", ""), "");
    }
}
