//! Placeholder map: token plus value rule for each placeholder role.
//!
//! Value rules are minijinja expressions rendered against the per-item
//! [`ValueContext`]. Undefined variables are errors, and fields that do not
//! apply to an item are left out of the context, so a rule that refers to
//! e.g. `filter_output` without a configured pattern fails loudly.

use anyhow::{Context, Result, anyhow};
use minijinja::{Environment, UndefinedBehavior};
use serde::Serialize;

use super::template::{Placeholder, Substitution, Substitutions};
use super::types::ItemMode;

pub const DEFAULT_SOURCE_TOKEN: &str = "XXXX";
pub const DEFAULT_DESTINATION_TOKEN: &str = "YYYY";
pub const DESTINATION_RULE: &str = "{{ result_file }}";

/// Values available to placeholder rules for one item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueContext {
    pub item: String,
    pub counter: u32,
    pub base: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub derived_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_output: Option<String>,
    pub result_file: String,
}

impl ValueContext {
    /// Context shaped like a real item for `mode`, used to check rules up front.
    pub fn sample(mode: ItemMode, filter_enabled: bool) -> Self {
        Self {
            item: "sample.tgz".to_string(),
            counter: 1,
            base: "sample".to_string(),
            derived_path: (mode == ItemMode::Archive).then(|| "sample/log".to_string()),
            filter_output: filter_enabled.then(|| "sample1.txt".to_string()),
            result_file: "sample_1.root".to_string(),
        }
    }
}

/// Default source rule for a mode.
pub fn default_source_rule(mode: ItemMode, filter_enabled: bool) -> &'static str {
    match mode {
        ItemMode::Token => "{{ item }}",
        ItemMode::Archive if filter_enabled => "{{ filter_output }}",
        ItemMode::Archive => "{{ derived_path }}",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaceholderRule {
    pub token: String,
    pub rule: String,
}

/// Source and destination rules, with a strict template environment.
pub struct PlaceholderMap {
    source: PlaceholderRule,
    destination: PlaceholderRule,
    env: Environment<'static>,
}

impl PlaceholderMap {
    pub fn new(source: PlaceholderRule, destination: PlaceholderRule) -> Result<Self> {
        validate_token(Placeholder::Source, &source.token)?;
        validate_token(Placeholder::Destination, &destination.token)?;
        if source.token == destination.token {
            return Err(anyhow!(
                "source and destination tokens must differ (both `{}`)",
                source.token
            ));
        }
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        for (placeholder, rule) in [
            (Placeholder::Source, &source.rule),
            (Placeholder::Destination, &destination.rule),
        ] {
            env.template_from_str(rule)
                .with_context(|| format!("parse {} value rule `{rule}`", placeholder.as_str()))?;
        }
        Ok(Self {
            source,
            destination,
            env,
        })
    }

    pub fn rule(&self, placeholder: Placeholder) -> &PlaceholderRule {
        match placeholder {
            Placeholder::Source => &self.source,
            Placeholder::Destination => &self.destination,
        }
    }

    /// Render both value rules for one item.
    pub fn substitutions(&self, ctx: &ValueContext) -> Result<Substitutions> {
        let mut entries = Vec::with_capacity(Placeholder::ALL.len());
        for placeholder in Placeholder::ALL {
            let rule = self.rule(placeholder);
            let value = self
                .env
                .render_str(&rule.rule, ctx)
                .with_context(|| {
                    format!("render {} value rule `{}`", placeholder.as_str(), rule.rule)
                })?;
            if value.contains('\n') {
                return Err(anyhow!(
                    "{} value must be a single line, got {value:?}",
                    placeholder.as_str()
                ));
            }
            entries.push(Substitution {
                placeholder,
                token: rule.token.clone(),
                value,
            });
        }
        Ok(Substitutions::new(entries))
    }

    /// Fail early if a rule cannot render for items of `mode`.
    pub fn check(&self, mode: ItemMode, filter_enabled: bool) -> Result<()> {
        self.substitutions(&ValueContext::sample(mode, filter_enabled))
            .with_context(|| format!("placeholder rules do not fit {} mode", mode.as_str()))?;
        Ok(())
    }
}

fn validate_token(placeholder: Placeholder, token: &str) -> Result<()> {
    if token.is_empty() {
        return Err(anyhow!("{} token must be non-empty", placeholder.as_str()));
    }
    if token.contains('\n') {
        return Err(anyhow!(
            "{} token must not contain a newline",
            placeholder.as_str()
        ));
    }
    Ok(())
}
