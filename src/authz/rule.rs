use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use glob::Pattern;
use serde::{Deserialize, Serialize};

use crate::authn::Subject;
use crate::permission::{Action, Permission};

use super::PolicyEvaluator;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Effect {
    Allow,
    Deny,
}

/// Rule that defines which subjects may perform which actions on which
/// permissions. Every field is a list of glob patterns: `*` matches any run
/// of characters, so `rn:hydra:accounts:*` covers every account instance,
/// and `?` and `[..]` have their usual glob meaning.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyRule {
    #[serde(default)]
    #[serde(skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub subjects: Vec<String>,

    pub permissions: Vec<String>,

    /// Available actions: "create", "get", "delete". Use "*" for all.
    pub actions: Vec<String>,

    #[serde(default = "default_effect")]
    pub effect: Effect,
}

impl PolicyRule {
    /// Checks that every list is non-empty and every pattern compiles.
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<CompiledRule> {
        Ok(CompiledRule {
            subjects: compile_patterns("subjects", &self.subjects)?,
            permissions: compile_patterns("permissions", &self.permissions)?,
            actions: compile_patterns("actions", &self.actions)?,
            effect: self.effect,
        })
    }
}

struct CompiledRule {
    subjects: Vec<Pattern>,
    permissions: Vec<Pattern>,
    actions: Vec<Pattern>,
    effect: Effect,
}

impl CompiledRule {
    fn matches(&self, subject: &str, permission: &str, action: &str) -> bool {
        match_any(&self.subjects, subject)
            && match_any(&self.permissions, permission)
            && match_any(&self.actions, action)
    }
}

/// Policy evaluator backed by a static list of rules. A request is permitted
/// when at least one allow rule matches and no deny rule does.
pub struct RulePolicyEvaluator {
    rules: Vec<CompiledRule>,
}

impl RulePolicyEvaluator {
    /// Compiles the rules once.
    ///
    /// # Arguments
    ///
    /// * `rules` - Rules in config order, an empty list permits nothing
    ///
    /// # Returns
    ///
    /// An error naming the first rule with an empty list or a pattern that
    /// does not compile.
    pub fn new(rules: Vec<PolicyRule>) -> Result<Self> {
        let rules = rules
            .iter()
            .enumerate()
            .map(|(idx, rule)| {
                rule.compile()
                    .with_context(|| format!("invalid authz rule #{idx}"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn evaluate(&self, subject: &str, permission: &str, action: &str) -> bool {
        let mut allowed = false;
        for rule in self.rules.iter() {
            if !rule.matches(subject, permission, action) {
                continue;
            }
            match rule.effect {
                Effect::Deny => return false,
                Effect::Allow => allowed = true,
            }
        }
        allowed
    }
}

#[async_trait]
impl PolicyEvaluator for RulePolicyEvaluator {
    async fn is_permitted(
        &self,
        subject: &Subject,
        permission: &Permission,
        action: Action,
    ) -> Result<bool> {
        Ok(self.evaluate(&subject.id, permission.as_str(), action.as_str()))
    }
}

fn compile_patterns(field: &str, patterns: &[String]) -> Result<Vec<Pattern>> {
    if patterns.is_empty() {
        bail!("{field} cannot be empty");
    }
    patterns
        .iter()
        .map(|pattern| {
            Pattern::new(pattern).with_context(|| format!("invalid {field} pattern '{pattern}'"))
        })
        .collect()
}

fn match_any(patterns: &[Pattern], value: &str) -> bool {
    patterns.iter().any(|pattern| pattern.matches(value))
}

fn default_effect() -> Effect {
    Effect::Allow
}
