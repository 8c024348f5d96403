//! Pure validation of learner submissions against the catalog.
//!
//! `validate` is a function of its inputs and the catalog only: no state,
//! no IO. Unknown challenges and missing tier rules fail validation, they
//! never error.

use tracing::debug;

use crate::catalog::Catalog;
use crate::domain::{DifficultyTier, ValidationRule, ValidationStrategy};
use crate::util::{char_len, normalize_submission};

/// Check a submission for one micro-challenge at one difficulty tier.
pub fn validate(catalog: &Catalog, challenge_id: u32, submitted: &str, tier: DifficultyTier) -> bool {
  let Some(challenge) = catalog.challenge(challenge_id) else {
    debug!(target: "course", challenge = challenge_id, "Validation against unknown challenge");
    return false;
  };
  let text = normalize_submission(submitted);
  match &challenge.strategy {
    ValidationStrategy::Generic(rules) => match rules.get(&tier) {
      Some(rule) => rule_passes(rule, &text),
      // No rule defined for this tier: automatic failure.
      None => false,
    },
    ValidationStrategy::Bespoke(predicate) => predicate(&text, tier),
  }
}

/// Conjunction of the rule's present conditions, checked over normalized
/// text. Short-circuits but stays order-independent for callers.
fn rule_passes(rule: &ValidationRule, text: &str) -> bool {
  if let Some(min) = rule.min_length {
    if char_len(text) < min {
      return false;
    }
  }
  for needle in &rule.required {
    if !text.contains(needle.as_str()) {
      return false;
    }
  }
  for needle in &rule.forbidden {
    if text.contains(needle.as_str()) {
      return false;
    }
  }
  if let Some(pattern) = &rule.pattern {
    if !pattern.is_match(text) {
      return false;
    }
  }
  true
}
