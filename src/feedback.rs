//! Feedback resolution: per-challenge, per-tier messages with defaults,
//! level completion congratulations, and hint policy.

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::domain::{DifficultyTier, Level};

/// Message tables consumed by the resolver. Built from seeds, optionally
/// overridden by the TOML overlay.
#[derive(Clone, Debug)]
pub struct FeedbackTables {
  pub success: BTreeMap<(u32, DifficultyTier), String>,
  pub failure: BTreeMap<(u32, DifficultyTier), String>,
  pub success_default: String,
  pub failure_default: String,
  /// Congratulation shown when a level's full challenge set is validated.
  pub level_success: BTreeMap<String, String>,
  /// Optional per-challenge hint texts.
  pub hints: BTreeMap<u32, String>,
  pub hint_default: String,
  /// Levels that refuse hints entirely, with the refusal message.
  pub hint_refusals: BTreeMap<String, String>,
}

/// Resolve the message for a validation outcome. Missing table entries
/// fall back to the generic success/failure strings.
pub fn feedback(catalog: &Catalog, challenge_id: u32, tier: DifficultyTier, passed: bool) -> String {
  let tables = catalog.feedback();
  let table = if passed { &tables.success } else { &tables.failure };
  let default = if passed { &tables.success_default } else { &tables.failure_default };
  table.get(&(challenge_id, tier)).unwrap_or(default).clone()
}

/// Congratulation for finishing every challenge of a level.
pub fn level_success_message(catalog: &Catalog, level_id: &str) -> String {
  let tables = catalog.feedback();
  tables
    .level_success
    .get(level_id)
    .cloned()
    .unwrap_or_else(|| tables.success_default.clone())
}

/// Hint for a challenge, honoring levels that refuse hints.
pub fn hint_text(catalog: &Catalog, level: &Level, challenge_id: u32) -> String {
  let tables = catalog.feedback();
  if let Some(refusal) = tables.hint_refusals.get(&level.id) {
    return refusal.clone();
  }
  tables
    .hints
    .get(&challenge_id)
    .cloned()
    .unwrap_or_else(|| tables.hint_default.clone())
}
