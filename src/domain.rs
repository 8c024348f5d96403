//! Domain models used by the backend: levels, difficulty tiers, validation
//! rules and strategies, badges, and the persisted session snapshot.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Badge granted when every challenge of a level has been validated.
pub const BADGE_COMPLETE: &str = "badge-complete";
/// Extra badge granted when the completed level is the top-ranked one.
pub const BADGE_PRO: &str = "badge-pro";

/// Difficulty bucket governing which validation rule applies.
///
/// `Professional` parses and serializes like the others but the rank
/// mapping never produces it; tier-dependent checks simply fail on it.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum DifficultyTier {
  Easy,
  Medium,
  Hard,
  Professional,
}

impl DifficultyTier {
  /// Fixed rank→tier mapping (1→easy, 2→medium, 3→hard). Other ranks map
  /// to no tier; callers treat that as "no rule defined".
  pub fn for_rank(rank: u32) -> Option<DifficultyTier> {
    match rank {
      1 => Some(DifficultyTier::Easy),
      2 => Some(DifficultyTier::Medium),
      3 => Some(DifficultyTier::Hard),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      DifficultyTier::Easy => "easy",
      DifficultyTier::Medium => "medium",
      DifficultyTier::Hard => "hard",
      DifficultyTier::Professional => "professional",
    }
  }
}

impl fmt::Display for DifficultyTier {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

/// One course level: ordered steps plus the micro-challenges it contains.
#[derive(Clone, Debug, Serialize)]
pub struct Level {
  pub id: String,
  pub name: String,
  pub rank: u32,
  pub icon: String,
  pub duration: String,
  pub description: String,
  pub features: Vec<String>,
  pub step_titles: Vec<String>,
  pub total_steps: usize,
  /// Challenge ids belonging to this level, in course order.
  pub challenges: Vec<u32>,
}

impl Level {
  /// Highest valid 0-based step index.
  pub fn last_step_index(&self) -> usize {
    self.total_steps.saturating_sub(1)
  }

  pub fn tier(&self) -> Option<DifficultyTier> {
    DifficultyTier::for_rank(self.rank)
  }
}

/// Generic validation rule: every present condition must hold.
/// An absent field means that condition is not checked.
#[derive(Clone, Debug, Default)]
pub struct ValidationRule {
  pub min_length: Option<usize>,
  pub required: Vec<String>,
  pub forbidden: Vec<String>,
  pub pattern: Option<Regex>,
}

/// Signature of a hand-written challenge check over normalized text.
pub type BespokePredicate = fn(&str, DifficultyTier) -> bool;

/// How a challenge is validated. Stored in the catalog and looked up,
/// never dispatched on by challenge number.
#[derive(Clone, Debug)]
pub enum ValidationStrategy {
  /// One optional rule per tier; missing tier entry = automatic failure.
  Generic(BTreeMap<DifficultyTier, ValidationRule>),
  /// Fixed boolean expression over substring checks.
  Bespoke(BespokePredicate),
}

/// One short coding exercise, validated independently of step navigation.
#[derive(Clone, Debug)]
pub struct MicroChallenge {
  pub id: u32,
  pub strategy: ValidationStrategy,
  /// Zero or one badge granted on first successful validation.
  pub badge: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Badge {
  pub id: String,
  pub label: String,
}

/// Flat record written to the progress store. Field names and shape are
/// the external contract; ordered collections keep repeated saves of the
/// same state byte-identical.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
  pub level: Option<String>,
  pub step_index: usize,
  #[serde(default)]
  pub validated_by_level: BTreeMap<String, Vec<u32>>,
  #[serde(default)]
  pub badges: Vec<String>,
  pub started_at: DateTime<Utc>,
}
