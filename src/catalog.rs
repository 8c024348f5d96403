//! Course catalog: read-only access to levels, micro-challenges, badges,
//! and feedback tables.
//!
//! The catalog is assembled once at startup from the built-in seeds plus
//! an optional TOML overlay, then shared immutably. Definitions that fail
//! their integrity checks are logged and skipped, never fatal.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{error, info, warn};

use crate::config::CourseConfig;
use crate::domain::{Badge, DifficultyTier, Level, MicroChallenge, ValidationStrategy};
use crate::feedback::FeedbackTables;
use crate::seeds::{seed_badges, seed_challenges, seed_feedback, seed_levels};

#[derive(Debug, Error, PartialEq, Eq)]
#[non_exhaustive]
pub enum CatalogError {
  #[error("unknown level '{0}'")]
  UnknownLevel(String),
  #[error("unknown challenge {0}")]
  UnknownChallenge(u32),
  #[error("level '{id}' rejected: {reason}")]
  InvalidLevel { id: String, reason: String },
}

#[derive(Debug)]
pub struct Catalog {
  levels: BTreeMap<String, Level>,
  challenges: BTreeMap<u32, MicroChallenge>,
  badges: BTreeMap<String, Badge>,
  feedback: FeedbackTables,
}

impl Catalog {
  /// Catalog holding only the built-in course data.
  pub fn builtin() -> Self {
    let mut catalog = Self {
      levels: BTreeMap::new(),
      challenges: BTreeMap::new(),
      badges: BTreeMap::new(),
      feedback: seed_feedback(),
    };
    for badge in seed_badges() {
      catalog.badges.insert(badge.id.clone(), badge);
    }
    for challenge in seed_challenges() {
      catalog.challenges.insert(challenge.id, challenge);
    }
    for level in seed_levels() {
      catalog.insert_level(level);
    }
    catalog
  }

  /// Built-in catalog extended by an optional overlay, with a startup
  /// inventory summary in the logs.
  pub fn with_overlay(cfg: Option<CourseConfig>) -> Self {
    let mut catalog = Self::builtin();
    if let Some(cfg) = cfg {
      catalog.merge(cfg);
    }
    catalog.log_inventory();
    catalog
  }

  fn merge(&mut self, cfg: CourseConfig) {
    for badge in cfg.badges {
      self.badges.insert(badge.id.clone(), Badge { id: badge.id, label: badge.label });
    }
    for cc in cfg.challenges {
      let id = cc.id;
      match cc.compile() {
        Ok(challenge) => {
          if self.challenges.insert(id, challenge).is_some() {
            warn!(target: "course", challenge = id, "Overlay replaced a built-in challenge");
          }
        }
        Err(e) => {
          error!(target: "course", challenge = id, error = %e, "Skipping overlay challenge");
        }
      }
    }
    for lc in cfg.levels {
      self.insert_level(lc.into_level());
    }
    if let Some(messages) = cfg.messages {
      messages.apply(&mut self.feedback);
    }
  }

  /// Validate and store a level. Invalid definitions are logged and
  /// dropped so a bad overlay cannot poison the catalog.
  fn insert_level(&mut self, level: Level) {
    if let Err(e) = self.check_level(&level) {
      error!(target: "course", level = %level.id, error = %e, "Rejecting level definition");
      return;
    }
    self.levels.insert(level.id.clone(), level);
  }

  fn check_level(&self, level: &Level) -> Result<(), CatalogError> {
    if level.total_steps == 0 {
      return Err(CatalogError::InvalidLevel {
        id: level.id.clone(),
        reason: "a level needs at least one step".into(),
      });
    }
    if level.total_steps != level.step_titles.len() {
      return Err(CatalogError::InvalidLevel {
        id: level.id.clone(),
        reason: format!(
          "total_steps {} does not match {} step titles",
          level.total_steps,
          level.step_titles.len()
        ),
      });
    }
    if self.levels.values().any(|l| l.rank == level.rank && l.id != level.id) {
      return Err(CatalogError::InvalidLevel {
        id: level.id.clone(),
        reason: format!("duplicate rank {}", level.rank),
      });
    }
    for id in &level.challenges {
      if !self.challenges.contains_key(id) {
        return Err(CatalogError::InvalidLevel {
          id: level.id.clone(),
          reason: format!("references unknown challenge {id}"),
        });
      }
    }
    Ok(())
  }

  fn log_inventory(&self) {
    for level in self.levels_ordered() {
      info!(
        target: "course",
        level = %level.id,
        rank = level.rank,
        steps = level.total_steps,
        challenges = level.challenges.len(),
        "Catalog level ready"
      );
    }
    info!(
      target: "course",
      levels = self.levels.len(),
      challenges = self.challenges.len(),
      badges = self.badges.len(),
      "Catalog assembled"
    );
  }

  pub fn level(&self, id: &str) -> Option<&Level> {
    self.levels.get(id)
  }

  pub fn require_level(&self, id: &str) -> Result<&Level, CatalogError> {
    self.level(id).ok_or_else(|| CatalogError::UnknownLevel(id.to_string()))
  }

  /// Levels sorted by ascending difficulty rank.
  pub fn levels_ordered(&self) -> Vec<&Level> {
    let mut levels: Vec<&Level> = self.levels.values().collect();
    levels.sort_by_key(|l| l.rank);
    levels
  }

  /// The hardest level, if any.
  pub fn top_level(&self) -> Option<&Level> {
    self.levels.values().max_by_key(|l| l.rank)
  }

  pub fn challenge(&self, id: u32) -> Option<&MicroChallenge> {
    self.challenges.get(&id)
  }

  pub fn require_challenge(&self, id: u32) -> Result<&MicroChallenge, CatalogError> {
    self.challenge(id).ok_or(CatalogError::UnknownChallenge(id))
  }

  pub fn badge(&self, id: &str) -> Option<&Badge> {
    self.badges.get(id)
  }

  pub fn feedback(&self) -> &FeedbackTables {
    &self.feedback
  }

  /// Whether a rule or predicate exists for this challenge at this tier.
  pub fn has_check(&self, challenge_id: u32, tier: DifficultyTier) -> bool {
    match self.challenge(challenge_id).map(|c| &c.strategy) {
      Some(ValidationStrategy::Generic(rules)) => rules.contains_key(&tier),
      Some(ValidationStrategy::Bespoke(_)) => true,
      None => false,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::{ChallengeCfg, LevelCfg, RuleCfg};
  use crate::domain::DifficultyTier::{Easy, Professional};

  #[test]
  fn builtin_levels_are_ordered_by_rank() {
    let catalog = Catalog::builtin();
    let ids: Vec<&str> = catalog.levels_ordered().iter().map(|l| l.id.as_str()).collect();
    assert_eq!(ids, ["debutant", "intermediaire", "avance"]);
    assert_eq!(catalog.top_level().map(|l| l.id.as_str()), Some("avance"));
  }

  #[test]
  fn unknown_lookups_are_typed_errors() {
    let catalog = Catalog::builtin();
    assert_eq!(
      catalog.require_level("expert").err(),
      Some(CatalogError::UnknownLevel("expert".into()))
    );
    assert_eq!(
      catalog.require_challenge(999).err(),
      Some(CatalogError::UnknownChallenge(999))
    );
  }

  #[test]
  fn has_check_reflects_strategy_and_tier() {
    let catalog = Catalog::builtin();
    assert!(catalog.has_check(2, Easy));
    assert!(!catalog.has_check(2, Professional));
    assert!(catalog.has_check(9, Professional));
    assert!(!catalog.has_check(999, Easy));
  }

  #[test]
  fn overlay_adds_levels_and_challenges() {
    let cfg = CourseConfig {
      levels: vec![LevelCfg {
        id: "expert".into(),
        name: "Expert".into(),
        rank: 4,
        icon: "🏅".into(),
        duration: "90 minutes".into(),
        description: String::new(),
        features: vec![],
        step_titles: vec!["Unique étape".into()],
        total_steps: None,
        challenges: vec![14],
      }],
      challenges: vec![ChallengeCfg {
        id: 14,
        badge: None,
        rules: [(Easy, RuleCfg {
          min_length: Some(10),
          required: vec!["class".into()],
          forbidden: vec![],
          pattern: None,
        })]
        .into_iter()
        .collect(),
      }],
      badges: vec![],
      messages: None,
    };
    let catalog = Catalog::with_overlay(Some(cfg));
    assert!(catalog.level("expert").is_some());
    assert!(catalog.has_check(14, Easy));
    assert_eq!(catalog.levels_ordered().len(), 4);
  }

  #[test]
  fn invalid_overlay_level_is_skipped() {
    let cfg = CourseConfig {
      levels: vec![LevelCfg {
        id: "broken".into(),
        name: "Broken".into(),
        rank: 1, // collides with debutant
        icon: String::new(),
        duration: String::new(),
        description: String::new(),
        features: vec![],
        step_titles: vec!["Une".into()],
        total_steps: None,
        challenges: vec![],
      }],
      challenges: vec![],
      badges: vec![],
      messages: None,
    };
    let catalog = Catalog::with_overlay(Some(cfg));
    assert!(catalog.level("broken").is_none());
    assert_eq!(catalog.levels_ordered().len(), 3);
  }
}
