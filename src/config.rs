//! Loading the course catalog overlay (levels, generic challenges, badges,
//! message overrides) from TOML.
//!
//! See `CourseConfig` for the expected schema.

use std::collections::BTreeMap;

use regex::Regex;
use serde::Deserialize;
use tracing::{error, info};

use crate::domain::{DifficultyTier, Level, MicroChallenge, ValidationRule, ValidationStrategy};
use crate::feedback::FeedbackTables;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct CourseConfig {
  #[serde(default)]
  pub levels: Vec<LevelCfg>,
  #[serde(default)]
  pub challenges: Vec<ChallengeCfg>,
  #[serde(default)]
  pub badges: Vec<BadgeCfg>,
  #[serde(default)]
  pub messages: Option<MessagesCfg>,
}

/// Level entry accepted in TOML configuration.
/// `total_steps` may be omitted; it then follows the step title count.
#[derive(Clone, Debug, Deserialize)]
pub struct LevelCfg {
  pub id: String,
  pub name: String,
  pub rank: u32,
  #[serde(default)] pub icon: String,
  #[serde(default)] pub duration: String,
  #[serde(default)] pub description: String,
  #[serde(default)] pub features: Vec<String>,
  pub step_titles: Vec<String>,
  #[serde(default)] pub total_steps: Option<usize>,
  #[serde(default)] pub challenges: Vec<u32>,
}

impl LevelCfg {
  pub fn into_level(self) -> Level {
    let total_steps = self.total_steps.unwrap_or(self.step_titles.len());
    Level {
      id: self.id,
      name: self.name,
      rank: self.rank,
      icon: self.icon,
      duration: self.duration,
      description: self.description,
      features: self.features,
      step_titles: self.step_titles,
      total_steps,
      challenges: self.challenges,
    }
  }
}

/// Challenge entry accepted in TOML configuration.
/// Overlay challenges are generic only; bespoke predicates cannot be
/// expressed in data.
#[derive(Clone, Debug, Deserialize)]
pub struct ChallengeCfg {
  pub id: u32,
  #[serde(default)] pub badge: Option<String>,
  #[serde(default)] pub rules: BTreeMap<DifficultyTier, RuleCfg>,
}

impl ChallengeCfg {
  /// Compile the per-tier rules. One invalid pattern rejects the entry.
  pub fn compile(self) -> Result<MicroChallenge, regex::Error> {
    let mut rules = BTreeMap::new();
    for (tier, rule) in self.rules {
      rules.insert(tier, rule.compile()?);
    }
    Ok(MicroChallenge {
      id: self.id,
      strategy: ValidationStrategy::Generic(rules),
      badge: self.badge,
    })
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct RuleCfg {
  #[serde(default)] pub min_length: Option<usize>,
  #[serde(default)] pub required: Vec<String>,
  #[serde(default)] pub forbidden: Vec<String>,
  #[serde(default)] pub pattern: Option<String>,
}

impl RuleCfg {
  fn compile(self) -> Result<ValidationRule, regex::Error> {
    let pattern = match self.pattern {
      Some(p) => Some(Regex::new(&p)?),
      None => None,
    };
    Ok(ValidationRule {
      min_length: self.min_length,
      required: self.required,
      forbidden: self.forbidden,
      pattern,
    })
  }
}

#[derive(Clone, Debug, Deserialize)]
pub struct BadgeCfg {
  pub id: String,
  pub label: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct FeedbackEntryCfg {
  pub challenge: u32,
  pub tier: DifficultyTier,
  pub text: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct HintCfg {
  pub challenge: u32,
  pub text: String,
}

/// Message overrides. Every field is optional; omitted fields keep the
/// built-in texts.
#[derive(Clone, Debug, Deserialize, Default)]
pub struct MessagesCfg {
  #[serde(default)] pub success_default: Option<String>,
  #[serde(default)] pub failure_default: Option<String>,
  #[serde(default)] pub hint_default: Option<String>,
  #[serde(default)] pub success: Vec<FeedbackEntryCfg>,
  #[serde(default)] pub failure: Vec<FeedbackEntryCfg>,
  #[serde(default)] pub hints: Vec<HintCfg>,
  #[serde(default)] pub level_success: BTreeMap<String, String>,
  #[serde(default)] pub hint_refusals: BTreeMap<String, String>,
}

impl MessagesCfg {
  pub fn apply(self, tables: &mut FeedbackTables) {
    if let Some(s) = self.success_default {
      tables.success_default = s;
    }
    if let Some(s) = self.failure_default {
      tables.failure_default = s;
    }
    if let Some(s) = self.hint_default {
      tables.hint_default = s;
    }
    for entry in self.success {
      tables.success.insert((entry.challenge, entry.tier), entry.text);
    }
    for entry in self.failure {
      tables.failure.insert((entry.challenge, entry.tier), entry.text);
    }
    for hint in self.hints {
      tables.hints.insert(hint.challenge, hint.text);
    }
    for (level, msg) in self.level_success {
      tables.level_success.insert(level, msg);
    }
    for (level, msg) in self.hint_refusals {
      tables.hint_refusals.insert(level, msg);
    }
  }
}

/// Attempt to load `CourseConfig` from COURSE_CONFIG_PATH.
/// On any parsing/IO error, returns None and the built-in catalog stands.
pub fn load_course_config_from_env() -> Option<CourseConfig> {
  let path = std::env::var("COURSE_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<CourseConfig>(&s) {
      Ok(cfg) => {
        info!(target: "poo_backend", %path, "Loaded course config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "poo_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "poo_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
