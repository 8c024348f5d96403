//! Session state machine: selected level, step navigation, validated
//! challenges, and badge awards.
//!
//! A `SessionState` is an explicit value owned by the registry; every
//! transition takes the catalog as an argument and either fully applies
//! or fully rejects. Nothing here is global and nothing here does IO.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::warn;

use crate::catalog::Catalog;
use crate::domain::{Level, SessionSnapshot, BADGE_COMPLETE, BADGE_PRO};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StateError {
    #[error("no level selected")]
    NoLevelSelected,
    #[error("unknown level '{0}'")]
    UnknownLevel(String),
    #[error("unknown challenge {0}")]
    UnknownChallenge(u32),
}

#[derive(Clone, Debug)]
pub struct SessionState {
    level: Option<String>,
    step_index: usize,
    validated_by_level: BTreeMap<String, BTreeSet<u32>>,
    badges: BTreeSet<String>,
    started_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            level: None,
            step_index: 0,
            validated_by_level: BTreeMap::new(),
            badges: BTreeSet::new(),
            started_at,
        }
    }

    #[must_use]
    pub fn level(&self) -> Option<&str> {
        self.level.as_deref()
    }

    #[must_use]
    pub fn step_index(&self) -> usize {
        self.step_index
    }

    #[must_use]
    pub fn badges(&self) -> &BTreeSet<String> {
        &self.badges
    }

    #[must_use]
    pub fn validated_by_level(&self) -> &BTreeMap<String, BTreeSet<u32>> {
        &self.validated_by_level
    }

    #[must_use]
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    fn current_level<'a>(&self, catalog: &'a Catalog) -> Result<&'a Level, StateError> {
        let id = self.level.as_deref().ok_or(StateError::NoLevelSelected)?;
        catalog
            .level(id)
            .ok_or_else(|| StateError::UnknownLevel(id.to_string()))
    }

    /// Select a level, restarting it: step index back to zero and the
    /// validated set cleared for that level only. Other levels' records
    /// and earned badges are untouched.
    pub fn select_level(&mut self, catalog: &Catalog, level_id: &str) -> Result<(), StateError> {
        let level = catalog
            .level(level_id)
            .ok_or_else(|| StateError::UnknownLevel(level_id.to_string()))?;
        self.level = Some(level.id.clone());
        self.step_index = 0;
        self.validated_by_level.insert(level.id.clone(), BTreeSet::new());
        Ok(())
    }

    /// Move one step forward, clamped at the last step. The clamp is a
    /// successful no-op, not an error. Returns the new index.
    pub fn advance_step(&mut self, catalog: &Catalog) -> Result<usize, StateError> {
        let last = self.current_level(catalog)?.last_step_index();
        if self.step_index < last {
            self.step_index += 1;
        }
        Ok(self.step_index)
    }

    /// Move one step back, clamped at zero. Returns the new index.
    pub fn retreat_step(&mut self) -> Result<usize, StateError> {
        if self.level.is_none() {
            return Err(StateError::NoLevelSelected);
        }
        self.step_index = self.step_index.saturating_sub(1);
        Ok(self.step_index)
    }

    /// Record a validation outcome for the current level.
    ///
    /// A failed outcome changes nothing. A pass marks the challenge
    /// validated and awards badges idempotently: the challenge badge,
    /// plus the completion badges once the level's whole challenge list
    /// is validated. Returns the badges newly earned by this call.
    pub fn record_validation(
        &mut self,
        catalog: &Catalog,
        challenge_id: u32,
        passed: bool,
    ) -> Result<Vec<String>, StateError> {
        let level = self.current_level(catalog)?;
        let challenge = catalog
            .challenge(challenge_id)
            .ok_or(StateError::UnknownChallenge(challenge_id))?;
        if !passed {
            return Ok(Vec::new());
        }

        let level_id = level.id.clone();
        let challenge_badge = challenge.badge.clone();
        self.validated_by_level
            .entry(level_id.clone())
            .or_default()
            .insert(challenge_id);

        let mut earned = Vec::new();
        if let Some(badge_id) = challenge_badge {
            self.award(catalog, &badge_id, &mut earned);
        }
        if self.level_complete(catalog, &level_id) {
            self.award(catalog, BADGE_COMPLETE, &mut earned);
            let is_top = catalog.top_level().map(|l| l.id == level_id).unwrap_or(false);
            if is_top {
                self.award(catalog, BADGE_PRO, &mut earned);
            }
        }
        Ok(earned)
    }

    /// Earn a badge once; ids the catalog does not know are dropped.
    fn award(&mut self, catalog: &Catalog, badge_id: &str, earned: &mut Vec<String>) {
        if catalog.badge(badge_id).is_none() {
            warn!(target: "course", badge = badge_id, "Skipping award of unknown badge");
            return;
        }
        if self.badges.insert(badge_id.to_string()) {
            earned.push(badge_id.to_string());
        }
    }

    fn level_complete(&self, catalog: &Catalog, level_id: &str) -> bool {
        let Some(level) = catalog.level(level_id) else {
            return false;
        };
        if level.challenges.is_empty() {
            return false;
        }
        let validated = self.validated_by_level.get(level_id);
        level.challenges.iter().all(|id| {
            validated.map(|set| set.contains(id)).unwrap_or(false)
        })
    }

    /// Whether every challenge of the selected level is validated.
    #[must_use]
    pub fn is_complete(&self, catalog: &Catalog) -> bool {
        match self.level.as_deref() {
            Some(id) => self.level_complete(catalog, id),
            None => false,
        }
    }

    /// Progress through the selected level's steps, rounded to a whole
    /// percentage. A single-step level is always at 100.
    #[must_use]
    pub fn progress_percent(&self, catalog: &Catalog) -> u32 {
        let Some(level) = self.level.as_deref().and_then(|id| catalog.level(id)) else {
            return 0;
        };
        if level.total_steps <= 1 {
            return 100;
        }
        let ratio = self.step_index as f64 / (level.total_steps - 1) as f64;
        (100.0 * ratio).round() as u32
    }

    /// Back to an empty session with a fresh start timestamp.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        *self = Self::new(now);
    }

    /// Flat record for the progress store.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            level: self.level.clone(),
            step_index: self.step_index,
            validated_by_level: self
                .validated_by_level
                .iter()
                .map(|(level, set)| (level.clone(), set.iter().copied().collect()))
                .collect(),
            badges: self.badges.iter().cloned().collect(),
            started_at: self.started_at,
        }
    }

    /// Rebuild a session from a stored snapshot, validating it against
    /// the catalog. An unknown selected level rejects the snapshot;
    /// unknown challenge or badge ids are dropped with a warning and the
    /// step index is clamped into the level's bounds.
    pub fn from_snapshot(catalog: &Catalog, snap: SessionSnapshot) -> Result<Self, StateError> {
        let (level, step_index) = match snap.level {
            Some(id) => {
                let level = catalog
                    .level(&id)
                    .ok_or_else(|| StateError::UnknownLevel(id.clone()))?;
                (Some(level.id.clone()), snap.step_index.min(level.last_step_index()))
            }
            None => (None, 0),
        };

        let mut validated_by_level = BTreeMap::new();
        for (level_id, ids) in snap.validated_by_level {
            if catalog.level(&level_id).is_none() {
                warn!(target: "course", level = %level_id, "Dropping stored validations for unknown level");
                continue;
            }
            let mut set = BTreeSet::new();
            for id in ids {
                if catalog.challenge(id).is_some() {
                    set.insert(id);
                } else {
                    warn!(target: "course", level = %level_id, challenge = id, "Dropping stored validation for unknown challenge");
                }
            }
            validated_by_level.insert(level_id, set);
        }

        let mut badges = BTreeSet::new();
        for id in snap.badges {
            if catalog.badge(&id).is_some() {
                badges.insert(id);
            } else {
                warn!(target: "course", badge = %id, "Dropping stored unknown badge");
            }
        }

        Ok(Self {
            level,
            step_index,
            validated_by_level,
            badges,
            started_at: snap.started_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Catalog;

    fn fresh() -> (Catalog, SessionState) {
        (Catalog::builtin(), SessionState::new(Utc::now()))
    }

    #[test]
    fn transitions_require_a_selected_level() {
        let (catalog, mut s) = fresh();
        assert_eq!(s.advance_step(&catalog), Err(StateError::NoLevelSelected));
        assert_eq!(s.retreat_step(), Err(StateError::NoLevelSelected));
        assert_eq!(
            s.record_validation(&catalog, 1, true),
            Err(StateError::NoLevelSelected)
        );
        assert_eq!(s.progress_percent(&catalog), 0);
    }

    #[test]
    fn selecting_an_unknown_level_changes_nothing() {
        let (catalog, mut s) = fresh();
        assert_eq!(
            s.select_level(&catalog, "expert"),
            Err(StateError::UnknownLevel("expert".into()))
        );
        assert_eq!(s.level(), None);
    }

    #[test]
    fn advance_and_retreat_round_trip() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        assert_eq!(s.advance_step(&catalog), Ok(1));
        assert_eq!(s.advance_step(&catalog), Ok(2));
        assert_eq!(s.retreat_step(), Ok(1));
        assert_eq!(s.advance_step(&catalog), Ok(2));
    }

    #[test]
    fn retreat_clamps_at_zero() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        assert_eq!(s.retreat_step(), Ok(0));
        assert_eq!(s.step_index(), 0);
    }

    #[test]
    fn advance_clamps_at_the_last_debutant_step() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        for _ in 0..7 {
            s.advance_step(&catalog).expect("selected");
        }
        assert_eq!(s.step_index(), 7);
        // The eighth advance is a no-op at the last index.
        assert_eq!(s.advance_step(&catalog), Ok(7));
        assert_eq!(s.progress_percent(&catalog), 100);
    }

    #[test]
    fn progress_percent_rounds_the_step_ratio() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        assert_eq!(s.progress_percent(&catalog), 0);
        s.advance_step(&catalog).expect("selected");
        // 100 * 1/7 = 14.28…
        assert_eq!(s.progress_percent(&catalog), 14);
        s.advance_step(&catalog).expect("selected");
        // 100 * 2/7 = 28.57…
        assert_eq!(s.progress_percent(&catalog), 29);
    }

    #[test]
    fn record_validation_is_idempotent() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        let first = s.record_validation(&catalog, 2, true).expect("valid");
        assert_eq!(first, vec!["badge-micro2".to_string()]);
        let again = s.record_validation(&catalog, 2, true).expect("valid");
        assert!(again.is_empty());
        assert_eq!(s.validated_by_level()["debutant"].len(), 1);
        assert_eq!(s.badges().len(), 1);
    }

    #[test]
    fn failed_validation_changes_nothing() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        let earned = s.record_validation(&catalog, 2, false).expect("valid");
        assert!(earned.is_empty());
        assert!(s.validated_by_level()["debutant"].is_empty());
    }

    #[test]
    fn unknown_challenge_is_rejected() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        assert_eq!(
            s.record_validation(&catalog, 999, true),
            Err(StateError::UnknownChallenge(999))
        );
        assert!(s.validated_by_level()["debutant"].is_empty());
    }

    #[test]
    fn completing_a_level_awards_the_completion_badge() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        for id in 1..=7 {
            s.record_validation(&catalog, id, true).expect("valid");
            assert!(!s.is_complete(&catalog));
        }
        let last = s.record_validation(&catalog, 8, true).expect("valid");
        assert!(s.is_complete(&catalog));
        assert!(last.contains(&"badge-micro8".to_string()));
        assert!(last.contains(&BADGE_COMPLETE.to_string()));
        assert!(!last.contains(&BADGE_PRO.to_string()));
    }

    #[test]
    fn completing_the_top_level_also_awards_pro() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "avance").expect("known level");
        for id in 1..=13 {
            s.record_validation(&catalog, id, true).expect("valid");
        }
        assert!(s.badges().contains(BADGE_COMPLETE));
        assert!(s.badges().contains(BADGE_PRO));
    }

    #[test]
    fn reselecting_clears_only_the_new_level() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        s.record_validation(&catalog, 1, true).expect("valid");
        s.select_level(&catalog, "intermediaire").expect("known level");
        s.record_validation(&catalog, 2, true).expect("valid");
        assert_eq!(s.step_index(), 0);
        // Switching away kept the debutant record...
        assert!(s.validated_by_level()["debutant"].contains(&1));
        // ...and re-entering debutant restarts that level only.
        s.select_level(&catalog, "debutant").expect("known level");
        assert!(s.validated_by_level()["debutant"].is_empty());
        assert!(s.validated_by_level()["intermediaire"].contains(&2));
        // Badges survive the restart.
        assert!(s.badges().contains("badge-micro1"));
    }

    #[test]
    fn snapshot_round_trips_through_the_catalog() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "intermediaire").expect("known level");
        s.advance_step(&catalog).expect("selected");
        s.record_validation(&catalog, 1, true).expect("valid");
        s.record_validation(&catalog, 9, true).expect("valid");

        let snap = s.snapshot();
        let restored = SessionState::from_snapshot(&catalog, snap.clone()).expect("valid snapshot");
        assert_eq!(restored.snapshot(), snap);
        assert_eq!(restored.level(), Some("intermediaire"));
        assert_eq!(restored.step_index(), 1);
    }

    #[test]
    fn empty_snapshot_round_trips() {
        let (catalog, s) = fresh();
        let snap = s.snapshot();
        let restored = SessionState::from_snapshot(&catalog, snap.clone()).expect("valid snapshot");
        assert_eq!(restored.snapshot(), snap);
    }

    #[test]
    fn completed_snapshot_round_trips() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        for id in 1..=8 {
            s.record_validation(&catalog, id, true).expect("valid");
        }
        assert!(s.is_complete(&catalog));

        let snap = s.snapshot();
        let restored = SessionState::from_snapshot(&catalog, snap.clone()).expect("valid snapshot");
        assert_eq!(restored.snapshot(), snap);
        assert!(restored.is_complete(&catalog));
        assert!(restored.badges().contains(BADGE_COMPLETE));
    }

    #[test]
    fn snapshot_with_unknown_level_is_rejected() {
        let catalog = Catalog::builtin();
        let snap = SessionSnapshot {
            level: Some("expert".into()),
            step_index: 3,
            validated_by_level: BTreeMap::new(),
            badges: vec![],
            started_at: Utc::now(),
        };
        let err = SessionState::from_snapshot(&catalog, snap).err();
        assert_eq!(err, Some(StateError::UnknownLevel("expert".into())));
    }

    #[test]
    fn snapshot_clamps_step_and_drops_unknown_ids() {
        let catalog = Catalog::builtin();
        let mut validated = BTreeMap::new();
        validated.insert("debutant".to_string(), vec![1, 999]);
        validated.insert("expert".to_string(), vec![1]);
        let snap = SessionSnapshot {
            level: Some("debutant".into()),
            step_index: 42,
            validated_by_level: validated,
            badges: vec!["badge-micro1".into(), "badge-unknown".into()],
            started_at: Utc::now(),
        };
        let restored = SessionState::from_snapshot(&catalog, snap).expect("known level");
        assert_eq!(restored.step_index(), 7);
        assert_eq!(
            restored.validated_by_level()["debutant"],
            [1u32].into_iter().collect::<BTreeSet<_>>()
        );
        assert!(!restored.validated_by_level().contains_key("expert"));
        assert_eq!(restored.badges().len(), 1);
    }

    #[test]
    fn reset_returns_to_empty() {
        let (catalog, mut s) = fresh();
        s.select_level(&catalog, "debutant").expect("known level");
        s.record_validation(&catalog, 1, true).expect("valid");
        s.reset(Utc::now());
        assert_eq!(s.level(), None);
        assert_eq!(s.step_index(), 0);
        assert!(s.validated_by_level().is_empty());
        assert!(s.badges().is_empty());
    }
}
