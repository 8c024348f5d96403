//! Core behaviors shared by both HTTP and WebSocket handlers.
//!
//! This includes:
//!   - Session lifecycle (attach, reset, remove, save)
//!   - Level selection and step navigation
//!   - Micro-challenge checks with feedback and badge awards
//!   - Hints, progress views, and the export/import documents
//!
//! Handlers stay thin: they parse transport concerns and call into
//! here; everything below returns protocol DTOs or `ApiError`.

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::catalog::Catalog;
use crate::domain::{DifficultyTier, SessionSnapshot, ValidationStrategy};
use crate::errors::ApiError;
use crate::feedback;
use crate::protocol::{
  level_summary, BadgeOut, ExportDoc, HintOut, LevelDetailOut, LevelSummaryOut, MicroInfoOut,
  MicroResultOut, ProgressOut, ProgressStats, RemovedOut, SavedOut, SessionOut, StepOut,
  ValidateIn, ValidateOut, EXPORT_VERSION,
};
use crate::session::{SessionState, StateError};
use crate::state::AppState;
use crate::validator::validate;

fn badge_out(catalog: &Catalog, id: &str) -> BadgeOut {
  match catalog.badge(id) {
    Some(b) => BadgeOut { id: b.id.clone(), label: b.label.clone() },
    None => BadgeOut { id: id.to_string(), label: id.to_string() },
  }
}

/// Project a session onto its client-facing progress view.
fn progress_of(catalog: &Catalog, s: &SessionState) -> ProgressOut {
  let level = s.level().and_then(|id| catalog.level(id));
  ProgressOut {
    level: level.map(level_summary),
    step_index: s.step_index(),
    step_title: level.and_then(|l| l.step_titles.get(s.step_index()).cloned()),
    total_steps: level.map(|l| l.total_steps).unwrap_or(0),
    progress_percent: s.progress_percent(catalog),
    validated: level
      .and_then(|l| s.validated_by_level().get(&l.id))
      .map(|set| set.iter().copied().collect())
      .unwrap_or_default(),
    validated_by_level: s
      .validated_by_level()
      .iter()
      .map(|(id, set)| (id.clone(), set.iter().copied().collect()))
      .collect(),
    badges: s.badges().iter().map(|id| badge_out(catalog, id)).collect(),
    started_at: s.started_at(),
    completed: s.is_complete(catalog),
  }
}

/// Flatten a session into the export totals.
fn stats_of(catalog: &Catalog, s: &SessionState) -> ProgressStats {
  let level = s.level().and_then(|id| catalog.level(id));
  let validated_by_level: std::collections::BTreeMap<String, Vec<u32>> = s
    .validated_by_level()
    .iter()
    .map(|(id, set)| (id.clone(), set.iter().copied().collect()))
    .collect();
  let validated_count = validated_by_level.values().map(Vec::len).sum();
  ProgressStats {
    level: s.level().map(String::from),
    level_name: level.map(|l| l.name.clone()),
    step_index: s.step_index(),
    total_steps: level.map(|l| l.total_steps).unwrap_or(0),
    progress_percent: s.progress_percent(catalog),
    validated_by_level,
    validated_count,
    badges: s.badges().iter().cloned().collect(),
    badge_count: s.badges().len(),
    started_at: s.started_at(),
    completed: s.is_complete(catalog),
  }
}

/// Attach to a session (fresh, live, or restored from the store) and
/// return its id plus the current progress view.
#[instrument(level = "info", skip(state))]
pub async fn start_session(state: &AppState, requested: Option<Uuid>) -> Result<SessionOut, ApiError> {
  let (session_id, restored) = state.attach_session(requested).await;
  let progress = view_progress(state, session_id).await?;
  Ok(SessionOut { session_id, restored, progress })
}

pub async fn list_levels(state: &AppState) -> Vec<LevelSummaryOut> {
  state.catalog.levels_ordered().into_iter().map(level_summary).collect()
}

pub async fn level_detail(state: &AppState, id: &str) -> Result<LevelDetailOut, ApiError> {
  let level = state.catalog.require_level(id)?;
  Ok(crate::protocol::level_detail(level))
}

#[instrument(level = "info", skip(state), fields(%session_id, level))]
pub async fn select_level(
  state: &AppState,
  session_id: Uuid,
  level: &str,
) -> Result<ProgressOut, ApiError> {
  state
    .try_with_session(session_id, |s, c| s.select_level(c, level))
    .await
    .ok_or(ApiError::UnknownSession(session_id))??;
  state.save_session(session_id).await;
  info!(target: "course", session = %session_id, level, "Level selected");
  view_progress(state, session_id).await
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn next_step(state: &AppState, session_id: Uuid) -> Result<StepOut, ApiError> {
  let step = state
    .try_with_session(session_id, |s, c| s.advance_step(c))
    .await
    .ok_or(ApiError::UnknownSession(session_id))??;
  state.save_session(session_id).await;
  step_view(state, session_id, step).await
}

#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn prev_step(state: &AppState, session_id: Uuid) -> Result<StepOut, ApiError> {
  let step = state
    .try_with_session(session_id, |s, _| s.retreat_step())
    .await
    .ok_or(ApiError::UnknownSession(session_id))??;
  state.save_session(session_id).await;
  step_view(state, session_id, step).await
}

async fn step_view(state: &AppState, session_id: Uuid, step_index: usize) -> Result<StepOut, ApiError> {
  let catalog = state.catalog.clone();
  state
    .read_session(session_id, |s| StepOut {
      step_index,
      step_title: s
        .level()
        .and_then(|id| catalog.level(id))
        .and_then(|l| l.step_titles.get(step_index).cloned())
        .unwrap_or_default(),
      progress_percent: s.progress_percent(&catalog),
    })
    .await
    .ok_or(ApiError::UnknownSession(session_id))
}

/// Check a submission against the session's current tier, record the
/// outcome, and resolve feedback plus any newly earned badges.
#[instrument(level = "info", skip(state, code), fields(%session_id, micro, code_len = code.len()))]
pub async fn check_micro(
  state: &AppState,
  session_id: Uuid,
  micro: u32,
  code: &str,
) -> Result<MicroResultOut, ApiError> {
  let level_id = state
    .read_session(session_id, |s| s.level().map(String::from))
    .await
    .ok_or(ApiError::UnknownSession(session_id))?
    .ok_or(StateError::NoLevelSelected)?;
  let tier = state.catalog.require_level(&level_id)?.tier();

  // A level whose rank maps to no tier has no runnable checks.
  let passed = match tier {
    Some(t) => validate(&state.catalog, micro, code, t),
    None => false,
  };

  let (earned, completed, just_completed) = state
    .try_with_session(session_id, |s, c| {
      let was_complete = s.is_complete(c);
      let earned = s.record_validation(c, micro, passed)?;
      let completed = s.is_complete(c);
      Ok((earned, completed, !was_complete && completed))
    })
    .await
    .ok_or(ApiError::UnknownSession(session_id))??;
  let badges_awarded: Vec<BadgeOut> =
    earned.iter().map(|id| badge_out(&state.catalog, id)).collect();

  let feedback_text = match tier {
    Some(t) => feedback::feedback(&state.catalog, micro, t, passed),
    None => state.catalog.feedback().failure_default.clone(),
  };
  let course_message = if just_completed {
    Some(feedback::level_success_message(&state.catalog, &level_id))
  } else {
    None
  };

  if passed {
    state.save_session(session_id).await;
    info!(target: "course", session = %session_id, micro, new_badges = badges_awarded.len(), completed, "Validation passed");
  }

  Ok(MicroResultOut {
    micro,
    passed,
    feedback: feedback_text,
    badges_awarded,
    completed,
    course_message,
  })
}

#[instrument(level = "info", skip(state), fields(%session_id, micro))]
pub async fn hint(state: &AppState, session_id: Uuid, micro: u32) -> Result<HintOut, ApiError> {
  let level_id = state
    .read_session(session_id, |s| s.level().map(String::from))
    .await
    .ok_or(ApiError::UnknownSession(session_id))?
    .ok_or(StateError::NoLevelSelected)?;
  let level = state.catalog.require_level(&level_id)?;
  Ok(HintOut { text: feedback::hint_text(&state.catalog, level, micro) })
}

pub async fn view_progress(state: &AppState, session_id: Uuid) -> Result<ProgressOut, ApiError> {
  let catalog = state.catalog.clone();
  state
    .read_session(session_id, |s| progress_of(&catalog, s))
    .await
    .ok_or(ApiError::UnknownSession(session_id))
}

/// Build the portable progress document.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn export_stats(state: &AppState, session_id: Uuid) -> Result<ExportDoc, ApiError> {
  let catalog = state.catalog.clone();
  let progress = state
    .read_session(session_id, |s| stats_of(&catalog, s))
    .await
    .ok_or(ApiError::UnknownSession(session_id))?;
  Ok(ExportDoc {
    progress,
    timestamp: Utc::now(),
    version: EXPORT_VERSION.to_string(),
  })
}

/// Replace the session's progress with an imported document. The
/// document must carry the supported version and reference only levels
/// the catalog knows; unknown challenge or badge ids are dropped.
#[instrument(level = "info", skip(state, doc), fields(%session_id, version = %doc.version))]
pub async fn import_stats(
  state: &AppState,
  session_id: Uuid,
  doc: ExportDoc,
) -> Result<ProgressOut, ApiError> {
  if doc.version != EXPORT_VERSION {
    return Err(ApiError::BadRequest(format!(
      "unsupported export version '{}'",
      doc.version
    )));
  }
  let snapshot = SessionSnapshot {
    level: doc.progress.level,
    step_index: doc.progress.step_index,
    validated_by_level: doc.progress.validated_by_level,
    badges: doc.progress.badges,
    started_at: doc.progress.started_at,
  };
  let restored = SessionState::from_snapshot(&state.catalog, snapshot)
    .map_err(|e| ApiError::BadRequest(format!("import rejected: {e}")))?;
  state
    .with_session(session_id, |s| *s = restored)
    .await
    .ok_or(ApiError::UnknownSession(session_id))?;
  state.save_session(session_id).await;
  info!(target: "course", session = %session_id, "Progress imported");
  view_progress(state, session_id).await
}

pub async fn save_now(state: &AppState, session_id: Uuid) -> Result<SavedOut, ApiError> {
  if state.read_session(session_id, |_| ()).await.is_none() {
    return Err(ApiError::UnknownSession(session_id));
  }
  Ok(SavedOut { saved: state.save_session(session_id).await })
}

/// Forget the session entirely, live and stored. Idempotent.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn remove_session(state: &AppState, session_id: Uuid) -> RemovedOut {
  RemovedOut { removed: state.drop_session(session_id).await }
}

/// Wipe the session back to its initial state.
#[instrument(level = "info", skip(state), fields(%session_id))]
pub async fn reset(state: &AppState, session_id: Uuid) -> Result<ProgressOut, ApiError> {
  if !state.reset_session(session_id).await {
    return Err(ApiError::UnknownSession(session_id));
  }
  view_progress(state, session_id).await
}

/// Stateless validation: the caller names the tier explicitly.
#[instrument(level = "info", skip(state, v), fields(micro = v.micro, tier = %v.tier, code_len = v.code.len()))]
pub async fn validate_only(state: &AppState, v: &ValidateIn) -> ValidateOut {
  ValidateOut {
    micro: v.micro,
    tier: v.tier,
    passed: validate(&state.catalog, v.micro, &v.code, v.tier),
  }
}

/// Describe a challenge: its strategy, badge, and which tiers carry a
/// runnable check.
pub async fn micro_info(
  state: &AppState,
  id: u32,
  tier: Option<DifficultyTier>,
) -> Result<MicroInfoOut, ApiError> {
  let ch = state.catalog.require_challenge(id)?;
  let strategy = match &ch.strategy {
    ValidationStrategy::Generic(_) => "generic",
    ValidationStrategy::Bespoke(_) => "bespoke",
  };
  let tiers: Vec<DifficultyTier> = match tier {
    Some(t) => vec![t],
    None => vec![
      DifficultyTier::Easy,
      DifficultyTier::Medium,
      DifficultyTier::Hard,
      DifficultyTier::Professional,
    ],
  };
  let checks_by_tier = tiers
    .into_iter()
    .map(|t| (t, state.catalog.has_check(id, t)))
    .collect();
  let badge = ch.badge.as_deref().map(|b| badge_out(&state.catalog, b));
  Ok(MicroInfoOut { id, strategy, badge, checks_by_tier })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::Arc;

  use crate::store::MemoryStore;

  fn test_state() -> AppState {
    AppState::with_store(Catalog::builtin(), Arc::new(MemoryStore::new()))
  }

  async fn started(state: &AppState) -> Uuid {
    start_session(state, None).await.expect("fresh session").session_id
  }

  #[tokio::test]
  async fn full_flow_awards_a_badge() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");

    let result = check_micro(
      &state,
      id,
      1,
      "Une voiture a une caractéristique comme sa couleur",
    )
    .await
    .expect("valid check");
    assert!(result.passed);
    assert_eq!(result.badges_awarded.len(), 1);
    assert_eq!(result.badges_awarded[0].id, "badge-micro1");
    assert_eq!(result.badges_awarded[0].label, "🤔 Observateur");
    assert!(!result.completed);
    assert!(result.course_message.is_none());

    let progress = view_progress(&state, id).await.expect("live session");
    assert_eq!(progress.validated, vec![1]);
    assert_eq!(progress.badges.len(), 1);
  }

  #[tokio::test]
  async fn completion_message_fires_only_on_the_completing_check() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");
    state
      .try_with_session(id, |s, c| {
        for micro in 1..=7 {
          s.record_validation(c, micro, true)?;
        }
        Ok(())
      })
      .await
      .expect("live session")
      .expect("known challenges");

    let zoo = "class Animal:\n    pass\n\nclass Chat(Animal):\n    pass";
    let first = check_micro(&state, id, 8, zoo).await.expect("valid check");
    assert!(first.passed);
    assert!(first.completed);
    assert_eq!(
      first.course_message.as_deref(),
      Some("🎉 Félicitations ! Vous maîtrisez les bases de la POO Python !")
    );

    let repeat = check_micro(&state, id, 8, zoo).await.expect("valid check");
    assert!(repeat.passed);
    assert!(repeat.completed);
    assert!(repeat.course_message.is_none());

    let failed = check_micro(&state, id, 1, "court").await.expect("valid check");
    assert!(!failed.passed);
    assert!(failed.completed);
    assert!(failed.course_message.is_none());
  }

  #[tokio::test]
  async fn completing_a_second_level_carries_its_own_message() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");
    state
      .try_with_session(id, |s, c| {
        for micro in 1..=8 {
          s.record_validation(c, micro, true)?;
        }
        Ok(())
      })
      .await
      .expect("live session")
      .expect("known challenges");

    select_level(&state, id, "intermediaire").await.expect("known level");
    state
      .try_with_session(id, |s, c| {
        for micro in 1..=10 {
          s.record_validation(c, micro, true)?;
        }
        Ok(())
      })
      .await
      .expect("live session")
      .expect("known challenges");

    let shop = "class Produit:\n    pass\n\nclass Panier:\n    def ajouter(self, produit):\n        raise ValueError";
    let result = check_micro(&state, id, 11, shop).await.expect("valid check");
    assert!(result.passed);
    assert_eq!(
      result.course_message.as_deref(),
      Some("🎉 Excellent ! Vous avez un niveau solide en POO Python !")
    );
  }

  #[tokio::test]
  async fn failed_check_returns_failure_feedback() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");

    let result = check_micro(&state, id, 1, "court").await.expect("valid check");
    assert!(!result.passed);
    assert!(result.badges_awarded.is_empty());
    assert!(!result.feedback.is_empty());
  }

  #[tokio::test]
  async fn checking_without_a_level_is_a_state_error() {
    let state = test_state();
    let id = started(&state).await;
    let err = check_micro(&state, id, 1, "whatever").await.err();
    assert!(matches!(err, Some(ApiError::State(StateError::NoLevelSelected))));
  }

  #[tokio::test]
  async fn unknown_micro_is_rejected_even_when_the_code_fails() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");
    let err = check_micro(&state, id, 999, "whatever").await.err();
    assert!(matches!(
      err,
      Some(ApiError::State(StateError::UnknownChallenge(999)))
    ));
  }

  #[tokio::test]
  async fn steps_move_and_clamp() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");

    let step = next_step(&state, id).await.expect("selected");
    assert_eq!(step.step_index, 1);
    assert!(!step.step_title.is_empty());
    let step = prev_step(&state, id).await.expect("selected");
    assert_eq!(step.step_index, 0);
    let step = prev_step(&state, id).await.expect("selected");
    assert_eq!(step.step_index, 0);
  }

  #[tokio::test]
  async fn hint_is_refused_on_the_advanced_level() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "avance").await.expect("known level");
    let hint = hint(&state, id, 1).await.expect("selected");
    assert!(hint.text.contains("Aucun indice disponible"));
  }

  #[tokio::test]
  async fn hint_needs_a_selected_level() {
    let state = test_state();
    let id = started(&state).await;
    let err = hint(&state, id, 1).await.err();
    assert!(matches!(err, Some(ApiError::State(StateError::NoLevelSelected))));
  }

  #[tokio::test]
  async fn export_then_import_transfers_progress() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");
    next_step(&state, id).await.expect("selected");
    check_micro(&state, id, 1, "Une voiture a une caractéristique visible")
      .await
      .expect("valid check");
    let doc = export_stats(&state, id).await.expect("live session");
    assert_eq!(doc.version, EXPORT_VERSION);
    assert_eq!(doc.progress.validated_count, 1);
    assert_eq!(doc.progress.level.as_deref(), Some("debutant"));

    let other = test_state();
    let other_id = started(&other).await;
    let progress = import_stats(&other, other_id, doc).await.expect("import");
    assert_eq!(progress.step_index, 1);
    assert_eq!(progress.validated, vec![1]);
    assert_eq!(progress.badges.len(), 1);
  }

  #[tokio::test]
  async fn import_rejects_other_versions() {
    let state = test_state();
    let id = started(&state).await;
    let mut doc = export_stats(&state, id).await.expect("live session");
    doc.version = "2.0".to_string();
    let err = import_stats(&state, id, doc).await.err();
    assert!(matches!(err, Some(ApiError::BadRequest(_))));
  }

  #[tokio::test]
  async fn reset_returns_a_blank_progress_view() {
    let state = test_state();
    let id = started(&state).await;
    select_level(&state, id, "debutant").await.expect("known level");
    let progress = reset(&state, id).await.expect("live session");
    assert!(progress.level.is_none());
    assert_eq!(progress.step_index, 0);
    assert_eq!(progress.progress_percent, 0);
  }

  #[tokio::test]
  async fn validate_only_ignores_sessions() {
    let state = test_state();
    let out = validate_only(
      &state,
      &ValidateIn {
        micro: 2,
        code: "class Chat:\n    pass".to_string(),
        tier: DifficultyTier::Easy,
      },
    )
    .await;
    assert!(out.passed);
  }

  #[tokio::test]
  async fn micro_info_names_the_strategy() {
    let state = test_state();
    let generic = micro_info(&state, 2, None).await.expect("known challenge");
    assert_eq!(generic.strategy, "generic");
    assert_eq!(generic.checks_by_tier[&DifficultyTier::Easy], true);
    assert_eq!(generic.checks_by_tier[&DifficultyTier::Professional], false);

    let bespoke = micro_info(&state, 9, None).await.expect("known challenge");
    assert_eq!(bespoke.strategy, "bespoke");
    assert_eq!(bespoke.checks_by_tier[&DifficultyTier::Professional], true);

    let err = micro_info(&state, 999, None).await.err();
    assert!(matches!(err, Some(ApiError::Catalog(_))));
  }

  #[tokio::test]
  async fn unknown_session_is_rejected_everywhere() {
    let state = test_state();
    let ghost = Uuid::new_v4();
    assert!(matches!(
      view_progress(&state, ghost).await.err(),
      Some(ApiError::UnknownSession(_))
    ));
    assert!(matches!(
      next_step(&state, ghost).await.err(),
      Some(ApiError::UnknownSession(_))
    ));
    assert!(matches!(
      save_now(&state, ghost).await.err(),
      Some(ApiError::UnknownSession(_))
    ));
    let removed = remove_session(&state, ghost).await;
    assert!(!removed.removed);
  }
}
