//! HTTP endpoint handlers. These are thin wrappers that forward to core logic.
//! Each handler is instrumented; failures surface as `ApiError` responses.

use std::sync::Arc;
use axum::{
  extract::{Path, Query, State},
  Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::errors::ApiError;
use crate::logic;
use crate::protocol::*;
use crate::state::AppState;

#[instrument(level = "info")]
pub async fn http_health() -> Json<HealthOut> {
  Json(HealthOut { ok: true })
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_levels(State(state): State<Arc<AppState>>) -> Json<Vec<LevelSummaryOut>> {
  Json(logic::list_levels(&state).await)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_level(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<LevelDetailOut>, ApiError> {
  Ok(Json(logic::level_detail(&state, &id).await?))
}

#[instrument(level = "info", skip(state, body))]
pub async fn http_post_session(
  State(state): State<Arc<AppState>>,
  body: Option<Json<AttachSessionIn>>,
) -> Result<Json<SessionOut>, ApiError> {
  let requested = body.and_then(|Json(b)| b.session_id);
  let out = logic::start_session(&state, requested).await?;
  info!(target: "course", session = %out.session_id, restored = out.restored, "HTTP session attached");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ProgressOut>, ApiError> {
  Ok(Json(logic::view_progress(&state, id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, level = %body.level))]
pub async fn http_post_level(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<SelectLevelIn>,
) -> Result<Json<ProgressOut>, ApiError> {
  Ok(Json(logic::select_level(&state, id, &body.level).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_next_step(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StepOut>, ApiError> {
  Ok(Json(logic::next_step(&state, id).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_prev_step(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<StepOut>, ApiError> {
  Ok(Json(logic::prev_step(&state, id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id, micro = body.micro, code_len = body.code.len()))]
pub async fn http_post_micro(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<CheckMicroIn>,
) -> Result<Json<MicroResultOut>, ApiError> {
  let out = logic::check_micro(&state, id, body.micro, &body.code).await?;
  info!(target: "course", session = %id, micro = out.micro, passed = out.passed, "HTTP micro checked");
  Ok(Json(out))
}

#[instrument(level = "info", skip(state), fields(%id, micro))]
pub async fn http_get_hint(
  State(state): State<Arc<AppState>>,
  Path((id, micro)): Path<(Uuid, u32)>,
) -> Result<Json<HintOut>, ApiError> {
  Ok(Json(logic::hint(&state, id, micro).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_export(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<ExportDoc>, ApiError> {
  Ok(Json(logic::export_stats(&state, id).await?))
}

#[instrument(level = "info", skip(state, body), fields(%id))]
pub async fn http_post_import(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
  Json(body): Json<ExportDoc>,
) -> Result<Json<ProgressOut>, ApiError> {
  Ok(Json(logic::import_stats(&state, id, body).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_post_save(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Result<Json<SavedOut>, ApiError> {
  Ok(Json(logic::save_now(&state, id).await?))
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_delete_session(
  State(state): State<Arc<AppState>>,
  Path(id): Path<Uuid>,
) -> Json<RemovedOut> {
  Json(logic::remove_session(&state, id).await)
}

#[instrument(level = "info", skip(state, body), fields(micro = body.micro, tier = %body.tier))]
pub async fn http_post_validate(
  State(state): State<Arc<AppState>>,
  Json(body): Json<ValidateIn>,
) -> Json<ValidateOut> {
  Json(logic::validate_only(&state, &body).await)
}

#[instrument(level = "info", skip(state), fields(%id))]
pub async fn http_get_micro(
  State(state): State<Arc<AppState>>,
  Path(id): Path<u32>,
  Query(q): Query<MicroInfoQuery>,
) -> Result<Json<MicroInfoOut>, ApiError> {
  Ok(Json(logic::micro_info(&state, id, q.tier).await?))
}
