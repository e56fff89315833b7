//! HTTP endpoint handlers. These are thin wrappers that forward to the core flows.
//! Each handler is instrumented and logs identifiers and basic result info.

use std::sync::Arc;
use axum::{extract::{Path, State}, http::StatusCode, Json, response::{IntoResponse, Response}};
use tracing::{error, info, instrument};

use crate::orchestrator::{generate_adaptive_puzzle, GenerationRequest};
use crate::protocol::*;
use crate::state::{AppState, Submission};

/// Error responses. Upstream details stay in the logs, never in the body.
#[derive(Debug)]
pub enum ApiError {
  BadRequest(String),
  NotFound(String),
  GenerationFailed,
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, error) = match self {
      ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
      ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
      ApiError::GenerationFailed => (StatusCode::BAD_GATEWAY, "Failed to generate puzzle".to_string()),
    };
    (status, Json(ErrorOut { error })).into_response()
  }
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(HealthOut { ok: true, model_configured: state.model_configured })
}

#[instrument(level = "info", skip(state, body), fields(topic = %body.topic, learner_id = ?body.learner_id))]
pub async fn http_generate_puzzle(
  State(state): State<Arc<AppState>>,
  Json(body): Json<GenerateIn>,
) -> Result<(StatusCode, Json<PuzzleOut>), ApiError> {
  if body.topic.trim().is_empty() {
    return Err(ApiError::BadRequest("topic must not be empty".into()));
  }

  let learner = match &body.learner_id {
    Some(id) => state.learner(id).await.and_then(|r| r.context()),
    None => None,
  };
  let request = GenerationRequest {
    topic: body.topic,
    difficulty: body.difficulty,
    language: body.language,
    learner,
  };

  let puzzle = generate_adaptive_puzzle(&*state.llm, &state.prompts, &request)
    .await
    .map_err(|e| {
      error!(target: "puzzle", error = %e, "Puzzle generation failed");
      ApiError::GenerationFailed
    })?;

  let out = to_out(&puzzle);
  state.insert_puzzle(puzzle).await;
  info!(target: "puzzle", id = %out.id, difficulty = %out.difficulty, "HTTP puzzle generated");
  Ok((StatusCode::CREATED, Json(out)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_puzzle(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<PuzzleOut>, ApiError> {
  state
    .get_puzzle(&id)
    .await
    .map(|p| Json(to_out(&p)))
    .ok_or_else(|| ApiError::NotFound(format!("puzzle {id} not found")))
}

#[instrument(level = "info", skip(state, body), fields(%body.learner_id, order_len = body.solution_order.len()))]
pub async fn http_submit_solution(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
  Json(body): Json<SubmitIn>,
) -> Result<Json<SubmitOut>, ApiError> {
  if body.learner_id.trim().is_empty() {
    return Err(ApiError::BadRequest("learnerId must not be empty".into()));
  }
  let puzzle = state
    .get_puzzle(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("puzzle {id} not found")))?;

  let submission = Submission {
    learner_id: body.learner_id.trim(),
    solution_order: &body.solution_order,
    time_spent: body.time_spent.unwrap_or(0.0),
    attempts_count: body.attempts_count,
  };
  let (grade, result) = state.record_submission(&puzzle, submission).await;
  info!(target: "learner", %id, correct = grade.correct, skill_after = result.skill_after, "HTTP submission graded");
  Ok(Json(submit_out(grade, result)))
}

#[instrument(level = "info", skip(state))]
pub async fn http_get_learner(
  State(state): State<Arc<AppState>>,
  Path(id): Path<String>,
) -> Result<Json<LearnerOut>, ApiError> {
  let record = state
    .learner(&id)
    .await
    .ok_or_else(|| ApiError::NotFound(format!("learner {id} not found")))?;
  Ok(Json(LearnerOut {
    learner_id: id,
    skill: record.skill.unwrap_or(0.0),
    recent_skills: record.recent_skills,
  }))
}
