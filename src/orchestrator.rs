//! The two core flows.
//!
//! - Generation: scheduler parameters → prompt → one model call → parse → sanitize.
//! - Attempt recording: grade → skill update → next-tier recommendation → next parameters.
//!
//! Neither flow holds state; the caller owns storage of puzzles and skills.

use tracing::{info, instrument};

use crate::config::Prompts;
use crate::domain::{Difficulty, DifficultyParameters, GeneratedPuzzle, SanitizedPuzzle};
use crate::error::{PuzzleError, Result};
use crate::learner::{recommend_next_difficulty, update_skill, AttemptOutcome, RecommendationInput};
use crate::llm::{ChatMessage, Completion, CompletionOptions};
use crate::parser::parse_with_strategy;
use crate::prompts::{generation_messages, PromptSpec};
use crate::sanitize::sanitize;
use crate::scheduler::{map_context_to_difficulty, map_skill_to_difficulty, skill_band, SkillContext};
use crate::util::clamp_skill;

pub const DEFAULT_LANGUAGE: &str = "python";
const GENERATION_TEMPERATURE: f32 = 0.7;

#[derive(Clone, Debug, Default)]
pub struct GenerationRequest {
  pub topic: String,
  /// Tier when no learner context is given. With a learner context it seeds the
  /// guardrail's previous band, so the result stays within one band of it.
  pub difficulty: Option<Difficulty>,
  pub language: Option<String>,
  pub learner: Option<SkillContext>,
}

/// Skill value whose band stands for a tier when no learner history exists.
fn representative_skill(difficulty: Difficulty) -> f64 {
  match difficulty {
    Difficulty::Easy => 20.0,
    Difficulty::Medium => 50.0,
    Difficulty::Hard => 85.0,
  }
}

/// Parameters for one generation: learner context when present, else the requested tier.
pub fn generation_parameters(request: &GenerationRequest) -> DifficultyParameters {
  let Some(ctx) = &request.learner else {
    return map_skill_to_difficulty(representative_skill(request.difficulty.unwrap_or_default()));
  };
  let (Some(requested), None) = (request.difficulty, ctx.previous_band) else {
    return map_context_to_difficulty(ctx);
  };

  let seeded = SkillContext {
    previous_band: Some(skill_band(representative_skill(requested))),
    ..ctx.clone()
  };
  let params = map_context_to_difficulty(&seeded);
  if params.difficulty != requested {
    info!(
      target: "puzzle",
      %requested,
      chosen = %params.difficulty,
      band = params.band,
      "Requested difficulty adjusted to learner skill"
    );
  }
  params
}

#[instrument(
  level = "info",
  skip(backend, prompts, request),
  fields(topic = %request.topic, has_learner = request.learner.is_some())
)]
pub async fn generate_adaptive_puzzle<B: Completion + ?Sized>(
  backend: &B,
  prompts: &Prompts,
  request: &GenerationRequest,
) -> Result<GeneratedPuzzle> {
  let topic = request.topic.trim();
  if topic.is_empty() {
    return Err(PuzzleError::Validation("topic must not be empty".into()));
  }
  let language = request
    .language
    .as_deref()
    .map(str::trim)
    .filter(|l| !l.is_empty())
    .unwrap_or(DEFAULT_LANGUAGE);

  let parameters = generation_parameters(request);
  let difficulty = parameters.difficulty;

  let spec = PromptSpec {
    topic,
    language,
    difficulty,
    parameters: Some(&parameters),
    include_examples: prompts.include_examples,
  };
  let (system, user) = generation_messages(prompts, &spec);
  let messages = [ChatMessage::system(system), ChatMessage::user(format!("{user}\nTopic: {topic}"))];
  let options = CompletionOptions { reasoning_enabled: false, temperature: GENERATION_TEMPERATURE };

  let raw = backend.complete(&messages, &options).await?;
  let (candidate, strategy) = parse_with_strategy(&raw)?;
  let puzzle = sanitize(&candidate)?;

  let generated = GeneratedPuzzle::new(topic, language, difficulty, puzzle, parameters);
  info!(
    target: "puzzle",
    puzzle_id = %generated.id,
    %difficulty,
    band = generated.parameters.band,
    ?strategy,
    lines = generated.puzzle.lines.len(),
    distractors = generated.puzzle.distractors.len(),
    "Puzzle generated"
  );
  Ok(generated)
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Grade {
  pub correct: bool,
  /// 100 or 0.
  pub score: u8,
}

/// Exact order match against the stored solution.
pub fn grade_submission(puzzle: &SanitizedPuzzle, submitted: &[usize]) -> Grade {
  let correct = puzzle.solution_order.as_slice() == submitted;
  Grade { correct, score: if correct { 100 } else { 0 } }
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttemptRecord {
  pub current_skill: Option<f64>,
  /// Skills before this attempt, oldest first.
  pub recent_skills: Vec<f64>,
  pub puzzle_difficulty: Difficulty,
  pub is_correct: bool,
  pub time_spent: f64,
  pub attempts_count: u32,
  pub max_time: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AttemptResult {
  pub skill_before: f64,
  pub skill_after: f64,
  pub recommended_difficulty: Difficulty,
  pub next_parameters: DifficultyParameters,
}

pub fn record_attempt_outcome(record: &AttemptRecord) -> AttemptResult {
  let skill_before = clamp_skill(record.current_skill.unwrap_or(0.0));
  let skill_after = update_skill(&AttemptOutcome {
    current_skill: record.current_skill,
    puzzle_difficulty: record.puzzle_difficulty,
    is_correct: record.is_correct,
    time_spent: record.time_spent,
    attempts_count: record.attempts_count,
    max_time: record.max_time,
  });

  let recommended_difficulty = recommend_next_difficulty(&RecommendationInput {
    current_skill: skill_after,
    current_difficulty: record.puzzle_difficulty,
    is_correct: record.is_correct,
    attempts_count: record.attempts_count,
  });

  let next_parameters = map_context_to_difficulty(&SkillContext {
    current_skill: skill_after,
    recent_skills: record.recent_skills.clone(),
    previous_band: None,
  });

  info!(
    target: "learner",
    skill_before,
    skill_after,
    correct = record.is_correct,
    %recommended_difficulty,
    next_band = next_parameters.band,
    "Attempt recorded"
  );

  AttemptResult { skill_before, skill_after, recommended_difficulty, next_parameters }
}
