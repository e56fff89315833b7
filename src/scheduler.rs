//! Difficulty scheduler: maps a (possibly noisy) skill signal to generation parameters.
//!
//! Six fixed skill bands partition [0, 100]. A moving average over recent skills
//! damps noise before band lookup, and a guardrail keeps the band from moving more
//! than one step per update. Absolute count bounds are applied last.
//!
//! Everything here is a pure function over read-only tables; history is always an
//! explicit input.

use serde::Serialize;
use tracing::debug;

use crate::domain::{CountRange, Difficulty, DifficultyParameters};
use crate::error::{PuzzleError, Result};
use crate::util::{clamp_skill, round2};

/// One row of the band table.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandProfile {
  pub difficulty_score: f64,
  pub lines: CountRange,
  pub distractors: CountRange,
  pub semantic_traps: CountRange,
  pub difficulty: Difficulty,
}

/// A band row together with its index, as returned by [`band_parameters`].
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BandParameters {
  #[serde(flatten)]
  pub profile: BandProfile,
  pub band: u8,
}

const fn profile(
  difficulty_score: f64,
  lines: (u32, u32, u32),
  distractors: (u32, u32, u32),
  semantic_traps: (u32, u32, u32),
  difficulty: Difficulty,
) -> BandProfile {
  BandProfile {
    difficulty_score,
    lines: CountRange::new(lines.0, lines.1, lines.2),
    distractors: CountRange::new(distractors.0, distractors.1, distractors.2),
    semantic_traps: CountRange::new(semantic_traps.0, semantic_traps.1, semantic_traps.2),
    difficulty,
  }
}

// Beginner, novice, intermediate, advanced, expert, master.
const BANDS: [BandProfile; 6] = [
  profile(1.0, (4, 6, 5), (1, 2, 1), (0, 1, 0), Difficulty::Easy),
  profile(1.5, (5, 7, 6), (1, 2, 2), (0, 1, 0), Difficulty::Easy),
  profile(2.0, (6, 9, 7), (2, 3, 2), (0, 2, 1), Difficulty::Medium),
  profile(2.5, (8, 12, 10), (2, 4, 3), (1, 3, 2), Difficulty::Medium),
  profile(3.0, (10, 15, 12), (3, 5, 4), (2, 4, 3), Difficulty::Hard),
  profile(3.5, (12, 20, 15), (4, 6, 5), (3, 5, 4), Difficulty::Hard),
];

pub const MAX_BAND: u8 = 5;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Guardrails {
  pub max_jump_per_attempt: u8,
  pub min_lines: u32,
  pub max_lines: u32,
  pub min_distractors: u32,
  pub max_distractors: u32,
  pub min_semantic_traps: u32,
  pub max_semantic_traps: u32,
  pub smoothing_window: usize,
}

pub const GUARDRAILS: Guardrails = Guardrails {
  max_jump_per_attempt: 1,
  min_lines: 4,
  max_lines: 20,
  min_distractors: 1,
  max_distractors: 6,
  min_semantic_traps: 0,
  max_semantic_traps: 5,
  smoothing_window: 5,
};

/// Skill signal with optional history for smoothing and guardrails.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SkillContext {
  pub current_skill: f64,
  pub recent_skills: Vec<f64>,
  pub previous_band: Option<u8>,
}

/// Band index for a skill value (clamped into [0, 100] first).
pub fn skill_band(skill: f64) -> u8 {
  let skill = clamp_skill(skill);
  if skill <= 20.0 {
    0
  } else if skill <= 35.0 {
    1
  } else if skill <= 50.0 {
    2
  } else if skill <= 70.0 {
    3
  } else if skill <= 85.0 {
    4
  } else {
    5
  }
}

/// Simple moving average over the last `GUARDRAILS.smoothing_window` values,
/// rounded to two decimals. Each value is clamped first. Empty input averages to 0.
pub fn moving_average(values: &[f64]) -> f64 {
  if values.is_empty() {
    return 0.0;
  }
  let window = &values[values.len().saturating_sub(GUARDRAILS.smoothing_window)..];
  let sum: f64 = window.iter().copied().map(clamp_skill).sum();
  round2(sum / window.len() as f64)
}

/// Pure table lookup. Errors with `Range` outside [0, 5].
pub fn band_parameters(index: i64) -> Result<BandParameters> {
  if !(0..=MAX_BAND as i64).contains(&index) {
    return Err(PuzzleError::Range { index });
  }
  Ok(BandParameters { profile: BANDS[index as usize], band: index as u8 })
}

/// Copy of the full band table.
pub fn band_table() -> Vec<BandParameters> {
  BANDS
    .iter()
    .enumerate()
    .map(|(i, p)| BandParameters { profile: *p, band: i as u8 })
    .collect()
}

/// By-value entry point: no history, so no smoothing and no guardrail movement.
pub fn map_skill_to_difficulty(skill: f64) -> DifficultyParameters {
  map_context_to_difficulty(&SkillContext { current_skill: skill, ..Default::default() })
}

/// By-context entry point with smoothing and the anti-jump guardrail.
pub fn map_context_to_difficulty(ctx: &SkillContext) -> DifficultyParameters {
  let current_skill = clamp_skill(ctx.current_skill);

  let previous_band = match (ctx.previous_band, ctx.recent_skills.last()) {
    (Some(band), _) => band.min(MAX_BAND),
    (None, Some(&last)) => skill_band(last),
    (None, None) => skill_band(current_skill),
  };

  let smoothed_skill = if ctx.recent_skills.is_empty() {
    current_skill
  } else {
    let mut series = ctx.recent_skills.clone();
    series.push(current_skill);
    moving_average(&series)
  };

  let raw_band = skill_band(smoothed_skill);
  let (band, band_limited) = limit_jump(previous_band, raw_band);
  if band_limited {
    debug!(target: "learner", previous_band, raw_band, band, "Band jump limited by guardrail");
  }

  let row = BANDS[band as usize];
  let mut params = DifficultyParameters {
    difficulty_score: row.difficulty_score,
    lines: row.lines,
    distractors: row.distractors,
    semantic_traps: row.semantic_traps,
    difficulty: row.difficulty,
    band,
    skill: current_skill,
    smoothed_skill: if smoothed_skill != current_skill { Some(smoothed_skill) } else { None },
    band_limited,
  };
  apply_absolute_bounds(&mut params);
  params
}

/// Predict the post-attempt skill (+2 correct, -1 incorrect) and map it with history.
pub fn next_difficulty(ctx: &SkillContext, is_correct: bool) -> DifficultyParameters {
  let skill = clamp_skill(ctx.current_skill);
  let predicted = if is_correct { (skill + 2.0).min(100.0) } else { (skill - 1.0).max(0.0) };
  map_context_to_difficulty(&SkillContext { current_skill: predicted, ..ctx.clone() })
}

fn limit_jump(previous: u8, current: u8) -> (u8, bool) {
  let max_jump = GUARDRAILS.max_jump_per_attempt;
  if current.abs_diff(previous) <= max_jump {
    return (current, false);
  }
  let limited = if current > previous {
    previous.saturating_add(max_jump).min(MAX_BAND)
  } else {
    previous.saturating_sub(max_jump)
  };
  (limited, true)
}

fn apply_absolute_bounds(params: &mut DifficultyParameters) {
  let g = GUARDRAILS;
  clamp_optimal(&mut params.lines, g.min_lines, g.max_lines);
  clamp_optimal(&mut params.distractors, g.min_distractors, g.max_distractors);
  clamp_optimal(&mut params.semantic_traps, g.min_semantic_traps, g.max_semantic_traps);
}

/// Only touches min/max when the optimal itself was out of range.
fn clamp_optimal(range: &mut CountRange, lo: u32, hi: u32) {
  if range.optimal < lo {
    range.optimal = lo;
    range.min = lo;
  }
  if range.optimal > hi {
    range.optimal = hi;
    range.max = hi;
  }
}
