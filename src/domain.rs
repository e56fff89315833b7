//! Domain models: difficulty tiers, puzzle records at each pipeline stage, and the
//! generation parameters produced by the scheduler.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse puzzle difficulty tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
  Easy,
  Medium,
  Hard,
}

impl Default for Difficulty {
  fn default() -> Self { Difficulty::Medium }
}

impl Difficulty {
  /// Numeric level: easy=1, medium=2, hard=3.
  pub fn level(self) -> u8 {
    match self {
      Difficulty::Easy => 1,
      Difficulty::Medium => 2,
      Difficulty::Hard => 3,
    }
  }

  /// Inverse of `level`; anything outside 1..=3 maps to medium.
  pub fn from_level(level: i32) -> Self {
    match level {
      1 => Difficulty::Easy,
      3 => Difficulty::Hard,
      _ => Difficulty::Medium,
    }
  }

  pub fn as_str(self) -> &'static str {
    match self {
      Difficulty::Easy => "easy",
      Difficulty::Medium => "medium",
      Difficulty::Hard => "hard",
    }
  }
}

impl std::fmt::Display for Difficulty {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Difficulty {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.trim().to_ascii_lowercase().as_str() {
      "easy" => Ok(Difficulty::Easy),
      "medium" => Ok(Difficulty::Medium),
      "hard" => Ok(Difficulty::Hard),
      other => Err(format!("Difficulty must be one of: easy, medium, hard (got '{other}')")),
    }
  }
}

/// Parser output: structurally valid, not yet bounded.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PuzzleCandidate {
  pub lines: Vec<String>,
  #[serde(default)] pub distractors: Vec<String>,
  pub solution_order: Vec<usize>,
  #[serde(default)] pub problem: String,
  #[serde(default)] pub hint: String,
}

/// Sanitizer output. The only puzzle shape handed to persistence.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SanitizedPuzzle {
  pub lines: Vec<String>,
  pub distractors: Vec<String>,
  pub solution_order: Vec<usize>,
  pub problem: String,
  pub hint: String,
}

/// `{min, max, optimal}` count triple used for lines, distractors and semantic traps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountRange {
  pub min: u32,
  pub max: u32,
  pub optimal: u32,
}

impl CountRange {
  pub const fn new(min: u32, max: u32, optimal: u32) -> Self {
    Self { min, max, optimal }
  }
}

/// Concrete generation parameters for one request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyParameters {
  pub difficulty_score: f64,
  pub lines: CountRange,
  pub distractors: CountRange,
  pub semantic_traps: CountRange,
  pub difficulty: Difficulty,
  pub band: u8,
  pub skill: f64,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub smoothed_skill: Option<f64>,
  #[serde(default)]
  pub band_limited: bool,
}

/// A sanitized puzzle plus the metadata the storage collaborator records with it.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedPuzzle {
  pub id: String,
  pub title: String,
  pub description: String,
  pub topic: String,
  pub language: String,
  pub difficulty: Difficulty,
  pub puzzle: SanitizedPuzzle,
  pub parameters: DifficultyParameters,
}

impl GeneratedPuzzle {
  pub fn new(
    topic: &str,
    language: &str,
    difficulty: Difficulty,
    puzzle: SanitizedPuzzle,
    parameters: DifficultyParameters,
  ) -> Self {
    let description = if puzzle.problem.trim().is_empty() {
      format!("Arrange the lines to solve: {topic}")
    } else {
      puzzle.problem.clone()
    };
    Self {
      id: Uuid::new_v4().to_string(),
      title: format!("Parsons: {topic}"),
      description,
      topic: topic.to_string(),
      language: language.to_string(),
      difficulty,
      puzzle,
      parameters,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn difficulty_levels_round_trip() {
    for d in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
      assert_eq!(Difficulty::from_level(d.level() as i32), d);
      assert_eq!(d.as_str().parse::<Difficulty>().unwrap(), d);
    }
    assert_eq!(Difficulty::from_level(0), Difficulty::Medium);
    assert_eq!(Difficulty::from_level(9), Difficulty::Medium);
    assert!("extreme".parse::<Difficulty>().is_err());
    assert_eq!(" HARD ".parse::<Difficulty>().unwrap(), Difficulty::Hard);
  }

  #[test]
  fn candidate_uses_camel_case_keys() {
    let c = PuzzleCandidate {
      lines: vec!["a".into()],
      solution_order: vec![0],
      ..Default::default()
    };
    let json = serde_json::to_value(&c).unwrap();
    assert!(json.get("solutionOrder").is_some());
    assert!(json.get("solution_order").is_none());
  }
}
