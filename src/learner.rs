//! Skill model: updates a learner's skill from one attempt and recommends the next tier.
//!
//! Skill lives in [0, 100]. The coarse tier `floor(skill / 33.33)` (0..=3) is compared
//! against the puzzle level (easy=1, medium=2, hard=3) to reward stretching and soften
//! penalties on puzzles above the learner's tier.

use tracing::debug;

use crate::domain::Difficulty;
use crate::util::{clamp_skill, round2};

const BASE_REWARD: f64 = 2.0;
const BASE_PENALTY: f64 = -0.5;
const FIRST_ATTEMPT_BONUS: f64 = 1.5;
const RETRY_BONUS_DECAY: f64 = 0.2;
const RETRY_PENALTY_GROWTH: f64 = 0.3;
const CHALLENGE_BONUS: f64 = 1.2;
const HARD_PUZZLE_PENALTY_FACTOR: f64 = 0.7;
const TIER_WIDTH: f64 = 33.33;
const LOW_SKILL_THRESHOLD: f64 = 33.0;

/// Metadata of one graded attempt.
#[derive(Clone, Debug, PartialEq)]
pub struct AttemptOutcome {
  /// `None` means the learner has no recorded skill yet.
  pub current_skill: Option<f64>,
  pub puzzle_difficulty: Difficulty,
  pub is_correct: bool,
  /// Seconds.
  pub time_spent: f64,
  pub attempts_count: u32,
  /// Expected upper bound in seconds; enables the time bonus.
  pub max_time: Option<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecommendationInput {
  pub current_skill: f64,
  pub current_difficulty: Difficulty,
  pub is_correct: bool,
  pub attempts_count: u32,
}

/// Coarse tier 0..=3.
pub fn skill_tier(skill: f64) -> i32 {
  (clamp_skill(skill) / TIER_WIDTH).floor() as i32
}

/// New skill after one attempt, clamped to [0, 100] and rounded to 2 decimals.
pub fn update_skill(outcome: &AttemptOutcome) -> f64 {
  let skill = clamp_skill(outcome.current_skill.unwrap_or(0.0));
  let attempts = outcome.attempts_count.max(1);
  let level = outcome.puzzle_difficulty.level() as i32;
  let tier = skill_tier(skill);

  let change = if outcome.is_correct {
    let attempt_bonus = if attempts == 1 {
      FIRST_ATTEMPT_BONUS
    } else {
      (1.0 - RETRY_BONUS_DECAY * (attempts - 1) as f64).max(0.0)
    };
    let time_bonus = time_bonus(outcome.time_spent, outcome.max_time);
    let difficulty_multiplier = level as f64 / 2.0;
    let challenge_bonus = if level > tier { CHALLENGE_BONUS } else { 1.0 };
    BASE_REWARD * attempt_bonus * time_bonus * difficulty_multiplier * challenge_bonus
  } else {
    let difficulty_adjustment = if level > tier { HARD_PUZZLE_PENALTY_FACTOR } else { 1.0 };
    let attempts_penalty = 1.0 + RETRY_PENALTY_GROWTH * (attempts - 1) as f64;
    BASE_PENALTY * difficulty_adjustment * attempts_penalty
  };

  let updated = round2(clamp_skill(skill + change));
  debug!(
    target: "learner",
    skill_before = skill,
    skill_after = updated,
    change,
    correct = outcome.is_correct,
    attempts,
    level,
    "Skill updated"
  );
  updated
}

/// 1.0 unless a positive `max_time` was given and the attempt finished under it;
/// then proportional to the fraction of time saved, within [0.5, 1.5].
fn time_bonus(time_spent: f64, max_time: Option<f64>) -> f64 {
  match max_time {
    Some(max) if max > 0.0 && time_spent > 0.0 => {
      let ratio = time_spent / max;
      let bonus = if ratio < 1.0 { 1.0 + (1.0 - ratio) * 0.5 } else { 1.0 };
      bonus.clamp(0.5, 1.5)
    }
    _ => 1.0,
  }
}

pub fn recommend_next_difficulty(input: &RecommendationInput) -> Difficulty {
  let current = input.current_difficulty.level() as i32;
  let attempts = input.attempts_count.max(1);

  let recommended = if input.is_correct {
    let base = match attempts {
      1 => (current + 1).min(3),
      _ => current,
    };
    if skill_tier(input.current_skill) > base { (base + 1).min(3) } else { base }
  } else {
    let base = if attempts == 1 { current } else { (current - 1).max(1) };
    if input.current_skill < LOW_SKILL_THRESHOLD && base > 1 { 1 } else { base }
  };

  Difficulty::from_level(recommended)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn outcome(skill: f64, difficulty: Difficulty, correct: bool, attempts: u32) -> AttemptOutcome {
    AttemptOutcome {
      current_skill: Some(skill),
      puzzle_difficulty: difficulty,
      is_correct: correct,
      time_spent: 60.0,
      attempts_count: attempts,
      max_time: None,
    }
  }

  fn rec(skill: f64, difficulty: Difficulty, correct: bool, attempts: u32) -> Difficulty {
    recommend_next_difficulty(&RecommendationInput {
      current_skill: skill,
      current_difficulty: difficulty,
      is_correct: correct,
      attempts_count: attempts,
    })
  }

  #[test]
  fn correct_first_attempt_reward() {
    // 2.0 * 1.5 * 1.0 * (2 / 2) * 1.2 (level 2 > tier 1) = 3.6
    assert_eq!(update_skill(&outcome(50.0, Difficulty::Medium, true, 1)), 53.6);
  }

  #[test]
  fn incorrect_penalty() {
    // -0.5 * 0.7 (level 3 > tier 1) * (1 + 0.3 * 2) = -0.56
    assert_eq!(update_skill(&outcome(50.0, Difficulty::Hard, false, 3)), 49.44);
    // -0.5 * 1.0 (level 1 <= tier 1) * 1.0 = -0.5
    assert_eq!(update_skill(&outcome(50.0, Difficulty::Easy, false, 1)), 49.5);
  }

  #[test]
  fn more_attempts_mean_smaller_reward() {
    let first = update_skill(&outcome(50.0, Difficulty::Medium, true, 1));
    let third = update_skill(&outcome(50.0, Difficulty::Medium, true, 3));
    assert!(first > third);
    // The retry bonus floors at zero instead of turning a correct answer into a loss.
    assert_eq!(update_skill(&outcome(50.0, Difficulty::Medium, true, 12)), 50.0);
  }

  #[test]
  fn time_bonus_rewards_speed() {
    let mut slow = outcome(50.0, Difficulty::Medium, true, 1);
    slow.time_spent = 120.0;
    slow.max_time = Some(120.0);
    let mut fast = slow.clone();
    fast.time_spent = 60.0;
    assert!(update_skill(&fast) > update_skill(&slow));
    assert_eq!(time_bonus(0.0, Some(100.0)), 1.0);
    assert_eq!(time_bonus(10.0, Some(0.0)), 1.0);
    assert_eq!(time_bonus(500.0, Some(100.0)), 1.0);
    assert_eq!(time_bonus(50.0, Some(100.0)), 1.25);
  }

  #[test]
  fn output_stays_in_range() {
    assert_eq!(update_skill(&outcome(0.0, Difficulty::Easy, false, 5)), 0.0);
    assert_eq!(update_skill(&outcome(100.0, Difficulty::Hard, true, 1)), 100.0);
    // 150 behaves as 100.
    assert_eq!(
      update_skill(&outcome(150.0, Difficulty::Easy, false, 1)),
      update_skill(&outcome(100.0, Difficulty::Easy, false, 1))
    );
    for skill in [-20.0, 0.0, 12.5, 50.0, 99.9, 100.0, 300.0] {
      for d in [Difficulty::Easy, Difficulty::Medium, Difficulty::Hard] {
        for correct in [true, false] {
          for attempts in [0, 1, 2, 5, 20] {
            let s = update_skill(&outcome(skill, d, correct, attempts));
            assert!((0.0..=100.0).contains(&s), "{skill} {d} {correct} {attempts} -> {s}");
          }
        }
      }
    }
  }

  #[test]
  fn missing_skill_starts_at_zero() {
    let mut o = outcome(0.0, Difficulty::Easy, true, 1);
    o.current_skill = None;
    // 2.0 * 1.5 * 0.5 * 1.2 = 1.8
    assert_eq!(update_skill(&o), 1.8);
  }

  #[test]
  fn non_finite_skill_starts_at_zero() {
    for skill in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
      assert_eq!(update_skill(&outcome(skill, Difficulty::Easy, true, 1)), 1.8);
      assert_eq!(update_skill(&outcome(skill, Difficulty::Hard, false, 1)), 0.0);
    }
  }

  #[test]
  fn recommendation_on_correct() {
    assert_eq!(rec(50.0, Difficulty::Easy, true, 1), Difficulty::Medium);
    assert_eq!(rec(50.0, Difficulty::Hard, true, 1), Difficulty::Hard);
    assert_eq!(rec(50.0, Difficulty::Medium, true, 2), Difficulty::Medium);
    assert_eq!(rec(10.0, Difficulty::Medium, true, 4), Difficulty::Medium);
    // Tier 2 exceeds easy: escalate once more.
    assert_eq!(rec(70.0, Difficulty::Easy, true, 2), Difficulty::Medium);
    assert_eq!(rec(100.0, Difficulty::Easy, true, 3), Difficulty::Medium);
  }

  #[test]
  fn recommendation_on_incorrect() {
    assert_eq!(rec(60.0, Difficulty::Medium, false, 1), Difficulty::Medium);
    assert_eq!(rec(60.0, Difficulty::Hard, false, 2), Difficulty::Medium);
    assert_eq!(rec(60.0, Difficulty::Easy, false, 3), Difficulty::Easy);
    // Low skill forces easy.
    assert_eq!(rec(20.0, Difficulty::Hard, false, 1), Difficulty::Easy);
    assert_eq!(rec(32.99, Difficulty::Medium, false, 1), Difficulty::Easy);
    assert_eq!(rec(33.0, Difficulty::Medium, false, 1), Difficulty::Medium);
  }

  #[test]
  fn tiers() {
    assert_eq!(skill_tier(0.0), 0);
    assert_eq!(skill_tier(33.32), 0);
    assert_eq!(skill_tier(33.33), 1);
    assert_eq!(skill_tier(66.66), 2);
    assert_eq!(skill_tier(100.0), 3);
  }
}
