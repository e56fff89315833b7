//! Hard resource limits applied to every candidate before it may be stored.
//!
//! Runs even after the parser validated indices: truncating `lines` can invalidate
//! indices that were in range before.

use tracing::{debug, instrument};

use crate::domain::{PuzzleCandidate, SanitizedPuzzle};
use crate::error::{PuzzleError, Result};
use crate::util::truncate_chars;

pub const MAX_LINES: usize = 30;
pub const MAX_DISTRACTORS: usize = 10;
pub const MAX_TEXT_CHARS: usize = 200;
pub const MAX_TOTAL_JSON_BYTES: usize = 64 * 1024;

#[instrument(level = "debug", skip(candidate), fields(lines = candidate.lines.len(), distractors = candidate.distractors.len()))]
pub fn sanitize(candidate: &PuzzleCandidate) -> Result<SanitizedPuzzle> {
  let size = serde_json::to_vec(candidate)
    .map_err(|e| PuzzleError::Validation(format!("candidate is not serializable: {e}")))?
    .len();
  if size > MAX_TOTAL_JSON_BYTES {
    return Err(PuzzleError::TooLarge { size, limit: MAX_TOTAL_JSON_BYTES });
  }

  let lines: Vec<String> = candidate
    .lines
    .iter()
    .take(MAX_LINES)
    .map(|s| truncate_chars(s, MAX_TEXT_CHARS))
    .collect();
  if lines.is_empty() {
    return Err(PuzzleError::Validation("no lines after sanitization".into()));
  }

  let distractors: Vec<String> = candidate
    .distractors
    .iter()
    .take(MAX_DISTRACTORS)
    .map(|s| truncate_chars(s, MAX_TEXT_CHARS))
    .collect();

  let solution_order: Vec<usize> =
    candidate.solution_order.iter().copied().filter(|&idx| idx < lines.len()).collect();
  if solution_order.is_empty() {
    return Err(PuzzleError::Validation(format!(
      "solutionOrder has no index in range 0..{} after sanitization",
      lines.len()
    )));
  }

  if lines.len() < candidate.lines.len() || solution_order.len() < candidate.solution_order.len() {
    debug!(
      target: "puzzle",
      lines_before = candidate.lines.len(),
      lines_after = lines.len(),
      order_before = candidate.solution_order.len(),
      order_after = solution_order.len(),
      "Candidate truncated"
    );
  }

  Ok(SanitizedPuzzle {
    lines,
    distractors,
    solution_order,
    problem: truncate_chars(&candidate.problem, MAX_TEXT_CHARS),
    hint: truncate_chars(&candidate.hint, MAX_TEXT_CHARS),
  })
}
