//! Turns raw model text into a `PuzzleCandidate`.
//!
//! Models are asked for strict JSON but routinely wrap it in prose or markdown fences,
//! or emit something JSON-ish that no JSON parser accepts. Four strategies are tried in
//! order and the first one yielding puzzle fields wins:
//!
//! 1) the whole text as JSON
//! 2) the first fenced code block (optionally tagged `json`)
//! 3) the first balanced top-level `{...}`
//! 4) a field-level scan for `lines`, `distractors` and `solutionOrder` arrays
//!
//! The winning object is then normalized and validated the same way regardless of
//! which strategy produced it.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, instrument, warn};

use crate::domain::PuzzleCandidate;
use crate::error::{PuzzleError, Result};
use crate::util::truncate_chars;

const PREVIEW_CHARS: usize = 500;
const PUZZLE_FIELDS: [&str; 3] = ["lines", "distractors", "solutionOrder"];

static FENCED_BLOCK: Lazy<Regex> =
  Lazy::new(|| Regex::new(r"(?is)```[ \t]*(?:json)?[ \t]*\r?\n?(.*?)```").expect("invalid fence regex"));

static LINES_KEY: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"["']?\blines\b["']?\s*[:=]\s*\["#).expect("invalid lines regex"));
static DISTRACTORS_KEY: Lazy<Regex> =
  Lazy::new(|| Regex::new(r#"["']?\bdistractors\b["']?\s*[:=]\s*\["#).expect("invalid distractors regex"));
static ORDER_KEY: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#"(?i)["']?\bsolution[_ ]?order\b["']?\s*[:=]\s*\["#).expect("invalid order regex")
});

// Double-quoted string | single-quoted string | bare integer.
static ARRAY_ITEM: Lazy<Regex> = Lazy::new(|| {
  Regex::new(r#""((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)'|(-?\d+)"#).expect("invalid item regex")
});

/// Which cascade step produced the candidate.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ParseStrategy {
  Direct,
  FencedBlock,
  BraceMatch,
  FieldScan,
}

/// Parse raw model output into a validated candidate.
pub fn parse(raw: &str) -> Result<PuzzleCandidate> {
  parse_with_strategy(raw).map(|(candidate, _)| candidate)
}

/// Same as [`parse`], also reporting which strategy succeeded.
#[instrument(level = "debug", skip(raw), fields(raw_len = raw.len()))]
pub fn parse_with_strategy(raw: &str) -> Result<(PuzzleCandidate, ParseStrategy)> {
  if raw.trim().is_empty() {
    return Err(parse_error("empty model response", raw));
  }

  let (obj, strategy) = try_direct(raw)
    .map(|o| (o, ParseStrategy::Direct))
    .or_else(|| try_fenced(raw).map(|o| (o, ParseStrategy::FencedBlock)))
    .or_else(|| try_brace_match(raw).map(|o| (o, ParseStrategy::BraceMatch)))
    .or_else(|| try_field_scan(raw).map(|o| (o, ParseStrategy::FieldScan)))
    .ok_or_else(|| parse_error("no puzzle structure found by any strategy", raw))?;

  debug!(target: "puzzle", ?strategy, "Model response parsed");
  let candidate = validate(&obj)?;
  Ok((candidate, strategy))
}

fn parse_error(message: &str, raw: &str) -> PuzzleError {
  PuzzleError::Parse { message: message.to_string(), preview: truncate_chars(raw, PREVIEW_CHARS) }
}

/// A strategy only counts when it yields an object carrying at least one puzzle field.
fn as_puzzle_object(v: Value) -> Option<Map<String, Value>> {
  match v {
    Value::Object(map) if PUZZLE_FIELDS.iter().any(|k| map.contains_key(*k)) => Some(map),
    _ => None,
  }
}

fn try_direct(raw: &str) -> Option<Map<String, Value>> {
  serde_json::from_str::<Value>(raw.trim()).ok().and_then(as_puzzle_object)
}

fn try_fenced(raw: &str) -> Option<Map<String, Value>> {
  let body = FENCED_BLOCK.captures(raw)?.get(1)?.as_str().trim();
  serde_json::from_str::<Value>(body).ok().and_then(as_puzzle_object)
}

fn try_brace_match(raw: &str) -> Option<Map<String, Value>> {
  let mut from = 0usize;
  while let Some(rel) = raw[from..].find('{') {
    let start = from + rel;
    let end = matching_close(raw, start, b'{', b'}', &[b'"'])?;
    if let Some(obj) = serde_json::from_str::<Value>(&raw[start..=end]).ok().and_then(as_puzzle_object) {
      return Some(obj);
    }
    from = end + 1;
  }
  None
}

fn try_field_scan(raw: &str) -> Option<Map<String, Value>> {
  let mut map = Map::new();
  for (key, re) in [("lines", &*LINES_KEY), ("distractors", &*DISTRACTORS_KEY), ("solutionOrder", &*ORDER_KEY)] {
    if let Some(body) = array_body_after(raw, re) {
      map.insert(key.to_string(), Value::Array(extract_array_items(body)));
    }
  }
  let found_any = map.values().any(|v| v.as_array().map_or(false, |a| !a.is_empty()));
  if found_any { Some(map) } else { None }
}

/// Contents between the `[` matched by `key_re` and its closing `]`.
/// Truncated output without a closing bracket yields the rest of the text.
fn array_body_after<'a>(raw: &'a str, key_re: &Regex) -> Option<&'a str> {
  let m = key_re.find(raw)?;
  let open = m.end() - 1;
  match matching_close(raw, open, b'[', b']', &[b'"', b'\'']) {
    Some(close) => Some(&raw[open + 1..close]),
    None => Some(&raw[open + 1..]),
  }
}

/// Index of the delimiter closing the one at `open_idx`, skipping quoted sections.
/// Byte scanning is safe here: every delimiter is ASCII and never occurs inside a
/// multi-byte UTF-8 sequence.
fn matching_close(text: &str, open_idx: usize, open: u8, close: u8, quotes: &[u8]) -> Option<usize> {
  let bytes = text.as_bytes();
  let mut depth = 0usize;
  let mut in_quote: Option<u8> = None;
  let mut escaped = false;

  for (i, &b) in bytes.iter().enumerate().skip(open_idx) {
    if let Some(q) = in_quote {
      if escaped {
        escaped = false;
      } else if b == b'\\' {
        escaped = true;
      } else if b == q {
        in_quote = None;
      }
      continue;
    }
    if quotes.contains(&b) {
      in_quote = Some(b);
    } else if b == open {
      depth += 1;
    } else if b == close {
      depth = depth.checked_sub(1)?;
      if depth == 0 {
        return Some(i);
      }
    }
  }
  None
}

/// Items of a bracketed list body: a JSON array parse first, then a scan for quoted
/// strings and bare integers.
fn extract_array_items(body: &str) -> Vec<Value> {
  let trimmed = body.trim();
  if trimmed.is_empty() {
    return Vec::new();
  }
  if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(&format!("[{trimmed}]")) {
    return items;
  }

  ARRAY_ITEM
    .captures_iter(trimmed)
    .filter_map(|cap| {
      if let Some(dq) = cap.get(1) {
        let text = serde_json::from_str::<String>(&format!("\"{}\"", dq.as_str()))
          .unwrap_or_else(|_| unescape_loose(dq.as_str(), '"'));
        Some(Value::String(text))
      } else if let Some(sq) = cap.get(2) {
        Some(Value::String(unescape_loose(sq.as_str(), '\'')))
      } else {
        cap.get(3).and_then(|n| n.as_str().parse::<i64>().ok()).map(Value::from)
      }
    })
    .collect()
}

fn unescape_loose(s: &str, quote: char) -> String {
  s.replace(&format!("\\{quote}"), &quote.to_string())
    .replace("\\n", "\n")
    .replace("\\\\", "\\")
}

// -------- Post-parse validation --------

fn validate(obj: &Map<String, Value>) -> Result<PuzzleCandidate> {
  let lines = match obj.get("lines") {
    Some(Value::Array(items)) => normalize_strings(items),
    _ => return Err(PuzzleError::Validation("missing or invalid \"lines\" array".into())),
  };
  if lines.is_empty() {
    return Err(PuzzleError::Validation("\"lines\" array is empty".into()));
  }

  let distractors = match obj.get("distractors") {
    Some(Value::Array(items)) => normalize_strings(items),
    _ => Vec::new(),
  };

  let solution_order: Vec<usize> = match obj.get("solutionOrder") {
    Some(Value::Array(items)) => items
      .iter()
      .filter_map(coerce_index)
      .filter(|&idx| idx < lines.len())
      .collect(),
    _ => return Err(PuzzleError::Validation("missing or invalid \"solutionOrder\" array".into())),
  };
  if solution_order.is_empty() {
    return Err(PuzzleError::Validation(format!(
      "\"solutionOrder\" has no index in range 0..{}",
      lines.len()
    )));
  }

  warn_if_unsolvable(lines.len(), &solution_order);

  Ok(PuzzleCandidate {
    lines,
    distractors,
    solution_order,
    problem: text_field(obj, "problem"),
    hint: text_field(obj, "hint"),
  })
}

fn normalize_strings(items: &[Value]) -> Vec<String> {
  items
    .iter()
    .filter_map(|v| match v {
      Value::Null => None,
      Value::String(s) => Some(s.trim().to_string()),
      other => Some(other.to_string().trim().to_string()),
    })
    .filter(|s| !s.is_empty())
    .collect()
}

/// Integral numbers, or strings holding an integer. Negative and fractional values drop.
fn coerce_index(v: &Value) -> Option<usize> {
  let n: i64 = match v {
    Value::Number(n) => match n.as_i64() {
      Some(i) => i,
      None => {
        let f = n.as_f64()?;
        if f.fract() != 0.0 || f < 0.0 || f > usize::MAX as f64 {
          return None;
        }
        f as i64
      }
    },
    Value::String(s) => s.trim().parse::<i64>().ok()?,
    _ => return None,
  };
  usize::try_from(n).ok()
}

fn text_field(obj: &Map<String, Value>, key: &str) -> String {
  match obj.get(key) {
    Some(Value::String(s)) => s.clone(),
    _ => String::new(),
  }
}

/// A solvable puzzle uses every line exactly once. Anything else is logged only.
fn warn_if_unsolvable(line_count: usize, order: &[usize]) {
  let unique: HashSet<usize> = order.iter().copied().collect();
  if unique.len() != order.len() {
    warn!(target: "puzzle", order_len = order.len(), unique = unique.len(), "solutionOrder contains duplicate indices");
  }
  if unique.len() != line_count {
    warn!(target: "puzzle", line_count, covered = unique.len(), "solutionOrder does not cover every line");
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_plain_json() {
    let raw = serde_json::json!({"lines": ["a", "b"], "distractors": ["x"], "solutionOrder": [0, 1]}).to_string();
    let (c, strategy) = parse_with_strategy(&raw).unwrap();
    assert_eq!(strategy, ParseStrategy::Direct);
    assert_eq!(c.lines, vec!["a", "b"]);
    assert_eq!(c.distractors, vec!["x"]);
    assert_eq!(c.solution_order, vec![0, 1]);
    assert_eq!(c.problem, "");
    assert_eq!(c.hint, "");
  }

  #[test]
  fn parses_fenced_block() {
    let raw = "Here you go:\n```json\n{\"lines\":[\"l1\",\"l2\"],\"distractors\":[\"d1\"],\"solutionOrder\":[0,1]}\n```\nEnjoy!";
    let (c, strategy) = parse_with_strategy(raw).unwrap();
    assert_eq!(strategy, ParseStrategy::FencedBlock);
    assert_eq!(c.lines.len(), 2);
    assert_eq!(c.solution_order, vec![0, 1]);
  }

  #[test]
  fn parses_untagged_fence() {
    let raw = "```\n{\"lines\":[\"a\"],\"solutionOrder\":[0]}\n```";
    let (c, strategy) = parse_with_strategy(raw).unwrap();
    assert_eq!(strategy, ParseStrategy::FencedBlock);
    assert_eq!(c.lines, vec!["a"]);
  }

  #[test]
  fn brace_match_skips_prose_braces_and_respects_strings() {
    let raw = r#"Use {curly} thinking. Result: {"lines": ["if x {", "}"], "solutionOrder": [0, 1], "problem": "braces"} trailing"#;
    let (c, strategy) = parse_with_strategy(raw).unwrap();
    assert_eq!(strategy, ParseStrategy::BraceMatch);
    assert_eq!(c.lines, vec!["if x {", "}"]);
    assert_eq!(c.problem, "braces");
  }

  #[test]
  fn field_scan_matches_json_result() {
    let json = parse(r#"{"lines":["x","y"],"distractors":["z"],"solutionOrder":[0,1]}"#).unwrap();
    let (loose, strategy) = parse_with_strategy(r#"lines: ["x","y"], distractors: ["z"], solutionOrder: [0,1]"#).unwrap();
    assert_eq!(strategy, ParseStrategy::FieldScan);
    assert_eq!(loose.lines, json.lines);
    assert_eq!(loose.distractors, json.distractors);
    assert_eq!(loose.solution_order, json.solution_order);
  }

  #[test]
  fn field_scan_handles_assignment_and_single_quotes() {
    let raw = "lines = ['print(x)', 'x = 5'] distractors = ['x == 5'] solution_order = [1, 0]";
    let c = parse(raw).unwrap();
    assert_eq!(c.lines, vec!["print(x)", "x = 5"]);
    assert_eq!(c.distractors, vec!["x == 5"]);
    assert_eq!(c.solution_order, vec![1, 0]);
  }

  #[test]
  fn field_scan_keeps_brackets_inside_strings() {
    let raw = r#"lines: ["return arr[len(arr) - 1]", "def f(arr):"], solutionOrder: [1, 0,]"#;
    let c = parse(raw).unwrap();
    assert_eq!(c.lines, vec!["return arr[len(arr) - 1]", "def f(arr):"]);
    assert_eq!(c.solution_order, vec![1, 0]);
  }

  #[test]
  fn rejects_text_without_structure() {
    match parse("not valid") {
      Err(PuzzleError::Parse { preview, .. }) => assert_eq!(preview, "not valid"),
      other => panic!("expected parse error, got {other:?}"),
    }
    assert!(matches!(parse("   "), Err(PuzzleError::Parse { .. })));
    assert!(matches!(parse("{\"title\": \"nothing useful\"}"), Err(PuzzleError::Parse { .. })));
  }

  #[test]
  fn parse_error_preview_is_bounded() {
    let raw = "z".repeat(2_000);
    match parse(&raw) {
      Err(PuzzleError::Parse { preview, .. }) => assert_eq!(preview.chars().count(), PREVIEW_CHARS),
      other => panic!("expected parse error, got {other:?}"),
    }
  }

  #[test]
  fn normalizes_lines_and_drops_blanks() {
    let raw = r#"{"lines": ["  a  ", "", null, 42, "   "], "distractors": "nope", "solutionOrder": [0, 1]}"#;
    let c = parse(raw).unwrap();
    assert_eq!(c.lines, vec!["a", "42"]);
    assert!(c.distractors.is_empty());
  }

  #[test]
  fn out_of_range_indices_are_dropped() {
    let raw = r#"{"lines": ["a", "b"], "solutionOrder": [0, 7, -1, "1", 1.5, "x"]}"#;
    let c = parse(raw).unwrap();
    assert_eq!(c.solution_order, vec![0, 1]);
  }

  #[test]
  fn empty_order_after_filtering_is_a_validation_error() {
    let raw = r#"{"lines": ["a"], "solutionOrder": [3, 4]}"#;
    assert!(matches!(parse(raw), Err(PuzzleError::Validation(_))));
  }

  #[test]
  fn missing_or_empty_lines_is_a_validation_error() {
    assert!(matches!(parse(r#"{"solutionOrder": [0]}"#), Err(PuzzleError::Validation(_))));
    assert!(matches!(parse(r#"{"lines": [" "], "solutionOrder": [0]}"#), Err(PuzzleError::Validation(_))));
  }

  #[test]
  fn incomplete_coverage_is_tolerated() {
    let c = parse(r#"{"lines": ["a", "b", "c"], "solutionOrder": [0, 0, 2]}"#).unwrap();
    assert_eq!(c.solution_order, vec![0, 0, 2]);
  }

  #[test]
  fn keeps_problem_and_hint() {
    let raw = r#"{"lines": ["a"], "solutionOrder": [0], "problem": "Do a", "hint": "Just a"}"#;
    let c = parse(raw).unwrap();
    assert_eq!(c.problem, "Do a");
    assert_eq!(c.hint, "Just a");
  }
}
