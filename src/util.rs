//! Small utility helpers used across modules.

/// Very small and safe string templating.
/// Replaces occurrences of `{key}` in the template with provided values.
pub fn fill_template(tpl: &str, pairs: &[(&str, &str)]) -> String {
  let mut out = tpl.to_string();
  for (k, v) in pairs {
    let needle = format!("{{{}}}", k);
    out = out.replace(&needle, v);
  }
  out
}

/// Keep at most `max` characters. Never splits a UTF-8 sequence.
pub fn truncate_chars(s: &str, max: usize) -> String {
  match s.char_indices().nth(max) {
    Some((idx, _)) => s[..idx].to_string(),
    None => s.to_string(),
  }
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge request/response payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  let head = truncate_chars(s, max);
  if head.len() == s.len() { head } else { format!("{}… ({} bytes total)", head, s.len()) }
}

/// Round to two decimal places.
pub fn round2(x: f64) -> f64 {
  (x * 100.0).round() / 100.0
}

/// Clamp a skill value into [0, 100]. NaN and infinities count as 0.
pub fn clamp_skill(x: f64) -> f64 {
  if !x.is_finite() { 0.0 } else { x.clamp(0.0, 100.0) }
}
