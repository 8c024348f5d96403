//! Small utility helpers used across modules.

/// Normalize a learner submission before textual matching:
/// trim surrounding whitespace, then lowercase.
/// Matching stays textual on purpose (no parsing, no execution).
pub fn normalize_submission(s: &str) -> String {
  s.trim().to_lowercase()
}

/// Character count (not bytes).
/// Rule length thresholds are expressed in characters so accented
/// French text counts the way the learner typed it.
pub fn char_len(s: &str) -> usize {
  s.chars().count()
}

/// Log-safe truncation for large strings.
/// Avoids spamming logs with huge submission payloads.
pub fn trunc_for_log(s: &str, max: usize) -> String {
  if s.len() <= max {
    return s.to_string();
  }
  let mut cut = max;
  while !s.is_char_boundary(cut) {
    cut -= 1;
  }
  format!("{}… ({} bytes total)", &s[..cut], s.len())
}
