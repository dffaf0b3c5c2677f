//! Fixed-capacity text buffer for one host response (spec §3, §4.B).
//!
//! Overflow policy (spec §9, "Silent truncation on translation buffer
//! overflow is deliberate"): once the cursor reaches capacity, further
//! appends are silently dropped rather than erroring, so a response
//! that has already grown past its useful prefix still ends with `ok`
//! instead of aborting the whole line.

use std::fmt;

/// Matches the host line's own size limit (spec §4.F's `BUFFER_MAX`)
/// since a response plus `ok` is bounded the same way the daemon bounds
/// an input line.
pub const BUFFER_MAX: usize = 256;

#[derive(Debug, Clone)]
pub struct TranslationBuffer {
  text: String,
  capacity: usize,
}

impl TranslationBuffer {
  pub fn new() -> Self {
    Self::with_capacity(BUFFER_MAX)
  }

  pub fn with_capacity(capacity: usize) -> Self {
    TranslationBuffer {
      text: String::with_capacity(capacity),
      capacity,
    }
  }

  /// Resets the cursor to the start without releasing the backing
  /// allocation.
  pub fn reset(&mut self) {
    self.text.clear();
  }

  pub fn len(&self) -> usize {
    self.text.len()
  }

  pub fn is_empty(&self) -> bool {
    self.text.is_empty()
  }

  pub fn as_str(&self) -> &str {
    &self.text
  }

  /// Appends a literal string, truncating silently at capacity.
  /// Returns the number of bytes actually appended.
  pub fn append_str(&mut self, s: &str) -> usize {
    let remaining = self.capacity.saturating_sub(self.text.len());
    if remaining == 0 {
      return 0;
    }

    let take = floor_char_boundary(s, remaining.min(s.len()));
    self.text.push_str(&s[..take]);
    take
  }

  /// Appends a formatted value via `write!`, truncating silently at
  /// capacity. Mirrors the teacher's `BufMut`-based append-and-measure
  /// shape, but over text instead of bytes.
  pub fn append(&mut self, args: fmt::Arguments<'_>) -> usize {
    let before = self.text.len();
    let remaining = self.capacity.saturating_sub(before);
    if remaining == 0 {
      return 0;
    }

    // format into a scratch string first so we can measure/truncate
    // without partially writing an invalid UTF-8 boundary into `text`.
    let mut scratch = String::new();
    if fmt::Write::write_fmt(&mut scratch, args).is_err() {
      return 0;
    }

    self.append_str(&scratch)
  }

  /// Appends a line (`s` followed by `\n`), truncating silently.
  pub fn append_line(&mut self, s: &str) -> usize {
    let mut written = self.append_str(s);
    written += self.append_str("\n");
    written
  }
}

impl Default for TranslationBuffer {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Write for TranslationBuffer {
  fn write_str(&mut self, s: &str) -> fmt::Result {
    self.append_str(s);
    Ok(())
  }
}

/// Largest `n' <= n` at which `s` can be safely sliced. `str::is_char_boundary`
/// is the std primitive; we just scan backward rather than depend on the
/// nightly-only `floor_char_boundary`.
fn floor_char_boundary(s: &str, n: usize) -> usize {
  if n >= s.len() {
    return s.len();
  }

  let mut idx = n;
  while idx > 0 && !s.is_char_boundary(idx) {
    idx -= 1;
  }
  idx
}

/// Convenience macro mirroring `write!` but targeting a
/// `TranslationBuffer`'s bounded-append semantics explicitly.
#[macro_export]
macro_rules! tb_write {
  ($buf:expr, $($arg:tt)*) => {
    $buf.append(format_args!($($arg)*))
  };
}
