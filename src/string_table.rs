//! Grow-on-demand ordered sequence of owned strings with case-insensitive
//! lookup (spec §3, §4.A). Used to cache the device's SD file listing so
//! host case-insensitive `M23 <name>` selection can recover the
//! device's case-exact filename.

/// Initial/growth chunk size, named for parity with spec §4.A even
/// though `Vec`'s own amortised growth already gives us this for free.
const GROWTH_CHUNK: usize = 10;

#[derive(Debug, Default, Clone)]
pub struct StringTable {
  entries: Vec<String>,
}

impl StringTable {
  pub fn new() -> Self {
    StringTable {
      entries: Vec::with_capacity(GROWTH_CHUNK),
    }
  }

  /// Appends a heap-owned copy of `s`, returning its index.
  pub fn add(&mut self, s: impl Into<String>) -> usize {
    self.entries.push(s.into());
    self.entries.len() - 1
  }

  /// Removes entry `i`, shifting the tail down. No-op if `i` is out of
  /// range.
  pub fn remove(&mut self, i: usize) {
    if i < self.entries.len() {
      self.entries.remove(i);
    }
  }

  /// Clears every entry, releasing the backing storage (spec testable
  /// property 4: after initialize/cleanup, no table allocations remain).
  pub fn clear(&mut self) {
    self.entries.clear();
    self.entries.shrink_to_fit();
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn get(&self, i: usize) -> Option<&str> {
    self.entries.get(i).map(String::as_str)
  }

  /// Returns the first match's index, comparing case-insensitively and
  /// preserving insertion order (first match wins, per spec testable
  /// property 5).
  pub fn find_case_insensitive(&self, s: &str) -> Option<usize> {
    self.entries.iter().position(|entry| entry.eq_ignore_ascii_case(s))
  }

  pub fn iter(&self) -> impl Iterator<Item = &str> {
    self.entries.iter().map(String::as_str)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_and_find_case_insensitive() {
    let mut table = StringTable::new();
    table.add("ABC.GCO");
    table.add("robot.x3g");

    assert_eq!(table.find_case_insensitive("abc.gco"), Some(0));
    assert_eq!(table.find_case_insensitive("ROBOT.X3G"), Some(1));
    assert_eq!(table.find_case_insensitive("missing.gco"), None);
  }

  #[test]
  fn first_match_wins_order_preserved() {
    let mut table = StringTable::new();
    table.add("dup.gco");
    table.add("DUP.GCO");

    assert_eq!(table.find_case_insensitive("dup.gco"), Some(0));
  }

  #[test]
  fn remove_shifts_tail() {
    let mut table = StringTable::new();
    table.add("a");
    table.add("b");
    table.add("c");

    table.remove(0);

    assert_eq!(table.get(0), Some("b"));
    assert_eq!(table.get(1), Some("c"));
    assert_eq!(table.len(), 2);
  }

  #[test]
  fn clear_releases_storage() {
    let mut table = StringTable::new();
    for i in 0..25 {
      table.add(format!("file{}.gco", i));
    }

    table.clear();

    assert_eq!(table.len(), 0);
    assert_eq!(table.entries.capacity(), 0);
  }
}
