//! The build-status state machine driven by device command 24 (spec
//! §4.C.1). Kept in its own module since it is genuinely a distinct
//! state machine from the rest of the per-command translator table.

use std::time::Instant;

use crate::device::BuildStatus;
use crate::session::Session;

/// The 3-second grace window a just-started SD print gets to leave
/// `NONE` (spec §4.E/§4.C.1). If the clock appears to have jumped
/// backward by more than this, the deadline is abandoned rather than
/// honoured (spec rule 2: "if sec - now > 4, clock jumped").
pub const START_GRACE: std::time::Duration = std::time::Duration::from_secs(3);
const CLOCK_JUMP_THRESHOLD: std::time::Duration = std::time::Duration::from_secs(4);

/// One line of host-visible text produced by the state machine. A
/// `Vec` rather than a single `String` because rule 2's CANCELED case
/// emits two lines by design (spec §9's Open Question: keep the
/// fall-through behaviour, but as an explicit named case rather than
/// an implicit one).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatusOutcome {
  Suppressed,
  Lines(Vec<String>),
  /// The CANCELED -> FINISHED_NORMALLY fall-through (spec §9 Open
  /// Question), named explicitly instead of falling through silently.
  CanceledThenFinished(Vec<String>),
}

/// Evaluates spec §4.C.1's three numbered rules against the current
/// session state and a freshly-decoded build-status reply.
pub fn evaluate(
  session: &mut Session,
  status: BuildStatus,
  line: u32,
  triggered_by_m27: bool,
  now: Instant,
) -> BuildStatusOutcome {
  // Rule 1
  if session.wait.bot_cancel && !matches!(status, BuildStatus::Running | BuildStatus::Paused | BuildStatus::Cancelling) {
    session.wait.bot_cancel = false;
  }

  // Rule 2
  if session.wait.start || triggered_by_m27 {
    if let Some(deadline) = session.deadline {
      if !matches!(status, BuildStatus::Running) && now < deadline {
        if deadline.saturating_duration_since(now) > CLOCK_JUMP_THRESHOLD {
          session.deadline = None;
        } else {
          return BuildStatusOutcome::Suppressed;
        }
      }
    }

    return match status {
      BuildStatus::None => BuildStatusOutcome::Lines(vec!["Not SD printing".into()]),
      BuildStatus::Running => {
        session.deadline = None;
        session.wait.start = false;
        BuildStatusOutcome::Lines(vec![format!("SD printing byte on line {}/0", line)])
      }
      BuildStatus::Canceled => {
        session.wait.clear_all();
        session.flags.get_pos_when_ready = false;
        BuildStatusOutcome::CanceledThenFinished(vec![
          "SD printing cancelled.".into(),
          "Done printing file".into(),
        ])
      }
      BuildStatus::FinishedNormally => {
        BuildStatusOutcome::Lines(vec!["Done printing file".into()])
      }
      BuildStatus::Paused => {
        BuildStatusOutcome::Lines(vec![format!("SD printing paused at line {}", line)])
      }
      BuildStatus::Cancelling => {
        BuildStatusOutcome::Lines(vec![format!("SD printing sleeping at line {}", line)])
      }
    };
  }

  // Rule 3 (routine check)
  match status {
    BuildStatus::Paused => {
      session.wait.unpause = true;
      BuildStatusOutcome::Lines(vec!["// echo: Waiting for unpause button on the LCD panel".into()])
    }
    BuildStatus::None | BuildStatus::Running if session.wait.unpause => {
      session.wait.empty_queue = true;
      BuildStatusOutcome::Suppressed
    }
    _ => {
      session.wait.unpause = false;
      BuildStatusOutcome::Suppressed
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::session::Session;

  fn session() -> Session {
    Session::initialize(crate::machine_profile::default_profile())
  }

  #[test]
  fn routine_pause_sets_unpause_and_echoes_once() {
    let mut s = session();
    let outcome = evaluate(&mut s, BuildStatus::Paused, 10, false, Instant::now());

    assert!(s.wait.unpause);
    assert_eq!(
      outcome,
      BuildStatusOutcome::Lines(vec!["// echo: Waiting for unpause button on the LCD panel".into()])
    );
  }

  #[test]
  fn routine_running_while_unpause_sets_empty_queue() {
    let mut s = session();
    s.wait.unpause = true;

    let outcome = evaluate(&mut s, BuildStatus::Running, 0, false, Instant::now());

    assert!(s.wait.empty_queue);
    assert_eq!(outcome, BuildStatusOutcome::Suppressed);
  }

  #[test]
  fn m27_before_deadline_suppresses_unless_running() {
    let mut s = session();
    let now = Instant::now();
    s.deadline = Some(now + START_GRACE);
    s.wait.start = true;

    let outcome = evaluate(&mut s, BuildStatus::None, 0, true, now);
    assert_eq!(outcome, BuildStatusOutcome::Suppressed);
  }

  #[test]
  fn m27_running_clears_deadline_and_start_wait() {
    let mut s = session();
    let now = Instant::now();
    s.deadline = Some(now + START_GRACE);
    s.wait.start = true;

    let outcome = evaluate(&mut s, BuildStatus::Running, 42, true, now);

    assert!(s.deadline.is_none());
    assert!(!s.wait.start);
    assert_eq!(outcome, BuildStatusOutcome::Lines(vec!["SD printing byte on line 42/0".into()]));
  }

  #[test]
  fn canceled_falls_through_to_finished_explicitly() {
    let mut s = session();
    s.wait.start = true;
    s.flags.get_pos_when_ready = true;

    let outcome = evaluate(&mut s, BuildStatus::Canceled, 0, true, Instant::now());

    assert!(!s.wait.any());
    assert!(!s.flags.get_pos_when_ready);
    assert_eq!(
      outcome,
      BuildStatusOutcome::CanceledThenFinished(vec![
        "SD printing cancelled.".into(),
        "Done printing file".into(),
      ])
    );
  }

  #[test]
  fn clock_jump_abandons_deadline() {
    let mut s = session();
    let now = Instant::now();
    // deadline far in the future relative to `now` => looks like a backward
    // clock jump of more than 4s when measured from `now`
    s.deadline = Some(now + std::time::Duration::from_secs(10));
    s.wait.start = true;

    let outcome = evaluate(&mut s, BuildStatus::Paused, 1, true, now);

    assert!(s.deadline.is_none());
    assert_eq!(outcome, BuildStatusOutcome::Lines(vec!["SD printing paused at line 1".into()]));
  }
}
