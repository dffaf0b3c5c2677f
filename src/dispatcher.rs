//! Line Dispatcher (spec §4.D): drives one host line end to end.
//!
//! The host protocol is synchronous — one line in, one response ending
//! in `ok` — while commands like `M109` (wait for extruder temperature)
//! can take real wall-clock time to resolve on the device side. Per
//! spec §5 ("all device replies associated with a host line arrive
//! before the next line is read"), that waiting happens *inside* this
//! call rather than by asking the host to resend `M105` itself: a
//! bounded number of sleep-and-repoll cycles run here before giving up
//! for this line, after which the wait state simply persists and the
//! host's own next poll (or another `M109`) picks up where this one
//! left off.

use std::time::Duration;

use crate::device::{cmd, tool_sub};
use crate::parser::CommandParser;
use crate::port::{DeviceCommand, PortHandler};
use crate::session::Session;

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const DEFAULT_MAX_INLINE_POLLS: usize = 3;

pub struct LineDispatcher<P> {
  pub session: Session,
  parser: P,
  poll_interval: Duration,
  max_inline_polls: usize,
}

impl<P: CommandParser> LineDispatcher<P> {
  pub fn new(session: Session, parser: P) -> Self {
    LineDispatcher {
      session,
      parser,
      poll_interval: DEFAULT_POLL_INTERVAL,
      max_inline_polls: DEFAULT_MAX_INLINE_POLLS,
    }
  }

  /// Overrides the inline busy-poll cadence; tests use a zero interval
  /// so exercising the retry path doesn't burn wall-clock time.
  pub fn with_poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  pub fn with_max_inline_polls(mut self, max: usize) -> Self {
    self.max_inline_polls = max;
    self
  }

  /// spec §4.D's `dispatch(line) -> status`, returning the host-visible
  /// response text *without* a trailing newline (the daemon writer
  /// appends exactly one, per spec §4.F).
  pub fn dispatch(&mut self, port: &mut dyn PortHandler, line: &str) -> String {
    let waiting_before = self.session.wait.any();
    self.session.buffer.reset();
    self.session.wait.buffer = false;
    if !waiting_before {
      self.session.flags.ok_pending = true;
    }

    match self.parser.dispatch(&mut self.session, port, line) {
      Ok(()) => {
        if self.session.buffer.is_empty() && self.session.wait.any() {
          self.issue_implicit_poll(port);
        }

        let mut polls = 0;
        while self.session.wait.any() && polls < self.max_inline_polls {
          std::thread::sleep(self.poll_interval);
          self.issue_implicit_poll(port);
          polls += 1;
        }
      }
      Err(e) => {
        self.session.buffer.append_line(&e.to_string());
      }
    }

    // Exactly one `ok` finalization per host line (spec §4.D), run once
    // every device round-trip this line provoked has completed --
    // however many `translate` calls that took -- rather than per reply.
    // An ordinary line always owes one once nothing is left waited-on; a
    // line that arrived mid-wait owes one only if this call is what
    // cleared that wait. `ok_pending` (set above iff `!waiting_before`)
    // and `waiting_before` are complementary, so both cases collapse to
    // a single check against the wait state as it stands now.
    if !self.session.wait.any() {
      self.session.buffer.append_line("ok");
    }

    self.session.flags.ok_pending = false;

    strip_trailing_newline(self.session.buffer.as_str())
  }

  /// The "implicit M105" of spec §4.D/GLOSSARY, extended to also
  /// re-check readiness for whichever wait flags are currently active
  /// (spec §4.C's tool sub-dispatch rows 22/35 are what actually clear
  /// `extruderA`/`extruderB`/`platform`; a bare temperature poll alone
  /// never would).
  fn issue_implicit_poll(&mut self, port: &mut dyn PortHandler) {
    let _ = self.parser.dispatch(&mut self.session, port, "M105");

    if self.session.wait.extruder_a {
      let _ = self.session.send(port, DeviceCommand::tool_query(0, tool_sub::IS_EXTRUDER_READY));
    }
    if self.session.wait.extruder_b {
      let _ = self.session.send(port, DeviceCommand::tool_query(1, tool_sub::IS_EXTRUDER_READY));
    }
    if self.session.wait.platform {
      let _ = self.session.send(port, DeviceCommand::tool_query(0, tool_sub::IS_PLATFORM_READY));
    }
    if self.session.wait.empty_queue {
      let _ = self.session.send(port, DeviceCommand::simple(cmd::IS_READY));
    }
  }
}

fn strip_trailing_newline(text: &str) -> String {
  match text.strip_suffix('\n') {
    Some(stripped) => stripped.to_string(),
    None => text.to_string(),
  }
}
