//! Wait-state bag and session scalar flags (spec §3).
//!
//! Per REDESIGN FLAGS: the source's packed bitfield becomes a plain
//! struct of named `bool`s with an `any()`/aggregate accessor; nothing
//! outside this module relies on a particular bit layout, only on set/
//! clear/any-of semantics.

/// Independent "still waiting for X" flags, plus the aggregate
/// `waiting` nesting counter for implicit-polling contexts (spec §3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WaitFlags {
  /// waiting for the device action buffer to drain
  pub empty_queue: bool,
  /// waiting for tool A to reach target temperature
  pub extruder_a: bool,
  /// waiting for tool B to reach target temperature
  pub extruder_b: bool,
  /// waiting for heated build plate to reach target
  pub platform: bool,
  /// waiting for a user LCD button press
  pub button: bool,
  /// waiting for a just-launched SD print to show status RUNNING
  pub start: bool,
  /// device rejected last queueable command with "buffer full"
  pub buffer: bool,
  /// we sent an abort; waiting for the device's cancel confirmation
  pub bot_cancel: bool,
  /// SD print is paused; waiting for unpause
  pub unpause: bool,
  /// host sent cancel gcode before the asynchronous cancel event
  pub cancel_sync: bool,
  /// nesting depth of "implicit polling" contexts
  pub waiting: u32,
}

impl WaitFlags {
  pub fn new() -> Self {
    Self::default()
  }

  /// `any_wait = OR(all members)`, not counting the `waiting` counter
  /// itself (which tracks nesting, not a distinct condition).
  pub fn any(&self) -> bool {
    self.empty_queue
      || self.extruder_a
      || self.extruder_b
      || self.platform
      || self.button
      || self.start
      || self.buffer
      || self.bot_cancel
      || self.unpause
      || self.cancel_sync
  }

  /// Clears every member flag and zeroes the `waiting` counter. Used by
  /// the build-status cancel-then-finished transition and by
  /// `clear_state_for_cancel` (spec §4.E).
  pub fn clear_all(&mut self) {
    *self = WaitFlags::new();
  }

  pub fn extruder_flag_mut(&mut self, tool: u8) -> &mut bool {
    if tool == 0 {
      &mut self.extruder_a
    } else {
      &mut self.extruder_b
    }
  }
}

/// Scalar session state bits distinct from `WaitFlags` (spec §3).
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionFlags {
  /// we owe the host an `ok` as soon as something else is printed, or
  /// at finalize
  pub ok_pending: bool,
  /// device has raised a cancel; host-visible ack deferred
  pub cancel_pending: bool,
  /// currently mid-emission of a multi-line file listing response
  pub listing_files: bool,
  /// next time the device reports idle, query position and record
  /// unknown axes
  pub get_pos_when_ready: bool,
  /// cancel arrived while waiting; remember for bookkeeping
  pub wait_cleared_by_cancel: bool,
}

impl SessionFlags {
  pub fn new() -> Self {
    Self::default()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn any_reflects_member_state() {
    let mut flags = WaitFlags::new();
    assert!(!flags.any());

    flags.platform = true;
    assert!(flags.any());

    flags.platform = false;
    assert!(!flags.any());
  }

  #[test]
  fn clear_all_resets_everything() {
    let mut flags = WaitFlags::new();
    flags.extruder_a = true;
    flags.waiting = 3;

    flags.clear_all();

    assert!(!flags.any());
    assert_eq!(flags.waiting, 0);
  }

  #[test]
  fn extruder_flag_mut_selects_by_tool() {
    let mut flags = WaitFlags::new();
    *flags.extruder_flag_mut(0) = true;
    assert!(flags.extruder_a);
    assert!(!flags.extruder_b);

    *flags.extruder_flag_mut(1) = true;
    assert!(flags.extruder_b);
  }
}
