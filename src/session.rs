//! Session / Lifecycle (spec §3 "Session", §4.E). Owns the
//! translation buffer, wait-state set, session flags, SD filename
//! cache, the 3-second start deadline, and the machine profile; holds
//! a borrowed port handler for the duration of each call rather than
//! owning it directly, so tests can swap in `MockPortHandler` per call
//! without threading trait objects through every constructor.

use std::time::{Duration, Instant};

use log::info;

use crate::error::{Error, Result};
use crate::machine_profile::MachineProfile;
use crate::port::{DeviceCommand, PortHandler};
use crate::string_table::StringTable;
use crate::translation_buffer::TranslationBuffer;
use crate::translator;
use crate::wait_state::{SessionFlags, WaitFlags};

/// Baud rates the device protocol supports (spec §4.E/§6). Listed in
/// the order the spec names them so `0` maps to the documented
/// default (115200) rather than an arbitrary array position.
const SUPPORTED_BAUDS: &[u32] = &[4800, 9600, 19200, 38400, 57600, 115200, 14400, 28800];
const DEFAULT_BAUD: u32 = 115200;

/// Which host command is driving the next `cmd::NEXT_FILENAME` device
/// round-trip (spec §4.C: the same device command serves both `M20`
/// listing and `M21` card-check, disambiguated by the caller).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum NextFilenameMode {
  Listing,
  CardCheck,
}

impl Default for NextFilenameMode {
  fn default() -> Self {
    NextFilenameMode::Listing
  }
}

/// Transient per-call context the external command parser sets just
/// before invoking `Session::send`, read by the translator for the
/// handful of device commands whose host-visible text depends on
/// which host command triggered them (spec §4.C: `M21` vs `M20`
/// emulation of cmd 18; `M115` vs a bare version query for cmd 27; the
/// echoed filename argument for cmd 14).
#[derive(Debug, Default, Clone)]
pub struct InvocationContext {
  pub next_filename_mode: NextFilenameMode,
  pub triggered_by_m27: bool,
  pub triggered_by_m115: bool,
  pub sd_capture_name: Option<String>,
}

/// How many times `Session::send` resends a queueable command that
/// came back buffer-full before giving up and leaving the `buffer`
/// wait flag set for a later poll to pick up (spec §7 Recovery:
/// "buffer-full is recoverable (retry later)"); shaped like the
/// teacher's `RetryConfig` in `lib.rs`.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
  pub retries: usize,
  pub sleep: Duration,
}

impl Default for RetryConfig {
  fn default() -> Self {
    RetryConfig { retries: 5, sleep: Duration::from_millis(5) }
  }
}

pub struct Session {
  pub buffer: TranslationBuffer,
  pub wait: WaitFlags,
  pub flags: SessionFlags,
  pub files: StringTable,
  /// the `sec` deadline of spec §3/§4.C.1
  pub deadline: Option<Instant>,
  pub profile: MachineProfile,
  /// which extruder is "current" for `E` axis mapping in the extended
  /// position report (spec §4.C, cmd 21)
  pub current_tool: u8,
  pub position_known: [bool; 5],
  pub current_position: [i32; 5],
  /// emulation quirk enabled at `initialize` (spec §4.E): fan control
  /// always targets the valve output
  pub fan_targets_valve: bool,
  pub invocation: InvocationContext,
  pub retry: RetryConfig,
}

impl Session {
  /// spec §4.E `initialize`: reset cursor, wait flags, string table;
  /// declare the default machine profile; enable the fan/valve quirk.
  pub fn initialize(profile: MachineProfile) -> Self {
    Session {
      buffer: TranslationBuffer::new(),
      wait: WaitFlags::new(),
      flags: SessionFlags::new(),
      files: StringTable::new(),
      deadline: None,
      profile,
      current_tool: 0,
      position_known: [false; 5],
      current_position: [0; 5],
      fan_targets_valve: true,
      invocation: InvocationContext::default(),
      retry: RetryConfig::default(),
    }
  }

  /// Maps a requested baud to a supported rate (spec §4.E/§6): `0`
  /// maps to 115200; anything else must be one of `SUPPORTED_BAUDS`.
  pub fn resolve_baud(requested: u32) -> Result<u32> {
    if requested == 0 {
      return Ok(DEFAULT_BAUD);
    }
    if SUPPORTED_BAUDS.contains(&requested) {
      Ok(requested)
    } else {
      Err(Error::InvalidBaud(requested))
    }
  }

  /// spec §4.E `connect`: validates baud and returns the literal
  /// connect banner. Opening the actual serial port is `crate::port`'s
  /// job (`open_serial_port`); this only validates the protocol-level
  /// baud contract and produces the banner text the caller writes.
  pub fn connect(&mut self, requested_baud: u32) -> Result<&'static str> {
    Session::resolve_baud(requested_baud)?;
    Ok("start\n")
  }

  /// spec §4.E `cleanup`: flush logs, tear down the string table,
  /// restore the default machine profile. Closing the port is the
  /// caller's responsibility (it owns the `Box<dyn PortHandler>` this
  /// session borrows per call).
  pub fn cleanup(&mut self) {
    info!("session cleanup: closing down");
    self.files.clear();
    self.profile = crate::machine_profile::default_profile();
  }

  /// spec §4.E `clear_state_for_cancel`: set program state to READY
  /// (modeled here as simply clearing all waits), zero positional and
  /// extruder "excess" accumulators, clear `waiting`, set `emptyQueue`
  /// wait (to drain), clear `getPosWhenReady`.
  pub fn clear_state_for_cancel(&mut self) {
    self.position_known = [false; 5];
    self.wait.clear_all();
    self.wait.empty_queue = true;
    self.flags.get_pos_when_ready = false;
  }

  /// Sends one device command and runs its reply through the
  /// translator, retrying while the device reports buffer-full (spec
  /// §7's PKT_BUFFER_FULL row: "retried by caller").
  pub fn send(&mut self, port: &mut dyn PortHandler, command: DeviceCommand) -> Result<()> {
    let config = self.retry;
    for attempt in 0..config.retries {
      let reply = port.send(&command)?;
      translator::translate(self, port, &reply)?;

      if !self.wait.buffer {
        return Ok(());
      }

      if attempt + 1 < config.retries {
        std::thread::sleep(config.sleep);
      }
    }

    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn baud_zero_maps_to_default() {
    assert_eq!(Session::resolve_baud(0).unwrap(), DEFAULT_BAUD);
  }

  #[test]
  fn supported_bauds_pass_through() {
    assert_eq!(Session::resolve_baud(57600).unwrap(), 57600);
    assert_eq!(Session::resolve_baud(28800).unwrap(), 28800);
  }

  #[test]
  fn unsupported_baud_errors() {
    assert!(matches!(Session::resolve_baud(1200), Err(Error::InvalidBaud(1200))));
  }

  #[test]
  fn cleanup_clears_string_table_and_profile() {
    let mut session = Session::initialize(crate::machine_profile::lookup("replicator2x"));
    session.files.add("a.gco");

    session.cleanup();

    assert_eq!(session.files.len(), 0);
    assert_eq!(session.profile.name, crate::machine_profile::default_profile().name);
  }

  #[test]
  fn clear_state_for_cancel_resets_and_sets_empty_queue() {
    let mut session = Session::initialize(crate::machine_profile::default_profile());
    session.wait.platform = true;
    session.flags.get_pos_when_ready = true;
    session.position_known[0] = true;

    session.clear_state_for_cancel();

    assert!(!session.wait.platform);
    assert!(session.wait.empty_queue);
    assert!(!session.flags.get_pos_when_ready);
    assert!(!session.position_known[0]);
  }
}
