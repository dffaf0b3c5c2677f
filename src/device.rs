//! Device-protocol surface consulted by the translator (spec §6): the
//! first bytes of a decoded reply packet identify the command id, an
//! optional tool id, and the decoded reply fields. Framing, CRC and
//! retries are the external `port_handler`'s job (see `crate::port`);
//! this module only names the command/sub-command ids and shapes the
//! decoded payload the translator reads.

/// Device command ids used by the translator's command-specific table
/// (spec §4.C). Named constants per REDESIGN FLAGS instead of inline
/// magic numbers.
pub mod cmd {
  pub const CLEAR_BUFFER: u8 = 3;
  pub const ABORT: u8 = 7;
  pub const RESET: u8 = 17;
  pub const TOOL_QUERY: u8 = 10;
  pub const IS_READY: u8 = 11;
  pub const BEGIN_SD_CAPTURE: u8 = 14;
  pub const END_SD_CAPTURE: u8 = 15;
  pub const START_SD_PLAYBACK: u8 = 16;
  pub const NEXT_FILENAME: u8 = 18;
  pub const EXTENDED_POSITION: u8 = 21;
  pub const MOTHERBOARD_STATUS: u8 = 23;
  pub const BUILD_STATISTICS: u8 = 24;
  pub const ADVANCED_VERSION: u8 = 27;
  pub const HOME: u8 = 131;
  pub const RECALL_HOME: u8 = 132;
  pub const DELAY: u8 = 133;
  pub const WAIT_FOR_EXTRUDER: u8 = 135;
  pub const WAIT_FOR_PLATFORM: u8 = 141;
  pub const HOME_OFFSETS: u8 = 144;
  pub const LCD_MESSAGE: u8 = 148;
  pub const WAIT_FOR_BUTTON: u8 = 149;
  /// Fan/valve toggle, driven by the host's `M106`/`M107` (spec §4.E's
  /// fan/valve emulation quirk). Not part of the translator's effect
  /// table in spec §4.C — it produces no host-visible text and no wait
  /// state, only the queueable buffer-clear every queueable command
  /// gets in `translate`.
  pub const TOGGLE_FAN: u8 = 150;
}

/// Fixed tool index the valve output is wired to, for machines where
/// the "valve" and "fan" outputs are the same physical toggle (spec
/// §4.E).
pub const VALVE_TOOL_INDEX: u8 = 1;

/// Tool-query sub-command ids for `cmd::TOOL_QUERY` (spec §4.C tool
/// sub-dispatch table).
pub mod tool_sub {
  pub const GET_EXTRUDER_TEMP: u8 = 2;
  pub const IS_EXTRUDER_READY: u8 = 22;
  pub const GET_PLATFORM_TEMP: u8 = 30;
  pub const GET_EXTRUDER_TARGET: u8 = 32;
  pub const GET_PLATFORM_TARGET: u8 = 33;
  pub const IS_PLATFORM_READY: u8 = 35;
}

/// `MOTHERBOARD_STATUS` (cmd 23) bitfield positions (spec §4.C's row
/// for cmd 23; exact bit positions are this crate's own encoding
/// choice since the spec only names the conditions).
pub mod mb_status {
  pub const BUILD_CANCELLING: u8 = 0x01;
  pub const HEAT_SHUTDOWN: u8 = 0x02;
  pub const POWER_ERROR: u8 = 0x04;
}

/// A queueable command's id has its top bit set (spec GLOSSARY); named
/// predicate per REDESIGN FLAGS rather than an inline `& 0x80` mask.
pub fn is_queueable(command_id: u8) -> bool {
  command_id & 0x80 != 0
}

/// Build status values reported by `cmd::BUILD_STATISTICS` (spec
/// §4.C.1).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum BuildStatus {
  None,
  Running,
  FinishedNormally,
  Paused,
  Canceled,
  Cancelling,
}

/// Firmware variant decoded from `cmd::ADVANCED_VERSION` (spec §4.C).
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FirmwareVariant {
  Makerbot,
  Sailfish,
  Unknown(u8),
}

impl FirmwareVariant {
  pub fn from_byte(b: u8) -> Self {
    match b {
      0x01 => FirmwareVariant::Makerbot,
      0x80 => FirmwareVariant::Sailfish,
      other => FirmwareVariant::Unknown(other),
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      FirmwareVariant::Makerbot => "Makerbot",
      FirmwareVariant::Sailfish => "Sailfish",
      FirmwareVariant::Unknown(_) => "Unknown",
    }
  }

  pub fn url(&self) -> &'static str {
    match self {
      FirmwareVariant::Sailfish => "http://www.sailfishfirmware.com",
      FirmwareVariant::Makerbot => "http://www.makerbot.com",
      FirmwareVariant::Unknown(_) => "",
    }
  }
}

/// Decoded fields of a successful device reply, keyed to the command
/// that produced them (spec §4.C's command table and tool sub-dispatch
/// table).
#[derive(Debug, Clone)]
pub enum ReplyPayload {
  Empty,
  ExtruderTemp(f32),
  ExtruderReady(bool),
  PlatformTemp(f32),
  ExtruderTarget(f32),
  PlatformTarget(f32),
  PlatformReady(bool),
  IsReady(bool),
  ExtendedPosition {
    x: i32,
    y: i32,
    z: i32,
    a: i32,
    b: i32,
  },
  MotherboardStatus(u8),
  BuildStatistics {
    status: BuildStatus,
    line: u32,
  },
  AdvancedVersion {
    variant: FirmwareVariant,
    version: u16,
  },
  /// `None` signals "end of listing" (spec: emit `End file list` when
  /// empty).
  NextFilename(Option<String>),
  /// cmd 16 (`START_SD_PLAYBACK`): the raw result byte; `7` means the
  /// requested file was not found (spec §4.C).
  PlaybackStart(u8),
  /// cmd 18 used in its `M21` card-check mode (spec §4.C): whether the
  /// card is present and readable.
  CardCheck(bool),
}

/// A decoded reply from the device, after framing/CRC/retries have
/// been handled by the external port_handler (spec §6).
#[derive(Debug, Clone)]
pub struct DeviceReply {
  pub command: u8,
  pub sub_command: Option<u8>,
  pub tool: Option<u8>,
  pub status: ReplyStatus,
  pub payload: ReplyPayload,
}

/// The device-level status byte of a reply. `Success` dispatches into
/// the command-specific table (spec §4.C); any other code is one of
/// the PKT_* rows of spec §7 and is handled by the translator before
/// the per-command table is consulted.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ReplyStatus {
  Success,
  Code(u8),
}

impl DeviceReply {
  pub fn success(command: u8, tool: Option<u8>, payload: ReplyPayload) -> Self {
    DeviceReply {
      command,
      sub_command: None,
      tool,
      status: ReplyStatus::Success,
      payload,
    }
  }

  pub fn error(command: u8, tool: Option<u8>, status: u8) -> Self {
    DeviceReply {
      command,
      sub_command: None,
      tool,
      status: ReplyStatus::Code(status),
      payload: ReplyPayload::Empty,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn queueable_predicate_checks_top_bit() {
    assert!(is_queueable(cmd::WAIT_FOR_EXTRUDER)); // 135 = 0x87
    assert!(is_queueable(cmd::HOME)); // 131 = 0x83
    assert!(!is_queueable(cmd::TOOL_QUERY)); // 10 = 0x0A
    assert!(!is_queueable(cmd::NEXT_FILENAME)); // 18 = 0x12
  }

  #[test]
  fn firmware_variant_decodes_known_tags() {
    assert_eq!(FirmwareVariant::from_byte(0x01), FirmwareVariant::Makerbot);
    assert_eq!(FirmwareVariant::from_byte(0x80), FirmwareVariant::Sailfish);
    assert_eq!(FirmwareVariant::from_byte(0x42).name(), "Unknown");
  }
}
