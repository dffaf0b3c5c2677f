//! Response Translator (spec §4.C): turns one decoded device reply into
//! host-protocol text appended to the session's `TranslationBuffer`,
//! updating `WaitFlags`/`SessionFlags` along the way. This is the core
//! state machine the rest of the crate exists to drive.
//!
//! `translate` is the entry point for every device reply that came
//! from an actual packet round-trip. The one host command with no
//! device-protocol equivalent at all (`M23` file selection) bypasses
//! it entirely via `translate_select_file`, per spec §4.C's
//! `length == 0` clause.
//!
//! Neither function flushes the `ok` acknowledgement itself: a single
//! host line can drive several device round-trips (and therefore
//! several `translate` calls), so `okPending` is only ever resolved
//! once, by the Line Dispatcher's finalizer (spec §4.D), after every
//! reply for the line has been processed.

use std::time::Instant;

use log::{debug, error, warn};

use crate::build_status::{self, BuildStatusOutcome};
use crate::device::{cmd, mb_status, tool_sub, DeviceReply, ReplyPayload};
use crate::error::{Error, Result};
use crate::port::{DeviceCommand, PortHandler};
use crate::session::Session;
use crate::tb_write;

/// Entry point for a decoded device reply (spec §4.C). Ordering
/// mirrors the spec prose: residue-draining drop check first, then
/// device-level status handling, then (on success) the per-command
/// effect table. `ok` is never flushed here — see the module doc.
pub fn translate(session: &mut Session, port: &mut dyn PortHandler, reply: &DeviceReply) -> Result<()> {
  debug!("translating reply: command={:#x} tool={:?} status={:?}", reply.command, reply.tool, reply.status);

  if session.flags.cancel_pending && crate::device::is_queueable(reply.command) {
    debug!("dropping queueable reply {:#x} while cancel is pending", reply.command);
    return Ok(());
  }

  if let crate::device::ReplyStatus::Code(status) = reply.status {
    return handle_status_code(session, status);
  }

  if crate::device::is_queueable(reply.command) {
    session.wait.buffer = false;
  }

  dispatch_command_effects(session, port, reply)?;
  Ok(())
}

/// Handles a non-success device status byte (spec §7's PKT_* rows).
/// `0x89` (cancel) and `0x82` (buffer full) get bespoke handling; every
/// other code becomes an `Error` the dispatcher formats into
/// host-visible text.
fn handle_status_code(session: &mut Session, status: u8) -> Result<()> {
  match status {
    0x89 => {
      handle_cancel_event(session, "Build cancelled");
      Ok(())
    }
    0x82 => {
      warn!("device buffer full, will retry");
      session.wait.buffer = true;
      session.buffer.append_line("Status: Buffer full");
      Ok(())
    }
    _ => {
      let e = Error::from_device_status(status).unwrap_or(Error::PktGeneric);
      error!("{}", e);
      Err(e)
    }
  }
}

/// Shared cancel-event handling, used both by a literal `0x89` reply
/// status and by `MOTHERBOARD_STATUS` bits that carry the same meaning
/// (spec §4.C's cmd 23 row: "return status 0x89"). A self-requested
/// cancel (`botCancel` already set) is consumed silently; otherwise the
/// session resets and `message` is emitted.
fn handle_cancel_event(session: &mut Session, message: &str) {
  if session.wait.bot_cancel {
    session.wait.bot_cancel = false;
    return;
  }

  session.flags.wait_cleared_by_cancel = session.wait.any();
  session.flags.cancel_pending = true;
  session.clear_state_for_cancel();
  session.buffer.append_line(message);
}

/// "Reset buffer" appears on every wait-producing command row of spec
/// §4.C's table; it uniformly means clearing a stale
/// `PKT_BUFFER_FULL` wait before starting a new one.
fn reset_buffer_wait(session: &mut Session) {
  session.wait.buffer = false;
}

/// spec §4.C's `length == 0` clause: `M23` has no device-protocol
/// equivalent at all, so the external command parser calls this
/// directly instead of routing through `translate`.
pub fn translate_select_file(session: &mut Session, requested_name: &str) -> Result<()> {
  match session.files.find_case_insensitive(requested_name) {
    Some(idx) => {
      let canonical = session.files.get(idx).unwrap_or(requested_name).to_string();
      tb_write!(session.buffer, "File opened:{} Size:0\n", canonical);
      tb_write!(session.buffer, "File selected:{}\n", canonical);
    }
    None => {
      session.buffer.append_line("Error: Could not find file");
    }
  }

  Ok(())
}

/// The per-command effect table of spec §4.C, exhaustive for the
/// commands this core handles.
fn dispatch_command_effects(session: &mut Session, port: &mut dyn PortHandler, reply: &DeviceReply) -> Result<()> {
  match reply.command {
    cmd::CLEAR_BUFFER | cmd::ABORT | cmd::RESET => {
      session.wait.waiting = 0;
      session.wait.bot_cancel = true;
    }

    cmd::TOOL_QUERY => dispatch_tool_query(session, reply),

    cmd::IS_READY => {
      if let ReplyPayload::IsReady(ready) = &reply.payload {
        if *ready {
          session.wait.empty_queue = false;
          session.wait.button = false;

          if session.flags.get_pos_when_ready {
            session.send(port, DeviceCommand::simple(cmd::EXTENDED_POSITION))?;
            session.flags.get_pos_when_ready = false;
          }
        }
      }
    }

    cmd::BEGIN_SD_CAPTURE => {
      let name = session.invocation.sd_capture_name.clone().unwrap_or_default();
      tb_write!(session.buffer, "Writing to file: {}\n", name);
    }

    cmd::END_SD_CAPTURE => {
      session.buffer.append_line("Done saving file");
    }

    cmd::START_SD_PLAYBACK => {
      if let ReplyPayload::PlaybackStart(code) = &reply.payload {
        if *code == 7 {
          session.buffer.append_line("Error: Could not find file");
        } else {
          reset_buffer_wait(session);
          session.deadline = Some(Instant::now() + crate::build_status::START_GRACE);
          session.wait.start = true;
        }
      }
    }

    cmd::NEXT_FILENAME => dispatch_next_filename(session, reply),

    cmd::EXTENDED_POSITION => dispatch_extended_position(session, reply),

    cmd::MOTHERBOARD_STATUS => {
      if let ReplyPayload::MotherboardStatus(bits) = &reply.payload {
        let bits = *bits;
        if bits == 0 {
          session.wait.button = false;
        } else if bits & mb_status::BUILD_CANCELLING != 0 {
          handle_cancel_event(session, "Build cancelled");
        } else if bits & mb_status::HEAT_SHUTDOWN != 0 {
          reset_buffer_wait(session);
          handle_cancel_event(session, "Error: Heaters were shutdown after 30 minutes of inactivity");
        } else if bits & mb_status::POWER_ERROR != 0 {
          reset_buffer_wait(session);
          handle_cancel_event(session, "Error: X3G power error");
        }
      }
    }

    cmd::BUILD_STATISTICS => {
      if let ReplyPayload::BuildStatistics { status, line } = &reply.payload {
        let (status, line) = (*status, *line);
        let outcome = build_status::evaluate(session, status, line, session.invocation.triggered_by_m27, Instant::now());
        match outcome {
          BuildStatusOutcome::Suppressed => {}
          BuildStatusOutcome::Lines(lines) | BuildStatusOutcome::CanceledThenFinished(lines) => {
            for line in lines {
              session.buffer.append_line(&line);
            }
          }
        }
      }
    }

    cmd::ADVANCED_VERSION => {
      if let ReplyPayload::AdvancedVersion { variant, version } = &reply.payload {
        let (variant, version) = (*variant, *version);
        let major = version / 100;
        let minor = version % 100;

        if session.invocation.triggered_by_m115 {
          tb_write!(
            session.buffer,
            "PROTOCOL_VERSION:0.1 FIRMWARE_NAME:{} FIRMWARE_VERSION:{}.{} FIRMWARE_URL:{} MACHINE_TYPE:{} EXTRUDER_COUNT:{}\n",
            variant.name(),
            major,
            minor,
            variant.url(),
            session.profile.machine_type,
            session.profile.extruder_count
          );
        } else {
          tb_write!(session.buffer, "{}.{}\n", major, minor);
        }
      }
    }

    cmd::WAIT_FOR_EXTRUDER => {
      reset_buffer_wait(session);
      session.wait.empty_queue = true;
      *session.wait.extruder_flag_mut(reply.tool.unwrap_or(0)) = true;
    }

    cmd::WAIT_FOR_PLATFORM => {
      reset_buffer_wait(session);
      session.wait.empty_queue = true;
      session.wait.platform = true;
    }

    cmd::HOME | cmd::RECALL_HOME | cmd::HOME_OFFSETS => {
      reset_buffer_wait(session);
      session.wait.empty_queue = true;
      session.flags.get_pos_when_ready = true;
    }

    cmd::DELAY => {
      reset_buffer_wait(session);
      session.wait.empty_queue = true;
    }

    cmd::LCD_MESSAGE | cmd::WAIT_FOR_BUTTON => {
      reset_buffer_wait(session);
      session.wait.button = true;
    }

    _ => {}
  }

  Ok(())
}

fn dispatch_tool_query(session: &mut Session, reply: &DeviceReply) {
  let tool = reply.tool.unwrap_or(0);

  match reply.sub_command {
    Some(tool_sub::GET_EXTRUDER_TEMP) => {
      if let ReplyPayload::ExtruderTemp(temp) = &reply.payload {
        let temp = *temp;
        if session.profile.extruder_count > 1 {
          tb_write!(session.buffer, " T{}:{:.0}", tool, temp);
        } else {
          tb_write!(session.buffer, " T:{:.0}", temp);
        }
      }
    }

    Some(tool_sub::IS_EXTRUDER_READY) => {
      if let ReplyPayload::ExtruderReady(ready) = &reply.payload {
        *session.wait.extruder_flag_mut(tool) = !*ready;
      }
    }

    Some(tool_sub::GET_PLATFORM_TEMP) => {
      if let ReplyPayload::PlatformTemp(temp) = &reply.payload {
        tb_write!(session.buffer, " B:{:.0}", *temp);
      }
    }

    Some(tool_sub::GET_EXTRUDER_TARGET) => {
      if let ReplyPayload::ExtruderTarget(target) = &reply.payload {
        let target = *target;
        tb_write!(session.buffer, " /{:.0}", target);
        if target == 0.0 {
          *session.wait.extruder_flag_mut(tool) = false;
        }
      }
    }

    Some(tool_sub::GET_PLATFORM_TARGET) => {
      if let ReplyPayload::PlatformTarget(target) = &reply.payload {
        let target = *target;
        tb_write!(session.buffer, " /{:.0}", target);
        if target == 0.0 {
          session.wait.platform = false;
        }
      }
    }

    Some(tool_sub::IS_PLATFORM_READY) => {
      if let ReplyPayload::PlatformReady(ready) = &reply.payload {
        session.wait.platform = !*ready;
      }
    }

    _ => {}
  }
}

fn dispatch_next_filename(session: &mut Session, reply: &DeviceReply) {
  use crate::session::NextFilenameMode;

  if session.invocation.next_filename_mode == NextFilenameMode::CardCheck {
    if let ReplyPayload::CardCheck(ok) = &reply.payload {
      session.buffer.append_line(if *ok { "SD card ok" } else { "SD init fail" });
    }
    return;
  }

  if let ReplyPayload::NextFilename(name) = &reply.payload {
    // "Begin file list" fires on the first call of a listing regardless
    // of whether that first reply already carries a name or is the
    // empty-listing `None`, so an empty SD card still gets a matched
    // Begin/End pair (spec §8 testable property 6).
    if !session.flags.listing_files {
      session.buffer.append_line("Begin file list");
      session.files.clear();
      session.flags.listing_files = true;
    }

    match name {
      Some(name) => {
        session.buffer.append_line(name);
        session.files.add(name.clone());
      }
      None => {
        session.buffer.append_line("End file list");
        session.flags.listing_files = false;
      }
    }
  }
}

fn dispatch_extended_position(session: &mut Session, reply: &DeviceReply) {
  if let ReplyPayload::ExtendedPosition { x, y, z, a, b } = &reply.payload {
    let (x, y, z, a, b) = (*x, *y, *z, *a, *b);
    let steps = session.profile.steps_per_mm;
    let x_mm = x as f32 / steps[0];
    let y_mm = y as f32 / steps[1];
    let z_mm = z as f32 / steps[2];
    let e_raw = if session.current_tool == 0 { a } else { b };
    let e_axis = if session.current_tool == 0 { 3 } else { 4 };
    let e_mm = e_raw as f32 / steps[e_axis];

    tb_write!(session.buffer, " X:{:.2} Y:{:.2} Z:{:.2} E:{:.2}", x_mm, y_mm, z_mm, e_mm);

    if session.flags.get_pos_when_ready {
      let values = [x, y, z, a, b];
      for (i, value) in values.iter().enumerate() {
        if !session.position_known[i] {
          session.current_position[i] = *value;
          session.position_known[i] = true;
        }
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::device::{BuildStatus, FirmwareVariant};
  use crate::port::MockPortHandler;

  fn session() -> Session {
    Session::initialize(crate::machine_profile::default_profile())
  }

  #[test]
  fn temperature_poll_formats_single_extruder_and_plate() {
    let mut s = session();
    let mut port = MockPortHandler::new();

    let mut temp_reply = DeviceReply::success(cmd::TOOL_QUERY, Some(0), ReplyPayload::ExtruderTemp(205.0));
    temp_reply.sub_command = Some(tool_sub::GET_EXTRUDER_TEMP);
    translate(&mut s, &mut port, &temp_reply).unwrap();

    let mut plate_reply = DeviceReply::success(cmd::TOOL_QUERY, None, ReplyPayload::PlatformTemp(55.0));
    plate_reply.sub_command = Some(tool_sub::GET_PLATFORM_TEMP);
    translate(&mut s, &mut port, &plate_reply).unwrap();

    assert_eq!(s.buffer.as_str(), " T:205 B:55");
  }

  #[test]
  fn multi_extruder_profile_includes_tool_index() {
    let mut s = Session::initialize(crate::machine_profile::lookup("replicator2x"));
    let mut port = MockPortHandler::new();

    let mut reply = DeviceReply::success(cmd::TOOL_QUERY, Some(0), ReplyPayload::ExtruderTemp(205.0));
    reply.sub_command = Some(tool_sub::GET_EXTRUDER_TEMP);
    translate(&mut s, &mut port, &reply).unwrap();

    assert_eq!(s.buffer.as_str(), " T0:205");
  }

  #[test]
  fn select_file_matches_case_insensitively_and_rewrites_canonical_name() {
    let mut s = session();
    s.files.add("ABC.gco");

    translate_select_file(&mut s, "abc.gco").unwrap();

    assert_eq!(s.buffer.as_str(), "File opened:ABC.gco Size:0\nFile selected:ABC.gco\n");
  }

  #[test]
  fn select_file_reports_not_found() {
    let mut s = session();

    translate_select_file(&mut s, "missing.gco").unwrap();

    assert_eq!(s.buffer.as_str(), "Error: Could not find file\n");
  }

  #[test]
  fn file_listing_emits_begin_entries_and_end_markers() {
    let mut s = session();
    let mut port = MockPortHandler::new();

    for name in ["ABC.GCO", "robot.x3g"] {
      let reply = DeviceReply::success(cmd::NEXT_FILENAME, None, ReplyPayload::NextFilename(Some(name.to_string())));
      translate(&mut s, &mut port, &reply).unwrap();
    }
    let end = DeviceReply::success(cmd::NEXT_FILENAME, None, ReplyPayload::NextFilename(None));
    translate(&mut s, &mut port, &end).unwrap();

    assert_eq!(s.buffer.as_str(), "Begin file list\nABC.GCO\nrobot.x3g\nEnd file list\n");
    assert_eq!(s.files.len(), 2);
  }

  #[test]
  fn wait_for_extruder_sets_matching_flag_and_empty_queue() {
    let mut s = session();
    let mut port = MockPortHandler::new();

    let reply = DeviceReply::success(cmd::WAIT_FOR_EXTRUDER, Some(1), ReplyPayload::Empty);
    translate(&mut s, &mut port, &reply).unwrap();

    assert!(s.wait.empty_queue);
    assert!(s.wait.extruder_b);
    assert!(!s.wait.extruder_a);
  }

  #[test]
  fn buffer_full_sets_wait_and_emits_status_line() {
    let mut s = session();
    let mut port = MockPortHandler::new();
    let reply = DeviceReply::error(cmd::WAIT_FOR_EXTRUDER, Some(0), 0x82);

    translate(&mut s, &mut port, &reply).unwrap();

    assert!(s.wait.buffer);
    assert_eq!(s.buffer.as_str(), "Status: Buffer full\n");
  }

  #[test]
  fn self_requested_cancel_is_consumed_silently() {
    let mut s = session();
    s.wait.bot_cancel = true;
    let mut port = MockPortHandler::new();
    let reply = DeviceReply::error(cmd::WAIT_FOR_EXTRUDER, Some(0), 0x89);

    translate(&mut s, &mut port, &reply).unwrap();

    assert!(!s.wait.bot_cancel);
    assert!(s.buffer.is_empty());
    assert!(!s.flags.cancel_pending);
  }

  #[test]
  fn device_initiated_cancel_resets_session_and_emits_message() {
    let mut s = session();
    s.wait.platform = true;
    let mut port = MockPortHandler::new();
    let reply = DeviceReply::error(cmd::WAIT_FOR_EXTRUDER, Some(0), 0x89);

    translate(&mut s, &mut port, &reply).unwrap();

    assert!(s.flags.cancel_pending);
    assert!(s.flags.wait_cleared_by_cancel);
    assert!(s.wait.empty_queue);
    assert!(!s.wait.platform);
    assert_eq!(s.buffer.as_str(), "Build cancelled\n");
  }

  #[test]
  fn cancel_pending_drops_queueable_replies_silently() {
    let mut s = session();
    s.flags.cancel_pending = true;
    let mut port = MockPortHandler::new();
    let reply = DeviceReply::success(cmd::WAIT_FOR_EXTRUDER, Some(0), ReplyPayload::Empty);

    translate(&mut s, &mut port, &reply).unwrap();

    assert!(s.buffer.is_empty());
    assert!(!s.wait.empty_queue);
  }

  #[test]
  fn advanced_version_formats_m115_identity_line() {
    let mut s = session();
    s.invocation.triggered_by_m115 = true;
    let mut port = MockPortHandler::new();
    let reply = DeviceReply::success(
      cmd::ADVANCED_VERSION,
      None,
      ReplyPayload::AdvancedVersion { variant: FirmwareVariant::from_byte(0x80), version: 723 },
    );

    translate(&mut s, &mut port, &reply).unwrap();

    assert_eq!(
      s.buffer.as_str(),
      "PROTOCOL_VERSION:0.1 FIRMWARE_NAME:Sailfish FIRMWARE_VERSION:7.23 FIRMWARE_URL:http://www.sailfishfirmware.com MACHINE_TYPE:replicator EXTRUDER_COUNT:1\n"
    );
  }

  #[test]
  fn build_statistics_suppressed_before_start_deadline() {
    let mut s = session();
    s.wait.start = true;
    s.deadline = Some(Instant::now() + std::time::Duration::from_secs(2));
    let mut port = MockPortHandler::new();
    let reply =
      DeviceReply::success(cmd::BUILD_STATISTICS, None, ReplyPayload::BuildStatistics { status: BuildStatus::None, line: 0 });

    translate(&mut s, &mut port, &reply).unwrap();

    assert!(s.buffer.is_empty());
  }

  #[test]
  fn unhandled_error_code_surfaces_as_error() {
    let mut s = session();
    let mut port = MockPortHandler::new();
    let reply = DeviceReply::error(cmd::TOOL_QUERY, Some(0), 0x84);

    let result = translate(&mut s, &mut port, &reply);

    assert!(matches!(result, Err(Error::PktTooBig)));
  }
}
