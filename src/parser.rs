//! The host-line command parser (spec §1/§6: "external collaborator,
//! interface only"). The real parser is out of scope for this core —
//! it is whatever turns a line of host gcode into the right sequence
//! of `Session::send` calls — but a minimal reference implementation
//! is included so the crate is runnable end to end and so the §8
//! end-to-end scenarios have something concrete driving them,
//! following the teacher's `sds011_tool.rs` dispatch-by-enum-variant
//! shape (matched here on the parsed command word instead of a CLI
//! subcommand).

use crate::device::{cmd, tool_sub};
use crate::error::Result;
use crate::port::DeviceCommand;
use crate::session::{NextFilenameMode, Session};
use crate::translator;

/// The out-of-scope host-line parser's interface (spec §4.D: "submits
/// to the command parser. It may call back into the Response
/// Translator zero or more times"). `Session::send` is exactly that
/// callback.
pub trait CommandParser {
  fn dispatch(&mut self, session: &mut Session, port: &mut dyn crate::port::PortHandler, line: &str) -> Result<()>;
}

/// A deliberately small reference gcode parser. Only the commands
/// named in spec §6/§8 are understood; anything else is a silent
/// no-op, since a full gcode grammar is explicitly out of scope (spec
/// §1 Non-goals: "interpreting the slicing semantics of the host
/// protocol").
#[derive(Debug, Default)]
pub struct GcodeParser;

impl GcodeParser {
  pub fn new() -> Self {
    GcodeParser
  }
}

impl CommandParser for GcodeParser {
  fn dispatch(&mut self, session: &mut Session, port: &mut dyn crate::port::PortHandler, line: &str) -> Result<()> {
    let line = strip_comment(line).trim();
    if line.is_empty() {
      return Ok(());
    }

    if line == "@clear_cancel" {
      session.wait.empty_queue = true;
      session.flags.cancel_pending = false;
      return Ok(());
    }

    let mut words = line.split_whitespace();
    let word = match words.next() {
      Some(w) => w,
      None => return Ok(()),
    };
    let rest: Vec<&str> = words.collect();

    match word {
      "M105" => dispatch_temperature_poll(session, port),
      "M109" => dispatch_wait_for_extruder(session, port),
      "M104" => Ok(()), // set-only; no device equivalent tracked by this core
      "M106" => dispatch_fan(session, port, true),
      "M107" => dispatch_fan(session, port, false),
      "M190" => dispatch_wait_for_platform(session, port),
      "M20" => dispatch_file_listing(session, port),
      "M21" => dispatch_card_check(session, port),
      "M23" => dispatch_select_file(session, rest.first().copied().unwrap_or("")),
      "M27" => dispatch_build_status(session, port),
      "M115" => dispatch_identify(session, port),
      "G28" => dispatch_home(session, port),
      _ => Ok(()),
    }
  }
}

fn strip_comment(line: &str) -> &str {
  match line.find(';') {
    Some(idx) => &line[..idx],
    None => line,
  }
}

fn dispatch_temperature_poll(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  let extruder_count = session.profile.extruder_count;
  for tool in 0..extruder_count {
    session.send(port, DeviceCommand::tool_query(tool, tool_sub::GET_EXTRUDER_TEMP))?;
  }
  session.send(port, DeviceCommand::tool_query(0, tool_sub::GET_PLATFORM_TEMP))
}

fn dispatch_wait_for_extruder(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.send(port, DeviceCommand::wait_for_extruder(session.current_tool))
}

fn dispatch_wait_for_platform(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.send(port, DeviceCommand::simple(cmd::WAIT_FOR_PLATFORM))
}

/// `M106`/`M107` (fan on/off), honoring the fan/valve emulation quirk
/// enabled at `Session::initialize` (spec §4.E): when set, the fan
/// command always targets the valve output rather than the tool's own
/// fan, regardless of which tool is current.
fn dispatch_fan(session: &mut Session, port: &mut dyn crate::port::PortHandler, on: bool) -> Result<()> {
  let tool = if session.fan_targets_valve { crate::device::VALVE_TOOL_INDEX } else { session.current_tool };
  session.send(port, DeviceCommand::toggle_fan(tool, on))
}

fn dispatch_home(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.send(port, DeviceCommand::simple(cmd::HOME))
}

fn dispatch_file_listing(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.invocation.next_filename_mode = NextFilenameMode::Listing;
  loop {
    session.send(port, DeviceCommand::simple(cmd::NEXT_FILENAME))?;
    if !session.flags.listing_files {
      break;
    }
  }
  Ok(())
}

fn dispatch_card_check(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.invocation.next_filename_mode = NextFilenameMode::CardCheck;
  session.send(port, DeviceCommand::simple(cmd::NEXT_FILENAME))
}

fn dispatch_select_file(session: &mut Session, name: &str) -> Result<()> {
  translator::translate_select_file(session, name)
}

fn dispatch_build_status(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.invocation.triggered_by_m27 = true;
  let result = session.send(port, DeviceCommand::simple(cmd::BUILD_STATISTICS));
  session.invocation.triggered_by_m27 = false;
  result
}

fn dispatch_identify(session: &mut Session, port: &mut dyn crate::port::PortHandler) -> Result<()> {
  session.invocation.triggered_by_m115 = true;
  let result = session.send(port, DeviceCommand::simple(cmd::ADVANCED_VERSION));
  session.invocation.triggered_by_m115 = false;
  result
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::device::{DeviceReply, FirmwareVariant, ReplyPayload};
  use crate::port::MockPortHandler;

  fn session() -> Session {
    Session::initialize(crate::machine_profile::default_profile())
  }

  #[test]
  fn m105_polls_extruder_and_platform_temperature() {
    let mut s = session();
    let mut port = MockPortHandler::new();
    port.push_reply(Ok(DeviceReply::success(cmd::TOOL_QUERY, Some(0), ReplyPayload::ExtruderTemp(205.0))));
    port.push_reply(Ok(DeviceReply::success(cmd::TOOL_QUERY, None, ReplyPayload::PlatformTemp(55.0))));

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "M105\n").unwrap();

    assert_eq!(s.buffer.as_str(), " T:205 B:55");
  }

  #[test]
  fn m23_selects_file_with_no_device_round_trip() {
    let mut s = session();
    s.files.add("ABC.gco");
    let mut port = MockPortHandler::new();

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "M23 abc.gco\n").unwrap();

    assert_eq!(s.buffer.as_str(), "File opened:ABC.gco Size:0\nFile selected:ABC.gco\n");
    assert!(port.sent.is_empty());
  }

  #[test]
  fn m115_decodes_firmware_identity() {
    let mut s = session();
    let mut port = MockPortHandler::new();
    port.push_reply(Ok(DeviceReply::success(
      cmd::ADVANCED_VERSION,
      None,
      ReplyPayload::AdvancedVersion { variant: FirmwareVariant::from_byte(0x01), version: 100 },
    )));

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "M115\n").unwrap();

    assert!(s.buffer.as_str().starts_with("PROTOCOL_VERSION:0.1 FIRMWARE_NAME:Makerbot"));
  }

  #[test]
  fn clear_cancel_pseudo_command_acks_device_cancel() {
    let mut s = session();
    s.flags.cancel_pending = true;
    let mut port = MockPortHandler::new();

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "@clear_cancel").unwrap();

    assert!(!s.flags.cancel_pending);
    assert!(s.wait.empty_queue);
  }

  #[test]
  fn fan_command_targets_valve_when_quirk_enabled() {
    let mut s = session();
    assert!(s.fan_targets_valve);
    let mut port = MockPortHandler::new();

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "M106\n").unwrap();

    assert_eq!(port.sent.len(), 1);
    assert_eq!(port.sent[0].id, cmd::TOGGLE_FAN);
    assert_eq!(port.sent[0].tool, Some(crate::device::VALVE_TOOL_INDEX));
    assert_eq!(port.sent[0].data, vec![1u8]);
  }

  #[test]
  fn fan_off_targets_current_tool_when_quirk_disabled() {
    let mut s = session();
    s.fan_targets_valve = false;
    s.current_tool = 1;
    let mut port = MockPortHandler::new();

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "M107\n").unwrap();

    assert_eq!(port.sent[0].tool, Some(1));
    assert_eq!(port.sent[0].data, vec![0u8]);
  }

  #[test]
  fn comment_only_line_is_a_no_op() {
    let mut s = session();
    let mut port = MockPortHandler::new();

    let mut parser = GcodeParser::new();
    parser.dispatch(&mut s, &mut port, "; just a comment\n").unwrap();

    assert!(s.buffer.is_empty());
    assert!(port.sent.is_empty());
  }
}
