//! The device-protocol packet encoder/decoder and transport (spec §1,
//! §6: "external collaborator... performs framing, CRC, retries").
//! Opaque to the core translator, which only ever sees a decoded
//! `DeviceReply`; this module is the interface-level stand-in plus a
//! real serial-backed implementation and a test mock, grounded on the
//! teacher's own `open_with_settings`/`write_all`/byte-stream read
//! loop in `lib.rs`.

use std::io::{Read, Write};
use std::time::Duration;

use bytes::Buf;
use log::debug;
use serialport::SerialPort;

use crate::device::{cmd, tool_sub, BuildStatus, DeviceReply, FirmwareVariant, ReplyPayload, ReplyStatus};
use crate::error::{Error, Result, SioKind};

/// An outgoing device command: id plus whatever data bytes the
/// specific command needs (spec §4.C's command table; payload
/// contents beyond the id/tool/sub are the encoder's concern and kept
/// opaque here as raw bytes).
#[derive(Debug, Clone)]
pub struct DeviceCommand {
  pub id: u8,
  pub tool: Option<u8>,
  pub sub: Option<u8>,
  pub data: Vec<u8>,
}

impl DeviceCommand {
  pub fn simple(id: u8) -> Self {
    DeviceCommand { id, tool: None, sub: None, data: Vec::new() }
  }

  pub fn tool_query(tool: u8, sub: u8) -> Self {
    DeviceCommand { id: cmd::TOOL_QUERY, tool: Some(tool), sub: Some(sub), data: Vec::new() }
  }

  pub fn with_data(id: u8, data: Vec<u8>) -> Self {
    DeviceCommand { id, tool: None, sub: None, data }
  }

  pub fn wait_for_extruder(tool: u8) -> Self {
    DeviceCommand { id: cmd::WAIT_FOR_EXTRUDER, tool: Some(tool), sub: None, data: Vec::new() }
  }

  pub fn toggle_fan(tool: u8, on: bool) -> Self {
    DeviceCommand { id: cmd::TOGGLE_FAN, tool: Some(tool), sub: None, data: vec![on as u8] }
  }
}

/// The external packet transport, opaque to the translator (spec §6).
/// Implementations own framing, CRC, and retry policy; `send` blocks
/// until a reply is decoded or a transport-level error occurs.
pub trait PortHandler {
  fn send(&mut self, command: &DeviceCommand) -> Result<DeviceReply>;
}

/// Lower 8 bits of the sum of `bytes`, in the teacher's
/// (`util.rs::checksum`) style; the real X3G wire checksum algorithm
/// is the encoder's concern and irrelevant to the translator core.
fn checksum(bytes: &[u8]) -> u8 {
  let sum: u32 = bytes.iter().map(|b| *b as u32).sum();
  sum.to_le_bytes()[0]
}

const PACKET_HEADER: u8 = 0xD5;

fn encode(command: &DeviceCommand) -> Vec<u8> {
  let mut payload = vec![command.id];
  if let Some(tool) = command.tool {
    payload.push(tool);
  }
  if let Some(sub) = command.sub {
    payload.push(sub);
  }
  payload.extend_from_slice(&command.data);

  let mut packet = Vec::with_capacity(payload.len() + 3);
  packet.push(PACKET_HEADER);
  packet.push(payload.len() as u8);
  packet.extend_from_slice(&payload);
  packet.push(checksum(&payload));
  packet
}

/// A serial-backed `PortHandler`, built on the teacher's
/// `serialport`-based open/clone/read/write pattern (`lib.rs::open_sensor`).
pub struct SerialPortHandler {
  port: Box<dyn SerialPort>,
}

impl SerialPortHandler {
  pub fn new(port: Box<dyn SerialPort>) -> Self {
    SerialPortHandler { port }
  }

  fn read_exact_timeout(&mut self, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    self.port.read_exact(&mut buf).map_err(|e| {
      if e.kind() == std::io::ErrorKind::TimedOut {
        Error::SioTimeout
      } else {
        Error::SioError { kind: SioKind::Read, code: e.raw_os_error().unwrap_or(0) as u32 }
      }
    })?;
    Ok(buf)
  }

  fn decode_reply(&mut self, command: &DeviceCommand) -> Result<DeviceReply> {
    let header = self.read_exact_timeout(1)?;
    if header[0] != PACKET_HEADER {
      return Err(Error::SioError { kind: SioKind::Frame, code: header[0] as u32 });
    }

    let len = self.read_exact_timeout(1)?[0] as usize;
    let payload = self.read_exact_timeout(len)?;
    let received_checksum = self.read_exact_timeout(1)?[0];

    if checksum(&payload) != received_checksum {
      return Err(Error::SioError { kind: SioKind::Crc, code: received_checksum as u32 });
    }

    if payload.is_empty() {
      return Err(Error::SioError { kind: SioKind::Frame, code: 0 });
    }

    let status = payload[0];
    if status != 0x00 && status != 0x01 {
      return Ok(DeviceReply::error(command.id, command.tool, status));
    }

    Ok(DeviceReply {
      command: command.id,
      sub_command: command.sub,
      tool: command.tool,
      status: ReplyStatus::Success,
      payload: decode_payload(command, &payload[1..]),
    })
  }
}

/// Decodes a reply's field bytes for the command that provoked it.
/// Wire layout is this reference transport's own invention (spec §6
/// leaves the device protocol opaque to the core); `cmd::NEXT_FILENAME`
/// is deliberately left undecoded since disambiguating its `M20`-
/// listing vs `M21`-card-check shape needs the invoking session's
/// `NextFilenameMode`, which isn't available to a `PortHandler`.
fn decode_payload(command: &DeviceCommand, mut body: &[u8]) -> ReplyPayload {
  match command.id {
    cmd::TOOL_QUERY => match command.sub {
      Some(tool_sub::GET_EXTRUDER_TEMP) if body.remaining() >= 4 => ReplyPayload::ExtruderTemp(body.get_f32_le()),
      Some(tool_sub::IS_EXTRUDER_READY) if body.has_remaining() => ReplyPayload::ExtruderReady(body.get_u8() != 0),
      Some(tool_sub::GET_PLATFORM_TEMP) if body.remaining() >= 4 => ReplyPayload::PlatformTemp(body.get_f32_le()),
      Some(tool_sub::GET_EXTRUDER_TARGET) if body.remaining() >= 4 => ReplyPayload::ExtruderTarget(body.get_f32_le()),
      Some(tool_sub::GET_PLATFORM_TARGET) if body.remaining() >= 4 => ReplyPayload::PlatformTarget(body.get_f32_le()),
      Some(tool_sub::IS_PLATFORM_READY) if body.has_remaining() => ReplyPayload::PlatformReady(body.get_u8() != 0),
      _ => ReplyPayload::Empty,
    },

    cmd::IS_READY if body.has_remaining() => ReplyPayload::IsReady(body.get_u8() != 0),

    cmd::EXTENDED_POSITION if body.remaining() >= 20 => ReplyPayload::ExtendedPosition {
      x: body.get_i32_le(),
      y: body.get_i32_le(),
      z: body.get_i32_le(),
      a: body.get_i32_le(),
      b: body.get_i32_le(),
    },

    cmd::MOTHERBOARD_STATUS if body.has_remaining() => ReplyPayload::MotherboardStatus(body.get_u8()),

    cmd::BUILD_STATISTICS if body.remaining() >= 5 => ReplyPayload::BuildStatistics {
      status: decode_build_status(body.get_u8()),
      line: body.get_u32_le(),
    },

    cmd::ADVANCED_VERSION if body.remaining() >= 3 => ReplyPayload::AdvancedVersion {
      variant: FirmwareVariant::from_byte(body.get_u8()),
      version: body.get_u16_le(),
    },

    cmd::START_SD_PLAYBACK if body.has_remaining() => ReplyPayload::PlaybackStart(body.get_u8()),

    _ => ReplyPayload::Empty,
  }
}

fn decode_build_status(b: u8) -> BuildStatus {
  match b {
    1 => BuildStatus::Running,
    2 => BuildStatus::FinishedNormally,
    3 => BuildStatus::Paused,
    4 => BuildStatus::Canceled,
    5 => BuildStatus::Cancelling,
    _ => BuildStatus::None,
  }
}

impl PortHandler for SerialPortHandler {
  fn send(&mut self, command: &DeviceCommand) -> Result<DeviceReply> {
    let packet = encode(command);
    debug!("sending packet: {:x?}", packet);

    self.port.write_all(&packet).map_err(|e| Error::SioError {
      kind: SioKind::Write,
      code: e.raw_os_error().unwrap_or(0) as u32,
    })?;

    self.decode_reply(command)
  }
}

/// Opens `device` at `baud` with the device-protocol's 8N1 framing and
/// a generous read timeout, matching the teacher's `SerialPortSettings`
/// construction in `lib.rs::open_sensor`.
pub fn open_serial_port(device: &str, baud: u32) -> Result<Box<dyn SerialPort>> {
  let settings = serialport::SerialPortSettings {
    baud_rate: baud,
    data_bits: serialport::DataBits::Eight,
    flow_control: serialport::FlowControl::None,
    parity: serialport::Parity::None,
    stop_bits: serialport::StopBits::One,
    timeout: Duration::from_millis(500),
  };

  serialport::open_with_settings(device, &settings)
    .map_err(|e| Error::OsError(std::io::Error::new(std::io::ErrorKind::Other, e.description)))
}

/// A scripted `PortHandler` used by tests (spec SPEC_FULL's "test
/// tooling" ambient-stack item): replies are queued in the order
/// `send` is expected to be called and popped one at a time.
#[derive(Default)]
pub struct MockPortHandler {
  replies: std::collections::VecDeque<Result<DeviceReply>>,
  pub sent: Vec<DeviceCommand>,
}

impl MockPortHandler {
  pub fn new() -> Self {
    MockPortHandler::default()
  }

  pub fn push_reply(&mut self, reply: Result<DeviceReply>) {
    self.replies.push_back(reply);
  }
}

impl PortHandler for MockPortHandler {
  fn send(&mut self, command: &DeviceCommand) -> Result<DeviceReply> {
    self.sent.push(command.clone());
    let reply = self
      .replies
      .pop_front()
      .unwrap_or_else(|| Ok(DeviceReply::success(command.id, command.tool, ReplyPayload::Empty)));

    // `command`/`tool`/`sub_command` always reflect what was actually
    // sent, same as `SerialPortHandler::decode_reply` stamps them from
    // the outgoing command rather than the wire bytes; a queued reply
    // only supplies the status/payload a test cares about.
    reply.map(|mut r| {
      r.command = command.id;
      r.tool = command.tool;
      r.sub_command = command.sub;
      r
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn encode_places_header_length_payload_checksum() {
    let command = DeviceCommand::simple(cmd::IS_READY);
    let packet = encode(&command);

    assert_eq!(packet[0], PACKET_HEADER);
    assert_eq!(packet[1], 1); // payload is just the command id
    assert_eq!(packet[2], cmd::IS_READY);
    assert_eq!(packet[3], checksum(&[cmd::IS_READY]));
  }

  #[test]
  fn mock_returns_queued_replies_in_order() {
    let mut mock = MockPortHandler::new();
    mock.push_reply(Ok(DeviceReply::success(cmd::IS_READY, None, ReplyPayload::IsReady(true))));
    mock.push_reply(Ok(DeviceReply::error(cmd::WAIT_FOR_EXTRUDER, Some(0), 0x82)));

    let r1 = mock.send(&DeviceCommand::simple(cmd::IS_READY)).unwrap();
    assert!(matches!(r1.payload, ReplyPayload::IsReady(true)));

    let r2 = mock.send(&DeviceCommand::wait_for_extruder(0)).unwrap();
    assert_eq!(r2.status, ReplyStatus::Code(0x82));
  }

  #[test]
  fn decode_payload_reads_little_endian_extruder_temperature() {
    let command = DeviceCommand::tool_query(0, tool_sub::GET_EXTRUDER_TEMP);
    let body = 205.5f32.to_le_bytes();

    let payload = decode_payload(&command, &body);

    assert!(matches!(payload, ReplyPayload::ExtruderTemp(t) if (t - 205.5).abs() < f32::EPSILON));
  }

  #[test]
  fn decode_payload_reads_extended_position() {
    let command = DeviceCommand::simple(cmd::EXTENDED_POSITION);
    let mut body = Vec::new();
    for v in [100i32, 200, 300, 400, 500] {
      body.extend_from_slice(&v.to_le_bytes());
    }

    let payload = decode_payload(&command, &body);

    assert!(matches!(payload, ReplyPayload::ExtendedPosition { x: 100, y: 200, z: 300, a: 400, b: 500 }));
  }
}
