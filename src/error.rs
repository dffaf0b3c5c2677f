use std::io;

use err_derive::Error;

/// Error taxonomy for the bridge (spec §7). Each variant formats to the
/// exact host-visible `Error: ...` text the line dispatcher writes
/// upstream, except where noted.
#[derive(Debug, Error)]
#[error(no_from)]
pub enum Error {
  /// Failed open/read/write on the downstream serial port.
  #[error(display = "Error: OS error trying to access X3G port")]
  OsError(#[error(source)] io::Error),

  /// Failed open/read/write/link on the upstream pseudo-terminal.
  #[error(display = "Error: OS error trying to access upstream pty")]
  PtyError(#[error(source)] nix::Error),

  /// Logic/parser error raised by the external command parser.
  #[error(display = "Error: GPX error")]
  GpxError(String),

  /// Serial transport fault, distinguished by `SioKind` as in §7.
  #[error(display = "Error: Serial communication error on X3G port. code = {}", code)]
  SioError {
    kind: SioKind,
    code: u32,
  },

  #[error(display = "Error: Timeout on X3G port")]
  SioTimeout,

  /// Device packet error, keyed by the device status byte (§7's PKT_*
  /// rows).
  #[error(display = "Error: X3G generic packet error")]
  PktGeneric,

  #[error(display = "Status: Buffer full")]
  PktBufferFull,

  #[error(display = "Error: X3G packet CRC mismatch (resend not implemented)")]
  PktCrc,

  #[error(display = "Error: X3G query packet too large")]
  PktTooBig,

  #[error(display = "Error: X3G unsupported command")]
  PktUnsupported,

  #[error(display = "Error: X3G downstream tool timeout")]
  PktDownstreamTimeout,

  #[error(display = "Error: X3G tool lock timeout")]
  PktToolLock,

  /// Device-initiated cancel (0x89). Only reaches this shape when the
  /// bridge did *not* request the cancel itself; a self-requested
  /// cancel is consumed by the translator and mapped to success before
  /// it ever becomes an `Error`.
  #[error(display = "Build cancelled")]
  PktCancel,

  #[error(display = "SD printing")]
  PktSdPrinting,

  #[error(display = "Error: X3G overheat")]
  PktOverheat,

  #[error(display = "Error: X3G generic timeout")]
  PktTimeout,

  #[error(display = "invalid baud rate: {}", _0)]
  InvalidBaud(u32),

  #[error(display = "string table index out of range: {}", _0)]
  StringTableIndex(usize),
}

/// Sub-kind of a `Error::SioError`, mirroring the four SIO_* rows of §7.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SioKind {
  Write,
  Read,
  Frame,
  Crc,
}

impl Error {
  /// Maps a device status byte (the first byte of a reply packet, per
  /// §6/§7) to the matching `Error` variant, or `None` for the success
  /// byte (0x00/0x01, handled by the caller before this is consulted).
  pub fn from_device_status(status: u8) -> Option<Error> {
    match status {
      0x80 => Some(Error::PktGeneric),
      0x82 => Some(Error::PktBufferFull),
      0x83 => Some(Error::PktCrc),
      0x84 => Some(Error::PktTooBig),
      0x85 => Some(Error::PktUnsupported),
      0x87 => Some(Error::PktDownstreamTimeout),
      0x88 => Some(Error::PktToolLock),
      0x89 => Some(Error::PktCancel),
      0x8A => Some(Error::PktSdPrinting),
      0x8B => Some(Error::PktOverheat),
      0x8C => Some(Error::PktTimeout),
      _ => None,
    }
  }

  /// True for statuses the dispatcher should still recover from (buffer
  /// full is retried by the caller, per §7's Recovery note).
  pub fn is_recoverable(&self) -> bool {
    matches!(self, Error::PktBufferFull)
  }
}

pub type Result<T> = std::result::Result<T, Error>;
