//! Daemon Port (spec §4.F): pairs a pseudo-terminal, emits the startup
//! banner, then drives the read-line / dispatch / write-back loop.
//!
//! The original links two pty pairs through an external helper process
//! and holds the "internal upstream endpoint" itself; per the Open
//! Question decision recorded in `DESIGN.md`, this core creates the
//! pty pair directly with `nix::pty::openpty` and keeps the master end
//! in-process, so there is no helper process, no "_u" symlink, and no
//! post-spawn symlink race to poll for.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use log::{info, warn};
use nix::pty::openpty;
use nix::unistd::ttyname;

use crate::dispatcher::LineDispatcher;
use crate::error::{Error, Result};
use crate::parser::CommandParser;
use crate::port::PortHandler;
use crate::translation_buffer::BUFFER_MAX;

/// A host line may be at most `BUFFER_MAX - 1` bytes before the
/// terminating `\n` (spec §4.F/§6).
const LINE_MAX: usize = BUFFER_MAX - 1;

/// Translates a `std::io::Error` raised while reading/writing the
/// upstream pty into the taxonomy's `PtyError` (spec §7), since
/// `Error::PtyError` carries a `nix::Error` rather than `io::Error`.
fn pty_io_err(e: std::io::Error) -> Error {
  Error::PtyError(nix::errno::Errno::from_i32(e.raw_os_error().unwrap_or(0)))
}

/// Reads one raw line up to `max` bytes or a `\n`, whichever comes
/// first. The second element of the result is `true` iff the line
/// ended in `\n` (a "not full-length" read, in spec §4.F's wording);
/// `false` means the caller hit `max` bytes without seeing a
/// terminator yet. `Ok(None)` signals upstream EOF.
fn read_raw_line<R: Read>(upstream: &mut R, max: usize) -> Result<Option<(Vec<u8>, bool)>> {
  let mut buf = Vec::with_capacity(max.min(64));
  let mut byte = [0u8; 1];

  loop {
    let n = upstream.read(&mut byte).map_err(pty_io_err)?;
    if n == 0 {
      return Ok(None);
    }
    if byte[0] == b'\n' {
      return Ok(Some((buf, true)));
    }

    buf.push(byte[0]);
    if buf.len() == max {
      return Ok(Some((buf, false)));
    }
  }
}

/// Line-buffering state machine for the upstream reader (spec §4.F):
/// swallows an overflowing line's tail rather than ever handing a
/// truncated command to the dispatcher.
struct LineReader {
  overflowed: bool,
  line_no: u64,
}

impl LineReader {
  fn new() -> Self {
    LineReader { overflowed: false, line_no: 0 }
  }

  /// Returns the next complete, non-overflowing host line, or
  /// `Ok(None)` once upstream closes.
  fn next_line<R: Read>(&mut self, upstream: &mut R) -> Result<Option<String>> {
    loop {
      let (raw, hit_newline) = match read_raw_line(upstream, LINE_MAX)? {
        Some(v) => v,
        None => return Ok(None),
      };

      if self.overflowed {
        // still resyncing: a full-length read means the garbage line
        // hasn't ended yet; a short (newline-terminated) read means
        // we just consumed its tail.
        self.overflowed = !hit_newline;
        continue;
      }

      self.line_no += 1;

      if !hit_newline {
        // Either way the real line hasn't actually ended yet upstream;
        // resync against its tail on the next call regardless.
        self.overflowed = true;

        if !raw.contains(&b';') {
          warn!("(line {}) Buffer overflow: {}", self.line_no, String::from_utf8_lossy(&raw));
          continue;
        }

        // A semicolon means the truncated remainder is just a comment
        // (spec §4.F): the command content is already complete, so
        // hand it to the dispatcher instead of discarding it.
      }

      return Ok(Some(String::from_utf8_lossy(&raw).into_owned()));
    }
  }
}

/// Owns the upstream pty pair and drives one host line at a time
/// through a `LineDispatcher` (spec §4.F, §5's single-threaded
/// cooperative model).
pub struct DaemonPort<P> {
  master: File,
  reader: LineReader,
  pub dispatcher: LineDispatcher<P>,
}

impl<P: CommandParser> DaemonPort<P> {
  /// Opens a fresh pty pair, symlinks the slave device at
  /// `upstream_name` for the host application to open, validates
  /// `baud`, and emits the connect banner (`"start\nok\n"`, spec §6).
  pub fn open(upstream_name: &str, baud: u32, mut dispatcher: LineDispatcher<P>) -> Result<Self> {
    let pty = openpty(None, None).map_err(Error::PtyError)?;
    let slave_path = ttyname(&pty.slave).map_err(Error::PtyError)?;
    // Nothing in-process needs the slave fd open; the real consumer
    // is whatever external application opens `upstream_name`.
    drop(pty.slave);

    let link_path = Path::new(upstream_name);
    let _ = std::fs::remove_file(link_path);
    std::os::unix::fs::symlink(&slave_path, link_path).map_err(pty_io_err)?;

    let mut master = File::from(pty.master);
    info!("pty pair created, upstream linked at {} ({})", upstream_name, slave_path.display());

    dispatcher.session.connect(baud)?;
    master.write_all(b"start\nok\n").map_err(pty_io_err)?;

    Ok(DaemonPort { master, reader: LineReader::new(), dispatcher })
  }

  /// Runs the read/dispatch/write-back loop until upstream closes
  /// (spec §4.F). One `port` round-trips to the actual device; tests
  /// pass a `MockPortHandler`.
  pub fn run(&mut self, port: &mut dyn PortHandler) -> Result<()> {
    while let Some(line) = self.reader.next_line(&mut self.master)? {
      let response = self.dispatcher.dispatch(port, &line);
      self.master.write_all(response.as_bytes()).map_err(pty_io_err)?;
      self.master.write_all(b"\n").map_err(pty_io_err)?;
    }

    self.dispatcher.session.cleanup();
    Ok(())
  }
}
