//! Bidirectional bridge between a line-oriented, gcode-like host
//! protocol and a packetized binary 3D-printer device protocol (see
//! `SPEC_FULL.md`). The core translates device replies into host text
//! and drives the wait-state machinery that decides when a host line
//! has earned its trailing `ok`; the host-line parser, device codec,
//! serial transport, and machine-profile registry are external
//! collaborators this crate only defines trait seams for.

#[macro_use]
extern crate log;

mod build_status;
mod daemon;
mod device;
mod dispatcher;
mod error;
mod machine_profile;
mod parser;
mod port;
mod session;
mod string_table;
mod translation_buffer;
mod translator;
mod wait_state;

pub use build_status::BuildStatusOutcome;
pub use daemon::DaemonPort;
pub use device::{cmd, is_queueable, tool_sub, BuildStatus, DeviceReply, FirmwareVariant, ReplyPayload, ReplyStatus, VALVE_TOOL_INDEX};
pub use dispatcher::LineDispatcher;
pub use error::{Error, Result, SioKind};
pub use machine_profile::{default_profile, lookup as lookup_profile, MachineProfile};
pub use parser::{CommandParser, GcodeParser};
pub use port::{open_serial_port, DeviceCommand, MockPortHandler, PortHandler, SerialPortHandler};
pub use session::{InvocationContext, NextFilenameMode, RetryConfig, Session};
pub use string_table::StringTable;
pub use translation_buffer::{TranslationBuffer, BUFFER_MAX};
pub use wait_state::{SessionFlags, WaitFlags};
