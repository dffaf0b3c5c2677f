//! Daemon entry point (spec §6 "Configuration / CLI (out of core)"):
//! wires a `Session`, the reference `GcodeParser`, a serial
//! `PortHandler`, and the pty `DaemonPort` together and runs the
//! bridge until the upstream pty closes.

use std::process::exit;

use log::{error, info};
use structopt::StructOpt;

use gpx_bridge::{
  default_profile, lookup_profile, open_serial_port, DaemonPort, GcodeParser, LineDispatcher, PortHandler, Session,
  SerialPortHandler,
};

#[derive(Debug, StructOpt)]
#[structopt(name = "gpx-bridged", about = "bridges a gcode-like host protocol to a binary 3D-printer device protocol")]
struct Opt {
  /// path at which the upstream pseudo-terminal is made available
  upstream_name: String,

  /// serial device the printer is attached to
  downstream_port: String,

  /// baud rate; 0 selects the device protocol's default (115200)
  #[structopt(long, default_value = "0")]
  baud: u32,

  /// named machine profile (falls back to the default profile if unknown)
  #[structopt(long)]
  machine_profile: Option<String>,
}

fn main() {
  let env = env_logger::Env::default().filter_or("GPX_BRIDGE_LOG", "info");
  env_logger::Builder::from_env(env).target(env_logger::Target::Stderr).init();

  let opt = Opt::from_args();

  if let Err(e) = run(opt) {
    error!("{}", e);
    exit(1);
  }
}

fn run(opt: Opt) -> anyhow::Result<()> {
  let profile = match &opt.machine_profile {
    Some(name) => lookup_profile(name),
    None => default_profile(),
  };

  let baud = Session::resolve_baud(opt.baud)?;
  let serial_port = open_serial_port(&opt.downstream_port, baud)?;
  let mut port: Box<dyn PortHandler> = Box::new(SerialPortHandler::new(serial_port));

  let session = Session::initialize(profile);
  let dispatcher = LineDispatcher::new(session, GcodeParser::new());

  let mut daemon = DaemonPort::open(&opt.upstream_name, opt.baud, dispatcher)?;
  info!("gpx-bridged listening on {}", opt.upstream_name);

  daemon.run(port.as_mut())?;

  Ok(())
}
