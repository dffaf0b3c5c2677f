//! Minimal stand-in for the machine-profile registry (spec §1/§6: "out
//! of scope / external collaborator"). The core only needs per-axis
//! steps-per-mm (for §4.C's extended-position formatting), the
//! extruder count (for §6's `M115` `EXTRUDER_COUNT`), and a machine
//! type name/firmware URL pair; a full profile/config format is the
//! external registry's concern, not this crate's.

#[derive(Debug, Clone)]
pub struct MachineProfile {
  pub name: &'static str,
  pub machine_type: &'static str,
  pub extruder_count: u8,
  /// steps per millimeter for X, Y, Z, A (extruder 0), B (extruder 1)
  pub steps_per_mm: [f32; 5],
}

impl MachineProfile {
  pub fn steps_per_mm_for_axis(&self, axis: Axis) -> f32 {
    self.steps_per_mm[axis as usize]
  }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Axis {
  X = 0,
  Y = 1,
  Z = 2,
  A = 3,
  B = 4,
}

/// The default profile, enabled at `Session::initialize` (spec §4.E)
/// and restored at `cleanup`.
pub fn default_profile() -> MachineProfile {
  MachineProfile {
    name: "replicator",
    machine_type: "Replicator",
    extruder_count: 1,
    steps_per_mm: [88.75294, 88.75294, 400.0, 96.275, 96.275],
  }
}

/// Looks up a built-in profile by name, falling back to the default
/// profile when unknown. Real profile storage (arbitrary per-machine
/// config files) is the registry's job, out of scope for this core.
pub fn lookup(name: &str) -> MachineProfile {
  match name {
    "replicator2" => MachineProfile {
      name: "replicator2",
      machine_type: "Replicator2",
      extruder_count: 1,
      steps_per_mm: [88.75294, 88.75294, 400.0, 96.275, 96.275],
    },
    "replicator2x" => MachineProfile {
      name: "replicator2x",
      machine_type: "Replicator2X",
      extruder_count: 2,
      steps_per_mm: [88.75294, 88.75294, 400.0, 96.275, 96.275],
    },
    _ => default_profile(),
  }
}
