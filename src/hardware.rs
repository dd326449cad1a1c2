use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Errors reported by a [`Hardware`] backend.
#[derive(Debug, Error)]
pub enum HardwareError {
    #[error("failed to connect to {port} at {baudrate} baud: {reason}")]
    Connection {
        port: String,
        baudrate: u32,
        reason: String,
    },

    #[error("failed to load config file {path}: {reason}")]
    Config { path: String, reason: String },

    #[error("write to {target} failed: {reason}")]
    Write { target: String, reason: String },

    #[error("unknown group '{0}'")]
    UnknownGroup(String),

    #[error("unknown joint {0}")]
    UnknownJoint(String),

    #[error("not connected")]
    NotConnected,

    #[error("no config file loaded")]
    ConfigNotLoaded,

    #[error("group '{group}' has {expected} joints but {actual} positions were given")]
    PoseLength {
        group: String,
        expected: usize,
        actual: usize,
    },
}

/// Position-control PID gains, always written together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PidGain {
    pub p: u16,
    pub i: u16,
    pub d: u16,
}

impl PidGain {
    /// Stiff holding gain used while the arm is commanded.
    pub const HOLD: PidGain = PidGain::new(800, 0, 0);
    /// Low gain that lets the arm go limp before torque is cut.
    pub const RELAX: PidGain = PidGain::new(5, 0, 0);

    pub const fn new(p: u16, i: u16, d: u16) -> Self {
        Self { p, i, d }
    }
}

impl fmt::Display for PidGain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.i, self.d)
    }
}

/// A single joint, addressed either by servo id or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JointRef<'a> {
    Id(u8),
    Name(&'a str),
}

impl From<u8> for JointRef<'_> {
    fn from(id: u8) -> Self {
        JointRef::Id(id)
    }
}

impl<'a> From<&'a str> for JointRef<'a> {
    fn from(name: &'a str) -> Self {
        JointRef::Name(name)
    }
}

impl fmt::Display for JointRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JointRef::Id(id) => write!(f, "ID:{}", id),
            JointRef::Name(name) => write!(f, "{}", name),
        }
    }
}

/// Servo bus abstraction the sequencer drives.
///
/// Angles are radians, velocities rad/s, accelerations rad/s^2.
/// `set_position` / `set_positions` only stage goals; nothing moves until
/// `sync_write` sends the staged goals of a group in one packet.
pub trait Hardware {
    fn connect(&mut self, port: &str, baudrate: u32) -> Result<(), HardwareError>;

    fn load_config_file(&mut self, path: &Path) -> Result<(), HardwareError>;

    fn write_max_acceleration_to_group(
        &mut self,
        group: &str,
        acceleration: f64,
    ) -> Result<(), HardwareError>;

    fn write_max_velocity_to_group(&mut self, group: &str, velocity: f64)
        -> Result<(), HardwareError>;

    fn write_position_pid_gain_to_group(
        &mut self,
        group: &str,
        gain: PidGain,
    ) -> Result<(), HardwareError>;

    fn write_position_pid_gain(
        &mut self,
        joint: JointRef<'_>,
        gain: PidGain,
    ) -> Result<(), HardwareError>;

    fn torque_on(&mut self, group: &str) -> Result<(), HardwareError>;

    fn torque_off(&mut self, group: &str) -> Result<(), HardwareError>;

    fn set_position(&mut self, joint: &str, position: f64) -> Result<(), HardwareError>;

    fn set_positions(&mut self, group: &str, positions: &[f64]) -> Result<(), HardwareError>;

    fn sync_write(&mut self, group: &str) -> Result<(), HardwareError>;

    /// Closes the session. Calling it twice is harmless.
    fn disconnect(&mut self);
}
