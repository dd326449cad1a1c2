use crate::config::Topology;
use crate::hardware::{Hardware, HardwareError, JointRef, PidGain};
use log::debug;
use rustypot::servo::dynamixel::xl330::Xl330Controller;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::path::Path;
use std::time::Duration;

/// Profile velocity unit: 0.229 RPM per count, expressed in rad/s
const RADS_PER_SEC_PER_COUNT: f64 = 0.229 * (2.0 * PI / 60.0);

/// Profile acceleration unit: 214.577 rev/min^2 per count, expressed in rad/s^2
const RADS_PER_SEC2_PER_COUNT: f64 = 214.577 * (2.0 * PI / 3600.0);

const SERIAL_TIMEOUT: Duration = Duration::from_millis(100);

/// Dynamixel X-series servo bus driven through rustypot (protocol v2).
///
/// Goals staged with `set_position`/`set_positions` are kept per joint and
/// only reach the servos on `sync_write`.
pub struct DynamixelHardware {
    controller: Option<Xl330Controller>,
    topology: Option<Topology>,
    goals: HashMap<String, f64>,
}

impl Default for DynamixelHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamixelHardware {
    pub fn new() -> Self {
        Self {
            controller: None,
            topology: None,
            goals: HashMap::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.controller.is_some()
    }

    fn topology(&self) -> Result<&Topology, HardwareError> {
        self.topology.as_ref().ok_or(HardwareError::ConfigNotLoaded)
    }

    fn group_ids(&self, group: &str) -> Result<Vec<u8>, HardwareError> {
        self.topology()?
            .group_ids(group)
            .ok_or_else(|| HardwareError::UnknownGroup(group.to_string()))
    }

    fn joint_id(&self, joint: JointRef<'_>) -> Result<u8, HardwareError> {
        let topology = self.topology()?;
        match joint {
            JointRef::Id(id) if topology.joint_name(id).is_some() => Ok(id),
            JointRef::Name(name) => topology
                .joint(name)
                .map(|j| j.id)
                .ok_or_else(|| HardwareError::UnknownJoint(joint.to_string())),
            JointRef::Id(_) => Err(HardwareError::UnknownJoint(joint.to_string())),
        }
    }

    /// Apply `write` to every servo id of `ids`, even after a failure.
    fn write_each<F>(&mut self, target: &str, ids: &[u8], mut write: F) -> Result<(), HardwareError>
    where
        F: FnMut(&mut Xl330Controller, u8) -> Result<(), String>,
    {
        let controller = self.controller.as_mut().ok_or(HardwareError::NotConnected)?;
        write_all(target, ids, |id| write(controller, id))
    }

    fn write_gain(&mut self, target: &str, ids: &[u8], gain: PidGain) -> Result<(), HardwareError> {
        self.write_each(target, ids, |c, id| {
            c.write_position_p_gain(id, gain.p)
                .map_err(|e| format!("P gain: {}", e))?;
            c.write_position_i_gain(id, gain.i)
                .map_err(|e| format!("I gain: {}", e))?;
            c.write_position_d_gain(id, gain.d)
                .map_err(|e| format!("D gain: {}", e))
        })
    }

    fn set_torque(&mut self, group: &str, enable: bool) -> Result<(), HardwareError> {
        let ids = self.group_ids(group)?;
        self.write_each(group, &ids, |c, id| {
            c.write_torque_enable(id, enable).map_err(|e| e.to_string())
        })
    }
}

/// Run `write` for each id and fold every failure into one error naming the
/// ids that failed.
fn write_all<F>(target: &str, ids: &[u8], mut write: F) -> Result<(), HardwareError>
where
    F: FnMut(u8) -> Result<(), String>,
{
    let failures: Vec<(u8, String)> = ids
        .iter()
        .filter_map(|&id| write(id).err().map(|reason| (id, reason)))
        .collect();

    if failures.is_empty() {
        return Ok(());
    }

    let failed_ids: Vec<String> = failures.iter().map(|(id, _)| id.to_string()).collect();
    let reasons: Vec<String> = failures
        .iter()
        .map(|(id, reason)| format!("ID:{}: {}", id, reason))
        .collect();
    Err(HardwareError::Write {
        target: format!("{} (ID:{})", target, failed_ids.join(",")),
        reason: reasons.join("; "),
    })
}

/// Convert a rate limit to profile register counts, 0 being "unlimited" on
/// the servo side and therefore never produced here.
fn to_profile_counts(value: f64, unit: f64) -> Option<u32> {
    if !value.is_finite() || value <= 0.0 {
        return None;
    }
    Some((value / unit).round().clamp(1.0, u32::MAX as f64) as u32)
}

impl Hardware for DynamixelHardware {
    fn connect(&mut self, port: &str, baudrate: u32) -> Result<(), HardwareError> {
        let serial_port = serialport::new(port, baudrate)
            .timeout(SERIAL_TIMEOUT)
            .open()
            .map_err(|e| HardwareError::Connection {
                port: port.to_string(),
                baudrate,
                reason: e.to_string(),
            })?;

        let controller = Xl330Controller::new()
            .with_protocol_v2()
            .with_serial_port(serial_port);

        self.controller = Some(controller);
        debug!("Opened {} at {} baud", port, baudrate);
        Ok(())
    }

    fn load_config_file(&mut self, path: &Path) -> Result<(), HardwareError> {
        let topology = Topology::load(path).map_err(|e| HardwareError::Config {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.topology = Some(topology);
        self.goals.clear();
        Ok(())
    }

    fn write_max_acceleration_to_group(
        &mut self,
        group: &str,
        acceleration: f64,
    ) -> Result<(), HardwareError> {
        let ids = self.group_ids(group)?;
        let counts = to_profile_counts(acceleration, RADS_PER_SEC2_PER_COUNT).ok_or_else(|| {
            HardwareError::Write {
                target: group.to_string(),
                reason: format!("invalid acceleration limit {}", acceleration),
            }
        })?;
        debug!("{}: profile acceleration {} counts", group, counts);
        self.write_each(group, &ids, |c, id| {
            c.write_profile_acceleration(id, counts).map_err(|e| e.to_string())
        })
    }

    fn write_max_velocity_to_group(
        &mut self,
        group: &str,
        velocity: f64,
    ) -> Result<(), HardwareError> {
        let ids = self.group_ids(group)?;
        let counts = to_profile_counts(velocity, RADS_PER_SEC_PER_COUNT).ok_or_else(|| {
            HardwareError::Write {
                target: group.to_string(),
                reason: format!("invalid velocity limit {}", velocity),
            }
        })?;
        debug!("{}: profile velocity {} counts", group, counts);
        self.write_each(group, &ids, |c, id| {
            c.write_profile_velocity(id, counts).map_err(|e| e.to_string())
        })
    }

    fn write_position_pid_gain_to_group(
        &mut self,
        group: &str,
        gain: PidGain,
    ) -> Result<(), HardwareError> {
        let ids = self.group_ids(group)?;
        self.write_gain(group, &ids, gain)
    }

    fn write_position_pid_gain(
        &mut self,
        joint: JointRef<'_>,
        gain: PidGain,
    ) -> Result<(), HardwareError> {
        let id = self.joint_id(joint)?;
        self.write_gain(&joint.to_string(), &[id], gain)
    }

    fn torque_on(&mut self, group: &str) -> Result<(), HardwareError> {
        self.set_torque(group, true)
    }

    fn torque_off(&mut self, group: &str) -> Result<(), HardwareError> {
        self.set_torque(group, false)
    }

    fn set_position(&mut self, joint: &str, position: f64) -> Result<(), HardwareError> {
        if self.topology()?.joint(joint).is_none() {
            return Err(HardwareError::UnknownJoint(joint.to_string()));
        }
        self.goals.insert(joint.to_string(), position);
        Ok(())
    }

    fn set_positions(&mut self, group: &str, positions: &[f64]) -> Result<(), HardwareError> {
        let members = self
            .topology()?
            .group(group)
            .ok_or_else(|| HardwareError::UnknownGroup(group.to_string()))?;

        if members.len() != positions.len() {
            return Err(HardwareError::PoseLength {
                group: group.to_string(),
                expected: members.len(),
                actual: positions.len(),
            });
        }

        let staged: Vec<(String, f64)> = members
            .iter()
            .cloned()
            .zip(positions.iter().copied())
            .collect();
        self.goals.extend(staged);
        Ok(())
    }

    fn sync_write(&mut self, group: &str) -> Result<(), HardwareError> {
        let members = self
            .topology()?
            .group(group)
            .ok_or_else(|| HardwareError::UnknownGroup(group.to_string()))?;

        let mut positions = Vec::with_capacity(members.len());
        for joint in members {
            let goal = self.goals.get(joint).copied().ok_or_else(|| HardwareError::Write {
                target: group.to_string(),
                reason: format!("no goal position staged for {}", joint),
            })?;
            positions.push(goal);
        }

        let ids = self.group_ids(group)?;
        let controller = self.controller.as_mut().ok_or(HardwareError::NotConnected)?;
        controller
            .sync_write_goal_position(&ids, &positions)
            .map_err(|e| HardwareError::Write {
                target: group.to_string(),
                reason: e.to_string(),
            })
    }

    fn disconnect(&mut self) {
        if self.controller.take().is_some() {
            debug!("Serial port closed");
        }
    }
}
